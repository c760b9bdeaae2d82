use crate::domain::Reading;
use crate::hal::HardwareProvider;
use crate::mood::MoodState;
use crate::presentation::present;

/// Throttled oled updates. A display that fails its startup probe is
/// switched off for the rest of the run; per-frame failures are only logged.
pub struct Display {
    available: bool,
    refresh_interval_ms: u64,
    last_refresh_ms: u64,
}

impl Display {
    pub fn probe<H: HardwareProvider>(
        hal: &H,
        enabled: bool,
        refresh_interval_ms: u64,
        start_ms: u64,
    ) -> Self {
        let available = if !enabled {
            tracing::info!("display disabled in config");
            false
        } else {
            match hal.init_display() {
                Ok(()) => {
                    tracing::info!("OLED initialized");
                    true
                }
                Err(e) => {
                    tracing::warn!("OLED not found ({}), continuing without display", e);
                    false
                }
            }
        };
        Self { available, refresh_interval_ms, last_refresh_ms: start_ms }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Redraw if strictly more than the refresh interval has passed.
    /// Returns whether a frame was drawn.
    pub fn update<H: HardwareProvider>(
        &mut self,
        hal: &H,
        now_ms: u64,
        reading: &Reading,
        mood: MoodState,
    ) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_refresh_ms);
        if !self.available || elapsed <= self.refresh_interval_ms {
            return false;
        }
        if let Err(e) = hal.draw_display(&frame_lines(reading, mood)) {
            tracing::warn!("OLED render failed: {}", e);
        }
        self.last_refresh_ms = now_ms;
        true
    }
}

pub fn frame_lines(reading: &Reading, mood: MoodState) -> Vec<String> {
    let face = present(mood);
    let temp = if reading.temperature_valid() {
        format!("{:.0}C", reading.temperature_c)
    } else {
        "--C".to_string()
    };
    let hum = if reading.humidity_valid() {
        format!("{:.0}%", reading.humidity_pct)
    } else {
        "--%".to_string()
    };
    vec![
        "Smart Plant Buddy".to_string(),
        format!("  {}", face.glyph),
        face.phrase.to_string(),
        format!("S:{} T:{}", reading.soil_raw, temp),
        format!("H:{}", hum),
    ]
}
