use serde::{Deserialize, Serialize};

use crate::mood::MoodState;

/// temperature reported when the climate sensor gives no number.
/// sits below every classification threshold so it can never read as hot.
pub const TEMP_INVALID_C: f32 = -100.0;

/// humidity reported when the climate sensor gives no number
pub const HUM_INVALID_PCT: f32 = -1.0;

/// one cycle's conditioned sensor snapshot
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// mean of the soil burst, raw 12-bit adc counts
    pub soil_raw: u16,
    /// raw 12-bit adc counts from the light dependent resistor
    pub light_raw: u16,
    /// celsius, or TEMP_INVALID_C
    pub temperature_c: f32,
    /// relative humidity (0-100%), or HUM_INVALID_PCT
    pub humidity_pct: f32,
    /// node clock at sampling time (see clock.rs for what "epoch" means before sync)
    pub timestamp_ms: i64,
}

impl Reading {
    pub fn temperature_valid(&self) -> bool {
        self.temperature_c != TEMP_INVALID_C
    }

    pub fn humidity_valid(&self) -> bool {
        self.humidity_pct != HUM_INVALID_PCT
    }

    pub fn has_valid_climate(&self) -> bool {
        self.temperature_valid() && self.humidity_valid()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Broadcast,
    Log,
}

/// a reading and its mood, handed once to a transport and then dropped
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistributionEvent {
    pub channel: Channel,
    pub reading: Reading,
    pub mood: MoodState,
}

impl DistributionEvent {
    pub fn new(channel: Channel, reading: Reading, mood: MoodState) -> Self {
        Self { channel, reading, mood }
    }
}

/// live frame pushed to websocket listeners
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastFrame {
    pub soil: u16,
    pub light: u16,
    pub temp: f64,
    pub hum: f64,
    pub mood: MoodState,
}

impl From<&DistributionEvent> for BroadcastFrame {
    fn from(ev: &DistributionEvent) -> Self {
        Self {
            soil: ev.reading.soil_raw,
            light: ev.reading.light_raw,
            temp: round_to(ev.reading.temperature_c, 1),
            hum: round_to(ev.reading.humidity_pct, 0),
            mood: ev.mood,
        }
    }
}

/// durable record posted to the remote log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: i64,
    pub soil_raw: u16,
    pub light_raw: u16,
    pub temp_c: f64,
    pub hum: f64,
    pub mood: MoodState,
}

impl From<&DistributionEvent> for LogRecord {
    fn from(ev: &DistributionEvent) -> Self {
        Self {
            timestamp: ev.reading.timestamp_ms,
            soil_raw: ev.reading.soil_raw,
            light_raw: ev.reading.light_raw,
            temp_c: round_to(ev.reading.temperature_c, 1),
            hum: round_to(ev.reading.humidity_pct, 0),
            mood: ev.mood,
        }
    }
}

fn round_to(v: f32, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v as f64 * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            soil_raw: 2200,
            light_raw: 900,
            temperature_c: 22.46,
            humidity_pct: 45.6,
            timestamp_ms: 1_730_000_000_000,
        }
    }

    #[test]
    fn broadcast_frame_wire_shape() {
        let ev = DistributionEvent::new(Channel::Broadcast, reading(), MoodState::Happy);
        let json = serde_json::to_value(BroadcastFrame::from(&ev)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "soil": 2200, "light": 900, "temp": 22.5, "hum": 46.0, "mood": "happy"
            })
        );
    }

    #[test]
    fn log_record_wire_shape() {
        let ev = DistributionEvent::new(Channel::Log, reading(), MoodState::Neutral);
        let json = serde_json::to_value(LogRecord::from(&ev)).unwrap();
        assert_eq!(json["timestamp"], 1_730_000_000_000i64);
        assert_eq!(json["soil_raw"], 2200);
        assert_eq!(json["light_raw"], 900);
        assert_eq!(json["temp_c"], 22.5);
        assert_eq!(json["mood"], "ok");
    }

    #[test]
    fn sentinels_are_reported_invalid() {
        let mut r = reading();
        assert!(r.has_valid_climate());
        r.temperature_c = TEMP_INVALID_C;
        assert!(!r.temperature_valid());
        assert!(r.humidity_valid());
        assert!(!r.has_valid_climate());
    }
}
