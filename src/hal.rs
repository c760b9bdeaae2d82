//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     the node's only contact with pins, buses and the oled.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! hardware (real build):
//!     - ADS1115 adc on i2c: channel 0 = resistive soil probe, channel 1 = LDR
//!     - DHT11 on a gpio pin, read through adafruit_dht
//!     - SSD1306 128x64 oled at 0x3C, drawn through luma.oled
//!
//! relationships:
//!     - used by: conditioner.rs (adc + dht), display.rs (oled)
//!     - uses: rppal (on feature="hardware")
//!     - uses: std::process::Command (python drivers for the dht and oled)
//!
//! ==============================================================================

use anyhow::Result;

pub trait HardwareProvider: Send + Sync {
    /// one conversion on an adc channel, scaled to 12 bits (0-4095)
    fn read_adc(&self, channel: u8) -> Result<u16>;
    /// (temperature celsius, relative humidity %)
    fn read_dht(&self, pin: u8) -> Result<(f32, f32)>;
    fn init_display(&self) -> Result<()>;
    fn draw_display(&self, lines: &[String]) -> Result<()>;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    tick: std::sync::atomic::AtomicU32,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(_adc_address: u8) -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self { tick: std::sync::atomic::AtomicU32::new(0) }
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn read_adc(&self, channel: u8) -> Result<u16> {
        use std::sync::atomic::Ordering;
        // small deterministic wobble so averaging has something to do
        let n = self.tick.fetch_add(1, Ordering::Relaxed);
        let jitter = (n % 7) as u16 * 5;
        let value = match channel {
            0 => 2180 + jitter,
            _ => 1200 + jitter,
        };
        tracing::trace!("[MOCK ADC] Channel {} -> {}", channel, value);
        Ok(value)
    }

    fn read_dht(&self, pin: u8) -> Result<(f32, f32)> {
        tracing::debug!("[MOCK DHT] Reading pin {}", pin);
        Ok((22.5, 48.0))
    }

    fn init_display(&self) -> Result<()> {
        tracing::debug!("[MOCK OLED] init");
        Ok(())
    }

    fn draw_display(&self, lines: &[String]) -> Result<()> {
        tracing::debug!("[MOCK OLED] {}", lines.join(" | "));
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    adc_address: u8,
    i2c: std::sync::Mutex<Option<rppal::i2c::I2c>>,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(adc_address: u8) -> Self {
        tracing::info!("Using REAL HARDWARE HAL (rppal), ADS1115 at 0x{:02X}", adc_address);
        Self { adc_address, i2c: std::sync::Mutex::new(None) }
    }

    // ADS1115 config word: start single conversion, AINx vs GND,
    // +-4.096V range, single-shot, 128 SPS, comparator off
    fn ads1115_config(channel: u8) -> u16 {
        0x8000
            | ((0b100 | (channel as u16 & 0b11)) << 12)
            | (0b001 << 9)
            | 0x0100
            | (0b100 << 5)
            | 0b11
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn read_adc(&self, channel: u8) -> Result<u16> {
        use rppal::i2c::I2c;

        let mut guard = self.i2c.lock().map_err(|_| anyhow::anyhow!("i2c lock poisoned"))?;
        if guard.is_none() {
            let mut bus = I2c::new()?;
            bus.set_slave_address(self.adc_address as u16)?;
            *guard = Some(bus);
        }
        let bus = guard.as_mut().ok_or_else(|| anyhow::anyhow!("i2c bus unavailable"))?;

        let cfg = Self::ads1115_config(channel).to_be_bytes();
        bus.write(&[0x01, cfg[0], cfg[1]])?;
        // one conversion at 128 SPS takes ~7.8ms
        std::thread::sleep(std::time::Duration::from_millis(9));
        bus.write(&[0x00])?;
        let mut buf = [0u8; 2];
        bus.read(&mut buf)?;

        // single-ended results are 15 bits; negative noise clamps to zero
        let raw = i16::from_be_bytes(buf).max(0) as u16;
        Ok(raw >> 3)
    }

    fn read_dht(&self, pin: u8) -> Result<(f32, f32)> {
        // NOTE: python subprocess for dht timing stability on generic kernels
        use std::process::Command;
        let script = format!(
            r#"
import adafruit_dht, board, json
try:
    dht = adafruit_dht.DHT11(board.D{})
    print(json.dumps({{"t": dht.temperature, "h": dht.humidity}}))
    dht.exit()
except Exception:
    print("null")
"#,
            pin
        );
        let output = Command::new("python3").args(["-c", &script]).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() == "null" {
            anyhow::bail!("DHT11 read failed");
        }
        let v: serde_json::Value = serde_json::from_str(&stdout)?;
        // a missing field comes back as NaN and is handled by the conditioner
        Ok((
            v["t"].as_f64().map(|t| t as f32).unwrap_or(f32::NAN),
            v["h"].as_f64().map(|h| h as f32).unwrap_or(f32::NAN),
        ))
    }

    fn init_display(&self) -> Result<()> {
        self.draw_display(&["Plant Buddy".to_string(), "Starting...".to_string()])
    }

    fn draw_display(&self, lines: &[String]) -> Result<()> {
        use std::process::Command;

        let text = serde_json::to_string(lines)?;
        let script = format!(
            r#"
import json
from luma.core.interface.serial import i2c
from luma.core.render import canvas
from luma.oled.device import ssd1306
lines = json.loads({text:?})
device = ssd1306(i2c(port=1, address=0x3C), width=128, height=64)
device.cleanup = lambda *a: None
with canvas(device) as draw:
    for i, line in enumerate(lines):
        draw.text((0, i * 12), line, fill="white")
"#
        );

        let output = Command::new("python3").args(["-c", &script]).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("OLED draw failed: {}", stderr.trim());
        }
        Ok(())
    }
}
