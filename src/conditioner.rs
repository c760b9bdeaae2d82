//! ==============================================================================
//! conditioner.rs - turning raw sensor output into a Reading
//! ==============================================================================
//!
//! purpose:
//!     - averages a burst of soil samples to knock down adc noise
//!     - folds climate sensor failures into sentinel values
//!
//! a failed temperature/humidity read is data, not an error: consumers check
//! `Reading::has_valid_climate()` before trusting those fields.
//!
//! relationships:
//!     - used by: node.rs (once per cycle)
//!     - uses: hal.rs (adc + dht)
//!
//! ==============================================================================

use std::time::Duration;

use crate::config::SensorsConfig;
use crate::domain::{Reading, HUM_INVALID_PCT, TEMP_INVALID_C};
use crate::error::{NodeError, Result};
use crate::hal::HardwareProvider;

pub fn condition(
    soil_samples: &[u16],
    light_raw: u16,
    raw_temp: f32,
    raw_hum: f32,
    timestamp_ms: i64,
) -> Result<Reading> {
    if soil_samples.is_empty() {
        return Err(NodeError::NoSamples);
    }
    let sum: u32 = soil_samples.iter().map(|&s| s as u32).sum();
    let soil_raw = (sum / soil_samples.len() as u32) as u16;

    // the dht answers for both fields at once; half a read is no read
    let (temperature_c, humidity_pct) = if raw_temp.is_finite() && raw_hum.is_finite() {
        (raw_temp, raw_hum)
    } else {
        (TEMP_INVALID_C, HUM_INVALID_PCT)
    };

    Ok(Reading { soil_raw, light_raw, temperature_c, humidity_pct, timestamp_ms })
}

/// Read `count` soil samples `delay` apart. Individual failed reads are
/// dropped; an all-failed burst is an error.
pub async fn sample_soil<H: HardwareProvider>(
    hal: &H,
    channel: u8,
    count: usize,
    delay: Duration,
) -> Result<Vec<u16>> {
    let mut samples = Vec::with_capacity(count);
    let mut last_err = None;
    for i in 0..count {
        match hal.read_adc(channel) {
            Ok(v) => samples.push(v),
            Err(e) => last_err = Some(e),
        }
        if i + 1 < count && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    if samples.is_empty() {
        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no samples requested".into());
        return Err(NodeError::Sensor(format!("soil channel {channel}: {detail}")));
    }
    if samples.len() < count {
        tracing::debug!("soil burst kept {}/{} samples", samples.len(), count);
    }
    Ok(samples)
}

/// One full sensor pass: soil burst, light, climate.
pub async fn read_sensors<H: HardwareProvider>(
    hal: &H,
    sensors: &SensorsConfig,
    soil_count: usize,
    sample_delay: Duration,
    timestamp_ms: i64,
) -> Result<Reading> {
    let soil = sample_soil(hal, sensors.soil_channel, soil_count, sample_delay).await?;

    let light = hal
        .read_adc(sensors.light_channel)
        .map_err(|e| NodeError::Sensor(format!("light channel {}: {}", sensors.light_channel, e)))?;

    let (temp, hum) = match hal.read_dht(sensors.dht_pin) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!("DHT read failed: {}", e);
            (f32::NAN, f32::NAN)
        }
    };

    condition(&soil, light, temp, hum, timestamp_ms)
}
