//! ==============================================================================
//! mood.rs - plant mood classification
//! ==============================================================================
//!
//! purpose:
//!     maps a conditioned reading to exactly one MoodState.
//!
//! policy (first match wins, the order is the tie-break):
//!
//!     soil <  dry_below             -> Thirsty
//!     soil >  wet_above             -> Drowning
//!     light > bright_above
//!       or temp >= hot_at_c         -> Hot
//!     dry_below <= soil <= happy_max -> Happy
//!     otherwise                     -> Neutral
//!
//!     soil in (happy_max, wet_above] with normal light/temp is Neutral:
//!     acceptable, not ideal. humidity never participates, and the invalid
//!     temperature sentinel is far below hot_at_c.
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodState {
    Thirsty,
    Drowning,
    Hot,
    Happy,
    #[serde(rename = "ok")]
    Neutral,
}

impl MoodState {
    pub const ALL: [MoodState; 5] = [
        MoodState::Thirsty,
        MoodState::Drowning,
        MoodState::Hot,
        MoodState::Happy,
        MoodState::Neutral,
    ];

    /// label used on the wire and in the remote log
    pub fn label(self) -> &'static str {
        match self {
            MoodState::Thirsty => "thirsty",
            MoodState::Drowning => "drowning",
            MoodState::Hot => "hot",
            MoodState::Happy => "happy",
            MoodState::Neutral => "ok",
        }
    }
}

impl fmt::Display for MoodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MoodState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoodState::ALL
            .into_iter()
            .find(|m| m.label() == s)
            .ok_or_else(|| format!("unknown mood label: {s}"))
    }
}

/// classification cut-offs, raw adc counts and celsius
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub dry_below: u16,
    pub wet_above: u16,
    pub happy_max: u16,
    pub bright_above: u16,
    pub hot_at_c: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        // tuned for a resistive soil probe on a 12-bit adc
        Self {
            dry_below: 1500,
            wet_above: 3500,
            happy_max: 3100,
            bright_above: 2500,
            hot_at_c: 27.0,
        }
    }
}

pub fn classify(soil_raw: u16, light_raw: u16, temperature_c: f32, t: &Thresholds) -> MoodState {
    if soil_raw < t.dry_below {
        return MoodState::Thirsty;
    }
    if soil_raw > t.wet_above {
        return MoodState::Drowning;
    }
    if light_raw > t.bright_above || temperature_c >= t.hot_at_c {
        return MoodState::Hot;
    }
    if (t.dry_below..=t.happy_max).contains(&soil_raw) {
        return MoodState::Happy;
    }
    MoodState::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TEMP_INVALID_C;

    fn c(soil: u16, light: u16, temp: f32) -> MoodState {
        classify(soil, light, temp, &Thresholds::default())
    }

    #[test]
    fn soil_bands_with_normal_light_and_temp() {
        for s in (0..=4095u16).step_by(7).chain([1499, 1500, 3100, 3101, 3500, 3501]) {
            let mood = c(s, 0, 20.0);
            assert_eq!(mood == MoodState::Thirsty, s < 1500, "soil {s}");
            assert_eq!(mood == MoodState::Drowning, s > 3500, "soil {s}");
            assert_eq!(mood == MoodState::Happy, (1500..=3100).contains(&s), "soil {s}");
        }
    }

    #[test]
    fn boundaries_are_exact() {
        assert_ne!(c(1500, 0, 20.0), MoodState::Thirsty);
        assert_eq!(c(1499, 0, 20.0), MoodState::Thirsty);
        assert_ne!(c(3500, 0, 20.0), MoodState::Drowning);
        assert_eq!(c(3501, 0, 20.0), MoodState::Drowning);
        assert_eq!(c(2000, 0, 27.0), MoodState::Hot);
        assert_eq!(c(2000, 0, 26.99), MoodState::Happy);
        assert_eq!(c(2000, 2500, 20.0), MoodState::Happy);
        assert_eq!(c(2000, 2501, 20.0), MoodState::Hot);
    }

    #[test]
    fn hot_outranks_happy_and_neutral_only() {
        assert_eq!(c(2500, 3000, 20.0), MoodState::Hot);
        assert_eq!(c(3300, 0, 30.0), MoodState::Hot);
        assert_eq!(c(1000, 4000, 35.0), MoodState::Thirsty);
        assert_eq!(c(3900, 4000, 35.0), MoodState::Drowning);
    }

    #[test]
    fn dead_zone_is_neutral() {
        assert_eq!(c(3101, 0, 20.0), MoodState::Neutral);
        assert_eq!(c(3500, 100, 22.0), MoodState::Neutral);
    }

    #[test]
    fn invalid_temperature_is_never_hot() {
        for s in [1500, 2200, 3100, 3300, 3500] {
            assert_ne!(c(s, 0, TEMP_INVALID_C), MoodState::Hot);
        }
    }

    #[test]
    fn labels_round_trip_through_from_str() {
        for m in MoodState::ALL {
            assert_eq!(m.label().parse::<MoodState>().unwrap(), m);
        }
        assert!("sleepy".parse::<MoodState>().is_err());
        assert_eq!(serde_json::to_string(&MoodState::Neutral).unwrap(), "\"ok\"");
    }
}
