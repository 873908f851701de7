//! Engine configuration shared by every sequencer module

use crate::error::SequencerError;
use serde::{Deserialize, Serialize};

/// How timers measure elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Accumulate `1 / sample_rate` per tick
    #[default]
    SampleAccurate,
    /// Sample a monotonic wall clock once per tick
    WallClock,
}

/// Configuration for a sequencer module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host sample rate in Hz (default: 44100)
    pub sample_rate: f64,
    /// Tick source for gate and glide timers (default: sample accurate)
    pub timing: TimingMode,
    /// Seed for run modes and randomization; system clock when `None`
    pub seed: Option<u64>,
    /// Clock input falling threshold in volts (default: 0.0)
    pub edge_low: f64,
    /// Clock input rising threshold in volts (default: 1.0)
    pub edge_high: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            timing: TimingMode::SampleAccurate,
            seed: None,
            edge_low: 0.0,
            edge_high: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn with_timing(mut self, timing: TimingMode) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_thresholds(mut self, low: f64, high: f64) -> Self {
        self.edge_low = low;
        self.edge_high = high;
        self
    }

    /// Check that the configuration can drive an engine
    pub fn validate(&self) -> Result<(), SequencerError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(SequencerError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.edge_low.is_finite() && self.edge_high.is_finite()) || self.edge_low > self.edge_high
        {
            return Err(SequencerError::InvalidConfig(format!(
                "edge thresholds inverted: low {} high {}",
                self.edge_low, self.edge_high
            )));
        }
        if self.timing == TimingMode::WallClock {
            log::info!("wall-clock timing selected; gate lengths follow host scheduling");
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    #[cfg(feature = "alloc")]
    pub fn from_json(json: &str) -> Result<Self, SequencerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SequencerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    #[cfg(feature = "alloc")]
    pub fn to_json(&self) -> Result<String, SequencerError> {
        serde_json::to_string_pretty(self).map_err(|e| SequencerError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.timing, TimingMode::SampleAccurate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new(48000.0)
            .with_seed(7)
            .with_timing(TimingMode::WallClock)
            .with_thresholds(0.1, 2.0);
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.timing, TimingMode::WallClock);
        assert_eq!((config.edge_low, config.edge_high), (0.1, 2.0));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::new(0.0).validate().is_err());
        assert!(EngineConfig::new(f64::NAN).validate().is_err());
        let inverted = EngineConfig::default().with_thresholds(2.0, 1.0);
        assert!(matches!(
            inverted.validate(),
            Err(SequencerError::InvalidConfig(_))
        ));
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{ "sample_rate": 48000.0, "seed": 3 }"#).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.edge_high, 1.0);

        let timing = EngineConfig::from_json(r#"{ "timing": "wall_clock" }"#).unwrap();
        assert_eq!(timing.timing, TimingMode::WallClock);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(EngineConfig::from_json("not json").is_err());
        assert!(EngineConfig::from_json(r#"{ "sample_rate": -1.0 }"#).is_err());
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig::new(96000.0).with_seed(11);
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
