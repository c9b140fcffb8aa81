//! Processor configuration, read from the worklet's `processorOptions`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorConfig {
    /// Render context sample rate in Hz; passed to engine construction.
    pub sample_rate: f32,
    /// Frames per render quantum.
    pub quantum_frames: usize,
    /// Output channels; channel 0 is rendered, the rest are copies of it.
    pub output_channels: usize,
    /// Undelivered notifications kept before new ones are dropped.
    pub notification_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            sample_rate: 48000.0,
            quantum_frames: 128,
            output_channels: 2,
            notification_capacity: 256,
        }
    }
}

impl ProcessorConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: ProcessorConfig = serde_json::from_str(source).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `processorOptions` as JSON. Options without `sampleRate`
    /// take the render context's rate when the host reports one. Null or
    /// undefined options count as an empty object.
    pub fn from_options(options: Value, context_rate: Option<f32>) -> Result<Self, ConfigError> {
        let options = match options {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let rate_given = options.get("sampleRate").is_some_and(|v| !v.is_null());
        let mut config: ProcessorConfig =
            serde_json::from_value(options).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        if let (false, Some(rate)) = (rate_given, context_rate) {
            config.sample_rate = rate;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: self.sample_rate,
            });
        }
        if self.quantum_frames == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.output_channels == 0 {
            return Err(ConfigError::NoOutputChannels);
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::ZeroNotificationCapacity);
        }
        Ok(())
    }

    /// Wall-clock time one quantum covers: the render deadline.
    pub fn quantum_budget(&self) -> Duration {
        Duration::from_secs_f64(self.quantum_frames as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quantum_frames, 128);
    }

    #[test]
    fn partial_options_fill_defaults() {
        let config = ProcessorConfig::from_json(r#"{"sampleRate": 44100}"#).unwrap();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.output_channels, 2);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            ProcessorConfig::from_json(r#"{"sampleRate": 0}"#),
            Err(ConfigError::InvalidSampleRate { rate: 0.0 })
        );
        assert_eq!(
            ProcessorConfig::from_json(r#"{"quantumFrames": 0}"#),
            Err(ConfigError::ZeroQuantum)
        );
        assert_eq!(
            ProcessorConfig::from_json(r#"{"outputChannels": 0}"#),
            Err(ConfigError::NoOutputChannels)
        );
        assert!(matches!(
            ProcessorConfig::from_json("{"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn context_rate_fills_missing_sample_rate() {
        let config = ProcessorConfig::from_options(json!({"outputChannels": 1}), Some(44100.0)).unwrap();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.output_channels, 1);

        let config = ProcessorConfig::from_options(Value::Null, Some(96000.0)).unwrap();
        assert_eq!(config.sample_rate, 96000.0);
    }

    #[test]
    fn explicit_sample_rate_wins_over_context() {
        let config = ProcessorConfig::from_options(json!({"sampleRate": 22050}), Some(44100.0)).unwrap();
        assert_eq!(config.sample_rate, 22050.0);
    }

    #[test]
    fn without_context_rate_the_default_applies() {
        let config = ProcessorConfig::from_options(json!({}), None).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
    }

    #[test]
    fn context_rate_is_validated() {
        assert_eq!(
            ProcessorConfig::from_options(json!({}), Some(0.0)),
            Err(ConfigError::InvalidSampleRate { rate: 0.0 })
        );
        assert!(matches!(
            ProcessorConfig::from_options(json!("fast"), Some(44100.0)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn budget_at_48k() {
        let budget = ProcessorConfig::default().quantum_budget();
        let micros = budget.as_micros();
        assert!((2660..=2670).contains(&micros), "128 frames at 48kHz ≈ 2.67ms, got {micros}µs");
    }
}
