//! Demodulation configuration loaded from TOML.
//!
//! Every key is optional; missing keys take the defaults of the canonical
//! 2 kHz sine run.
//!
//! ```toml
//! binarate = "middle"     # start | middle | end | none
//! window_time = 3e-3      # s, "none" or 0 disables the edge taper
//! bandwidth = 1000.0      # Hz
//! order = 50
//! dead_time = 15e-3       # s, "none" or 0 keeps every point
//! chunk_time = 221.34e-6  # s
//! ```

use crate::error::{Error, Result};
use crate::signal::BinarateMode;
use crate::spectral::DEFAULT_BANDPASS_ORDER;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;

/// Parameters for [`Signal::demodulate`](crate::signal::Signal::demodulate)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemodConfig {
    /// Power-of-two length mask; `None` keeps every sample
    #[serde(
        serialize_with = "serialize_binarate",
        deserialize_with = "deserialize_binarate"
    )]
    pub binarate: Option<BinarateMode>,
    /// Edge window rise time [s]
    #[serde(serialize_with = "serialize_seconds", deserialize_with = "deserialize_seconds")]
    pub window_time: Option<f64>,
    /// Bandpass filter bandwidth [Hz]
    pub bandwidth: f64,
    /// Bandpass filter order
    pub order: i32,
    /// Ripple dead time at each end [s]
    #[serde(serialize_with = "serialize_seconds", deserialize_with = "deserialize_seconds")]
    pub dead_time: Option<f64>,
    /// Target chunk duration for the phase fit [s]
    pub chunk_time: f64,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            binarate: Some(BinarateMode::Middle),
            window_time: Some(3e-3),
            bandwidth: 1e3,
            order: DEFAULT_BANDPASS_ORDER,
            dead_time: Some(15e-3),
            chunk_time: 221.34e-6,
        }
    }
}

impl DemodConfig {
    /// Parse a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|err| Error::invalid(format!("demodulation config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::invalid(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| Error::invalid(format!("demodulation config: {err}")))
    }

    /// Check values that no signal could satisfy
    pub fn validate(&self) -> Result<()> {
        fn non_negative(name: &str, value: Option<f64>) -> Result<()> {
            match value {
                Some(v) if !(v >= 0.0 && v.is_finite()) => Err(Error::invalid(format!(
                    "{name} must be non-negative and finite, got {v}"
                ))),
                _ => Ok(()),
            }
        }

        non_negative("window_time", self.window_time)?;
        non_negative("dead_time", self.dead_time)?;
        if !(self.bandwidth > 0.0 && self.bandwidth.is_finite()) {
            return Err(Error::invalid(format!(
                "bandwidth must be positive, got {}",
                self.bandwidth
            )));
        }
        if self.order < 1 {
            return Err(Error::invalid(format!(
                "filter order must be at least 1, got {}",
                self.order
            )));
        }
        if !(self.chunk_time > 0.0 && self.chunk_time.is_finite()) {
            return Err(Error::invalid(format!(
                "chunk_time must be positive, got {}",
                self.chunk_time
            )));
        }
        Ok(())
    }
}

fn serialize_binarate<S: Serializer>(
    mode: &Option<BinarateMode>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match mode {
        Some(mode) => serializer.serialize_str(&mode.to_string()),
        None => serializer.serialize_str("none"),
    }
}

fn deserialize_binarate<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<BinarateMode>, D::Error> {
    let s = String::deserialize(deserializer)?;
    if s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    s.parse().map(Some).map_err(serde::de::Error::custom)
}

/// Optional durations are written as `"none"` when absent so that a missing
/// key still means "use the default".
fn serialize_seconds<S: Serializer>(
    seconds: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match seconds {
        Some(seconds) => serializer.serialize_f64(*seconds),
        None => serializer.serialize_str("none"),
    }
}

fn deserialize_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Value(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Value(v) => Ok(Some(v)),
        Seconds::Text(s) if s.eq_ignore_ascii_case("none") => Ok(None),
        Seconds::Text(s) => Err(serde::de::Error::custom(format!(
            "expected a duration in seconds or \"none\", got \"{s}\""
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DemodConfig::default();
        config.validate().unwrap();
        assert_eq!(config.order, 50);
        assert_eq!(config.binarate, Some(BinarateMode::Middle));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DemodConfig::from_toml_str("bandwidth = 500.0\nbinarate = \"none\"\n").unwrap();
        assert_eq!(config.bandwidth, 500.0);
        assert_eq!(config.binarate, None);
        assert_eq!(config.chunk_time, DemodConfig::default().chunk_time);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(DemodConfig::from_toml_str("bandwidth = -1.0").is_err());
        assert!(DemodConfig::from_toml_str("order = 0").is_err());
        assert!(DemodConfig::from_toml_str("dead_time = -1e-3").is_err());
        assert!(DemodConfig::from_toml_str("binarate = \"sideways\"").is_err());
        assert!(DemodConfig::from_toml_str("bandwith = 10.0").is_err());
        assert!(DemodConfig::from_toml_str("window_time = \"later\"").is_err());
    }

    #[test]
    fn test_disabled_stages_survive_round_trip() {
        let config = DemodConfig {
            window_time: None,
            dead_time: None,
            ..DemodConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("window_time = \"none\""));
        let loaded = DemodConfig::from_toml_str(&text).unwrap();
        assert_eq!(loaded.window_time, None);
        assert_eq!(loaded.dead_time, None);
        assert_eq!(loaded, config);

        let zero = DemodConfig::from_toml_str("window_time = 0.0\ndead_time = 0.0\n").unwrap();
        assert_eq!(zero.window_time, Some(0.0));
        assert_eq!(zero.dead_time, Some(0.0));
    }

    #[test]
    fn test_toml_file_round_trip() {
        let config = DemodConfig {
            binarate: None,
            bandwidth: 250.0,
            ..DemodConfig::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();
        let loaded = DemodConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = DemodConfig::load_from_file("/nonexistent/demod.toml").unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
