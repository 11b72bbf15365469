use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::errors::GosgraphError;
use crate::errors::GosgraphError::ConfigError;

pub const ENV_CACHE_DEPTH: &str = "GOSGRAPH_CACHE_DEPTH";
pub const ENV_PIPELINE_DEPTH: &str = "GOSGRAPH_PIPELINE_DEPTH";
pub const ENV_DEVICE: &str = "GOSGRAPH_DEVICE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Compiled executables kept per session.
    pub cache_depth: usize,
    /// Staging slots the GPU executor reads results back through.
    pub pipeline_depth: usize,
    /// Run every op on this device regardless of where it was placed.
    pub device_override: Option<Device>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_depth: 16,
            pipeline_depth: 2,
            device_override: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, GosgraphError> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `GOSGRAPH_*` environment variables.
    pub fn from_env() -> Result<Self, GosgraphError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, GosgraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_CACHE_DEPTH) {
            config.cache_depth = parse_depth(ENV_CACHE_DEPTH, &v)?;
        }
        if let Some(v) = lookup(ENV_PIPELINE_DEPTH) {
            config.pipeline_depth = parse_depth(ENV_PIPELINE_DEPTH, &v)?;
        }
        if let Some(v) = lookup(ENV_DEVICE) {
            config.device_override = Some(v.parse()?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_device_override(mut self, device: Device) -> Self {
        self.device_override = Some(device);
        self
    }

    pub fn validate(&self) -> Result<(), GosgraphError> {
        if self.cache_depth == 0 {
            return Err(ConfigError("cache_depth must be at least 1".into()));
        }
        if self.pipeline_depth == 0 {
            return Err(ConfigError("pipeline_depth must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_depth(key: &str, value: &str) -> Result<usize, GosgraphError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError(format!("{}=`{}`: {}", key, value, e)))
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = SessionConfig::from_json(r#"{ "cache_depth": 4 }"#).unwrap();
        assert_eq!(config.cache_depth, 4);
        assert_eq!(config.pipeline_depth, 2);
        assert_eq!(config.device_override, None);

        let config = SessionConfig::from_json(r#"{ "device_override": "gpu" }"#).unwrap();
        assert_eq!(config.device_override, Some(Device::Gpu));
    }

    #[test]
    fn json_rejects_zero_depth() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "cache_depth": 0 }"#),
            Err(ConfigError(_))
        ));
        assert!(SessionConfig::from_json("not json").is_err());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_CACHE_DEPTH, "3"),
            (ENV_PIPELINE_DEPTH, " 5 "),
            (ENV_DEVICE, "cpu"),
        ]
        .into_iter()
        .collect();
        let config = SessionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(
            config,
            SessionConfig {
                cache_depth: 3,
                pipeline_depth: 5,
                device_override: Some(Device::Cpu),
            }
        );
    }

    #[test]
    fn env_rejects_garbage() {
        assert!(SessionConfig::from_lookup(|k| (k == ENV_CACHE_DEPTH).then(|| "lots".into())).is_err());
        assert!(SessionConfig::from_lookup(|k| (k == ENV_DEVICE).then(|| "tpu".into())).is_err());
        assert_eq!(SessionConfig::from_lookup(|_| None).unwrap(), SessionConfig::default());
    }
}
