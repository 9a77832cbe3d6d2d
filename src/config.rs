use std::{collections::HashSet, path::Path, time::Duration};

use thiserror::Error;
use validator::Validate;

use crate::{
    api::PIXELS_PER_CHUNK,
    models::{Device, DeviceId, Segment},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("duplicate device id '{0}'")]
    DuplicateDevice(DeviceId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct TransitionConfig {
    /// Frame rate used when a transition does not ask for one
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
    /// Gamma exponent for sampling frames
    #[validate(range(min = 0.1, max = 5.0))]
    pub gamma: f64,
    /// Shortest allowed transition
    #[validate(range(min = 1))]
    pub min_duration_ms: u64,
}

impl TransitionConfig {
    /// Duration floor, never zero
    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms.max(1))
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            gamma: crate::gradient::DEFAULT_GAMMA,
            min_duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DummyMode {
    Text,
    Ansi,
}

impl Default for DummyMode {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DummyConfig {
    pub mode: DummyMode,
    #[validate(range(min = 1))]
    pub chunk_size: usize,
    /// Simulated round-trip time per call
    pub latency_ms: u64,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            mode: Default::default(),
            chunk_size: PIXELS_PER_CHUNK,
            latency_ms: 0,
        }
    }
}

fn default_flags() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SegmentConfig {
    pub id: u32,
    pub start: usize,
    pub stop: usize,
    /// Light capability bit field reported for this segment
    #[serde(default = "default_flags")]
    pub flags: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[validate(range(min = 1))]
    pub led_count: usize,
    #[serde(default)]
    pub segments: Vec<SegmentConfig>,
}

impl DeviceConfig {
    pub fn to_device(&self) -> Device {
        let name = if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        };

        Device::new(self.id.clone(), name, self.led_count).with_segments(
            self.segments
                .iter()
                .map(|segment| Segment {
                    id: segment.id,
                    start: segment.start,
                    stop: segment.stop,
                })
                .collect(),
        )
    }

    /// Capability flags as the device would report them, `None` without declared segments
    pub fn segment_flags(&self) -> Option<Vec<i64>> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.iter().map(|segment| segment.flags).collect())
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[validate(nested)]
    pub transition: TransitionConfig,
    #[validate(nested)]
    pub dummy: DummyConfig,
    #[validate(nested)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let full = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&full)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;

        let mut seen = HashSet::new();
        for device in &config.devices {
            if !seen.insert(&device.id) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
        }

        Ok(config)
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| &device.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [transition]
        fps = 48
        minDurationMs = 250

        [dummy]
        mode = "ansi"
        chunkSize = 64

        [[devices]]
        id = "living-room"
        name = "Living room"
        ledCount = 120

        [[devices.segments]]
        id = 0
        start = 0
        stop = 60
        flags = 3

        [[devices.segments]]
        id = 1
        start = 60
        stop = 120

        [[devices]]
        id = "desk"
        ledCount = 30
    "#;

    #[test]
    fn load_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.transition.fps, 48);
        assert_eq!(config.transition.gamma, 2.2);
        assert_eq!(config.transition.min_duration(), Duration::from_millis(250));
        assert_eq!(config.dummy.mode, DummyMode::Ansi);
        assert_eq!(config.dummy.chunk_size, 64);

        let living_room = config.device(&"living-room".into()).unwrap();
        assert_eq!(living_room.segment_flags(), Some(vec![3, 1]));
        assert_eq!(living_room.to_device().segment_len(1), 60);

        let desk = config.device(&"desk".into()).unwrap().to_device();
        assert_eq!(desk.name, "desk");
        assert_eq!(desk.segment_len(0), 30);
    }

    #[test]
    fn defaults_when_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dummy.chunk_size, PIXELS_PER_CHUNK);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml("[transition]\nfps = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml("[[devices]]\nid = \"a\"\nledCount = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml("[transition]\nminDurationMs = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml("[transition]\nframes = 3"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn min_duration_is_never_zero() {
        let config = TransitionConfig {
            min_duration_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.min_duration(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_duplicate_devices() {
        let toml = "[[devices]]\nid = \"a\"\nledCount = 1\n[[devices]]\nid = \"a\"\nledCount = 2";
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::DuplicateDevice(id)) if id.as_str() == "a"
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let rendered = config.to_string().unwrap();
        assert_eq!(Config::from_toml(&rendered).unwrap(), config);
    }
}
