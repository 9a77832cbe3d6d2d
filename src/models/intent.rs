use thiserror::Error;

use super::{is_hex_color, DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntentMode {
    Solid,
    PerPixel,
    Palette,
}

/// A requested change to the visual state of one device segment
///
/// Fields that do not apply to `mode` are ignored. Nothing is validated here: consumers check
/// the fields they actually use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorIntent {
    pub device_id: DeviceId,
    #[serde(default)]
    pub segment_id: u32,
    pub mode: IntentMode,
    pub brightness: Option<u8>,
    pub transition_ms: Option<u32>,
    pub solid_color: Option<Vec<i32>>,
    pub white_level: Option<u8>,
    pub color_temperature: Option<u8>,
    pub per_pixel_hex: Option<Vec<String>>,
    pub effect_id: Option<i32>,
    pub palette_id: Option<i32>,
    pub speed: Option<i32>,
    pub intensity: Option<i32>,
}

impl ColorIntent {
    pub fn new(device_id: impl Into<DeviceId>, mode: IntentMode) -> Self {
        Self {
            device_id: device_id.into(),
            segment_id: 0,
            mode,
            brightness: None,
            transition_ms: None,
            solid_color: None,
            white_level: None,
            color_temperature: None,
            per_pixel_hex: None,
            effect_id: None,
            palette_id: None,
            speed: None,
            intensity: None,
        }
    }

    pub fn solid(device_id: impl Into<DeviceId>, rgb: [u8; 3]) -> Self {
        Self::new(device_id, IntentMode::Solid).with_solid_color(rgb.iter().map(|&c| c.into()))
    }

    /// Brightness-only change
    pub fn brightness(device_id: impl Into<DeviceId>, brightness: u8) -> Self {
        Self::new(device_id, IntentMode::Solid).with_brightness(brightness)
    }

    pub fn per_pixel(device_id: impl Into<DeviceId>, pixels: Vec<String>) -> Self {
        Self {
            per_pixel_hex: Some(pixels),
            ..Self::new(device_id, IntentMode::PerPixel)
        }
    }

    pub fn palette(device_id: impl Into<DeviceId>, effect_id: i32, palette_id: i32) -> Self {
        Self {
            effect_id: Some(effect_id),
            palette_id: Some(palette_id),
            ..Self::new(device_id, IntentMode::Palette)
        }
    }

    pub fn with_segment(mut self, segment_id: u32) -> Self {
        self.segment_id = segment_id;
        self
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn with_transition_ms(mut self, transition_ms: u32) -> Self {
        self.transition_ms = Some(transition_ms);
        self
    }

    pub fn with_solid_color(mut self, components: impl IntoIterator<Item = i32>) -> Self {
        self.solid_color = Some(components.into_iter().collect());
        self
    }

    pub fn with_white_level(mut self, white_level: u8) -> Self {
        self.white_level = Some(white_level);
        self
    }

    pub fn with_color_temperature(mut self, cct: u8) -> Self {
        self.color_temperature = Some(cct);
        self
    }

    pub fn with_effect(mut self, speed: Option<i32>, intensity: Option<i32>) -> Self {
        self.speed = speed;
        self.intensity = intensity;
        self
    }

    /// True when the only requested change is brightness
    pub fn is_brightness_only(&self) -> bool {
        self.brightness.is_some()
            && self.solid_color.is_none()
            && self.per_pixel_hex.is_none()
            && self.effect_id.is_none()
            && self.palette_id.is_none()
    }

    /// Decode `solid_color` as `[r, g, b]` plus an optional white component
    ///
    /// Accepts 3 to 5 components; a 4th component is the white channel. An explicit
    /// `white_level` takes precedence over it.
    pub fn solid_rgbw(&self) -> Result<Option<([u8; 3], Option<u8>)>, IntentError> {
        let components = match &self.solid_color {
            Some(components) => components,
            None => return Ok(None),
        };

        if !(3..=5).contains(&components.len()) {
            return Err(IntentError::ComponentCount(components.len()));
        }

        let mut channels = [0u8; 5];
        for (dst, &src) in channels.iter_mut().zip(components) {
            *dst = u8::try_from(src).map_err(|_| IntentError::ComponentRange(src))?;
        }

        let white = self
            .white_level
            .or_else(|| (components.len() > 3).then(|| channels[3]));

        Ok(Some(([channels[0], channels[1], channels[2]], white)))
    }

    /// Per-pixel colours, checked to be 6-digit hex strings
    pub fn pixels(&self) -> Result<&[String], IntentError> {
        let pixels = self
            .per_pixel_hex
            .as_deref()
            .ok_or(IntentError::MissingPixels)?;

        if let Some((index, value)) = pixels
            .iter()
            .enumerate()
            .find(|(_, value)| !is_hex_color(value))
        {
            return Err(IntentError::InvalidPixel {
                index,
                value: value.clone(),
            });
        }

        Ok(pixels)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("solid color must have 3 to 5 components, got {0}")]
    ComponentCount(usize),
    #[error("color component {0} is out of range 0-255")]
    ComponentRange(i32),
    #[error("per-pixel intent has no pixel data")]
    MissingPixels,
    #[error("pixel {index} is not a 6-digit hex color: '{value}'")]
    InvalidPixel { index: usize, value: String },
}
