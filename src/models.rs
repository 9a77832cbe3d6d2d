use std::{fmt, str::FromStr};

use derive_more::{Display, From};
use hex::FromHex;
use thiserror::Error;

mod intent;
pub use intent::*;

/// 8-bit sRGB colour, as sent to devices
pub type Color = palette::Srgb<u8>;

/// Parse a `RRGGBB` (optionally `#`-prefixed) hex string
pub fn parse_hex(s: &str) -> Result<Color, hex::FromHexError> {
    let s = s.trim();
    let [r, g, b] = <[u8; 3]>::from_hex(s.strip_prefix('#').unwrap_or(s))?;
    Ok(Color::new(r, g, b))
}

/// Format a colour as a 6-digit uppercase hex string
pub fn to_hex(color: Color) -> String {
    hex::encode_upper([color.red, color.green, color.blue])
}

/// Returns true if `s` is exactly 6 hex digits
pub fn is_hex_color(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

mod hex_color {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Color;

    pub fn serialize<S: Serializer>(color: &Color, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_hex(*color))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Color, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_hex(&s).map_err(D::Error::custom)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Contiguous, independently addressable run of LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub start: usize,
    pub stop: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub led_count: usize,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, led_count: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            led_count,
            segments: Vec::new(),
        }
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    /// Number of pixels in the given segment
    ///
    /// A device that declares no segments is treated as one segment spanning the whole strip.
    pub fn segment_len(&self, segment_id: u32) -> usize {
        if self.segments.is_empty() {
            return self.led_count;
        }

        self.segments
            .iter()
            .find(|segment| segment.id == segment_id)
            .map(Segment::len)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub position: f64,
    #[serde(with = "hex_color")]
    pub color: Color,
}

impl GradientStop {
    pub fn new(position: f64, color: Color) -> Self {
        Self { position, color }
    }
}

/// Set of colour stops
///
/// Stops are kept in insertion order; consumers sort them by position before use.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gradient {
    pub stops: Vec<GradientStop>,
}

impl Gradient {
    pub fn new(stops: Vec<GradientStop>) -> Self {
        Self { stops }
    }

    /// Spread the given colours evenly over `[0, 1]`
    pub fn evenly_spaced(colors: &[Color]) -> Self {
        let last = colors.len().saturating_sub(1).max(1) as f64;
        Self {
            stops: colors
                .iter()
                .enumerate()
                .map(|(i, &color)| GradientStop::new(i as f64 / last, color))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stops sorted by position. Equal positions keep their insertion order.
    pub fn sorted_stops(&self) -> Vec<GradientStop> {
        sort_stops(&self.stops)
    }
}

pub(crate) fn sort_stops(stops: &[GradientStop]) -> Vec<GradientStop> {
    let mut sorted = stops.to_vec();
    sorted.sort_by(|a, b| a.position.total_cmp(&b.position));
    sorted
}

impl fmt::Display for Gradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stop) in self.stops.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", stop.position, to_hex(stop.color))?;
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GradientParseError {
    #[error("empty gradient")]
    Empty,
    #[error("invalid stop position '{0}'")]
    Position(String),
    #[error("stop position {0} is outside of [0, 1]")]
    OutOfRange(f64),
    #[error("invalid color '{color}': {source}")]
    Color {
        color: String,
        source: hex::FromHexError,
    },
}

impl FromStr for Gradient {
    type Err = GradientParseError;

    /// Parse `pos:RRGGBB,...` or bare `RRGGBB,...` (spread evenly)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            return Err(GradientParseError::Empty);
        }

        let parse_color = |color: &str| {
            parse_hex(color).map_err(|source| GradientParseError::Color {
                color: color.to_owned(),
                source,
            })
        };

        if parts.iter().all(|part| !part.contains(':')) {
            let colors = parts
                .iter()
                .map(|part| parse_color(part))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::evenly_spaced(&colors));
        }

        let mut stops = Vec::with_capacity(parts.len());
        for part in parts {
            let (position, color) = part
                .split_once(':')
                .ok_or_else(|| GradientParseError::Position(part.to_owned()))?;
            let position: f64 = position
                .trim()
                .parse()
                .map_err(|_| GradientParseError::Position(position.to_owned()))?;

            if !(0.0..=1.0).contains(&position) {
                return Err(GradientParseError::OutOfRange(position));
            }

            stops.push(GradientStop::new(position, parse_color(color.trim())?));
        }

        Ok(Self::new(stops))
    }
}
