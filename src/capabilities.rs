//! Per-segment hardware capability detection
//!
//! WLED reports one light-capability bit field per segment (`info.leds.seglc`): bit 0 is RGB,
//! bit 1 a dedicated white channel and bit 2 tunable white (CCT). The bits are independent, so a
//! tunable-white-only strip reports white and CCT without RGB.
//!
//! Detection results are cached per device and only ever recomputed by an explicit
//! [CapabilityDetector::detect] call; every other query reads the cache.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::models::DeviceId;

const FLAG_RGB: u8 = 0b001;
const FLAG_WHITE: u8 = 0b010;
const FLAG_CCT: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Channel {
    #[strum(serialize = "RGB")]
    Rgb,
    #[strum(serialize = "White")]
    White,
    #[strum(serialize = "CCT")]
    Cct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCapabilities {
    pub supports_rgb: bool,
    pub supports_white: bool,
    pub supports_cct: bool,
}

impl SegmentCapabilities {
    /// Capabilities assumed when nothing better is known
    pub const RGB_ONLY: Self = Self {
        supports_rgb: true,
        supports_white: false,
        supports_cct: false,
    };

    /// Decode a light capability bit field. Bits above bit 2 are ignored.
    pub fn from_flags(flags: u8) -> Self {
        Self {
            supports_rgb: flags & FLAG_RGB != 0,
            supports_white: flags & FLAG_WHITE != 0,
            supports_cct: flags & FLAG_CCT != 0,
        }
    }

    pub fn supports(&self, channel: Channel) -> bool {
        match channel {
            Channel::Rgb => self.supports_rgb,
            Channel::White => self.supports_white,
            Channel::Cct => self.supports_cct,
        }
    }

    /// Supported channels, in RGB, White, CCT order
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::iter().filter(move |&channel| self.supports(channel))
    }
}

impl Default for SegmentCapabilities {
    fn default() -> Self {
        Self::RGB_ONLY
    }
}

impl fmt::Display for SegmentCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut any = false;
        for channel in self.channels() {
            if any {
                write!(f, " + ")?;
            }
            write!(f, "{}", channel)?;
            any = true;
        }

        if !any {
            write!(f, "None")?;
        }

        Ok(())
    }
}

/// Capabilities of every segment of one device, indexed by segment id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilitySet {
    segments: Vec<SegmentCapabilities>,
}

impl DeviceCapabilitySet {
    fn from_flags(flags: Option<&[i64]>) -> Self {
        let segments = match flags {
            Some(flags) if !flags.is_empty() => flags
                .iter()
                // Only the low three bits carry meaning
                .map(|&flag| SegmentCapabilities::from_flags((flag & 0b111) as u8))
                .collect(),
            _ => vec![SegmentCapabilities::RGB_ONLY],
        };

        Self { segments }
    }

    /// Capabilities of a segment; unknown segments fall back to RGB only
    pub fn segment(&self, segment_id: usize) -> SegmentCapabilities {
        self.segments
            .get(segment_id)
            .copied()
            .unwrap_or(SegmentCapabilities::RGB_ONLY)
    }

    pub fn segments(&self) -> &[SegmentCapabilities] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// `leds` object of a WLED `/json/info` response
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedInfo {
    /// Total LED count
    #[serde(default)]
    pub count: usize,
    /// Combined light capabilities of the whole device
    #[serde(default)]
    pub lc: Option<i64>,
    /// Per-segment light capabilities
    #[serde(default)]
    pub seglc: Option<Vec<i64>>,
}

#[derive(Debug, Default)]
pub struct CapabilityDetector {
    cache: RwLock<HashMap<DeviceId, Arc<DeviceCapabilitySet>>>,
}

impl CapabilityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `segment_flags` and cache the result for `device_id`, replacing any previous entry
    ///
    /// Missing or empty flags yield a single RGB-only segment.
    pub fn detect(
        &self,
        device_id: &DeviceId,
        segment_flags: Option<&[i64]>,
    ) -> Arc<DeviceCapabilitySet> {
        let set = Arc::new(DeviceCapabilitySet::from_flags(segment_flags));

        debug!(
            device = %device_id,
            segments = set.segment_count(),
            flags = ?segment_flags,
            "detected segment capabilities"
        );

        self.cache
            .write()
            .unwrap()
            .insert(device_id.clone(), set.clone());

        set
    }

    /// Run detection from a WLED info response
    ///
    /// Uses the per-segment `seglc` array when present, otherwise treats the device-wide `lc` as
    /// a single segment.
    pub fn detect_from_info(
        &self,
        device_id: &DeviceId,
        info: &LedInfo,
    ) -> Arc<DeviceCapabilitySet> {
        match (&info.seglc, info.lc) {
            (Some(seglc), _) if !seglc.is_empty() => {
                self.detect(device_id, Some(seglc.as_slice()))
            }
            (_, Some(lc)) => self.detect(device_id, Some(std::slice::from_ref(&lc))),
            _ => self.detect(device_id, None),
        }
    }

    pub fn get_cached(&self, device_id: &DeviceId) -> Option<Arc<DeviceCapabilitySet>> {
        self.cache.read().unwrap().get(device_id).cloned()
    }

    /// Forget the detection results for one device
    pub fn clear_cache(&self, device_id: &DeviceId) {
        if self.cache.write().unwrap().remove(device_id).is_some() {
            debug!(device = %device_id, "cleared capability cache");
        }
    }

    pub fn clear_all(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Capabilities of a segment, RGB only if the device or segment is unknown
    pub fn capabilities(&self, device_id: &DeviceId, segment_id: usize) -> SegmentCapabilities {
        self.get_cached(device_id)
            .map(|set| set.segment(segment_id))
            .unwrap_or_default()
    }

    /// Number of detected segments, 0 if the device was never detected
    pub fn get_segment_count(&self, device_id: &DeviceId) -> usize {
        self.get_cached(device_id)
            .map(|set| set.segment_count())
            .unwrap_or(0)
    }

    pub fn has_multiple_segments(&self, device_id: &DeviceId) -> bool {
        self.get_segment_count(device_id) > 1
    }

    pub fn should_show_cct_slider(&self, device_id: &DeviceId, segment_id: usize) -> bool {
        self.capabilities(device_id, segment_id).supports_cct
    }

    pub fn should_show_white_slider(&self, device_id: &DeviceId, segment_id: usize) -> bool {
        self.capabilities(device_id, segment_id).supports_white
    }

    pub fn should_show_rgb_controls(&self, device_id: &DeviceId, segment_id: usize) -> bool {
        self.capabilities(device_id, segment_id).supports_rgb
    }

    /// Human readable list of supported channels, e.g. `RGB + CCT`
    pub fn get_capability_description(&self, device_id: &DeviceId, segment_id: usize) -> String {
        self.capabilities(device_id, segment_id).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(rgb: bool, white: bool, cct: bool) -> SegmentCapabilities {
        SegmentCapabilities {
            supports_rgb: rgb,
            supports_white: white,
            supports_cct: cct,
        }
    }

    #[test]
    fn decode_flags() {
        assert_eq!(SegmentCapabilities::from_flags(0b101), caps(true, false, true));
        assert_eq!(SegmentCapabilities::from_flags(0b011), caps(true, true, false));
        assert_eq!(SegmentCapabilities::from_flags(0b110), caps(false, true, true));
        assert_eq!(SegmentCapabilities::from_flags(0b111), caps(true, true, true));
        assert_eq!(SegmentCapabilities::from_flags(0b001), caps(true, false, false));
        assert_eq!(SegmentCapabilities::from_flags(0), caps(false, false, false));
    }

    #[test]
    fn missing_flags_fall_back_to_rgb() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("desk");

        for flags in [None, Some(&[][..])] {
            let set = detector.detect(&id, flags);
            assert_eq!(set.segments(), &[SegmentCapabilities::RGB_ONLY]);
        }
    }

    #[test]
    fn out_of_range_segment_falls_back() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("desk");
        detector.detect(&id, Some(&[6, 7][..]));

        assert_eq!(detector.get_segment_count(&id), 2);
        assert!(detector.has_multiple_segments(&id));
        assert_eq!(detector.capabilities(&id, 0), caps(false, true, true));
        assert_eq!(detector.capabilities(&id, 5), SegmentCapabilities::RGB_ONLY);
        assert!(detector.should_show_rgb_controls(&id, 5));
        assert!(!detector.should_show_rgb_controls(&id, 0));
    }

    #[test]
    fn queries_never_detect() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("unknown");

        assert!(detector.get_cached(&id).is_none());
        assert_eq!(detector.get_segment_count(&id), 0);
        assert!(!detector.has_multiple_segments(&id));
        assert!(detector.should_show_rgb_controls(&id, 0));
        assert!(!detector.should_show_white_slider(&id, 0));
        assert!(!detector.should_show_cct_slider(&id, 0));
        assert!(detector.get_cached(&id).is_none());
    }

    #[test]
    fn clear_and_redetect() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("porch");

        detector.detect(&id, Some(&[3][..]));
        assert!(detector.get_cached(&id).is_some());

        detector.clear_cache(&id);
        assert!(detector.get_cached(&id).is_none());

        detector.detect(&id, Some(&[7, 1, 1][..]));
        assert_eq!(detector.get_segment_count(&id), 3);
        assert!(detector.should_show_cct_slider(&id, 0));
    }

    #[test]
    fn redetect_replaces_set() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("porch");

        let first = detector.detect(&id, Some(&[1, 1][..]));
        detector.detect(&id, Some(&[2][..]));

        assert_eq!(first.segment_count(), 2);
        assert_eq!(detector.get_segment_count(&id), 1);
        assert!(detector.should_show_white_slider(&id, 0));
    }

    #[test]
    fn descriptions() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("lamp");
        detector.detect(&id, Some(&[7, 5, 6, 0, 8 | 1][..]));

        assert_eq!(detector.get_capability_description(&id, 0), "RGB + White + CCT");
        assert_eq!(detector.get_capability_description(&id, 1), "RGB + CCT");
        assert_eq!(detector.get_capability_description(&id, 2), "White + CCT");
        assert_eq!(detector.get_capability_description(&id, 3), "None");
        assert_eq!(detector.get_capability_description(&id, 4), "RGB");
        assert_eq!(detector.get_capability_description(&id, 9), "RGB");
    }

    #[test]
    fn detect_from_wled_info() {
        let detector = CapabilityDetector::new();
        let id = DeviceId::from("wled");

        let info: LedInfo =
            serde_json::from_str(r#"{"count": 60, "lc": 7, "seglc": [1, 3]}"#).unwrap();
        detector.detect_from_info(&id, &info);
        assert_eq!(detector.get_segment_count(&id), 2);
        assert!(detector.should_show_white_slider(&id, 1));

        let info: LedInfo = serde_json::from_str(r#"{"count": 60, "lc": 4}"#).unwrap();
        detector.detect_from_info(&id, &info);
        assert_eq!(detector.capabilities(&id, 0), caps(false, false, true));

        detector.detect_from_info(&id, &LedInfo::default());
        assert_eq!(detector.capabilities(&id, 0), SegmentCapabilities::RGB_ONLY);
    }
}
