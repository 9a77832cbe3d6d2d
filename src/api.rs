//! Device API seam
//!
//! The colour pipeline never talks to the network itself: it drives an implementation of
//! [DeviceApi]. A real client speaks the WLED JSON/WebSocket API; [dummy::DummyApi] logs calls
//! for previews and local development.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Device;

pub mod dummy;

#[cfg(test)]
pub(crate) mod testing;

/// Upper bound on the pixels a client should send in one per-pixel request
pub const PIXELS_PER_CHUNK: usize = 256;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("device error: {0}")]
    Device(String),
    #[error("request timed out")]
    Timeout,
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Device power/brightness state update
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

/// Notified by [DeviceApi::set_segment_pixels] after each chunk is acknowledged
#[async_trait]
pub trait ChunkListener: Send + Sync {
    async fn after_chunk(&self);
}

#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn set_brightness(&self, device: &Device, brightness: u8) -> Result<(), ApiError>;

    async fn set_color(
        &self,
        device: &Device,
        rgb: [u8; 3],
        cct: Option<u8>,
        white: Option<u8>,
    ) -> Result<(), ApiError>;

    async fn update_state(&self, device: &Device, update: StateUpdate) -> Result<(), ApiError>;

    /// Upload `colors` (6-digit hex) to a segment starting at `start_index`
    ///
    /// Implementations split the upload into chunks of at most [PIXELS_PER_CHUNK] pixels, send
    /// them in order, and call `listener` after each acknowledged chunk.
    async fn set_segment_pixels(
        &self,
        device: &Device,
        segment_id: u32,
        start_index: usize,
        colors: &[String],
        cct: Option<u8>,
        listener: &dyn ChunkListener,
    ) -> Result<(), ApiError>;
}
