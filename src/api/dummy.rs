use std::{fmt::Write, time::Duration};

use async_trait::async_trait;

use super::{ApiError, ChunkListener, DeviceApi, StateUpdate, PIXELS_PER_CHUNK};
use crate::{
    config::{DummyConfig, DummyMode},
    models::{parse_hex, Device},
};

/// Device API that writes every call to the log instead of the network
pub struct DummyApi {
    mode: DummyMode,
    chunk_size: usize,
    latency: Duration,
}

impl DummyApi {
    pub fn new(config: &DummyConfig) -> Self {
        Self {
            mode: config.mode,
            chunk_size: config.chunk_size.clamp(1, PIXELS_PER_CHUNK),
            latency: Duration::from_millis(config.latency_ms),
        }
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn log_pixels(&self, device: &Device, segment_id: u32, start: usize, chunk: &[String]) {
        match self.mode {
            DummyMode::Text => {
                for (i, pixel) in chunk.iter().enumerate() {
                    info!(
                        device = %device.id,
                        segment = segment_id,
                        led = %format_args!("{:3}", start + i),
                        color = %pixel,
                    );
                }
            }

            DummyMode::Ansi => {
                let mut buf = String::with_capacity(chunk.len() * 20);

                for pixel in chunk {
                    // Pixels were validated upstream, fall back to black just in case
                    let color = parse_hex(pixel).unwrap_or_default();
                    write!(
                        &mut buf,
                        "\x1B[38;2;{red};{green};{blue}m█",
                        red = color.red,
                        green = color.green,
                        blue = color.blue
                    )
                    .expect("failed to format escape sequence");
                }

                buf.push_str("\x1B[0m");

                info!(device = %device.id, segment = segment_id, start, "{}", buf);
            }
        }
    }
}

#[async_trait]
impl DeviceApi for DummyApi {
    async fn set_brightness(&self, device: &Device, brightness: u8) -> Result<(), ApiError> {
        self.round_trip().await;
        info!(device = %device.id, brightness, "set brightness");
        Ok(())
    }

    async fn set_color(
        &self,
        device: &Device,
        rgb: [u8; 3],
        cct: Option<u8>,
        white: Option<u8>,
    ) -> Result<(), ApiError> {
        self.round_trip().await;
        info!(
            device = %device.id,
            color = %hex::encode_upper(rgb),
            ?cct,
            ?white,
            "set color"
        );
        Ok(())
    }

    async fn update_state(&self, device: &Device, update: StateUpdate) -> Result<(), ApiError> {
        self.round_trip().await;
        info!(
            device = %device.id,
            on = ?update.on,
            brightness = ?update.brightness,
            "update state"
        );
        Ok(())
    }

    async fn set_segment_pixels(
        &self,
        device: &Device,
        segment_id: u32,
        start_index: usize,
        colors: &[String],
        cct: Option<u8>,
        listener: &dyn ChunkListener,
    ) -> Result<(), ApiError> {
        debug!(
            device = %device.id,
            segment = segment_id,
            pixels = colors.len(),
            ?cct,
            "uploading pixels"
        );

        for (index, chunk) in colors.chunks(self.chunk_size).enumerate() {
            self.round_trip().await;
            self.log_pixels(device, segment_id, start_index + index * self.chunk_size, chunk);
            listener.after_chunk().await;
        }

        Ok(())
    }
}
