//! Colour pipeline
//!
//! The single authority turning [ColorIntent]s into device calls. Per-pixel uploads mark their
//! device as uploading; brightness-only intents that arrive meanwhile are parked (last write
//! wins) and flushed after the next acknowledged chunk, and once more when the upload ends, so
//! they never interleave with half-received pixel data.
//!
//! Per-pixel uploads to one device run one at a time, in arrival order.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::{
    api::{ChunkListener, DeviceApi},
    models::{ColorIntent, Device, DeviceId, IntentError, IntentMode},
};

#[derive(Debug, Default)]
struct PipelineState {
    uploading_pixels: HashSet<DeviceId>,
    pending_brightness: HashMap<DeviceId, u8>,
    upload_turns: HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>,
}

pub struct ColorPipeline {
    api: Arc<dyn DeviceApi>,
    state: Mutex<PipelineState>,
}

impl ColorPipeline {
    pub fn new(api: Arc<dyn DeviceApi>) -> Self {
        Self {
            api,
            state: Default::default(),
        }
    }

    pub fn api(&self) -> &Arc<dyn DeviceApi> {
        &self.api
    }

    /// Apply one intent to `device`
    ///
    /// Only malformed intents are reported. Device call failures are logged and absorbed: the
    /// next successful call corrects the device state.
    #[instrument(skip(self, intent, device), fields(device = %device.id, mode = ?intent.mode))]
    pub async fn apply(&self, intent: &ColorIntent, device: &Device) -> Result<(), IntentError> {
        if intent.device_id != device.id {
            warn!(intent_device = %intent.device_id, "intent addressed to another device");
        }

        match intent.mode {
            IntentMode::Solid => self.apply_solid(intent, device).await,
            IntentMode::PerPixel => self.apply_pixels(intent, device).await,
            IntentMode::Palette => {
                // Effects and palettes go through device state calls higher up
                debug!(
                    effect = ?intent.effect_id,
                    palette = ?intent.palette_id,
                    "ignoring palette intent"
                );
                Ok(())
            }
        }
    }

    /// Forget upload and pending brightness state for a device
    pub fn cancel_uploads(&self, device_id: &DeviceId) {
        let mut state = self.state.lock().unwrap();
        let was_uploading = state.uploading_pixels.remove(device_id);
        let dropped = state.pending_brightness.remove(device_id);

        if was_uploading || dropped.is_some() {
            debug!(device = %device_id, ?dropped, "cancelled upload state");
        }
    }

    pub fn is_uploading(&self, device_id: &DeviceId) -> bool {
        self.state
            .lock()
            .unwrap()
            .uploading_pixels
            .contains(device_id)
    }

    pub fn pending_brightness(&self, device_id: &DeviceId) -> Option<u8> {
        self.state
            .lock()
            .unwrap()
            .pending_brightness
            .get(device_id)
            .copied()
    }

    async fn apply_solid(&self, intent: &ColorIntent, device: &Device) -> Result<(), IntentError> {
        if intent.is_brightness_only() {
            if let Some(brightness) = intent.brightness {
                if self.defer_brightness(&device.id, brightness) {
                    trace!(brightness, "upload in flight, brightness deferred");
                } else {
                    self.send_brightness(device, brightness).await;
                }
            }

            return Ok(());
        }

        match intent.solid_rgbw()? {
            Some((rgb, white)) => {
                if let Err(error) = self
                    .api
                    .set_color(device, rgb, intent.color_temperature, white)
                    .await
                {
                    warn!(device = %device.id, %error, "set color failed");
                }

                // Sent alongside the colour, not coalesced
                if let Some(brightness) = intent.brightness {
                    self.send_brightness(device, brightness).await;
                }
            }
            None => {
                debug!("solid intent without color or brightness");
            }
        }

        Ok(())
    }

    async fn apply_pixels(&self, intent: &ColorIntent, device: &Device) -> Result<(), IntentError> {
        let pixels = intent.pixels()?;
        if pixels.is_empty() {
            debug!("empty pixel frame");
            return Ok(());
        }

        let _turn = UploadTurn::acquire(&self.state, &device.id).await;
        let upload = UploadGuard::begin(&self.state, &device.id);

        // Brightness carried by a frame takes the same path as one issued during the upload
        if let Some(brightness) = intent.brightness {
            self.defer_brightness(&device.id, brightness);
        }

        let listener = FlushPending {
            pipeline: self,
            device,
        };

        let result = self
            .api
            .set_segment_pixels(
                device,
                intent.segment_id,
                0,
                pixels,
                intent.color_temperature,
                &listener,
            )
            .await;

        drop(upload);

        if let Err(error) = result {
            warn!(
                device = %device.id,
                segment = intent.segment_id,
                %error,
                "pixel upload failed"
            );
        }

        self.flush_pending(device).await;

        Ok(())
    }

    /// Park `brightness` if the device is mid-upload. Returns true if it was parked.
    fn defer_brightness(&self, device_id: &DeviceId, brightness: u8) -> bool {
        let mut state = self.state.lock().unwrap();

        if state.uploading_pixels.contains(device_id) {
            state.pending_brightness.insert(device_id.clone(), brightness);
            true
        } else {
            false
        }
    }

    async fn flush_pending(&self, device: &Device) {
        let pending = self
            .state
            .lock()
            .unwrap()
            .pending_brightness
            .remove(&device.id);

        if let Some(brightness) = pending {
            trace!(device = %device.id, brightness, "flushing pending brightness");
            self.send_brightness(device, brightness).await;
        }
    }

    async fn send_brightness(&self, device: &Device, brightness: u8) {
        if let Err(error) = self.api.set_brightness(device, brightness).await {
            warn!(device = %device.id, brightness, %error, "set brightness failed");
        }
    }
}

/// Exclusive right to upload pixels to one device, held until the final flush is done
struct UploadTurn<'s> {
    state: &'s Mutex<PipelineState>,
    device_id: DeviceId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'s> UploadTurn<'s> {
    async fn acquire(state: &'s Mutex<PipelineState>, device_id: &DeviceId) -> UploadTurn<'s> {
        let turn = state
            .lock()
            .unwrap()
            .upload_turns
            .entry(device_id.clone())
            .or_default()
            .clone();

        Self {
            state,
            device_id: device_id.clone(),
            guard: Some(turn.lock_owned().await),
        }
    }
}

impl Drop for UploadTurn<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            drop(self.guard.take());

            // Waiting uploads hold their own reference
            let idle = state
                .upload_turns
                .get(&self.device_id)
                .map_or(false, |turn| Arc::strong_count(turn) == 1);
            if idle {
                state.upload_turns.remove(&self.device_id);
            }
        }
    }
}

/// Marks a device as uploading until dropped
struct UploadGuard<'s> {
    state: &'s Mutex<PipelineState>,
    device_id: DeviceId,
}

impl<'s> UploadGuard<'s> {
    fn begin(state: &'s Mutex<PipelineState>, device_id: &DeviceId) -> Self {
        state
            .lock()
            .unwrap()
            .uploading_pixels
            .insert(device_id.clone());

        Self {
            state,
            device_id: device_id.clone(),
        }
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.uploading_pixels.remove(&self.device_id);
        }
    }
}

struct FlushPending<'p> {
    pipeline: &'p ColorPipeline,
    device: &'p Device,
}

#[async_trait]
impl ChunkListener for FlushPending<'_> {
    async fn after_chunk(&self) {
        self.pipeline.flush_pending(self.device).await;
    }
}
