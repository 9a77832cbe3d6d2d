use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use super::{ApiError, ChunkListener, DeviceApi, StateUpdate, PIXELS_PER_CHUNK};
use crate::models::{Device, DeviceId};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    SetBrightness {
        device: DeviceId,
        brightness: u8,
    },
    SetColor {
        device: DeviceId,
        rgb: [u8; 3],
        cct: Option<u8>,
        white: Option<u8>,
    },
    UpdateState {
        device: DeviceId,
        update: StateUpdate,
    },
    SetSegmentPixels {
        device: DeviceId,
        segment_id: u32,
        colors: Vec<String>,
    },
}

/// Device API that records calls in order
///
/// When gated, every chunk of a pixel upload waits for one permit on the gate semaphore before
/// it is acknowledged, so tests can act while an upload is in flight. Failing calls are still
/// recorded.
pub struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    gate: Option<Arc<Semaphore>>,
    upload_started: Arc<Notify>,
    fail_uploads: AtomicBool,
    fail_brightness: AtomicBool,
    fail_color: AtomicBool,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: None,
            upload_started: Arc::new(Notify::new()),
            fail_uploads: AtomicBool::new(false),
            fail_brightness: AtomicBool::new(false),
            fail_color: AtomicBool::new(false),
        }
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(gate.clone()),
                ..Self::new()
            },
            gate,
        )
    }

    /// Make every pixel upload fail after its first gate permit
    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn fail_brightness(&self) {
        self.fail_brightness.store(true, Ordering::SeqCst);
    }

    pub fn fail_color(&self) {
        self.fail_color.store(true, Ordering::SeqCst);
    }

    pub fn upload_started(&self) -> Arc<Notify> {
        self.upload_started.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn brightness_calls(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::SetBrightness { brightness, .. } => Some(brightness),
                _ => None,
            })
            .collect()
    }

    pub fn pixel_frames(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::SetSegmentPixels { colors, .. } => Some(colors),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl DeviceApi for RecordingApi {
    async fn set_brightness(&self, device: &Device, brightness: u8) -> Result<(), ApiError> {
        self.record(ApiCall::SetBrightness {
            device: device.id.clone(),
            brightness,
        });

        if self.fail_brightness.load(Ordering::SeqCst) {
            return Err(ApiError::Timeout);
        }
        Ok(())
    }

    async fn set_color(
        &self,
        device: &Device,
        rgb: [u8; 3],
        cct: Option<u8>,
        white: Option<u8>,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::SetColor {
            device: device.id.clone(),
            rgb,
            cct,
            white,
        });

        if self.fail_color.load(Ordering::SeqCst) {
            return Err(ApiError::Http {
                status: 500,
                message: "color rejected".to_owned(),
            });
        }
        Ok(())
    }

    async fn update_state(&self, device: &Device, update: StateUpdate) -> Result<(), ApiError> {
        self.record(ApiCall::UpdateState {
            device: device.id.clone(),
            update,
        });
        Ok(())
    }

    async fn set_segment_pixels(
        &self,
        device: &Device,
        segment_id: u32,
        _start_index: usize,
        colors: &[String],
        _cct: Option<u8>,
        listener: &dyn ChunkListener,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::SetSegmentPixels {
            device: device.id.clone(),
            segment_id,
            colors: colors.to_vec(),
        });
        self.upload_started.notify_one();

        if self.fail_uploads.load(Ordering::SeqCst) {
            self.wait_gate().await;
            return Err(ApiError::Unavailable("upload rejected".to_owned()));
        }

        for _chunk in colors.chunks(PIXELS_PER_CHUNK) {
            self.wait_gate().await;
            listener.after_chunk().await;
        }

        Ok(())
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
