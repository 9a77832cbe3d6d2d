//! Client-side gradient transitions
//!
//! WLED's native transitions cannot animate per-pixel gradients, so transitions are rendered here
//! as a timed sequence of per-pixel frames pushed through the [ColorPipeline].
//!
//! A device runs at most one transition at a time: starting a second one waits until the first
//! has fully exited. Cancellation is cooperative and observed once per frame.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use parse_display::Display;
use tokio::{sync::OwnedMutexGuard, time::Instant};

use crate::{
    config::TransitionConfig,
    gradient::{self, lerp_color, sample_color},
    models::{ColorIntent, Device, DeviceId, Gradient, GradientStop},
    pipeline::ColorPipeline,
};

pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

pub struct TransitionRequest {
    pub from: Gradient,
    pub to: Gradient,
    pub duration: Duration,
    /// Frame rate, the runner's default if unset
    pub fps: Option<u32>,
    pub segment_id: u32,
    pub from_brightness: Option<u8>,
    pub to_brightness: Option<u8>,
    /// Called once per frame with the eased progress
    pub on_progress: Option<ProgressCallback>,
}

impl TransitionRequest {
    pub fn new(from: Gradient, to: Gradient, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            fps: None,
            segment_id: 0,
            from_brightness: None,
            to_brightness: None,
            on_progress: None,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_segment(mut self, segment_id: u32) -> Self {
        self.segment_id = segment_id;
        self
    }

    pub fn with_brightness(mut self, from: u8, to: u8) -> Self {
        self.from_brightness = Some(from);
        self.to_brightness = Some(to);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display(style = "lowercase")]
pub enum TransitionOutcome {
    Completed,
    Cancelled,
}

/// Ease-in-out cubic curve over `[0, 1]`
pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Blend two gradients at progress `t`
///
/// Both gradients are resampled at `max(len, 2)` evenly spaced positions and each pair of colours
/// is mixed linearly.
pub fn interpolate_gradients(from: &Gradient, to: &Gradient, t: f64) -> Gradient {
    let count = from.len().max(to.len()).max(2);
    let last = (count - 1) as f64;

    let stops = (0..count)
        .map(|i| {
            let position = i as f64 / last;
            let a = sample_color(position, &from.stops);
            let b = sample_color(position, &to.stops);
            GradientStop::new(position, lerp_color(a, b, t, 1.0))
        })
        .collect();

    Gradient::new(stops)
}

fn lerp_brightness(from: u8, to: u8, t: f64) -> u8 {
    let (from, to) = (f64::from(from), f64::from(to));
    (from + (to - from) * t).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, Default)]
struct RunnerState {
    cancel_requested: HashSet<DeviceId>,
    running_devices: HashSet<DeviceId>,
    turns: HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>,
}

pub struct GradientTransitionRunner {
    pipeline: Arc<ColorPipeline>,
    config: TransitionConfig,
    state: Mutex<RunnerState>,
}

impl GradientTransitionRunner {
    pub fn new(pipeline: Arc<ColorPipeline>, config: TransitionConfig) -> Self {
        Self {
            pipeline,
            config,
            state: Default::default(),
        }
    }

    pub fn pipeline(&self) -> &Arc<ColorPipeline> {
        &self.pipeline
    }

    /// Run a transition on `device` until it completes or is cancelled
    ///
    /// If a transition is already running on the device, waits for it to exit first.
    #[instrument(skip(self, device, request), fields(device = %device.id))]
    pub async fn start(&self, device: &Device, request: TransitionRequest) -> TransitionOutcome {
        let turn = self.turn(&device.id).lock_owned().await;
        let _running = RunningGuard::enter(&self.state, &device.id, turn);

        let outcome = self.run_frames(device, request).await;
        info!(%outcome, "transition finished");

        outcome
    }

    /// Ask the running transition on a device to stop before its next frame
    pub fn cancel(&self, device_id: &DeviceId) {
        let mut state = self.state.lock().unwrap();

        if state.running_devices.contains(device_id) {
            state.cancel_requested.insert(device_id.clone());
            info!(device = %device_id, "cancelling transition");
        } else {
            debug!(device = %device_id, "no transition to cancel");
        }
    }

    pub fn is_running(&self, device_id: &DeviceId) -> bool {
        self.state
            .lock()
            .unwrap()
            .running_devices
            .contains(device_id)
    }

    fn is_cancelled(&self, device_id: &DeviceId) -> bool {
        self.state
            .lock()
            .unwrap()
            .cancel_requested
            .contains(device_id)
    }

    fn turn(&self, device_id: &DeviceId) -> Arc<tokio::sync::Mutex<()>> {
        self.state
            .lock()
            .unwrap()
            .turns
            .entry(device_id.clone())
            .or_default()
            .clone()
    }

    async fn run_frames(
        &self,
        device: &Device,
        mut request: TransitionRequest,
    ) -> TransitionOutcome {
        let fps = request.fps.unwrap_or(self.config.fps).max(1);
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(fps));
        let duration = request
            .duration
            .max(self.config.min_duration())
            .as_secs_f64();
        let pixel_count = device.segment_len(request.segment_id);
        let brightness = request.from_brightness.zip(request.to_brightness);

        debug!(
            fps,
            duration,
            pixel_count,
            from = %request.from,
            to = %request.to,
            "starting transition"
        );

        let start = Instant::now();
        let mut frames = 0usize;

        loop {
            if self.is_cancelled(&device.id) {
                debug!(frames, "transition cancelled");
                return TransitionOutcome::Cancelled;
            }

            let linear = (start.elapsed().as_secs_f64() / duration).clamp(0.0, 1.0);
            let t = ease_in_out_cubic(linear);

            if let Some((from, to)) = brightness {
                let value = lerp_brightness(from, to, t);
                let intent = ColorIntent::brightness(device.id.clone(), value)
                    .with_segment(request.segment_id);
                self.push(&intent, device).await;
            }

            let frame = interpolate_gradients(&request.from, &request.to, t);
            let pixels = gradient::sample(&frame, pixel_count, self.config.gamma);
            let intent =
                ColorIntent::per_pixel(device.id.clone(), pixels).with_segment(request.segment_id);
            self.push(&intent, device).await;

            frames += 1;

            if let Some(on_progress) = request.on_progress.as_mut() {
                on_progress(t);
            }

            if t >= 1.0 {
                debug!(frames, "transition complete");
                return TransitionOutcome::Completed;
            }

            tokio::task::yield_now().await;
            tokio::time::sleep(frame_interval).await;
        }
    }

    async fn push(&self, intent: &ColorIntent, device: &Device) {
        // Frames are generated here, a rejected one is a bug but must not stop the animation
        if let Err(error) = self.pipeline.apply(intent, device).await {
            warn!(%error, "transition frame rejected");
        }
    }
}

/// Holds a device in the running set along with its turn; clears its state on drop, whatever the
/// exit path
struct RunningGuard<'s> {
    state: &'s Mutex<RunnerState>,
    device_id: DeviceId,
    turn: Option<OwnedMutexGuard<()>>,
}

impl<'s> RunningGuard<'s> {
    fn enter(
        state: &'s Mutex<RunnerState>,
        device_id: &DeviceId,
        turn: OwnedMutexGuard<()>,
    ) -> Self {
        state
            .lock()
            .unwrap()
            .running_devices
            .insert(device_id.clone());

        Self {
            state,
            device_id: device_id.clone(),
            turn: Some(turn),
        }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.running_devices.remove(&self.device_id);
            state.cancel_requested.remove(&self.device_id);
            drop(self.turn.take());

            // Queued runs hold their own reference
            let idle = state
                .turns
                .get(&self.device_id)
                .map_or(false, |turn| Arc::strong_count(turn) == 1);
            if idle {
                state.turns.remove(&self.device_id);
            }
        }
    }
}
