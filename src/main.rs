#[macro_use]
extern crate tracing;

use std::{path::PathBuf, sync::Arc, time::Duration};

use structopt::StructOpt;
use tokio::runtime::Builder;
use tokio::signal;

use wled_control::{
    api::{dummy::DummyApi, DeviceApi, StateUpdate},
    capabilities::CapabilityDetector,
    config::{Config, DeviceConfig},
    gradient,
    models::{parse_hex, ColorIntent, Device, DeviceId, Gradient},
    pipeline::ColorPipeline,
    transition::{GradientTransitionRunner, TransitionRequest},
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
    #[structopt(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Set a solid color
    Color {
        device: String,
        /// Color as RRGGBB
        color: String,
        #[structopt(short, long)]
        brightness: Option<u8>,
        #[structopt(short, long)]
        white: Option<u8>,
        #[structopt(long)]
        cct: Option<u8>,
    },
    /// Set brightness only
    Brightness { device: String, value: u8 },
    /// Render a gradient to a segment
    Pixels {
        device: String,
        /// Gradient as pos:RRGGBB,... or RRGGBB,...
        gradient: Gradient,
        #[structopt(short, long, default_value = "0")]
        segment: u32,
    },
    /// Animate between two gradients
    Transition {
        /// Devices to animate, all configured devices if empty
        devices: Vec<String>,
        #[structopt(long)]
        from: Gradient,
        #[structopt(long)]
        to: Gradient,
        /// Duration in seconds
        #[structopt(short, long, default_value = "2")]
        duration: f64,
        #[structopt(long)]
        fps: Option<u32>,
        #[structopt(short, long, default_value = "0")]
        segment: u32,
        #[structopt(long)]
        from_brightness: Option<u8>,
        #[structopt(long)]
        to_brightness: Option<u8>,
    },
    /// Show detected segment capabilities
    Capabilities { devices: Vec<String> },
    /// Turn a device on or off
    Power {
        device: String,
        #[structopt(long)]
        off: bool,
    },
}

struct Context {
    config: Config,
    pipeline: Arc<ColorPipeline>,
}

impl Context {
    fn device_config(&self, id: &str) -> color_eyre::eyre::Result<&DeviceConfig> {
        self.config
            .device(&DeviceId::from(id))
            .ok_or_else(|| color_eyre::eyre::eyre!("unknown device '{}'", id))
    }

    fn device(&self, id: &str) -> color_eyre::eyre::Result<Device> {
        Ok(self.device_config(id)?.to_device())
    }

    fn devices(&self, ids: &[String]) -> color_eyre::eyre::Result<Vec<&DeviceConfig>> {
        if ids.is_empty() {
            Ok(self.config.devices.iter().collect())
        } else {
            ids.iter().map(|id| self.device_config(id)).collect()
        }
    }
}

async fn transition(
    ctx: &Context,
    devices: Vec<Device>,
    make_request: impl Fn(&Device) -> TransitionRequest,
) {
    let runner =
        GradientTransitionRunner::new(ctx.pipeline.clone(), ctx.config.transition.clone());

    let runs = futures::future::join_all(
        devices
            .iter()
            .map(|device| runner.start(device, make_request(device))),
    );
    tokio::pin!(runs);

    let outcomes = tokio::select! {
        outcomes = &mut runs => outcomes,
        _ = signal::ctrl_c() => {
            for device in &devices {
                runner.cancel(&device.id);
            }
            runs.await
        }
    };

    for (device, outcome) in devices.iter().zip(outcomes) {
        info!(device = %device.id, %outcome, "transition done");
    }
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let mut config = if let Some(config_path) = opts.config_path.as_deref() {
        Config::load_file(config_path).await?
    } else {
        Config::default()
    };

    if config.devices.is_empty() {
        config.devices.push(DeviceConfig {
            id: DeviceId::from("demo"),
            name: "Demo strip".to_owned(),
            led_count: 30,
            segments: Vec::new(),
        });
    }

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    let api: Arc<dyn DeviceApi> = Arc::new(DummyApi::new(&config.dummy));
    let ctx = Context {
        pipeline: Arc::new(ColorPipeline::new(api)),
        config,
    };

    let command = match opts.command {
        Some(command) => command,
        None => {
            warn!("no command given, see --help");
            return Ok(());
        }
    };

    match command {
        Command::Color {
            device,
            color,
            brightness,
            white,
            cct,
        } => {
            let device = ctx.device(&device)?;
            let color = parse_hex(&color)?;

            let mut intent =
                ColorIntent::solid(device.id.clone(), [color.red, color.green, color.blue]);
            intent.brightness = brightness;
            intent.white_level = white;
            intent.color_temperature = cct;

            ctx.pipeline.apply(&intent, &device).await?;
        }

        Command::Brightness { device, value } => {
            let device = ctx.device(&device)?;
            ctx.pipeline
                .apply(&ColorIntent::brightness(device.id.clone(), value), &device)
                .await?;
        }

        Command::Pixels {
            device,
            gradient,
            segment,
        } => {
            let device = ctx.device(&device)?;
            let pixels = gradient::sample(
                &gradient,
                device.segment_len(segment),
                ctx.config.transition.gamma,
            );

            let intent = ColorIntent::per_pixel(device.id.clone(), pixels).with_segment(segment);
            ctx.pipeline.apply(&intent, &device).await?;
        }

        Command::Transition {
            devices,
            from,
            to,
            duration,
            fps,
            segment,
            from_brightness,
            to_brightness,
        } => {
            let devices = ctx
                .devices(&devices)?
                .into_iter()
                .map(DeviceConfig::to_device)
                .collect();
            let duration = Duration::from_secs_f64(duration.max(0.0));

            transition(&ctx, devices, |device| {
                let id = device.id.clone();
                let mut request = TransitionRequest::new(from.clone(), to.clone(), duration)
                    .with_segment(segment)
                    .on_progress(move |t| trace!(device = %id, progress = t));
                request.fps = fps;
                request.from_brightness = from_brightness;
                request.to_brightness = to_brightness;
                request
            })
            .await;
        }

        Command::Capabilities { devices } => {
            let detector = CapabilityDetector::new();

            for device in ctx.devices(&devices)? {
                detector.detect(&device.id, device.segment_flags().as_deref());

                for segment in 0..detector.get_segment_count(&device.id) {
                    info!(
                        device = %device.id,
                        segment,
                        capabilities = %detector.get_capability_description(&device.id, segment),
                    );
                }
            }
        }

        Command::Power { device, off } => {
            let device = ctx.device(&device)?;
            let update = StateUpdate {
                on: Some(!off),
                brightness: None,
            };

            if let Err(error) = ctx.pipeline.api().update_state(&device, update).await {
                error!(device = %device.id, %error, "power update failed");
            }
        }
    }

    Ok(())
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("WLED_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "wled_control=warn,wledctl=warn",
            1 => "wled_control=info,wledctl=info",
            2 => "wled_control=debug,wledctl=debug",
            _ => "wled_control=trace,wledctl=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
