//! Patchscale CLI
//!
//! Runs the incremental upscaling pipeline over a directory of frames or a
//! synthetic clip, using the nearest-neighbour reference upscaler, and
//! writes every artifact to a workspace.

use clap::Parser;
use patchscale::{
    config::FileConfig,
    frame::{DirectorySource, FrameSource, SyntheticSource},
    pipeline::{PipelineDriver, PipelineError, PipelineStats},
    upscale::{Dispatcher, NearestUpscaler},
    workspace::Workspace,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "patchscale", version)]
#[command(about = "Upscale video frames by re-upscaling only what changed", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of numbered PNG/JPEG frames
    #[arg(short, long, conflicts_with = "synthetic")]
    input: Option<PathBuf>,

    /// Generate a synthetic clip of this many frames instead of reading input
    #[arg(long, value_name = "FRAMES")]
    synthetic: Option<u64>,

    /// Workspace directory (overrides the config file)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Upscale factor
    #[arg(long)]
    scale: Option<u32>,

    /// Block size in raw pixels
    #[arg(long)]
    block_size: Option<u32>,

    /// Bleed padding in raw pixels
    #[arg(long)]
    bleed: Option<u32>,

    /// Also write logs to <workspace>/logs/patchscale.log
    #[arg(long)]
    log_to_workspace: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut workspace = match Workspace::create(&config.workspace) {
        Ok(workspace) => workspace,
        Err(e) => {
            eprintln!("Failed to prepare workspace: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(args.log_to_workspace.then(|| workspace.log_path())) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Patchscale v{}", patchscale::VERSION);

    match run(&args, &config, &mut workspace) {
        Ok(stats) => {
            info!(
                frames = stats.frames,
                regions = stats.regions_dispatched,
                corrections = stats.corrections_run,
                workspace = %workspace.root().display(),
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(frame = ?e.frame_index(), error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<FileConfig, patchscale::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(path) = &args.workspace {
        config.workspace.path = path.clone();
        config.workspace.use_temp = false;
    }
    if let Some(scale) = args.scale {
        config.pipeline.scale_factor = scale;
    }
    if let Some(block_size) = args.block_size {
        config.pipeline.block_size = block_size;
    }
    if let Some(bleed) = args.bleed {
        config.pipeline.bleed = bleed;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(log_file: Option<PathBuf>) -> std::io::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// `RUST_LOG` directives when given and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn open_source(args: &Args, config: &FileConfig) -> Result<Box<dyn FrameSource>, PipelineError> {
    if let Some(dir) = &args.input {
        return Ok(Box::new(DirectorySource::open(dir)?));
    }

    let frames = args.synthetic.unwrap_or(60);
    let block = config.pipeline.block_size;
    let mut clip = SyntheticSource::new(block * 16, block * 12, block * 2, frames)?;
    if frames >= 8 {
        clip = clip.with_fade_from(frames - frames / 4);
    }
    info!(frames, "Using synthetic clip");
    Ok(Box::new(clip))
}

fn run(
    args: &Args,
    config: &FileConfig,
    workspace: &mut Workspace,
) -> Result<PipelineStats, PipelineError> {
    let mut source = open_source(args, config)?;

    let upscaler = Arc::new(NearestUpscaler::new(config.pipeline.scale_factor));
    let dispatcher = Dispatcher::new(
        upscaler,
        config.pipeline.max_dispatch_retries,
        config.pipeline.max_concurrent_dispatches,
    );

    let cancel = dispatcher.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling outstanding dispatches");
        cancel.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut driver = PipelineDriver::new(&config.pipeline, &config.correction, dispatcher);

    #[cfg(feature = "metrics")]
    {
        if let Some(state) = metrics_export::spawn(&config.metrics) {
            let mut sink = metrics_export::PublishingSink::new(&mut *workspace, state);
            return driver.run(source.as_mut(), &mut sink);
        }
    }

    driver.run(source.as_mut(), &mut *workspace)
}

#[cfg(feature = "metrics")]
mod metrics_export {
    use patchscale::config::MetricsConfig;
    use patchscale::frame::Frame;
    use patchscale::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig, MetricsState};
    use patchscale::pipeline::{FrameSink, PipelineStats, SinkError, StepReport};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing::{error, warn};

    /// Starts the exporter on its own thread; `None` when disabled.
    pub fn spawn(config: &MetricsConfig) -> Option<Arc<RwLock<MetricsState>>> {
        let server_config = MetricsServerConfig::from_config(config)?;
        let registry = match MetricsRegistry::new() {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                return None;
            }
        };
        let server = MetricsServer::new(server_config, registry);
        let state = server.state();

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                error!("Metrics server stopped: {}", e);
            }
        });
        Some(state)
    }

    /// Forwards frames to an inner sink and publishes the driver's totals.
    pub struct PublishingSink<'a> {
        inner: &'a mut dyn FrameSink,
        state: Arc<RwLock<MetricsState>>,
    }

    impl<'a> PublishingSink<'a> {
        pub fn new(inner: &'a mut dyn FrameSink, state: Arc<RwLock<MetricsState>>) -> Self {
            Self { inner, state }
        }
    }

    impl FrameSink for PublishingSink<'_> {
        fn emit(&mut self, report: &StepReport, frame: &Frame) -> Result<(), SinkError> {
            self.inner.emit(report, frame)
        }

        fn progress(&mut self, stats: &PipelineStats) {
            self.inner.progress(stats);
            self.state.blocking_write().publish(stats, false);
        }

        fn finish(&mut self, stats: &PipelineStats) -> Result<(), SinkError> {
            self.inner.finish(stats)?;
            self.state.blocking_write().publish(stats, true);
            Ok(())
        }

        fn abort(&mut self, stats: &PipelineStats) {
            self.inner.abort(stats);
            self.state.blocking_write().publish(stats, true);
        }
    }
}
