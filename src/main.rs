//! ctp-touchd CLI
//!
//! Userspace multi-touch driver for UART capacitive touch sensors.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::bounded;
use ctp_touchd::{
    acquisition::{
        open_input, request_realtime_priority, AcquisitionLoop, ByteReader, LoopExit,
        READ_BUF_SIZE, REALTIME_PRIORITY,
    },
    config::{Config, Orientation, ProtocolVariant},
    core::FrameProcessor,
    output::{EventSink, TextSink},
    VERSION,
};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ctp-touchd")]
#[command(version = VERSION)]
#[command(about = "Userspace multi-touch driver for UART touch sensors", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the sensor and drive the virtual touchscreen
    Run {
        /// Sensor character device
        #[arg(long)]
        input: Option<PathBuf>,

        /// uinput control node
        #[arg(long)]
        uinput: Option<PathBuf>,

        /// Do not request realtime scheduling
        #[arg(long)]
        no_realtime: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Feed a captured byte stream through the pipeline and print the events
    Replay {
        /// Raw capture of the sensor link
        file: PathBuf,

        /// Write events here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show the effective configuration and device paths
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

/// Per-invocation overrides of the pipeline settings.
#[derive(Args)]
struct PipelineArgs {
    /// Display orientation (landscape or portrait)
    #[arg(long)]
    orientation: Option<Orientation>,

    /// Multi-touch protocol (a or b)
    #[arg(long)]
    protocol: Option<ProtocolVariant>,

    /// Disable the position averaging filter
    #[arg(long)]
    no_averaging: bool,

    /// Disable the single-touch debounce filter
    #[arg(long)]
    no_debounce: bool,

    /// Disable large-jump re-identification
    #[arg(long)]
    no_jump_rejection: bool,

    /// Log every frame's matrix at trace level, hiding cells below the
    /// given value
    #[arg(long, num_args = 0..=1, default_missing_value = "1", value_name = "THRESHOLD")]
    raw_frames: Option<u8>,
}

impl PipelineArgs {
    fn apply(&self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        if let Some(orientation) = self.orientation {
            pipeline.orientation = orientation;
        }
        if let Some(protocol) = self.protocol {
            pipeline.protocol = protocol;
        }
        if self.no_averaging {
            pipeline.filters.averaging = false;
        }
        if self.no_debounce {
            pipeline.filters.debounce = false;
        }
        if self.no_jump_rejection {
            pipeline.filters.jump_rejection = false;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw_frames = match &cli.command {
        Commands::Run { pipeline, .. } | Commands::Replay { pipeline, .. } => pipeline.raw_frames,
        _ => None,
    };
    init_logging(cli.verbose, raw_frames.is_some());

    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    match cli.command {
        Commands::Run {
            input,
            uinput,
            no_realtime,
            pipeline,
        } => {
            pipeline.apply(&mut config);
            if let Some(path) = input {
                config.input_device = path;
            }
            if let Some(path) = uinput {
                config.uinput_device = path;
            }
            if no_realtime {
                config.realtime_priority = false;
            }
            config.validate()?;
            cmd_run(&config, pipeline.raw_frames)
        }
        Commands::Replay {
            file,
            output,
            pipeline,
        } => {
            pipeline.apply(&mut config);
            config.validate()?;
            cmd_replay(&config, &file, output.as_deref(), pipeline.raw_frames)
        }
        Commands::Status => {
            cmd_status(&config, &config_path);
            Ok(())
        }
        Commands::Config { init } => cmd_config(&config, &config_path, init),
    }
}

/// Directives forced by the command line; dependencies stay at info.
fn flag_directives(verbose: bool, raw_frames: bool) -> Option<&'static str> {
    if raw_frames {
        Some("info,ctp_touchd=trace")
    } else if verbose {
        Some("info,ctp_touchd=debug")
    } else {
        None
    }
}

/// Log to stderr. RUST_LOG applies unless a flag asks for more detail.
fn init_logging(verbose: bool, raw_frames: bool) {
    let env_filter = match flag_directives(verbose, raw_frames) {
        Some(directives) => tracing_subscriber::EnvFilter::new(directives),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn cmd_run(config: &Config, raw_frames: Option<u8>) -> Result<()> {
    tracing::info!(
        version = VERSION,
        input = %config.input_device.display(),
        orientation = ?config.pipeline.orientation,
        protocol = ?config.pipeline.protocol,
        "starting ctp-touchd"
    );

    if config.realtime_priority {
        match request_realtime_priority(REALTIME_PRIORITY) {
            Ok(()) => tracing::info!(priority = REALTIME_PRIORITY, "running with SCHED_FIFO"),
            Err(e) => tracing::warn!("could not switch to realtime scheduling: {e}"),
        }
    }

    let source = open_input(&config.input_device).with_context(|| {
        format!("opening input device {}", config.input_device.display())
    })?;
    let sink = create_output(config)?;

    let mut processor = FrameProcessor::new(&config.pipeline, sink).with_raw_dump(raw_frames);
    // A previous instance may have died with contacts down.
    processor.force_liftoff();

    let reader = ByteReader::spawn(source).context("starting reader thread")?;

    let (shutdown_tx, shutdown_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("installing Ctrl+C handler")?;

    let mut acquisition = AcquisitionLoop::new(processor, config.liftoff_timeout);
    let exit = acquisition.run(reader.receiver(), &shutdown_rx);

    let (mut processor, mut stats) = acquisition.into_parts();
    processor.liftoff();
    stats.update(&processor.counters());

    println!();
    println!("{}", stats.summary());

    match exit {
        LoopExit::Shutdown => {
            tracing::info!("shutting down");
            Ok(())
        }
        LoopExit::InputClosed => bail!("input device {} closed", config.input_device.display()),
        LoopExit::InputFailed(e) => Err(e)
            .with_context(|| format!("reading input device {}", config.input_device.display())),
    }
}

#[cfg(target_os = "linux")]
fn create_output(config: &Config) -> Result<Box<dyn EventSink>> {
    use ctp_touchd::output::{DeviceSpec, UinputDevice};

    let spec = DeviceSpec::new(
        &config.device_name,
        config.pipeline.orientation,
        config.pipeline.protocol,
    );
    let device = UinputDevice::create(&config.uinput_device, &spec)
        .context("creating virtual touchscreen")?;
    Ok(Box::new(device))
}

#[cfg(not(target_os = "linux"))]
fn create_output(_config: &Config) -> Result<Box<dyn EventSink>> {
    bail!("the uinput output is only available on Linux; use `replay` to test captures")
}

fn cmd_replay(
    config: &Config,
    file: &Path,
    output: Option<&Path>,
    raw_frames: Option<u8>,
) -> Result<()> {
    let mut source =
        File::open(file).with_context(|| format!("opening capture {}", file.display()))?;

    let out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut processor =
        FrameProcessor::new(&config.pipeline, TextSink::new(out)).with_raw_dump(raw_frames);

    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = source.read(&mut buf).context("reading capture")?;
        if n == 0 {
            break;
        }
        processor.feed(&buf[..n]);
    }
    // End of capture counts as the sensor going quiet.
    processor.liftoff();

    let counters = processor.counters();
    processor
        .into_sink()
        .into_inner()
        .flush()
        .context("flushing events")?;

    if counters.write_failures > 0 {
        bail!("{} events could not be written", counters.write_failures);
    }
    tracing::info!(
        bytes = counters.bytes,
        frames = counters.frames,
        touches = counters.touches_reported,
        liftoffs = counters.liftoffs,
        dropped_lines = counters.dropped_lines,
        "replay finished"
    );
    Ok(())
}

fn cmd_status(config: &Config, config_path: &Path) {
    println!("ctp-touchd Status");
    println!("=================");
    println!();

    println!("Configuration ({}):", config_path.display());
    println!("  Input device: {}", config.input_device.display());
    println!("  uinput device: {}", config.uinput_device.display());
    println!("  Orientation: {:?}", config.pipeline.orientation);
    println!("  Protocol: {:?}", config.pipeline.protocol);
    println!(
        "  Liftoff timeout: {}ms",
        config.liftoff_timeout.as_millis()
    );
    let filters = &config.pipeline.filters;
    println!(
        "  Filters: averaging={} debounce={} jump_rejection={}",
        filters.averaging, filters.debounce, filters.jump_rejection
    );
    println!(
        "  Realtime priority: {}",
        if config.realtime_priority { "requested" } else { "off" }
    );
    println!();

    for (label, path) in [
        ("Input device", &config.input_device),
        ("uinput device", &config.uinput_device),
    ] {
        let state = if path.exists() { "present" } else { "missing" };
        println!("{label} {}: {state}", path.display());
    }
}

fn cmd_config(config: &Config, config_path: &Path, init: bool) -> Result<()> {
    if init {
        config
            .save_to(config_path)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", config_path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("serializing configuration")?
    );
    Ok(())
}
