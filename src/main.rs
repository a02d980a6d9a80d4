//! v4l2-oneshot binary: capture one frame and write it to a file.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use thiserror::Error;

use v4l2_oneshot::config::DEFAULT_BUFFER_COUNT;
use v4l2_oneshot::{
    capability, capture_frame, format, CaptureConfig, CaptureFailure, CaptureMode, ErrorKind,
    Format, FormatPolicy, FourCC, V4L2Device,
};

/// Capture a single raw frame from a V4L2 device
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
#[command(name = "v4l2-oneshot")]
#[command(version)]
#[command(about = "Capture a single raw frame from a V4L2 device")]
struct Cli {
    /// Device node to open
    #[arg(short, long, default_value = "/dev/video0", conflicts_with = "index")]
    device: PathBuf,

    /// Device index, shorthand for `/dev/videoN`
    #[arg(short, long)]
    index: Option<u32>,

    /// Requested frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Requested pixel format (four characters, e.g. YUYV, MJPG)
    #[arg(long, default_value = "YUYV")]
    fourcc: FourCC,

    /// Number of streaming buffers to request
    #[arg(short, long, default_value_t = DEFAULT_BUFFER_COUNT)]
    buffers: u32,

    /// Capture with read() instead of memory-mapped streaming
    #[arg(long)]
    read: bool,

    /// Fail if the device cannot do read() capture
    #[arg(long)]
    require_read_write: bool,

    /// Fail if the driver changes the requested size or pixel format
    #[arg(long)]
    strict: bool,

    /// File to write the raw frame to
    #[arg(short, long, default_value = "frame.raw")]
    output: PathBuf,

    /// List the device's pixel formats and exit
    #[arg(long)]
    list_formats: bool,

    /// List V4L2 device nodes and exit
    #[arg(long)]
    list: bool,

    /// Enable verbose logging (`RUST_LOG=trace` shows every request)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Device(#[from] v4l2_oneshot::Error),

    #[error(transparent)]
    Capture(#[from] CaptureFailure),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        let kind = match self {
            Self::Open { .. } | Self::Write { .. } => return 1,
            Self::Device(err) => err.kind(),
            Self::Capture(failure) => failure.kind(),
        };
        match kind {
            ErrorKind::DeviceCapability => 2,
            ErrorKind::FormatNegotiation => 3,
            ErrorKind::InsufficientBuffers | ErrorKind::Mapping => 4,
            ErrorKind::Queue | ErrorKind::CorruptedBuffer | ErrorKind::Read => 5,
            ErrorKind::Request | ErrorKind::Layout => 1,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Initialize `env_logger` from the verbosity flags; `RUST_LOG` wins.
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();
    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.list {
        list_devices();
        return Ok(());
    }

    let path = cli
        .index
        .map_or_else(|| cli.device.clone(), |index| PathBuf::from(format!("/dev/video{index}")));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|source| CliError::Open {
            path: path.clone(),
            source,
        })?;
    let mut device = V4L2Device::new(file.as_fd());
    info!("opened {}", path.display());

    if cli.list_formats {
        let caps = capability::query(&mut device)?;
        println!("{} ({}) at {}", caps.card, caps.driver, caps.bus_info);
        for desc in format::enumerate_formats(&mut device)? {
            let mut notes = Vec::new();
            if desc.compressed {
                notes.push("compressed");
            }
            if desc.emulated {
                notes.push("emulated");
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join(", "))
            };
            println!("  [{}] {} {}{notes}", desc.index, desc.fourcc, desc.description);
        }
        return Ok(());
    }

    let config = config_from(cli);
    let frame = capture_frame(&mut device, &config)?;

    fs::write(&cli.output, &frame.data).map_err(|source| CliError::Write {
        path: cli.output.clone(),
        source,
    })?;
    println!(
        "{}x{} {}: {} bytes written to {}",
        frame.format.width,
        frame.format.height,
        frame.format.fourcc,
        frame.data.len(),
        cli.output.display()
    );
    Ok(())
}

fn config_from(cli: &Cli) -> CaptureConfig {
    let mode = if cli.read {
        CaptureMode::ReadWrite
    } else {
        CaptureMode::Mmap
    };
    let policy = if cli.strict {
        FormatPolicy::Strict
    } else {
        FormatPolicy::Lenient
    };
    CaptureConfig::default()
        .with_format(Format::new(cli.width, cli.height, cli.fourcc))
        .with_buffer_count(cli.buffers)
        .with_mode(mode)
        .with_require_read_write(cli.require_read_write)
        .with_policy(policy)
}

fn list_devices() {
    let nodes = v4l::context::enum_devices();
    if nodes.is_empty() {
        println!("no V4L2 devices found");
    }
    for node in nodes {
        let name = node.name().unwrap_or_else(|| "unknown".to_owned());
        println!("{:>3}  {}  {name}", node.index(), node.path().display());
    }
}
