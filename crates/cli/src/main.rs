use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

use framepace_core::encoding::domain::sequence_encoder::SequenceEncoder;
use framepace_core::encoding::infrastructure::ffmpeg_cli_encoder::FfmpegCliEncoder;
use framepace_core::encoding::infrastructure::ffmpeg_lib_encoder::FfmpegLibEncoder;
use framepace_core::persistence::infrastructure::directory_frame_store::DirectoryFrameStore;
use framepace_core::persistence::infrastructure::sink_factory::create_sink;
use framepace_core::pipeline::capture_logger::{CaptureLogger, LogCaptureLogger};
use framepace_core::pipeline::capture_screencast_use_case::CaptureScreencastUseCase;
use framepace_core::pipeline::encode_handoff_use_case::EncodeHandoffUseCase;
use framepace_core::shared::capture_config::{CaptureConfig, ImageFormat, PersistenceMode};
use framepace_core::shared::constants::{
    DEFAULT_BASE_DIR, DEFAULT_CRF, DEFAULT_JPEG_QUALITY, RUN_DIR_PREFIX, VIDEO_FILE_NAME,
};
use framepace_core::source::domain::frame_source::FrameSource;
use framepace_core::source::infrastructure::replay_frame_source::ReplayFrameSource;
use framepace_core::source::infrastructure::screencast_bridge_source::{
    BridgeSettings, ScreencastBridgeSource,
};

type CliError = Box<dyn std::error::Error + Send + Sync>;

/// Paced screencast capture to a numbered image sequence and a video.
///
/// Frames come from a bridge process given after `--`, or from a directory
/// of images with --replay.
#[derive(Parser)]
#[command(name = "framepace")]
struct Cli {
    /// Bridge command streaming frames as JSON lines (after `--`).
    #[arg(last = true)]
    bridge: Vec<String>,

    /// Replay the images in this directory instead of running a bridge.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Emission rate of the replay source.
    #[arg(long, default_value = "60")]
    replay_fps: f64,

    /// Stop the replay source after this many frames.
    #[arg(long)]
    replay_limit: Option<usize>,

    /// JSON capture config; explicit flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persistence mode: buffered or streaming.
    #[arg(short, long)]
    mode: Option<String>,

    /// Target frame rate.
    #[arg(long)]
    fps: Option<f64>,

    /// Capture duration in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Viewport width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Frame image type: png or jpeg.
    #[arg(long)]
    image_type: Option<String>,

    /// JPEG quality (1-100).
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Maximum outstanding writes in streaming mode.
    #[arg(long)]
    max_pending_writes: Option<usize>,

    /// Directory under which the run directory is created.
    #[arg(long, default_value = DEFAULT_BASE_DIR)]
    base_dir: PathBuf,

    /// Encoder: cli (ffmpeg executable, H.264) or lib (in-process, MPEG-4).
    #[arg(long, default_value = "cli")]
    encoder: String,

    /// H.264 CRF quality for the cli encoder (0=lossless, 51=worst).
    #[arg(long, default_value_t = DEFAULT_CRF)]
    crf: u32,

    /// Keep the frames but skip video encoding.
    #[arg(long)]
    no_encode: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let run_dir = run_directory(&cli.base_dir)?;
    let store = Arc::new(DirectoryFrameStore::new(&run_dir, config.image_format)?);
    log::info!("Capturing into {}", run_dir.display());

    let source = build_source(&cli, &config)?;
    let sink = create_sink(&config, store);
    let logger: Box<dyn CaptureLogger> = Box::new(LogCaptureLogger::default());
    let mut capture = CaptureScreencastUseCase::new(source, sink, config, Some(logger))?;
    let report = capture.execute()?;

    if cli.no_encode {
        log::info!("Capture complete. Frames stored in: {}", run_dir.display());
        return Ok(());
    }

    let encoder = build_encoder(&cli)?;
    let output = EncodeHandoffUseCase::new(encoder).execute(&report, &run_dir.join(VIDEO_FILE_NAME))?;
    log::info!(
        "Capture complete. Frames and video stored in: {}",
        run_dir.display()
    );
    println!("{}", output.display());
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), CliError> {
    match (&cli.replay, cli.bridge.is_empty()) {
        (Some(_), false) => {
            return Err("--replay and a bridge command are mutually exclusive".into());
        }
        (None, true) => {
            return Err("A bridge command (after `--`) or --replay is required".into());
        }
        _ => {}
    }
    if let Some(dir) = &cli.replay {
        if !dir.is_dir() {
            return Err(format!("Replay directory not found: {}", dir.display()).into());
        }
    }
    if !cli.replay_fps.is_finite() || cli.replay_fps <= 0.0 {
        return Err(format!("Replay fps must be greater than 0, got {}", cli.replay_fps).into());
    }
    if let Some(mode) = &cli.mode {
        parse_mode(mode)?;
    }
    if let Some(image_type) = &cli.image_type {
        if !matches!(image_type.as_str(), "png" | "jpeg" | "jpg") {
            return Err(format!("Image type must be 'png' or 'jpeg', got '{image_type}'").into());
        }
    }
    if cli.encoder != "cli" && cli.encoder != "lib" {
        return Err(format!("Encoder must be 'cli' or 'lib', got '{}'", cli.encoder).into());
    }
    if cli.crf > 51 {
        return Err(format!("CRF must be between 0 and 51, got {}", cli.crf).into());
    }
    Ok(())
}

fn parse_mode(mode: &str) -> Result<PersistenceMode, CliError> {
    match mode {
        "buffered" => Ok(PersistenceMode::Buffered),
        "streaming" => Ok(PersistenceMode::Streaming),
        other => Err(format!("Mode must be 'buffered' or 'streaming', got '{other}'").into()),
    }
}

/// Config file values (or defaults), then explicit flags on top.
fn build_config(cli: &Cli) -> Result<CaptureConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
            serde_json::from_str::<CaptureConfig>(&text)
                .map_err(|e| format!("Invalid config {}: {e}", path.display()))?
        }
        None => CaptureConfig::default(),
    };

    if let Some(mode) = &cli.mode {
        config.persistence_mode = parse_mode(mode)?;
    }
    if let Some(fps) = cli.fps {
        config.frame_rate = fps;
    }
    if let Some(duration) = cli.duration {
        config.duration_secs = duration;
    }
    if let Some(width) = cli.width {
        config.viewport.width = width;
    }
    if let Some(height) = cli.height {
        config.viewport.height = height;
    }
    if let Some(image_type) = &cli.image_type {
        config.image_format = match image_type.as_str() {
            "png" => ImageFormat::Png,
            _ => ImageFormat::Jpeg {
                quality: match config.image_format {
                    ImageFormat::Jpeg { quality } => quality,
                    ImageFormat::Png => DEFAULT_JPEG_QUALITY,
                },
            },
        };
    }
    if let Some(quality) = cli.jpeg_quality {
        if let ImageFormat::Jpeg { quality: ref mut q } = config.image_format {
            *q = quality;
        } else {
            log::warn!("--jpeg-quality has no effect on png frames");
        }
    }
    if let Some(max_pending) = cli.max_pending_writes {
        config.max_pending_writes = max_pending;
    }

    config.validate()?;
    Ok(config)
}

fn run_directory(base_dir: &Path) -> Result<PathBuf, CliError> {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    Ok(base_dir.join(format!("{RUN_DIR_PREFIX}{millis}")))
}

fn build_source(cli: &Cli, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CliError> {
    if let Some(dir) = &cli.replay {
        let mut source = ReplayFrameSource::from_directory(dir, cli.replay_fps)?;
        if let Some(limit) = cli.replay_limit {
            source = source.with_limit(limit);
        }
        return Ok(Box::new(source));
    }
    log::info!("Starting bridge: {}", cli.bridge.join(" "));
    let settings = BridgeSettings::new(config.viewport, config.image_format);
    Ok(Box::new(ScreencastBridgeSource::from_command_line(
        &cli.bridge,
        settings,
    )?))
}

fn build_encoder(cli: &Cli) -> Result<Box<dyn SequenceEncoder>, CliError> {
    if cli.encoder == "lib" {
        return Ok(Box::new(FfmpegLibEncoder::new()));
    }
    let encoder = FfmpegCliEncoder::new().with_crf(cli.crf);
    if !encoder.is_available() {
        return Err("ffmpeg executable not found; use --encoder lib or --no-encode".into());
    }
    Ok(Box::new(encoder))
}
