//! code-scanner - read a printed code from still images
//!
//! Serves the given images as frames to a scan session backed by the
//! Tesseract CLI and prints the extracted code.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use code_scanner::analysis::ExtractedCode;
use code_scanner::config::{self, ScanMode};
use code_scanner::scan::{LogHooks, ScanHooks};
use code_scanner::vision::debug::render_candidates;
use code_scanner::vision::{CandidateSet, PreprocessedFrame, Region};
use code_scanner::{ImageFileSource, ScanController, ScanOutcome, TesseractRecognizer};

/// code-scanner - OCR a printed code from images
#[derive(Parser, Debug)]
#[command(name = "code-scanner")]
#[command(about = "Extract a printed alphanumeric code from images with OCR")]
struct Args {
    /// Image files served as frames, in order
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one attempt or keep scanning until a code is found
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// OCR ranked candidate regions instead of the whole frame
    #[arg(long)]
    regions: bool,

    /// Accepted code prefix, may be repeated
    #[arg(short, long = "prefix")]
    prefixes: Vec<String>,

    /// Digits required after the prefix
    #[arg(short, long)]
    digits: Option<usize>,

    /// Save preprocessed frames and candidate overlays to this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Continuous,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ScanMode::SingleShot,
            ModeArg::Continuous => ScanMode::Continuous,
        }
    }
}

/// Logs through tracing and optionally dumps each attempt's buffers
struct CliHooks {
    log: LogHooks,
    debug_dir: Option<PathBuf>,
    attempt: Mutex<u32>,
}

impl CliHooks {
    fn save_attempt(&self, dir: &Path, frame: &PreprocessedFrame, candidates: Option<&CandidateSet>) {
        let attempt = {
            let mut attempt = self.attempt.lock();
            *attempt += 1;
            *attempt
        };

        let frame_path = dir.join(format!("attempt-{:03}-frame.png", attempt));
        if let Err(e) = frame.image.save(&frame_path) {
            warn!("Failed to save {:?}: {}", frame_path, e);
        }

        if let Some(candidates) = candidates {
            let overlay_path = dir.join(format!("attempt-{:03}-candidates.png", attempt));
            if let Err(e) = render_candidates(&frame.image, candidates).save(&overlay_path) {
                warn!("Failed to save {:?}: {}", overlay_path, e);
            }
        }
    }
}

impl ScanHooks for CliHooks {
    fn on_log(&self, message: &str) {
        self.log.on_log(message);
    }

    fn on_progress(&self) {
        self.log.on_progress();
    }

    fn on_found(&self, code: &ExtractedCode, region: Option<Region>) {
        self.log.on_found(code, region);
    }

    fn on_not_found(&self) {
        self.log.on_not_found();
    }

    fn on_error(&self, message: &str) {
        self.log.on_error(message);
    }

    fn on_interrupted(&self) {
        self.log.on_interrupted();
    }

    fn on_frame(&self, frame: &PreprocessedFrame, candidates: Option<&CandidateSet>) {
        if let Some(dir) = &self.debug_dir {
            self.save_attempt(dir, frame, candidates);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = config::load_or_default(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.scan.mode = mode.into();
    }
    if args.regions {
        config.scan.use_candidate_regions = true;
    }
    if !args.prefixes.is_empty() {
        config.grammar.prefixes = args.prefixes.clone();
    }
    if let Some(digits) = args.digits {
        config.grammar.digits = digits;
    }
    config.validate()?;

    if let Some(dir) = &args.debug_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create debug directory {:?}", dir))?;
    }

    let source = ImageFileSource::open(&args.images, config.capture.resolution_hint)?;
    if source.is_empty() {
        bail!("No images to scan");
    }

    let recognizer = TesseractRecognizer::new(&config.recognizer);
    let hooks = CliHooks {
        log: LogHooks,
        debug_dir: args.debug_dir.clone(),
        attempt: Mutex::new(0),
    };

    let controller = ScanController::new(
        &config,
        Arc::new(source),
        Arc::new(recognizer),
        Arc::new(hooks),
    )?;

    let Some(session) = controller.start() else {
        bail!("A scan session is already running");
    };

    let stopper = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current OCR call");
            stopper.request_stop();
        }
    });

    let outcome = session.await.context("Scan session panicked")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            ScanOutcome::Found { code, .. } => println!("{}", code),
            ScanOutcome::NotFound => error!("No valid code found"),
            ScanOutcome::Interrupted => info!("Scan interrupted"),
        }
    }

    let code = match outcome {
        ScanOutcome::Found { .. } => 0,
        ScanOutcome::NotFound => 1,
        ScanOutcome::Interrupted => 130,
    };
    std::process::exit(code);
}
