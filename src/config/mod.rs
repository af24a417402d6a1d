//! Application Configuration
//!
//! Scanner settings stored in TOML format.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Scanner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Frame source settings
    pub capture: CaptureSettings,
    /// Scan loop settings
    pub scan: ScanSettings,
    /// Accepted code grammar
    pub grammar: GrammarConfig,
    /// Candidate region filter thresholds
    pub candidates: CandidateConfig,
    /// Frame preprocessing stages
    pub preprocessing: PreprocessConfig,
    /// OCR engine settings
    pub recognizer: RecognizerConfig,
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.grammar.validate()?;
        self.candidates.validate()?;
        self.preprocessing.validate()?;
        if self.recognizer.timeout_ms == 0 {
            bail!("recognizer.timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Frame source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Preferred capture resolution (width, height); larger frames are downscaled
    pub resolution_hint: Option<(u32, u32)>,
    /// Delay before asking the frame source again when it is not ready
    pub poll_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            resolution_hint: Some((640, 480)),
            poll_interval_ms: 100,
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// How many attempts a single start request drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// One preprocess, select and OCR cycle per start request
    SingleShot,
    /// Repeat cycles until a code validates or a stop is requested
    #[default]
    Continuous,
}

/// Scan loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub mode: ScanMode,
    /// Pause between attempts in continuous mode
    pub inter_attempt_delay_ms: u64,
    /// Run OCR over candidate regions instead of the whole frame
    pub use_candidate_regions: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Continuous,
            inter_attempt_delay_ms: 100,
            use_candidate_regions: false,
        }
    }
}

impl ScanSettings {
    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }
}

/// Accepted code grammar: `PREFIX digits{n} [SEPARATOR digits{m}]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Accepted prefixes, matched case-insensitively, tried in order
    pub prefixes: Vec<String>,
    /// Length of the first digit run
    pub digits: usize,
    /// Literal between the two digit runs
    pub separator: Option<String>,
    /// Length of the second digit run
    pub second_digits: Option<usize>,
    /// Let the OCR engine emit lowercase letters
    pub allow_lowercase: bool,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["SGRO".to_string()],
            digits: 10,
            separator: None,
            second_digits: None,
            allow_lowercase: false,
        }
    }
}

impl GrammarConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefixes.is_empty() || self.prefixes.iter().any(|p| p.trim().is_empty()) {
            bail!("grammar.prefixes must contain at least one non-empty prefix");
        }
        if self.digits == 0 {
            bail!("grammar.digits must be greater than zero");
        }
        match (&self.separator, self.second_digits) {
            (Some(sep), Some(n)) if !sep.is_empty() && n > 0 => Ok(()),
            (None, None) => Ok(()),
            _ => bail!("grammar.separator and grammar.second_digits must be set together"),
        }
    }
}

/// Candidate region selection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Smallest accepted width/height ratio
    pub min_aspect: f32,
    /// Largest accepted width/height ratio
    pub max_aspect: f32,
    /// Smallest accepted region width in pixels
    pub min_width: u32,
    /// Regions kept after ranking, before filtering
    pub top_k: usize,
    /// Horizontal radius used to merge neighbouring glyphs into one line (0 disables)
    pub merge_radius: u32,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            min_aspect: 2.0,
            max_aspect: 15.0,
            min_width: 100,
            top_k: 10,
            merge_radius: 8,
        }
    }
}

impl CandidateConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_aspect > 0.0 && self.min_aspect <= self.max_aspect) {
            bail!(
                "candidates aspect band is invalid: {}..{}",
                self.min_aspect,
                self.max_aspect
            );
        }
        if self.top_k == 0 {
            bail!("candidates.top_k must be greater than zero");
        }
        Ok(())
    }
}

/// Color to grayscale reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrayscaleMethod {
    /// Perceptual luminance (0.299 R + 0.587 G + 0.114 B)
    #[default]
    Luminance,
    /// Plain channel average
    Average,
}

/// Frame preprocessing stages, always applied in this order when enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub grayscale: GrayscaleMethod,
    /// Tiled adaptive histogram equalization
    pub contrast_enhancement: bool,
    pub clahe_clip_limit: f32,
    /// Tiles per axis
    pub clahe_tile_grid: u32,
    /// Gaussian kernel size (odd); 0 disables smoothing
    pub blur_kernel: u32,
    /// Adaptive (locally windowed) thresholding
    pub binarize: bool,
    /// Adaptive threshold window size (odd)
    pub threshold_window: u32,
    /// Subtracted from the local mean before comparing
    pub threshold_offset: i32,
    /// Close then open with a 3x3 element
    pub morphology: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            grayscale: GrayscaleMethod::Luminance,
            contrast_enhancement: true,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            blur_kernel: 3,
            binarize: true,
            threshold_window: 11,
            threshold_offset: 2,
            morphology: false,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blur_kernel != 0 && self.blur_kernel % 2 == 0 {
            bail!("preprocessing.blur_kernel must be odd, got {}", self.blur_kernel);
        }
        if self.threshold_window < 3 || self.threshold_window % 2 == 0 {
            bail!(
                "preprocessing.threshold_window must be odd and at least 3, got {}",
                self.threshold_window
            );
        }
        Ok(())
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Tesseract executable (looked up on PATH when not absolute)
    pub tesseract_path: PathBuf,
    /// Tesseract language pack
    pub language: String,
    /// Per-call timeout
    pub timeout_ms: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl RecognizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "codescanner", "CodeScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Load the configuration from `path`, or from the user config directory, or use defaults
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = load_config(&config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}
