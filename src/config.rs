//! Process-wide configuration handed to the orchestrator at construction.
//!
//! Loaded from JSON with every field optional, then adjusted from `LOGO_RENDER_*` environment
//! variables. Render settings are not tunable per request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};
use crate::publish::PublishConfig;

pub const ENV_ENGINE: &str = "LOGO_RENDER_ENGINE";
pub const ENV_TIMEOUT_SECONDS: &str = "LOGO_RENDER_TIMEOUT_SECONDS";
pub const ENV_OUTPUT_DIR: &str = "LOGO_RENDER_OUTPUT_DIR";
pub const ENV_WORK_DIR: &str = "LOGO_RENDER_WORK_DIR";
/// Enables publication to this bucket. `S3_BUCKET_NAME` is honored when it is unset.
pub const ENV_S3_BUCKET: &str = "LOGO_RENDER_S3_BUCKET";
pub const ENV_S3_BUCKET_FALLBACK: &str = "S3_BUCKET_NAME";
pub const ENV_S3_ENDPOINT: &str = "LOGO_RENDER_S3_ENDPOINT";

/// Everything an [`Orchestrator`](crate::Orchestrator) needs, passed in at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub engine: EngineConfig,
    /// Parent of the per-job working directories.
    pub work_root: PathBuf,
    /// Persistent location artifacts are copied to before the working directory is removed.
    pub output_root: PathBuf,
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Upper bound on how long a killed job may take to release its pipes.
    #[serde(with = "secs")]
    pub kill_grace: Duration,
    pub render: RenderSettings,
    pub video: Option<VideoConfig>,
    /// Upload of the final artifact to object storage.
    pub publish: Option<PublishConfig>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            work_root: std::env::temp_dir().join("logo-render"),
            output_root: PathBuf::from("output"),
            timeout: Duration::from_secs(300),
            kill_grace: Duration::from_secs(5),
            render: RenderSettings::default(),
            video: None,
            publish: None,
        }
    }
}

/// How the external rendering engine is invoked.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program name or path.
    pub program: PathBuf,
    /// Install locations tried, in order, when `program` is a bare name.
    pub candidates: Vec<PathBuf>,
    /// Arguments placed before the script path.
    pub leading_args: Vec<String>,
    /// Engine-side script that reads the scene descriptor and renders it.
    pub script: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("blender"),
            candidates: vec![
                PathBuf::from("/usr/local/bin/blender"),
                PathBuf::from("/opt/blender/blender"),
            ],
            leading_args: vec!["--background".into(), "--python".into()],
            script: PathBuf::from("scripts/render_logo.py"),
            env: BTreeMap::new(),
        }
    }
}

/// Fixed, process-wide render settings. Not tunable per request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub frames: u32,
    pub fps: u32,
    pub format: OutputFormat,
    pub frame_prefix: String,
    pub frame_digits: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            samples: 4096,
            frames: 240,
            fps: 24,
            format: OutputFormat::PngSequence,
            frame_prefix: "frame_".to_string(),
            frame_digits: 4,
        }
    }
}

impl RenderSettings {
    /// File name the engine writes for 1-based frame `index`.
    pub fn frame_file_name(&self, index: u32) -> String {
        format!(
            "{}{:0width$}.{}",
            self.frame_prefix,
            index,
            self.format.extension(),
            width = self.frame_digits
        )
    }

    /// printf-style pattern for the whole sequence, e.g. `frame_%04d.png`.
    pub fn frame_pattern(&self) -> String {
        format!(
            "{}%0{}d.{}",
            self.frame_prefix,
            self.frame_digits,
            self.format.extension()
        )
    }

    /// Parse the frame number out of a sequence file name.
    pub fn parse_frame_index(&self, file_name: &str) -> Option<u32> {
        let ext = format!(".{}", self.format.extension());
        let digits = file_name
            .strip_prefix(self.frame_prefix.as_str())?
            .strip_suffix(ext.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    PngSequence,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::PngSequence => "png",
        }
    }
}

/// Optional MP4 assembly of the rendered frame sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub program: PathBuf,
    pub crf: u8,
    pub file_name: String,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            crf: 23,
            file_name: "render.mp4".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl RenderConfig {
    pub fn from_path(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::config(format!("read config '{}': {e}", path.display())))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            RenderError::config(format!("parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> RenderResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> RenderResult<Self> {
        if let Some(engine) = lookup(ENV_ENGINE) {
            self.engine.program = PathBuf::from(engine);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECONDS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                RenderError::config(format!("{ENV_TIMEOUT_SECONDS} must be whole seconds, got '{raw}'"))
            })?;
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_root = PathBuf::from(dir);
        }
        if let Some(bucket) = lookup(ENV_S3_BUCKET).or_else(|| lookup(ENV_S3_BUCKET_FALLBACK)) {
            self.publish.get_or_insert_with(PublishConfig::default).bucket = bucket;
        }
        if let Some(endpoint) = lookup(ENV_S3_ENDPOINT)
            && let Some(publish) = self.publish.as_mut()
        {
            publish.endpoint = Some(endpoint);
            publish.force_path_style = true;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.engine.program.as_os_str().is_empty() {
            return Err(RenderError::config("engine program must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(RenderError::config("timeout must be non-zero"));
        }
        let r = &self.render;
        if r.width == 0 || r.height == 0 {
            return Err(RenderError::config("render width/height must be non-zero"));
        }
        if r.samples == 0 || r.frames == 0 || r.fps == 0 {
            return Err(RenderError::config(
                "render samples, frames and fps must be non-zero",
            ));
        }
        if r.frame_prefix.is_empty() || r.frame_digits == 0 {
            return Err(RenderError::config(
                "frame prefix and digit count must be non-empty",
            ));
        }
        if let Some(video) = &self.video
            && (!r.width.is_multiple_of(2) || !r.height.is_multiple_of(2))
        {
            return Err(RenderError::config(format!(
                "render width/height must be even for yuv420p output ({})",
                video.file_name
            )));
        }
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        Ok(())
    }
}

pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
