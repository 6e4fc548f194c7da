//! Working directory lifecycle and artifact persistence.
//!
//! A [`WorkingDir`] is owned by exactly one job and is removed when the job ends, whether it
//! completed, failed or timed out. Artifacts survive only after [`OutputManager::persist`] has
//! copied them under the output root.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;
use uuid::Uuid;

use crate::config::RenderSettings;
use crate::foundation::error::{RenderError, RenderResult};

/// Job-exclusive scratch directory. Removed on [`WorkingDir::cleanup`] or on drop.
#[derive(Debug)]
pub struct WorkingDir {
    dir: tempfile::TempDir,
}

impl WorkingDir {
    pub fn create(root: &Path, job_id: Uuid) -> RenderResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            RenderError::asset(format!("create work root '{}': {e}", root.display()))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(root)
            .map_err(|e| {
                RenderError::asset(format!(
                    "create working directory in '{}': {e}",
                    root.display()
                ))
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn cleanup(self) -> RenderResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove working directory '{}'", path.display()))?;
        tracing::debug!(dir = %path.display(), "working directory removed");
        Ok(())
    }
}

/// Stable handle to a persisted artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactReference {
    pub file_name: String,
    /// Location under the output root.
    pub path: PathBuf,
    /// `<job_id>/<file_name>`, suitable for static serving.
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct PersistedOutput {
    /// First frame of the sequence.
    pub artifact: ArtifactReference,
    pub frames: Vec<PathBuf>,
    pub job_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct OutputManager {
    output_root: PathBuf,
    settings: RenderSettings,
}

impl OutputManager {
    pub fn new(output_root: impl Into<PathBuf>, settings: RenderSettings) -> Self {
        Self {
            output_root: output_root.into(),
            settings,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Frame files in `dir`, ordered by frame number.
    pub fn collect_frames(&self, dir: &Path) -> RenderResult<Vec<(u32, PathBuf)>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("list working directory '{}'", dir.display()))?;

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in '{}'", dir.display()))?;
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| self.settings.parse_frame_index(n))
            else {
                continue;
            };
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                frames.push((index, entry.path()));
            }
        }
        frames.sort_by_key(|(index, _)| *index);
        Ok(frames)
    }

    /// Copy the frame sequence out of `work_dir` and reference its first frame.
    pub fn persist(&self, work_dir: &Path, job_id: Uuid) -> RenderResult<PersistedOutput> {
        let frames = self.collect_frames(work_dir)?;
        if frames.is_empty() {
            return Err(RenderError::output_missing(format!(
                "engine exited successfully but wrote no '{}' files",
                self.settings.frame_pattern()
            )));
        }

        let job_dir = self.output_root.join(job_id.to_string());
        std::fs::create_dir_all(&job_dir)
            .with_context(|| format!("create output directory '{}'", job_dir.display()))?;

        let persisted = match copy_frames(&frames, &job_dir) {
            Ok(persisted) => persisted,
            Err(e) => {
                self.discard(&job_dir);
                return Err(e);
            }
        };
        let Some(first) = persisted.first().cloned() else {
            self.discard(&job_dir);
            return Err(RenderError::output_missing("no frame could be copied"));
        };
        let file_name = first
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(PersistedOutput {
            artifact: ArtifactReference {
                url: format!("{job_id}/{file_name}"),
                file_name,
                path: first,
            },
            frames: persisted,
            job_dir,
        })
    }

    /// Remove a job's persisted output. Used when a later step fails the job.
    pub fn discard(&self, job_dir: &Path) {
        match std::fs::remove_dir_all(job_dir) {
            Ok(()) => tracing::debug!(dir = %job_dir.display(), "discarded job output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %job_dir.display(), error = %e, "failed to discard job output")
            }
        }
    }
}

fn copy_frames(frames: &[(u32, PathBuf)], job_dir: &Path) -> RenderResult<Vec<PathBuf>> {
    let mut persisted = Vec::with_capacity(frames.len());
    for (_, src) in frames {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = job_dir.join(name);
        std::fs::copy(src, &dst)
            .with_context(|| format!("copy '{}' to '{}'", src.display(), dst.display()))?;
        persisted.push(dst);
    }
    Ok(persisted)
}
