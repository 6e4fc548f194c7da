use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::encode::ffmpeg::encode_sequence;
use crate::engine::runner::{JobRunner, RenderJob};
use crate::foundation::error::{ErrorKind, RenderError, RenderResult};
use crate::output::{ArtifactReference, OutputManager, PersistedOutput, WorkingDir};
use crate::params::{self, RenderParams, RenderRequest};
use crate::publish::{PublishedArtifact, Publisher};
use crate::scene::SceneDescriptor;

/// Terminal result of one [`Orchestrator::submit`] call.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Completed {
        job_id: Uuid,
        /// First frame of the rendered sequence.
        artifact: ArtifactReference,
        frame_count: usize,
        video: Option<ArtifactReference>,
        /// Object-storage copy of the video, or of the first frame when no video was made.
        published: Option<PublishedArtifact>,
        render_time_secs: f64,
    },
    /// The request never reached the engine.
    Rejected {
        kind: ErrorKind,
        field: Option<&'static str>,
        reason: String,
    },
    Failed {
        job_id: Option<Uuid>,
        kind: ErrorKind,
        reason: String,
    },
}

impl RenderOutcome {
    fn rejected(err: RenderError) -> Self {
        let field = match &err {
            RenderError::InvalidParameter { field, .. } => Some(*field),
            _ => None,
        };
        Self::Rejected {
            kind: err.kind(),
            field,
            reason: err.to_string(),
        }
    }

    fn failed(job_id: Option<Uuid>, err: RenderError) -> Self {
        Self::Failed {
            job_id,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Error tag for rejected and failed outcomes.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Completed { .. } => None,
            Self::Rejected { kind, .. } | Self::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Rejected { reason, .. } | Self::Failed { reason, .. } => Some(reason),
        }
    }

    pub fn artifact(&self) -> Option<&ArtifactReference> {
        match self {
            Self::Completed { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

struct Completion {
    artifact: ArtifactReference,
    frame_count: usize,
    video: Option<ArtifactReference>,
    published: Option<PublishedArtifact>,
}

/// Validates, builds, runs and collects one render per call. Holds no per-job state, so a
/// single instance serves any number of concurrent submissions.
#[derive(Debug)]
pub struct Orchestrator {
    config: RenderConfig,
    runner: JobRunner,
    output: OutputManager,
    publisher: tokio::sync::OnceCell<Publisher>,
}

impl Orchestrator {
    pub fn new(config: RenderConfig) -> RenderResult<Self> {
        config.validate()?;
        let output = OutputManager::new(&config.output_root, config.render.clone());
        let runner = JobRunner::new(
            config.engine.clone(),
            config.timeout,
            config.kill_grace,
            output.clone(),
        );
        Ok(Self {
            config,
            runner,
            output,
            publisher: tokio::sync::OnceCell::new(),
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub async fn submit(&self, request: RenderRequest) -> RenderOutcome {
        let params = match params::validate(&request) {
            Ok(p) => p,
            Err(e) => {
                tracing::info!(error = %e, "render request rejected");
                return RenderOutcome::rejected(e);
            }
        };

        let job_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(
            %job_id,
            material = %params.material,
            extrude_depth = params.extrude_depth,
            bevel_depth = params.bevel_depth,
            "render job started"
        );

        match self.execute(job_id, &params).await {
            Ok(done) => {
                let elapsed = started.elapsed();
                tracing::info!(%job_id, ?elapsed, frames = done.frame_count, "render job completed");
                RenderOutcome::Completed {
                    job_id,
                    artifact: done.artifact,
                    frame_count: done.frame_count,
                    video: done.video,
                    published: done.published,
                    render_time_secs: elapsed.as_secs_f64(),
                }
            }
            Err(e) => {
                tracing::warn!(%job_id, kind = ?e.kind(), error = %e, "render job failed");
                RenderOutcome::failed(Some(job_id), e)
            }
        }
    }

    /// Run [`submit`](Self::submit) on its own task.
    pub fn spawn(self: &Arc<Self>, request: RenderRequest) -> tokio::task::JoinHandle<RenderOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.submit(request).await })
    }

    /// Blocking variant for callers outside a tokio runtime. Called from within one it returns a
    /// failed outcome instead of blocking a worker thread; use [`submit`](Self::submit) there.
    pub fn submit_blocking(&self, request: RenderRequest) -> RenderOutcome {
        if tokio::runtime::Handle::try_current().is_ok() {
            return RenderOutcome::failed(
                None,
                RenderError::failed(
                    "submit_blocking called from inside a tokio runtime; use submit instead",
                ),
            );
        }
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(self.submit(request)),
            Err(e) => RenderOutcome::failed(
                None,
                RenderError::Other(anyhow::Error::new(e).context("build tokio runtime")),
            ),
        }
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    async fn execute(&self, job_id: Uuid, params: &RenderParams) -> RenderResult<Completion> {
        let work_dir = WorkingDir::create(&self.config.work_root, job_id)?;
        let mut job = RenderJob::new(job_id, work_dir);

        let result = match SceneDescriptor::build(params, job.work_dir(), &self.config.render) {
            Ok(scene) => self.runner.run(&mut job, scene).await,
            Err(e) => Err(e),
        };

        let state = job.state();
        if let Err(e) = job.finish() {
            tracing::warn!(?state, error = %e, "working directory cleanup failed");
        }
        let persisted = result?;

        // A job that fails after persisting must not leave its output behind.
        match self.finalize(job_id, params, &persisted).await {
            Ok((video, published)) => Ok(Completion {
                frame_count: persisted.frames.len(),
                artifact: persisted.artifact,
                video,
                published,
            }),
            Err(e) => {
                self.output.discard(&persisted.job_dir);
                Err(e)
            }
        }
    }

    async fn finalize(
        &self,
        job_id: Uuid,
        params: &RenderParams,
        persisted: &PersistedOutput,
    ) -> RenderResult<(Option<ArtifactReference>, Option<PublishedArtifact>)> {
        let video = match &self.config.video {
            Some(video) => Some(
                encode_sequence(
                    video,
                    &self.config.render,
                    &persisted.job_dir,
                    job_id,
                    self.config.kill_grace,
                )
                .await?,
            ),
            None => None,
        };

        let published = match &self.config.publish {
            Some(cfg) => {
                let publisher = self
                    .publisher
                    .get_or_try_init(|| Publisher::connect(cfg.clone()))
                    .await?;
                let target = video.as_ref().unwrap_or(&persisted.artifact);
                Some(
                    publisher
                        .publish(target, params.user_id.as_deref(), job_id)
                        .await?,
                )
            }
            None => None,
        };

        Ok((video, published))
    }
}
