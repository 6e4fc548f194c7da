use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use super::locate::resolve_program;
use super::supervise::run_supervised;
use crate::config::EngineConfig;
use crate::foundation::error::{RenderError, RenderResult};
use crate::output::{OutputManager, PersistedOutput, WorkingDir};
use crate::scene::{SCENE_FILE_NAME, SceneDescriptor};

pub const ENV_SCENE: &str = "LOGO_RENDER_SCENE";
pub const ENV_WORKDIR: &str = "LOGO_RENDER_WORKDIR";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed,
    TimedOut,
    LaunchError,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }
}

/// One render attempt: one working directory, one engine process.
#[derive(Debug)]
pub struct RenderJob {
    id: Uuid,
    work_dir: WorkingDir,
    state: JobState,
    deadline: Option<Instant>,
}

impl RenderJob {
    pub fn new(id: Uuid, work_dir: WorkingDir) -> Self {
        Self {
            id,
            work_dir,
            state: JobState::Created,
            deadline: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Release the working directory. Runs for every terminal state.
    pub fn finish(self) -> RenderResult<()> {
        self.work_dir.cleanup()
    }
}

/// Fully resolved engine command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
    pub current_dir: PathBuf,
}

impl Invocation {
    /// `<program> <leading_args...> <script> -- <scene.json> <work_dir>`
    pub fn new(engine: &EngineConfig, program: PathBuf, scene_path: &Path, work_dir: &Path) -> Self {
        let mut args: Vec<OsString> = engine.leading_args.iter().map(OsString::from).collect();
        args.push(engine.script.clone().into_os_string());
        args.push("--".into());
        args.push(scene_path.as_os_str().to_owned());
        args.push(work_dir.as_os_str().to_owned());

        let mut env: Vec<(String, OsString)> = engine
            .env
            .iter()
            .map(|(k, v)| (k.clone(), OsString::from(v)))
            .collect();
        env.push((ENV_SCENE.to_string(), scene_path.as_os_str().to_owned()));
        env.push((ENV_WORKDIR.to_string(), work_dir.as_os_str().to_owned()));

        Self {
            program,
            args,
            env,
            current_dir: work_dir.to_path_buf(),
        }
    }

    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.current_dir);
        cmd
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Launches the engine for one job and decides its terminal state.
#[derive(Clone, Debug)]
pub struct JobRunner {
    engine: EngineConfig,
    timeout: Duration,
    kill_grace: Duration,
    output: OutputManager,
}

impl JobRunner {
    pub fn new(
        engine: EngineConfig,
        timeout: Duration,
        kill_grace: Duration,
        output: OutputManager,
    ) -> Self {
        Self {
            engine,
            timeout,
            kill_grace,
            output,
        }
    }

    /// Serialize `scene`, run the engine in the job's directory, and persist its output.
    ///
    /// Never retries: every error leaves `job` in a terminal state.
    #[tracing::instrument(skip_all, fields(job_id = %job.id()))]
    pub async fn run(
        &self,
        job: &mut RenderJob,
        scene: SceneDescriptor,
    ) -> RenderResult<PersistedOutput> {
        let result = self.run_inner(job, scene).await;
        job.state = match &result {
            Ok(_) => JobState::Completed,
            Err(RenderError::Launch(_)) => JobState::LaunchError,
            Err(RenderError::TimedOut(_)) => JobState::TimedOut,
            Err(_) => JobState::Failed,
        };
        result
    }

    async fn run_inner(
        &self,
        job: &mut RenderJob,
        scene: SceneDescriptor,
    ) -> RenderResult<PersistedOutput> {
        let work_dir = job.work_dir().to_path_buf();
        let scene_path = work_dir.join(SCENE_FILE_NAME);
        std::fs::write(&scene_path, scene.to_json()?).map_err(|e| {
            RenderError::asset(format!("write scene '{}': {e}", scene_path.display()))
        })?;
        drop(scene);

        let program = resolve_program(&self.engine)?;
        let invocation = Invocation::new(&self.engine, program, &scene_path, &work_dir);
        tracing::debug!(command = %invocation.display(), "launching engine");

        job.state = JobState::Running;
        job.deadline = Some(Instant::now() + self.timeout);
        let exit = run_supervised(
            invocation.command(),
            "engine",
            self.timeout,
            self.kill_grace,
        )
        .await?;

        if !exit.status.success() {
            let reason = exit.failure_reason("engine");
            tracing::warn!(status = %exit.status, "engine failed");
            return Err(RenderError::failed(reason));
        }
        tracing::info!(elapsed = ?exit.elapsed, "engine finished");

        let output = self.output.clone();
        let job_id = job.id();
        tokio::task::spawn_blocking(move || output.persist(&work_dir, job_id))
            .await
            .map_err(|e| RenderError::failed(format!("output task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_layout() {
        let engine = EngineConfig {
            script: PathBuf::from("/srv/render_logo.py"),
            env: [("CYCLES_DEVICE".to_string(), "GPU".to_string())].into(),
            ..EngineConfig::default()
        };
        let inv = Invocation::new(
            &engine,
            PathBuf::from("/usr/bin/blender"),
            Path::new("/tmp/job/scene.json"),
            Path::new("/tmp/job"),
        );
        assert_eq!(
            inv.display(),
            "/usr/bin/blender --background --python /srv/render_logo.py -- /tmp/job/scene.json /tmp/job"
        );
        assert_eq!(inv.current_dir, PathBuf::from("/tmp/job"));
        assert!(inv.env.contains(&("CYCLES_DEVICE".to_string(), "GPU".into())));
        assert!(
            inv.env
                .contains(&(ENV_SCENE.to_string(), "/tmp/job/scene.json".into()))
        );
        assert!(inv.env.contains(&(ENV_WORKDIR.to_string(), "/tmp/job".into())));
    }

    #[test]
    fn only_created_and_running_are_live() {
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Running.is_terminal());
        for s in [
            JobState::Completed,
            JobState::Failed,
            JobState::TimedOut,
            JobState::LaunchError,
        ] {
            assert!(s.is_terminal());
        }
    }
}
