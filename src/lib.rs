//! Render job orchestration for extruded 3D logo animations.
//!
//! A [`RenderRequest`] is validated into [`RenderParams`], turned into an immutable
//! [`SceneDescriptor`], and handed to an external rendering engine running as a supervised
//! subprocess inside a job-exclusive working directory. The [`Orchestrator`] returns a
//! [`RenderOutcome`] that tells rejected input apart from failed and timed-out renders.
#![forbid(unsafe_code)]

mod foundation;

pub mod config;
pub mod encode;
pub mod engine;
pub mod material;
pub mod orchestrator;
pub mod output;
pub mod params;
pub mod publish;
pub mod scene;

pub use crate::config::{EngineConfig, OutputFormat, RenderConfig, RenderSettings, VideoConfig};
pub use crate::engine::runner::{Invocation, JobRunner, JobState, RenderJob};
pub use crate::foundation::error::{ErrorKind, LogoProblem, RenderError, RenderResult};
pub use crate::material::{MaterialPreset, ShaderParams};
pub use crate::orchestrator::{Orchestrator, RenderOutcome};
pub use crate::output::{ArtifactReference, OutputManager, PersistedOutput, WorkingDir};
pub use crate::params::{LogoFormat, LogoPayload, RenderParams, RenderRequest, validate};
pub use crate::publish::{PublishConfig, PublishedArtifact, Publisher};
pub use crate::scene::SceneDescriptor;
