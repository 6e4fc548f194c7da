use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::foundation::error::{RenderError, RenderResult};

/// Resolve the engine binary: explicit paths must exist; bare names are looked up on `PATH`
/// first and then in the configured install locations.
pub fn resolve_program(engine: &EngineConfig) -> RenderResult<PathBuf> {
    let program = engine.program.as_path();
    if is_explicit_path(program) {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        return Err(RenderError::launch(format!(
            "engine '{}' does not exist",
            program.display()
        )));
    }

    if let Some(found) = search_path(program) {
        return Ok(found);
    }
    if let Some(found) = engine.candidates.iter().find(|c| c.is_file()) {
        return Ok(found.clone());
    }

    Err(RenderError::launch(format!(
        "engine '{}' not found on PATH or in [{}]",
        program.display(),
        engine
            .candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

fn is_explicit_path(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| candidate.is_file())
}

fn executable_names(name: &Path) -> Vec<PathBuf> {
    if cfg!(windows) && name.extension().is_none() {
        vec![name.with_extension("exe"), name.to_path_buf()]
    } else {
        vec![name.to_path_buf()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &str, candidates: Vec<PathBuf>) -> EngineConfig {
        EngineConfig {
            program: PathBuf::from(program),
            candidates,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn missing_explicit_path_is_a_launch_error() {
        let err = resolve_program(&engine("/definitely/not/here/blender", vec![])).unwrap_err();
        assert!(matches!(err, RenderError::Launch(_)));
    }

    #[test]
    fn unknown_bare_name_is_a_launch_error() {
        let err = resolve_program(&engine("no-such-engine-binary-4f1c", vec![])).unwrap_err();
        assert!(matches!(err, RenderError::Launch(_)));
        assert!(err.to_string().contains("no-such-engine-binary-4f1c"));
    }

    #[test]
    fn candidate_is_used_when_path_lookup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let installed = dir.path().join("blender");
        std::fs::write(&installed, b"").unwrap();
        let found = resolve_program(&engine(
            "no-such-engine-binary-4f1c",
            vec![dir.path().join("missing"), installed.clone()],
        ))
        .unwrap();
        assert_eq!(found, installed);
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_resolves_through_path() {
        let found = resolve_program(&engine("sh", vec![])).unwrap();
        assert!(found.is_absolute());
    }
}
