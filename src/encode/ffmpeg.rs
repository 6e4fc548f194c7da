use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use uuid::Uuid;

use crate::config::{RenderSettings, VideoConfig};
use crate::engine::supervise::run_supervised;
use crate::foundation::error::{RenderError, RenderResult};
use crate::output::ArtifactReference;

/// Arguments turning `<frames_dir>/frame_%04d.png` into an h264 MP4 at `out_path`.
pub fn sequence_args(
    video: &VideoConfig,
    settings: &RenderSettings,
    frames_dir: &Path,
    out_path: &Path,
) -> Vec<String> {
    let input = frames_dir.join(settings.frame_pattern());
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-framerate".into(),
        settings.fps.to_string(),
        "-start_number".into(),
        "1".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-an".into(),
        // h264 + yuv420p for broad player compatibility.
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-crf".into(),
        video.crf.to_string(),
        "-movflags".into(),
        "+faststart".into(),
        out_path.to_string_lossy().into_owned(),
    ]
}

/// Encode the persisted frame sequence in `frames_dir` into a video next to it.
///
/// Every failure, including a missing `ffmpeg`, is reported as [`RenderError::Failed`]: the
/// frames are already rendered, so only the assembly step went wrong.
#[tracing::instrument(skip_all, fields(job_id = %job_id))]
pub async fn encode_sequence(
    video: &VideoConfig,
    settings: &RenderSettings,
    frames_dir: &Path,
    job_id: Uuid,
    grace: Duration,
) -> RenderResult<ArtifactReference> {
    let out_path: PathBuf = frames_dir.join(&video.file_name);
    let mut cmd = Command::new(&video.program);
    cmd.args(sequence_args(video, settings, frames_dir, &out_path));

    let exit = run_supervised(cmd, "ffmpeg", video.timeout, grace)
        .await
        .map_err(|e| RenderError::failed(format!("video encoding: {e}")))?;
    if !exit.status.success() {
        return Err(RenderError::failed(format!(
            "video encoding: {}",
            exit.failure_reason("ffmpeg")
        )));
    }
    if !out_path.is_file() {
        return Err(RenderError::failed(format!(
            "video encoding: ffmpeg exited successfully but '{}' is missing",
            out_path.display()
        )));
    }
    tracing::info!(elapsed = ?exit.elapsed, path = %out_path.display(), "video encoded");

    Ok(ArtifactReference {
        file_name: video.file_name.clone(),
        url: format!("{job_id}/{}", video.file_name),
        path: out_path,
    })
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_reference_the_sequence_pattern() {
        let video = VideoConfig::default();
        let settings = RenderSettings::default();
        let args = sequence_args(
            &video,
            &settings,
            Path::new("/out/job"),
            Path::new("/out/job/render.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-framerate 24"));
        assert!(joined.contains("-i /out/job/frame_%04d.png"));
        assert!(joined.contains("-crf 23"));
        assert_eq!(args.last().map(String::as_str), Some("/out/job/render.mp4"));
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_failed_not_launch() {
        let dir = tempfile::tempdir().unwrap();
        let video = VideoConfig {
            program: PathBuf::from("/no/such/ffmpeg"),
            ..VideoConfig::default()
        };
        let err = encode_sequence(
            &video,
            &RenderSettings::default(),
            dir.path(),
            Uuid::new_v4(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenderError::Failed(_)));
    }

    #[tokio::test]
    async fn encodes_png_sequence_when_ffmpeg_is_available() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings {
            width: 16,
            height: 16,
            frames: 3,
            ..RenderSettings::default()
        };
        for i in 1..=3 {
            let img = image::RgbaImage::from_pixel(16, 16, image::Rgba([i * 60, 0, 0, 255]));
            img.save(dir.path().join(settings.frame_file_name(u32::from(i))))
                .unwrap();
        }
        let job_id = Uuid::new_v4();
        let artifact = encode_sequence(
            &VideoConfig::default(),
            &settings,
            dir.path(),
            job_id,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(artifact.file_name, "render.mp4");
        assert_eq!(artifact.url, format!("{job_id}/render.mp4"));
        assert!(artifact.path.is_file());
    }
}
