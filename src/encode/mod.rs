//! Post-render assembly of the frame sequence.

/// `ffmpeg`-based MP4 output via the system `ffmpeg`.
pub mod ffmpeg;
