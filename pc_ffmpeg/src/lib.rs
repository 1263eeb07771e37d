pub mod probe;
pub mod split;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Failed to parse ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),
    #[error("Source has no video stream")]
    NoVideoStream,
    #[error("Source duration is missing or invalid: {0:?}")]
    InvalidDuration(Option<String>),
}

pub type Result<T> = std::result::Result<T, FfmpegError>;
