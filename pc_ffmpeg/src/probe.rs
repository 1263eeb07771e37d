use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

use crate::{split::Resolution, FfmpegError, Result};

/// What the splitter needs to know about a source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Container duration, in seconds.
    pub duration: f64,
    pub resolution: Resolution,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    // ffprobe prints numbers as strings in its JSON output
    duration: Option<String>,
}

pub fn build_probe_command(path: &Path) -> Command {
    let mut cmd = Command::new("ffprobe");

    cmd.arg("-v")
        .arg("error")
        .arg("-select_streams") // only the first video stream
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height:format=duration")
        .arg("-of")
        .arg("json")
        .arg(path);

    cmd
}

/// Parse the JSON printed by the command from [`build_probe_command`].
///
/// # Errors
/// If the output is not valid JSON, has no video stream with dimensions, or
/// has no positive duration.
pub fn parse_probe_output(output: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(output)?;

    let (width, height) = probe
        .streams
        .iter()
        .find_map(|stream| Some((stream.width?, stream.height?)))
        .ok_or(FfmpegError::NoVideoStream)?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .filter(|duration| duration.is_finite() && *duration >= 0.0)
        .ok_or(FfmpegError::InvalidDuration(probe.format.duration.clone()))?;

    Ok(MediaInfo {
        duration,
        resolution: Resolution { width, height },
    })
}

/// Probe the duration and frame size of a video file.
///
/// # Errors
/// If ffprobe cannot be spawned, exits unsuccessfully or prints output
/// that [`parse_probe_output`] rejects.
#[tracing::instrument]
pub async fn probe(path: &Path) -> Result<MediaInfo> {
    let output = build_probe_command(path)
        .output()
        .await
        .map_err(|source| FfmpegError::Spawn {
            program: "ffprobe",
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::error!("ffprobe error: {}", stderr);
        return Err(FfmpegError::Failed {
            program: "ffprobe",
            status: output.status,
            stderr,
        });
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
    tracing::debug!(?info, "probed source");

    Ok(info)
}
