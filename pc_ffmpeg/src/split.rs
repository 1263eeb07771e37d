use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{FfmpegError, Result};

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 1080x1920, the 9:16 frame used for vertical shorts.
    pub const VERTICAL_1080P: Self = Self {
        width: 1080,
        height: 1920,
    };
}

/// A `[start, end)` time range of the source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentRange {
    pub start: f64,
    pub end: f64,
}

impl SegmentRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Region of the source frame kept by the crop filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Encoder settings applied to every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub video_codec: String,
    pub preset: String,
    /// 0-51, lower is better quality. 23 is the x264 default.
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Number of chunks of `chunk_length` seconds needed to cover `duration`;
/// the last one may be shorter.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn segment_count(duration: f64, chunk_length: f64) -> u32 {
    if duration <= 0.0 || chunk_length <= 0.0 {
        return 0;
    }

    (duration / chunk_length).ceil() as u32
}

pub fn plan_segments(duration: f64, chunk_length: f64) -> Vec<SegmentRange> {
    (0..segment_count(duration, chunk_length))
        .map(|i| {
            let i = f64::from(i);
            SegmentRange {
                start: i * chunk_length,
                end: ((i + 1.0) * chunk_length).min(duration),
            }
        })
        .collect()
}

/// Largest centered region of `source` with the aspect ratio of `target`.
///
/// Only the wider dimension is cut. Sizes are rounded down to even values
/// because yuv420p encoders reject odd dimensions.
#[allow(clippy::cast_possible_truncation)]
pub fn center_crop(source: Resolution, target: Resolution) -> CropRect {
    let (src_w, src_h) = (u64::from(source.width), u64::from(source.height));
    let (dst_w, dst_h) = (u64::from(target.width), u64::from(target.height));

    let (width, height) = if src_w * dst_h > src_h * dst_w {
        (src_h * dst_w / dst_h, src_h)
    } else {
        (src_w, src_w * dst_h / dst_w)
    };

    // both values are bounded by the source dimensions, so they fit in u32
    let width = (width as u32 & !1).max(2).min(source.width);
    let height = (height as u32 & !1).max(2).min(source.height);

    CropRect {
        width,
        height,
        x: (source.width - width) / 2,
        y: (source.height - height) / 2,
    }
}

pub fn video_filter(crop: CropRect, target: Resolution) -> String {
    format!(
        "crop={}:{}:{}:{},scale={}:{},setsar=1",
        crop.width, crop.height, crop.x, crop.y, target.width, target.height
    )
}

/// Builds the ffmpeg command extracting one segment of `input`, cropped
/// and scaled to `target`, into `output`.
pub fn build_segment_command(
    input: &Path,
    output: &Path,
    range: SegmentRange,
    crop: CropRect,
    target: Resolution,
    options: &RenderOptions,
) -> Command {
    let mut cmd = Command::new("ffmpeg");

    cmd.arg("-hide_banner")
        .arg("-y") // overwrite a segment left over from an aborted run
        .arg("-ss") // seeking before -i is fast and frame accurate when re-encoding
        .arg(range.start.to_string())
        .arg("-i")
        .arg(input)
        .arg("-t")
        .arg(range.duration().to_string());
    cmd.arg("-vf").arg(video_filter(crop, target));
    cmd.arg("-c:v")
        .arg(&options.video_codec)
        .arg("-preset")
        .arg(&options.preset)
        .arg("-crf")
        .arg(options.crf.to_string())
        .arg("-pix_fmt")
        .arg("yuv420p");
    cmd.arg("-c:a")
        .arg(&options.audio_codec)
        .arg("-b:a")
        .arg(&options.audio_bitrate);
    cmd.arg("-movflags").arg("+faststart");
    cmd.arg(output);

    cmd
}

/// Render one segment.
///
/// # Errors
/// If ffmpeg cannot be spawned or exits unsuccessfully.
#[tracing::instrument(skip(options))]
pub async fn render_segment(
    input: &Path,
    output: &Path,
    range: SegmentRange,
    crop: CropRect,
    target: Resolution,
    options: &RenderOptions,
) -> Result<()> {
    let mut cmd =
        build_segment_command(input, output, range, crop, target, options);

    tracing::debug!("running {:?}", cmd.as_std());

    let command_output =
        cmd.output().await.map_err(|source| FfmpegError::Spawn {
            program: "ffmpeg",
            source,
        })?;

    let command_stderr = String::from_utf8_lossy(&command_output.stderr);
    tracing::trace!("ffmpeg output: {}", command_stderr);

    if !command_output.status.success() {
        tracing::error!("ffmpeg error: {}", command_stderr);
        return Err(FfmpegError::Failed {
            program: "ffmpeg",
            status: command_output.status,
            stderr: command_stderr.to_string(),
        });
    }

    Ok(())
}
