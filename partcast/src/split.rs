use std::path::{Path, PathBuf};

use pc_ffmpeg::{
    FfmpegError,
    probe::probe,
    split::{center_crop, plan_segments, render_segment},
};
use tracing::instrument;
use types::SegmentName;

use crate::{Config, Error};

#[derive(Debug, Default)]
pub struct SplitSummary {
    pub sources: usize,
    pub segments_written: usize,
    /// Sources whose split stopped early, with the reason.
    pub failed: Vec<(PathBuf, FfmpegError)>,
}

impl SplitSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Split {} source videos into {} segments.",
            self.sources - self.failed.len(),
            self.segments_written
        );

        for (source, error) in &self.failed {
            message.push_str(&format!(
                "\nFailed to split {}: {}",
                source.display(),
                error
            ));
        }

        message
    }
}

/// Source videos of `dir`, sorted by file name.
///
/// # Errors
/// If the directory is missing or cannot be listed.
pub async fn eligible_sources(
    dir: &Path,
    extensions: &[String],
) -> Result<Vec<PathBuf>, Error> {
    if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::MissingSourceDir(dir.display().to_string()));
    }

    let io_error = |source| Error::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut sources = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();

        // sources are often symlinked in, so follow links
        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            continue;
        }

        let eligible = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            });

        if eligible {
            sources.push(path);
        }
    }

    sources.sort();

    Ok(sources)
}

/// Split every eligible source video into segments in the parts directory.
///
/// A source that fails to probe or render is skipped after logging; the
/// segments it already produced stay on disk.
///
/// # Errors
/// If the split settings are invalid, the source directory is missing or
/// the parts directory cannot be created.
#[instrument(skip(config))]
pub async fn split_all(config: &Config) -> Result<SplitSummary, Error> {
    config.validate_split()?;

    let sources =
        eligible_sources(&config.source_dir, &config.source_extensions)
            .await?;

    tokio::fs::create_dir_all(&config.parts_dir)
        .await
        .map_err(|source| Error::Io {
            path: config.parts_dir.display().to_string(),
            source,
        })?;

    tracing::info!("{} source videos found", sources.len());

    let mut summary = SplitSummary {
        sources: sources.len(),
        ..SplitSummary::default()
    };

    for source in sources {
        if let Err(e) =
            split_source(config, &source, &mut summary.segments_written).await
        {
            tracing::error!("failed to split {}: {}", source.display(), e);
            summary.failed.push((source, e));
        }
    }

    Ok(summary)
}

#[instrument(skip(config, written))]
async fn split_source(
    config: &Config,
    source: &Path,
    written: &mut usize,
) -> Result<(), FfmpegError> {
    let info = probe(source).await?;
    let ranges = plan_segments(info.duration, config.chunk_seconds);
    let crop = center_crop(info.resolution, config.target);

    let base_title = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();

    tracing::info!(
        "Processing {}: {:.1}s, {} segments",
        source.display(),
        info.duration,
        ranges.len()
    );

    for (part_index, range) in (1..).zip(ranges) {
        let file_name = SegmentName::new(base_title.as_str(), part_index)
            .file_name(&config.segment_extension);
        let output = config.parts_dir.join(&file_name);

        render_segment(
            source,
            &output,
            range,
            crop,
            config.target,
            &config.render,
        )
        .await?;

        *written += 1;
        tracing::info!("Exported: {}", file_name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_eligible_sources() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mov", "a talk.MP4", "notes.txt", "c.mkv", "noext"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        tokio::fs::create_dir(dir.path().join("folder.mp4"))
            .await
            .unwrap();

        let sources =
            eligible_sources(dir.path(), &Config::default().source_extensions)
                .await
                .unwrap();

        assert_eq!(
            sources,
            vec![
                dir.path().join("a talk.MP4"),
                dir.path().join("b.mov"),
                dir.path().join("c.mkv"),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_sources_are_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("yt-vids");
        tokio::fs::create_dir(&sources).await.unwrap();
        tokio::fs::write(dir.path().join("talk.mp4"), b"x").await.unwrap();
        tokio::fs::symlink(dir.path().join("talk.mp4"), sources.join("talk.mp4"))
            .await
            .unwrap();
        tokio::fs::symlink(dir.path().join("gone.mp4"), sources.join("gone.mp4"))
            .await
            .unwrap();

        let eligible =
            eligible_sources(&sources, &Config::default().source_extensions)
                .await
                .unwrap();

        assert_eq!(eligible, vec![sources.join("talk.mp4")]);
    }

    #[tokio::test]
    async fn test_missing_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            source_dir: dir.path().join("yt-vids"),
            parts_dir: dir.path().join("yt-vids_parts"),
            ..Config::default()
        };

        let result = split_all(&config).await;

        assert!(matches!(result, Err(Error::MissingSourceDir(_))));
        assert!(!config.parts_dir.exists());
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected_first() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("yt-vids")).await.unwrap();
        let base = Config {
            source_dir: dir.path().join("yt-vids"),
            parts_dir: dir.path().join("yt-vids_parts"),
            ..Config::default()
        };

        for config in [
            Config {
                target: pc_ffmpeg::split::Resolution {
                    width: 0,
                    height: 0,
                },
                ..base.clone()
            },
            Config {
                chunk_seconds: 0.0,
                ..base.clone()
            },
            Config {
                chunk_seconds: f64::NAN,
                ..base.clone()
            },
        ] {
            let result = split_all(&config).await;

            assert!(matches!(result, Err(Error::InvalidConfig(_))));
            assert!(!config.parts_dir.exists());
        }
    }

    #[tokio::test]
    async fn test_empty_source_dir_creates_parts_dir() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("yt-vids")).await.unwrap();
        let config = Config {
            source_dir: dir.path().join("yt-vids"),
            parts_dir: dir.path().join("yt-vids_parts"),
            ..Config::default()
        };

        let summary = split_all(&config).await.unwrap();

        assert_eq!(summary.segments_written, 0);
        assert!(config.parts_dir.is_dir());
        assert_eq!(
            summary.message(),
            "Split 0 source videos into 0 segments."
        );
    }

    #[test]
    fn test_summary_lists_failures() {
        let summary = SplitSummary {
            sources: 2,
            segments_written: 3,
            failed: vec![(PathBuf::from("b.mp4"), FfmpegError::NoVideoStream)],
        };

        assert_eq!(
            summary.message(),
            "Split 1 source videos into 3 segments.\nFailed to split b.mp4: Source has no video stream"
        );
    }
}
