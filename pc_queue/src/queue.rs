use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::instrument;
use types::{Privacy, SegmentName, UploadMetadata, normalize_title, part_label};

use crate::{Ledger, LedgerError, QueueError, UploadError, Uploader};

/// Uploads allowed per run when the caller does not say otherwise.
pub const DEFAULT_RUN_QUOTA: usize = 10;

/// YouTube rejects longer titles.
pub const MAX_TITLE_CHARS: usize = 100;

/// Metadata applied to every uploaded segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDefaults {
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: Privacy,
    /// Appended to titles and repeated in descriptions.
    pub hashtag: String,
    /// Last line of every description.
    pub description_footer: String,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            tags: ["shorts", "viral", "youtubeshorts", "trend", "shortsvideo"]
                .map(String::from)
                .to_vec(),
            category_id: "22".to_string(),
            privacy: Privacy::Public,
            hashtag: "#shorts".to_string(),
            description_footer: "Automated upload via partcast.".to_string(),
        }
    }
}

/// Build the title and description of a segment from its file name.
///
/// The base title is normalized (see [`normalize_title`]) and shortened
/// when the whole title would exceed [`MAX_TITLE_CHARS`].
pub fn describe_segment(
    file_name: &str,
    defaults: &UploadDefaults,
) -> UploadMetadata {
    let base_title = normalize_title(&SegmentName::parse(file_name).base_title);
    let part = part_label(file_name);

    let mut suffix = format!(" - Part {part}");
    if !defaults.hashtag.is_empty() {
        suffix.push(' ');
        suffix.push_str(&defaults.hashtag);
    }

    let room = MAX_TITLE_CHARS.saturating_sub(suffix.chars().count());
    let short_title: String = base_title.chars().take(room).collect();
    let title = format!("{}{suffix}", short_title.trim_end());

    let description = [
        format!("Part {part} from video '{base_title}'."),
        defaults.hashtag.clone(),
        defaults.description_footer.clone(),
    ]
    .into_iter()
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    UploadMetadata {
        title,
        description,
        tags: defaults.tags.clone(),
        category_id: defaults.category_id.clone(),
        privacy: defaults.privacy,
    }
}

/// List the segment files of `dir` in upload order.
///
/// Only regular files with the given extension (case-insensitive) are
/// returned, sorted by part index. Part indexes are compared across all
/// base titles, so parts of different videos interleave.
///
/// # Errors
/// If the directory is missing or cannot be read.
pub async fn discover_segments(
    dir: &Path,
    extension: &str,
) -> Result<Vec<String>, QueueError> {
    if !tokio::fs::metadata(dir)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
    {
        return Err(QueueError::MissingPartsDir(dir.display().to_string()));
    }

    let discover_error = |source| QueueError::Discover {
        path: dir.display().to_string(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(discover_error)?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(discover_error)?
    {
        let path = entry.path();

        // follows symlinks, unlike DirEntry::file_type
        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            continue;
        }

        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches_extension {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => {
                tracing::warn!("skipping non UTF-8 file name {:?}", name);
            }
        }
    }

    // directory order is arbitrary; sort by name first so equal part
    // indexes come out the same way on every run
    names.sort();
    names.sort_by_key(|name| types::part_index(name));

    Ok(names)
}

/// Settings of one upload run.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub parts_dir: PathBuf,
    pub segment_extension: String,
    pub run_quota: usize,
    pub defaults: UploadDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedSegment {
    pub file_name: String,
    pub video_id: String,
}

#[derive(Debug)]
pub enum StopReason {
    /// Every discovered segment is in the ledger.
    QueueDrained,
    /// The run quota was used up with segments still pending.
    RunQuotaReached,
    UploadFailed {
        file_name: String,
        error: UploadError,
    },
    /// The upload went through but could not be recorded; the segment may
    /// be uploaded again by the next run.
    LedgerFailed {
        file_name: String,
        error: LedgerError,
    },
}

#[derive(Debug)]
pub struct RunReport {
    pub uploaded: Vec<UploadedSegment>,
    pub stop: StopReason,
}

impl RunReport {
    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }

    pub const fn is_failure(&self) -> bool {
        matches!(
            self.stop,
            StopReason::UploadFailed { .. } | StopReason::LedgerFailed { .. }
        )
    }
}

/// Uploads pending segments one at a time, recording each success in the
/// ledger before moving on.
pub struct UploadQueue<U> {
    settings: QueueSettings,
    uploader: U,
}

impl<U: Uploader> UploadQueue<U> {
    pub const fn new(settings: QueueSettings, uploader: U) -> Self {
        Self { settings, uploader }
    }

    pub const fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Segments not in the ledger yet, in upload order.
    ///
    /// # Errors
    /// See [`discover_segments`].
    pub async fn pending(
        &self,
        ledger: &Ledger,
    ) -> Result<Vec<String>, QueueError> {
        let mut segments = discover_segments(
            &self.settings.parts_dir,
            &self.settings.segment_extension,
        )
        .await?;

        segments.retain(|name| !ledger.contains(name));

        Ok(segments)
    }

    /// Upload up to the run quota of pending segments.
    ///
    /// The run stops at the first failure without trying the remaining
    /// segments; entries already written to the ledger stay valid.
    ///
    /// # Errors
    /// Only when the parts directory cannot be listed. Failures during the
    /// run end up in [`RunReport::stop`].
    #[instrument(skip(self, ledger), fields(parts_dir = %self.settings.parts_dir.display()))]
    pub async fn run(
        &mut self,
        ledger: &mut Ledger,
    ) -> Result<RunReport, QueueError> {
        let pending = self.pending(ledger).await?;

        tracing::info!(
            "{} segments pending, run quota {}",
            pending.len(),
            self.settings.run_quota
        );

        let mut uploaded = Vec::new();

        for file_name in pending {
            if uploaded.len() >= self.settings.run_quota {
                return Ok(RunReport {
                    uploaded,
                    stop: StopReason::RunQuotaReached,
                });
            }

            let path = self.settings.parts_dir.join(&file_name);
            let metadata = describe_segment(&file_name, &self.settings.defaults);

            tracing::info!("Uploading: {}", path.display());

            let video_id = match self.uploader.upload(&path, &metadata).await {
                Ok(video_id) => video_id,
                Err(error) => {
                    tracing::error!("upload of {} failed: {}", file_name, error);
                    return Ok(RunReport {
                        uploaded,
                        stop: StopReason::UploadFailed { file_name, error },
                    });
                }
            };

            tracing::info!("Uploaded {}. ID: {}", file_name, video_id);

            if let Err(error) = ledger.record(&file_name).await {
                tracing::error!("failed to record {}: {}", file_name, error);
                uploaded.push(UploadedSegment {
                    file_name: file_name.clone(),
                    video_id,
                });
                return Ok(RunReport {
                    uploaded,
                    stop: StopReason::LedgerFailed { file_name, error },
                });
            }

            uploaded.push(UploadedSegment {
                file_name,
                video_id,
            });
        }

        Ok(RunReport {
            uploaded,
            stop: StopReason::QueueDrained,
        })
    }
}
