//! Tracks which segments were uploaded and decides what to upload next.
//!
//! State lives in two places on disk: the parts directory filled by the
//! splitter, and the ledger, an append-only text file with one uploaded
//! file name per line.
mod ledger;
mod queue;

use std::path::Path;

use thiserror::Error;
use types::UploadMetadata;

pub use ledger::{Ledger, LedgerLock};
pub use queue::{
    DEFAULT_RUN_QUOTA, MAX_TITLE_CHARS, QueueSettings, RunReport, StopReason,
    UploadDefaults, UploadQueue, UploadedSegment, describe_segment,
    discover_segments,
};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to access ledger {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(
        "Ledger {path} is locked by another upload run (remove {lock} if no other run is active)"
    )]
    Locked { path: String, lock: String },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Parts directory not found: {0}")]
    MissingPartsDir(String),
    #[error("Failed to list parts directory {path}: {source}")]
    Discover {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Why the upload collaborator failed.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The platform refused because of quota or rate limiting; later
    /// segments would fail the same way.
    #[error("upload quota exhausted: {0}")]
    Quota(String),
    #[error("platform rejected the upload: {0}")]
    Platform(String),
    #[error("upload failed: {0}")]
    Transport(String),
}

/// Uploads one segment file and returns the id the platform assigned.
pub trait Uploader {
    fn upload(
        &mut self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> impl Future<Output = Result<String, UploadError>>;
}
