use std::io::SeekFrom;
use std::path::Path;

use reqwest::Response;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, LOCATION};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;
use types::UploadMetadata;

use crate::YouTubeError;

pub const UPLOAD_ENDPOINT: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos";

/// Resumable upload chunks must be a multiple of this size, except the last.
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE: u64 = 32 * CHUNK_GRANULARITY;

/// How far a running upload has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    #[allow(clippy::cast_possible_truncation)]
    pub const fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        // bytes_sent never exceeds total_bytes, so this is at most 100
        (self.bytes_sent * 100 / self.total_bytes) as u8
    }
}

enum UploadStatus {
    Complete { video_id: String },
    Incomplete { next_byte: u64 },
}

#[derive(serde::Deserialize)]
struct YouTubeUploadStatusResponse {
    id: String,
}

struct ChunkResponse {
    response: Response,
}

impl ChunkResponse {
    const fn new(response: Response) -> Self {
        Self { response }
    }

    async fn determine_upload_status(
        self,
    ) -> Result<UploadStatus, YouTubeError> {
        let status = self.response.status();

        if status.is_success() {
            let result: YouTubeUploadStatusResponse =
                self.response.json().await?;
            return Ok(UploadStatus::Complete {
                video_id: result.id,
            });
        }

        if status.as_u16() == 308 {
            // no Range header means the server has not stored any byte yet
            let next_byte = match self
                .response
                .headers()
                .get("Range")
                .and_then(|v| v.to_str().ok())
            {
                Some(range) => parse_range_end(range)
                    .map(|end| end + 1)
                    .ok_or_else(|| {
                        tracing::error!("malformed Range header: {}", range);
                        YouTubeError::Api {
                            status: 308,
                            reason: None,
                            message: format!("malformed Range header {range}"),
                        }
                    })?,
                None => 0,
            };

            return Ok(UploadStatus::Incomplete { next_byte });
        }

        let body = self.response.text().await.unwrap_or_default();
        Err(YouTubeError::from_response(status.as_u16(), &body))
    }
}

/// Last byte from a range header which looks like "bytes=0-12345".
fn parse_range_end(range: &str) -> Option<u64> {
    range
        .trim()
        .strip_prefix("bytes=")?
        .split_once('-')?
        .1
        .parse()
        .ok()
}

/// Client for the YouTube Data API resumable upload protocol.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    access_token: String,
    endpoint: String,
    chunk_size: u64,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            access_token,
            endpoint: UPLOAD_ENDPOINT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the chunk size, rounded up to a multiple of 256 KiB.
    #[must_use]
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size =
            bytes.div_ceil(CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        self
    }

    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Open a resumable upload session and return its URL.
    ///
    /// # Errors
    /// If the request fails or YouTube rejects the metadata; quota
    /// exhaustion is reported as [`YouTubeError::QuotaExceeded`].
    #[instrument(skip(self))]
    pub async fn create_upload_url(
        &self,
        metadata: &UploadMetadata,
        file_size: u64,
    ) -> Result<String, YouTubeError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| YouTubeError::InvalidUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("uploadType", "resumable")
            .append_pair("part", "snippet,status")
            .finish();

        tracing::debug!("URL: {:?}", url);

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header("X-Upload-Content-Length", file_size.to_string())
            .header("X-Upload-Content-Type", "video/mp4")
            .json(&json!({
                "snippet": {
                    "title": metadata.title,
                    "description": metadata.description,
                    "tags": metadata.tags,
                    "categoryId": metadata.category_id,
                },
                "status": {
                    "privacyStatus": metadata.privacy.as_str(),
                    "selfDeclaredMadeForKids": false,
                },
            }))
            .send()
            .await?;

        tracing::trace!("Response: {:?}", response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YouTubeError::from_response(status.as_u16(), &body));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(YouTubeError::MissingLocation)?
            .to_str()
            .map_err(|_| YouTubeError::MissingLocation)?;

        Ok(location.to_string())
    }

    /// Upload a video file and return the id YouTube assigned to it.
    ///
    /// The file is sent in chunks; `on_progress` is called after every
    /// chunk the server acknowledges. Nothing is retried: the first failed
    /// request ends the upload.
    ///
    /// # Errors
    /// If the file cannot be read, a request fails, or YouTube rejects the
    /// upload.
    #[instrument(skip(self, metadata, on_progress))]
    pub async fn upload_video<F>(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        mut on_progress: F,
    ) -> Result<String, YouTubeError>
    where
        F: FnMut(UploadProgress),
    {
        let mut file = tokio::fs::File::open(path).await?;
        let total_bytes = file.metadata().await?.len();

        if total_bytes == 0 {
            return Err(YouTubeError::EmptyFile);
        }

        tracing::info!("Creating upload URL");
        let upload_url = self.create_upload_url(metadata, total_bytes).await?;

        let mut start_byte = 0;
        loop {
            let chunk_len = self.chunk_size.min(total_bytes - start_byte);
            let end_byte = start_byte + chunk_len - 1;

            let mut chunk = vec![0; usize::try_from(chunk_len).map_err(
                |_| std::io::Error::other("chunk does not fit in memory"),
            )?];
            file.seek(SeekFrom::Start(start_byte)).await?;
            file.read_exact(&mut chunk).await?;

            tracing::debug!(
                "sending bytes {}-{}/{}",
                start_byte,
                end_byte,
                total_bytes
            );

            let response = self
                .http
                .put(&upload_url)
                .header(AUTHORIZATION, self.bearer())
                .header(CONTENT_TYPE, "video/mp4")
                .header(
                    CONTENT_RANGE,
                    format!("bytes {start_byte}-{end_byte}/{total_bytes}"),
                )
                .body(chunk)
                .send()
                .await?;

            tracing::trace!("Response: {:?}", response);

            match ChunkResponse::new(response).determine_upload_status().await? {
                UploadStatus::Complete { video_id } => {
                    on_progress(UploadProgress {
                        bytes_sent: total_bytes,
                        total_bytes,
                    });
                    return Ok(video_id);
                }
                UploadStatus::Incomplete { next_byte } => {
                    if next_byte <= start_byte || next_byte > total_bytes {
                        return Err(YouTubeError::Stalled {
                            offset: start_byte,
                        });
                    }
                    start_byte = next_byte;
                    on_progress(UploadProgress {
                        bytes_sent: start_byte,
                        total_bytes,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use types::Privacy;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            title: "Talk - Part 1 #shorts".to_string(),
            description: "Part 1 from video 'Talk'.".to_string(),
            tags: vec!["shorts".to_string()],
            category_id: "22".to_string(),
            privacy: Privacy::Public,
        }
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(header("Authorization", "Bearer token"))
            .and(body_partial_json(json!({
                "snippet": {"title": "Talk - Part 1 #shorts", "categoryId": "22"},
                "status": {"privacyStatus": "public"},
            })))
            .respond_with(
                ResponseTemplate::new(200).insert_header(
                    "Location",
                    format!("{}/session/1", server.uri()).as_str(),
                ),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> YouTubeClient {
        YouTubeClient::new(reqwest::Client::new(), "token".to_string())
            .with_endpoint(format!("{}/upload/youtube/v3/videos", server.uri()))
            .with_chunk_size(1)
    }

    #[test]
    fn test_parse_range_end() {
        assert_eq!(parse_range_end("bytes=0-12345"), Some(12345));
        assert_eq!(parse_range_end("bytes=0-"), None);
        assert_eq!(parse_range_end("0-10"), None);
    }

    #[test]
    fn test_chunk_size_rounding() {
        let client =
            YouTubeClient::new(reqwest::Client::new(), String::new());
        assert_eq!(client.clone().with_chunk_size(1).chunk_size(), 262_144);
        assert_eq!(
            client.with_chunk_size(262_145).chunk_size(),
            2 * 262_144
        );
    }

    #[test]
    fn test_progress_percent() {
        let progress = UploadProgress {
            bytes_sent: 50,
            total_bytes: 200,
        };
        assert_eq!(progress.percent(), 25);
    }

    #[tokio::test]
    async fn test_single_chunk_upload() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 0-9/10"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "abc123", "kind": "youtube#video"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Talk_part_1.mp4");
        tokio::fs::write(&file, b"0123456789").await.unwrap();

        let mut seen = Vec::new();
        let video_id = client(&server)
            .upload_video(&file, &metadata(), |p| seen.push(p.percent()))
            .await
            .unwrap();

        assert_eq!(video_id, "abc123");
        assert_eq!(seen, vec![100]);
    }

    #[tokio::test]
    async fn test_multi_chunk_upload_follows_range() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 0-262143/300000"))
            .respond_with(
                ResponseTemplate::new(308).insert_header("Range", "bytes=0-262143"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 262144-299999/300000"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "xyz"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Talk_part_1.mp4");
        tokio::fs::write(&file, vec![7u8; 300_000]).await.unwrap();

        let mut seen = Vec::new();
        let video_id = client(&server)
            .upload_video(&file, &metadata(), |p| seen.push(p.bytes_sent))
            .await
            .unwrap();

        assert_eq!(video_id, "xyz");
        assert_eq!(seen, vec![262_144, 300_000]);
    }

    #[tokio::test]
    async fn test_quota_error_on_session_creation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "quota",
                    "errors": [{"reason": "quotaExceeded"}],
                }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Talk_part_1.mp4");
        tokio::fs::write(&file, b"data").await.unwrap();

        let error = client(&server)
            .upload_video(&file, &metadata(), |_| {})
            .await
            .unwrap_err();

        assert!(error.is_quota(), "{error:?}");
    }

    #[tokio::test]
    async fn test_missing_location_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = client(&server).create_upload_url(&metadata(), 4).await;

        assert!(matches!(result, Err(YouTubeError::MissingLocation)));
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.mp4");
        tokio::fs::write(&file, b"").await.unwrap();

        let result = client(&server)
            .upload_video(&file, &metadata(), |_| {})
            .await;

        assert!(matches!(result, Err(YouTubeError::EmptyFile)));
    }
}
