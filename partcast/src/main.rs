use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pc_ffmpeg::split::{RenderOptions, Resolution};
use pc_queue::{DEFAULT_RUN_QUOTA, UploadDefaults};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod menu;
mod split;
mod upload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the long source videos.
    pub source_dir: PathBuf,
    /// Directory the splitter writes segments to and the queue reads from.
    pub parts_dir: PathBuf,
    pub source_extensions: Vec<String>,
    pub segment_extension: String,
    /// Length of every segment but the last, in seconds.
    pub chunk_seconds: f64,
    pub target: Resolution,
    pub render: RenderOptions,

    /// Uploads per run unless overridden with `upload --limit`.
    pub run_quota: usize,
    pub ledger_file: PathBuf,
    pub client_secret_file: PathBuf,
    pub token_file: PathBuf,
    pub upload: UploadDefaults,
    pub upload_chunk_bytes: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("yt-vids"),
            parts_dir: PathBuf::from("yt-vids_parts"),
            source_extensions: ["mp4", "mov", "mkv", "avi"]
                .map(String::from)
                .to_vec(),
            segment_extension: "mp4".to_string(),
            chunk_seconds: 60.0,
            target: Resolution::VERTICAL_1080P,
            render: RenderOptions::default(),
            run_quota: DEFAULT_RUN_QUOTA,
            ledger_file: PathBuf::from("uploaded.txt"),
            client_secret_file: PathBuf::from("client_secret.json"),
            token_file: PathBuf::from("token.json"),
            upload: UploadDefaults::default(),
            upload_chunk_bytes: pc_youtube::upload::DEFAULT_CHUNK_SIZE,
            user_agent: concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )
            .to_string(),
        }
    }
}

impl Config {
    /// Check the settings the splitter divides by.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for a non-positive chunk length or an empty
    /// target resolution.
    pub fn validate_split(&self) -> Result<(), Error> {
        if self.chunk_seconds.is_nan() || self.chunk_seconds <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "chunk_seconds must be positive, got {}",
                self.chunk_seconds
            )));
        }

        if self.target.width == 0 || self.target.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "target resolution must not be empty, got {}x{}",
                self.target.width, self.target.height
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
}

impl pc_app::ContextProvider<Config> for AppContext {
    fn new(config: Config) -> Self {
        Self { config }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Source directory not found: {0}")]
    MissingSourceDir(String),
    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Queue(#[from] pc_queue::QueueError),
    #[error(transparent)]
    Ledger(#[from] pc_queue::LedgerError),
    #[error(transparent)]
    YouTube(#[from] pc_youtube::YouTubeError),
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Cut long videos into vertical shorts and upload them to YouTube a few
/// at a time.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to `partcast.toml` when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Split every source video into segments
    Split,
    /// Upload pending segments
    Upload {
        /// Maximum number of uploads in this run
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Authorize access to the YouTube account
    Auth,
    /// Interactive menu
    Menu,
}

/// Run the splitter and print its summary. Returns whether every source
/// was split.
pub async fn split_command(context: &AppContext) -> Result<bool, Error> {
    let summary = split::split_all(&context.config).await?;
    println!("{}", summary.message());

    Ok(summary.failed.is_empty())
}

/// Run one upload pass and print its summary. Returns whether the run
/// ended without a failure.
pub async fn upload_command(
    context: &AppContext,
    limit: Option<usize>,
) -> Result<bool, Error> {
    let report = upload::run_upload(&context.config, limit).await?;
    println!("{}", upload::summary(&report));

    Ok(!report.is_failure())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    pc_app::init_tracing(cli.json_logs);

    let context: AppContext =
        match pc_app::create_app_context(cli.config.as_deref()) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("failed to load configuration: {}", e);
                return ExitCode::FAILURE;
            }
        };

    let result = match cli.command.unwrap_or(Command::Menu) {
        Command::Split => split_command(&context).await,
        Command::Upload { limit } => upload_command(&context, limit).await,
        Command::Auth => {
            upload::authorize(&context.config).await.map(|()| true)
        }
        Command::Menu => Ok(menu::run(&context, tokio::io::stdin()).await),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use types::Privacy;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_upload_limit_argument() {
        let cli =
            Cli::try_parse_from(["partcast", "upload", "--limit", "3"]).unwrap();

        assert_eq!(cli.command, Some(Command::Upload { limit: Some(3) }));
    }

    #[test]
    fn test_menu_is_default() {
        let cli = Cli::try_parse_from(["partcast", "--json-logs"]).unwrap();

        assert!(cli.json_logs);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_default_split_settings_are_valid() {
        assert!(Config::default().validate_split().is_ok());

        let config = Config {
            chunk_seconds: -5.0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate_split(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "partcast.toml",
                r#"
                parts_dir = "shorts"
                chunk_seconds = 45.0

                [target]
                width = 720
                height = 1280

                [upload]
                privacy = "unlisted"
                "#,
            )?;
            jail.set_env("PARTCAST_RUN_QUOTA", "3");
            jail.set_env("PARTCAST_UPLOAD__HASHTAG", "#clips");

            let config: Config = pc_app::load_config(None)?;

            assert_eq!(config.source_dir, PathBuf::from("yt-vids"));
            assert_eq!(config.parts_dir, PathBuf::from("shorts"));
            assert_eq!(config.chunk_seconds, 45.0);
            assert_eq!(
                config.target,
                Resolution {
                    width: 720,
                    height: 1280
                }
            );
            assert_eq!(config.run_quota, 3);
            assert_eq!(config.upload.privacy, Privacy::Unlisted);
            assert_eq!(config.upload.hashtag, "#clips");
            assert_eq!(config.upload.category_id, "22");

            Ok(())
        });
    }
}
