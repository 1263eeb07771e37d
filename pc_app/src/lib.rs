use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Prefix of the environment variables read into the configuration.
/// Nested keys are separated with `__`, e.g. `PARTCAST_UPLOAD__PRIVACY`.
pub const ENV_PREFIX: &str = "PARTCAST_";

/// Configuration file looked up in the working directory when no explicit
/// path is given.
pub const DEFAULT_CONFIG_FILE: &str = "partcast.toml";

pub trait ContextProvider<Config> {
    fn new(config: Config) -> Self;
}

/// Install the global tracing subscriber.
///
/// The log level defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        // remove the name of the module from every log entry
        .with_target(false);

    if json {
        builder.json().with_current_span(false).init();
    } else {
        builder.init();
    }
}

/// Load the configuration.
///
/// Values are layered: the defaults of `Config`, then the TOML file, then
/// `PARTCAST_*` environment variables.
///
/// # Arguments
/// `config_file` - Explicit configuration file. It must exist. When `None`,
/// `partcast.toml` is used if present.
///
/// # Errors
/// If the explicit file is missing or a value cannot be deserialized.
pub fn load_config<Config>(
    config_file: Option<&Path>,
) -> Result<Config, figment::Error>
where
    Config: Default + Serialize + for<'de> Deserialize<'de>,
{
    let file = match config_file {
        Some(path) if !path.is_file() => {
            return Err(figment::Error::from(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        Some(path) => path,
        None => Path::new(DEFAULT_CONFIG_FILE),
    };

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
}

/// Initialize the application context from the layered configuration.
///
/// # Errors
/// If the configuration cannot be loaded, see [`load_config`].
pub fn create_app_context<A, Config>(
    config_file: Option<&Path>,
) -> Result<A, figment::Error>
where
    A: ContextProvider<Config>,
    Config: Default + Serialize + for<'de> Deserialize<'de>,
{
    let config: Config = load_config(config_file)?;

    tracing::debug!("configuration loaded");

    Ok(A::new(config))
}
