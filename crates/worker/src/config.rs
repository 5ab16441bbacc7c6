use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scail_comfyui::api::DEFAULT_REQUEST_TIMEOUT;
use scail_comfyui::client::{ws_url_from_api_url, ComfyUIClientError};
use scail_storage::{R2Config, StorageError};

/// Worker configuration loaded from environment variables.
///
/// Built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// ComfyUI HTTP base URL.
    pub comfyui_url: String,
    /// ComfyUI WebSocket base URL.
    pub comfyui_ws_url: String,
    /// Client ID this worker registers with ComfyUI.
    pub client_id: String,
    /// Directory ComfyUI loads input media from.
    pub input_dir: PathBuf,
    /// Upper bound on waiting for one execution to complete.
    pub execution_timeout: Duration,
    /// Upper bound on each ComfyUI REST request, output downloads included.
    pub request_timeout: Duration,
    /// History reads per completion event.
    pub history_poll_attempts: u32,
    pub r2: R2Config,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default                          |
    /// |--------------------------|----------------------------------|
    /// | `HOST`                   | `0.0.0.0`                        |
    /// | `PORT`                   | `8000`                           |
    /// | `COMFYUI_URL`            | `http://127.0.0.1:8188`          |
    /// | `COMFYUI_WS_URL`         | derived from `COMFYUI_URL`       |
    /// | `COMFYUI_CLIENT_ID`      | fresh UUID v4                    |
    /// | `COMFYUI_INPUT_DIR`      | `/root/comfy/ComfyUI/input`      |
    /// | `EXECUTION_TIMEOUT_SECS` | `1800`                           |
    /// | `COMFYUI_REQUEST_TIMEOUT_SECS` | `120`                      |
    /// | `HISTORY_POLL_ATTEMPTS`  | `5`                              |
    /// | `R2_*`                   | see [`R2Config::from_lookup`]    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_var(&var, "PORT", 8000, "a valid port")?;

        let comfyui_url = var("COMFYUI_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8188".into())
            .trim_end_matches('/')
            .to_string();
        let comfyui_ws_url = match var("COMFYUI_WS_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => ws_url_from_api_url(&comfyui_url)?,
        };
        let client_id = var("COMFYUI_CLIENT_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let input_dir = PathBuf::from(
            var("COMFYUI_INPUT_DIR").unwrap_or_else(|| "/root/comfy/ComfyUI/input".into()),
        );

        let timeout_secs = positive_secs(&var, "EXECUTION_TIMEOUT_SECS", 1800)?;
        let request_timeout_secs = positive_secs(
            &var,
            "COMFYUI_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;

        let history_poll_attempts: u32 =
            parse_var(&var, "HISTORY_POLL_ATTEMPTS", 5, "a non-negative integer")?;

        let r2 = R2Config::from_lookup(&lookup)?;

        Ok(Self {
            host,
            port,
            comfyui_url,
            comfyui_ws_url,
            client_id,
            input_dir,
            execution_timeout: Duration::from_secs(timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            history_poll_attempts,
            r2,
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            expected,
        }),
    }
}

/// A whole number of seconds; zero is rejected.
fn positive_secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_var(var, name, default, "a positive integer")? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".into(),
            expected: "a positive integer",
        }),
        secs => Ok(secs),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ComfyUI(#[from] ComfyUIClientError),
}
