//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the event-stream address and the client ID
//! this worker registers with. Call [`ComfyUIClient::connect`] to open a
//! live [`ComfyUIConnection`]; each job opens its own.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The raw WebSocket stream type used for ComfyUI connections.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound on the WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration handle for a ComfyUI event stream.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
    client_id: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url`    - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `client_id` - ID ComfyUI uses to address events to this worker.
    ///   Submissions must carry the same ID.
    pub fn new(ws_url: String, client_id: String) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            client_id,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Connect to the ComfyUI WebSocket endpoint (`/ws?clientId=...`).
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, self.client_id);

        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ComfyUIClientError::Connection(format!(
                    "Timed out connecting to ComfyUI at {} after {CONNECT_TIMEOUT:?}",
                    self.ws_url
                ))
            })?
            .map_err(|e| {
                ComfyUIClientError::Connection(format!(
                    "Failed to connect to ComfyUI at {}: {e}",
                    self.ws_url
                ))
            })?;

        tracing::debug!(
            client_id = %self.client_id,
            "Connected to ComfyUI event stream at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

/// Derive the event-stream base URL from the HTTP API URL.
///
/// Keeps only scheme, credentials, host and port: `http` maps to `ws`,
/// `https` to `wss`.
pub fn ws_url_from_api_url(api_url: &str) -> Result<String, ComfyUIClientError> {
    let mut url = reqwest::Url::parse(api_url)
        .map_err(|e| ComfyUIClientError::InvalidUrl(format!("{api_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ComfyUIClientError::InvalidUrl(format!(
                "{api_url}: unsupported scheme '{other}'"
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|()| ComfyUIClientError::InvalidUrl(api_url.to_string()))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The configured engine URL cannot be turned into a WebSocket URL.
    #[error("Invalid ComfyUI URL: {0}")]
    InvalidUrl(String),
}
