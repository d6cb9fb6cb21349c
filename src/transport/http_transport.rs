use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::BridgeError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    timeout: Duration,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, BridgeError> {
    let mut builder = reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| BridgeError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))
}

fn build_static_headers(upstream: &UpstreamConfig) -> Result<HeaderMap, BridgeError> {
    let mut headers = HeaderMap::with_capacity(upstream.headers.len() + 2);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    for (name, value) in &upstream.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BridgeError::Config(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BridgeError::Config(format!("Invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Vendor response as the transformer needs it.
pub struct UpstreamResponse {
    pub status: u16,
    /// Raw `content-type` header, empty when absent.
    pub content_type: String,
    pub body: BoxStream<'static, Result<Bytes, BridgeError>>,
}

/// Pooled HTTP client bound to the vendor chat endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Build the client from server timeouts and the upstream section.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for an unusable URL or header and
    /// [`BridgeError::Transport`] when the client cannot be built.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, BridgeError> {
        let chat_url = url::Url::parse(&upstream.chat_url)
            .map_err(|e| BridgeError::Config(format!("Invalid upstream chat_url: {e}")))?;
        let client = build_reqwest_client(
            Duration::from_secs(server.timeout),
            upstream.proxy.as_deref(),
        )?;
        Ok(Self {
            client,
            chat_url,
            headers: build_static_headers(upstream)?,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    /// POST a chat request and hand back the streaming response.
    ///
    /// Any HTTP status is returned as a response; deciding what a non-SSE
    /// body means is left to the transformer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the request cannot be sent.
    pub async fn send_chat(&self, body: &serde_json::Value) -> Result<UpstreamResponse, BridgeError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| BridgeError::Internal(format!("Failed to encode vendor body: {e}")))?;
        let response = self
            .client
            .post(self.chat_url.clone())
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            tracing::warn!(status, url = %self.chat_url, "vendor returned non-success status");
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BridgeError::Transport(e.to_string())))
            .boxed();

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
