use crate::config::RelayConfig;
use crate::types::constants::{BETA_HEADER_NAME, BETA_HEADER_VALUE};
use crate::types::{RelayError, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Connector for the outbound leg of a session.
///
/// One connection is opened per session, authenticated with the session's
/// ephemeral credential as a bearer token. The configured model rides on
/// the endpoint URL as a query parameter.
pub struct UpstreamConnector;

impl UpstreamConnector {
    pub async fn connect(
        config: &RelayConfig,
        token: &str,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let url = Self::endpoint_url(config)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::UpstreamRejected(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RelayError::UpstreamRejected("credential is not a valid header value".to_string()))?;
        let headers = request.headers_mut();
        headers.insert(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION, bearer);
        headers.insert(
            HeaderName::from_static(BETA_HEADER_NAME),
            HeaderValue::from_static(BETA_HEADER_VALUE),
        );

        tracing::debug!("Opening upstream connection to {}", url);
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| RelayError::UpstreamRejected(e.to_string()))?;

        Ok(stream)
    }

    /// Builds the upstream endpoint URL with the model query parameter.
    pub fn endpoint_url(config: &RelayConfig) -> Result<Url> {
        let mut url = Url::parse(&config.upstream_url)?;
        url.query_pairs_mut().append_pair("model", &config.model);
        Ok(url)
    }
}
