//! Engine websocket session.
//!
//! JSON-RPC over a websocket to the Qlik engine. The session is the
//! pluggable seam consumed by app-level commands; the core never drives it
//! directly. Sessions are not shared across tasks.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::{AuthMethod, SessionConfig};
use crate::error::{SessionError, SessionResult};

/// One JSON-RPC round-trip against the engine. Implementations own the
/// connection; callers suspend at every call.
#[async_trait]
pub trait EngineTransport: Send {
    /// Invoke `method` on the object `handle` (-1 is the global scope).
    async fn call(&mut self, method: &str, handle: i64, params: Value) -> SessionResult<Value>;

    /// Close the session, reporting protocol-level failure if any.
    async fn close(&mut self) -> SessionResult<()>;
}

/// Engine session over tokio-tungstenite with the configured auth material.
/// The method surface offered to callers follows the configured schema
/// version.
pub struct WsEngineSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl WsEngineSession {
    /// Open a websocket to one app, or to the global `engineData` scope.
    pub async fn connect(config: &SessionConfig, app_id: Option<&str>) -> SessionResult<Self> {
        let url = config.engine_ws_url(app_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(SessionError::WebSocket)?;

        match &config.auth {
            AuthMethod::Bearer(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| SessionError::Config("bearer token is not a valid header value".to_string()))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            AuthMethod::Certificate { .. } => {
                let value = HeaderValue::from_str(&config.qlik_user_header())
                    .map_err(|_| SessionError::Config("invalid X-Qlik-User header".to_string()))?;
                request.headers_mut().insert("X-Qlik-User", value);
            }
        }

        let mut tls = native_tls::TlsConnector::builder();
        if let AuthMethod::Certificate {
            cert_pem,
            key_pem,
            root_pem,
        } = &config.auth
        {
            tls.identity(native_tls::Identity::from_pkcs8(cert_pem, key_pem)?);
            tls.add_root_certificate(native_tls::Certificate::from_pem(root_pem)?);
        }
        if !config.secure {
            tls.danger_accept_invalid_certs(true);
        }
        let connector = Connector::NativeTls(tls.build()?);

        let (ws, _response) =
            connect_async_tls_with_config(request, None, false, Some(connector)).await?;
        debug!(url = %url, "engine session open");

        Ok(Self { ws, next_id: 1 })
    }
}

#[async_trait]
impl EngineTransport for WsEngineSession {
    async fn call(&mut self, method: &str, handle: i64, params: Value) -> SessionResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "handle": handle,
            "params": params,
        });
        self.ws.send(Message::Text(frame.to_string())).await?;

        while let Some(message) = self.ws.next().await {
            let text = match message? {
                Message::Text(text) => text,
                // Engine pushes pings and change notifications; skip them.
                _ => continue,
            };
            let value: Value = serde_json::from_str(&text)?;
            if value.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = value.get("error") {
                return Err(SessionError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown engine error")
                        .to_string(),
                });
            }
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }

        Err(SessionError::EngineClosed)
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
