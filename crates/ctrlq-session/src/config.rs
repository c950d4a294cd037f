//! Connection configuration for a QSEoW cluster.

use std::path::Path;

use crate::error::{SessionError, SessionResult};

/// Default engine (websocket) port for certificate auth.
pub const DEFAULT_ENGINE_PORT: u16 = 4747;

/// Default repository (QRS) port for certificate auth.
pub const DEFAULT_QRS_PORT: u16 = 4242;

/// Default engine API schema version.
pub const DEFAULT_SCHEMA_VERSION: &str = "12.612.0";

/// Credential material for a QSEoW session.
#[derive(Clone)]
pub enum AuthMethod {
    /// Mutual TLS with a client certificate triple (cert, key, root), all PEM.
    Certificate {
        cert_pem: Vec<u8>,
        key_pem: Vec<u8>,
        root_pem: Vec<u8>,
    },
    /// JWT passed as `Authorization: Bearer …`, no mutual TLS.
    Bearer(String),
}

impl AuthMethod {
    /// Load a certificate triple from disk. Unreadable files fail before any
    /// network I/O.
    pub fn from_cert_files(cert: &Path, key: &Path, root: &Path) -> SessionResult<Self> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| SessionError::CredentialFile {
                path: path.display().to_string(),
                source,
            })
        };
        Ok(Self::Certificate {
            cert_pem: read(cert)?,
            key_pem: read(key)?,
            root_pem: read(root)?,
        })
    }

    pub fn is_certificate(&self) -> bool {
        matches!(self, Self::Certificate { .. })
    }
}

impl std::fmt::Debug for AuthMethod {
    // Credential material stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Certificate { .. } => write!(f, "AuthMethod::Certificate"),
            Self::Bearer(_) => write!(f, "AuthMethod::Bearer"),
        }
    }
}

/// Connection parameters for one QSEoW cluster.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub engine_port: u16,
    pub qrs_port: u16,
    /// Virtual-proxy prefix, without slashes. Empty for the default proxy.
    pub virtual_proxy: String,
    /// When false, server certificate verification is disabled.
    pub secure: bool,
    /// Engine API schema version negotiated on websocket connect.
    pub schema_version: String,
    pub auth: AuthMethod,
    /// Identity asserted via the `X-Qlik-User` header for certificate auth.
    pub user_directory: String,
    pub user_id: String,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            engine_port: DEFAULT_ENGINE_PORT,
            qrs_port: DEFAULT_QRS_PORT,
            virtual_proxy: String::new(),
            secure: true,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            auth,
            user_directory: "INTERNAL".to_string(),
            user_id: "sa_repository".to_string(),
        }
    }

    /// Base URL of the Repository service, virtual proxy included.
    pub fn qrs_base_url(&self) -> String {
        match self.virtual_proxy.as_str() {
            "" => format!("https://{}:{}/qrs", self.host, self.qrs_port),
            proxy => format!("https://{}:{}/{}/qrs", self.host, self.qrs_port, proxy),
        }
    }

    /// Websocket URL for an engine session against one app, or the global
    /// `engineData` pseudo-app when no app is given.
    pub fn engine_ws_url(&self, app_id: Option<&str>) -> String {
        let app = app_id.unwrap_or("engineData");
        match self.virtual_proxy.as_str() {
            "" => format!("wss://{}:{}/app/{}", self.host, self.engine_port, app),
            proxy => format!(
                "wss://{}:{}/{}/app/{}",
                self.host, self.engine_port, proxy, app
            ),
        }
    }

    /// Value of the `X-Qlik-User` header.
    pub fn qlik_user_header(&self) -> String {
        format!(
            "UserDirectory={}; UserId={}",
            self.user_directory, self.user_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::new("sense.example.com", AuthMethod::Bearer("tok".to_string()))
    }

    #[test]
    fn test_default_ports() {
        let cfg = config();
        assert_eq!(cfg.engine_port, 4747);
        assert_eq!(cfg.qrs_port, 4242);
        assert!(cfg.secure);
    }

    #[test]
    fn test_qrs_base_url_with_and_without_proxy() {
        let mut cfg = config();
        assert_eq!(cfg.qrs_base_url(), "https://sense.example.com:4242/qrs");
        cfg.virtual_proxy = "hdr".to_string();
        assert_eq!(cfg.qrs_base_url(), "https://sense.example.com:4242/hdr/qrs");
    }

    #[test]
    fn test_engine_ws_url() {
        let cfg = config();
        assert_eq!(
            cfg.engine_ws_url(None),
            "wss://sense.example.com:4747/app/engineData"
        );
        assert_eq!(
            cfg.engine_ws_url(Some("abc")),
            "wss://sense.example.com:4747/app/abc"
        );
    }

    #[test]
    fn test_missing_cert_file_fails_fast() {
        let err = AuthMethod::from_cert_files(
            Path::new("/nonexistent/client.pem"),
            Path::new("/nonexistent/client_key.pem"),
            Path::new("/nonexistent/root.pem"),
        );
        assert!(matches!(err, Err(SessionError::CredentialFile { .. })));
    }
}
