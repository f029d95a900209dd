pub mod listener;

use axum::http::Uri;

use crate::error::{AppError, Result};

pub use listener::{CallbackListener, ListenOutcome};

/// Port the listener binds when the callback URL does not name one.
pub const DEFAULT_CALLBACK_PORT: u16 = 9999;

/// Where DiveCloud should POST the run result, derived from the callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl CallbackEndpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let uri: Uri = raw
            .parse()
            .map_err(|e| AppError::MalformedEndpoint(format!("{raw}: {e}")))?;

        let scheme = uri
            .scheme_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| AppError::MalformedEndpoint(format!("{raw}: missing scheme")))?;
        if scheme != "http" && scheme != "https" {
            return Err(AppError::MalformedEndpoint(format!(
                "{raw}: unsupported scheme '{scheme}'"
            )));
        }

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::MalformedEndpoint(format!("{raw}: missing host")))?
            .to_string();

        Ok(Self {
            scheme,
            host,
            port: uri.port_u16().unwrap_or(DEFAULT_CALLBACK_PORT),
            path: uri.path().to_string(),
        })
    }

    /// The URL registered with the webhook service, always with an explicit port.
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port_is_preserved() {
        let endpoint = CallbackEndpoint::parse("http://ci.example.com:8080/callback").unwrap();
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.url(), "http://ci.example.com:8080/callback");
    }

    #[test]
    fn test_scheme_default_port_still_counts_as_explicit() {
        let endpoint = CallbackEndpoint::parse("http://ci.example.com:80/callback").unwrap();
        assert_eq!(endpoint.port, 80);
    }

    #[test]
    fn test_missing_port_defaults_to_9999() {
        let endpoint = CallbackEndpoint::parse("https://ci.example.com/hooks/divecloud").unwrap();
        assert_eq!(endpoint.port, DEFAULT_CALLBACK_PORT);
        assert_eq!(endpoint.url(), "https://ci.example.com:9999/hooks/divecloud");
    }

    #[test]
    fn test_query_is_dropped() {
        let endpoint = CallbackEndpoint::parse("http://10.0.0.5:7000/cb?token=x").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.url(), "http://10.0.0.5:7000/cb");
    }

    #[test]
    fn test_invalid_urls_are_rejected() {
        for raw in ["", "not a url", "ci.example.com:8080", "ftp://ci.example.com/x", "/only/a/path"] {
            assert!(CallbackEndpoint::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }
}
