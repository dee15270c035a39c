//! HTTP transport seam
//!
//! The uploader only needs "POST this and tell me the status and body".
//! [`UreqTransport`] does that over the network; tests script responses.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Status and body of a completed HTTP exchange (any status code)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// A request that never produced a status code
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },
}

/// Outbound HTTP
pub trait Transport {
    /// POST a JSON body with optional query parameters
    fn post_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpResponse, TransportError>;

    /// POST a form-encoded body with extra headers
    fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport; each call has one deadline covering connect, send and read
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("dataloader/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn finish(
        url: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<HttpResponse, TransportError> {
        match result {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.into_string().map_err(|e| Self::read_error(url, e))?;
                Ok(HttpResponse::new(status, body))
            }
            // Non-2xx still carries a body worth classifying
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Ok(HttpResponse::new(code, body))
            }
            Err(ureq::Error::Transport(transport)) => {
                let message = transport.to_string();
                if message.to_ascii_lowercase().contains("timed out") {
                    Err(TransportError::Timeout {
                        url: url.to_string(),
                    })
                } else {
                    Err(TransportError::Network {
                        url: url.to_string(),
                        message,
                    })
                }
            }
        }
    }
}

impl UreqTransport {
    fn read_error(url: &str, e: std::io::Error) -> TransportError {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout {
                url: url.to_string(),
            },
            _ => TransportError::Network {
                url: url.to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl Transport for UreqTransport {
    fn post_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, "POST json");
        let mut req = self.agent.post(url).set("Content-Type", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        Self::finish(url, req.send_json(body))
    }

    fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, "POST form");
        let mut req = self.agent.post(url);
        for (k, v) in headers {
            req = req.set(k, v);
        }
        Self::finish(url, req.send_form(form))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(202, "").is_success());
        assert!(!HttpResponse::new(400, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[test]
    fn test_http_response_json() {
        assert_eq!(
            HttpResponse::new(200, r#"{"a":1}"#).json(),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(HttpResponse::new(200, "<html>").json(), None);
    }

    #[test]
    fn test_slow_server_hits_overall_deadline() {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::time::Instant;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/slow", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            // Each byte arrives well inside a per-read timeout
            for byte in b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}" {
                if stream.write_all(&[*byte]).is_err() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        });

        let transport = UreqTransport::new(Duration::from_millis(500));
        let started = Instant::now();
        let result = transport.post_json(&url, &[], &serde_json::json!({}));

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
