//! Authenticated DIGIT client

use base64::Engine;
use serde_json::Value;
use thiserror::Error;

use crate::upload::envelope;
use crate::upload::transport::{HttpResponse, Transport, TransportError};

/// OAuth client id the gateway expects for employee logins
const OAUTH_CLIENT: &str = "egov-user-client:";

pub const LOGIN_PATH: &str = "/user/oauth/token";

/// Errors that stop an operation as a whole
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not authenticated. Log in before uploading")]
    NotAuthenticated,

    #[error("Login failed (HTTP {status}): {message}")]
    LoginFailed { status: u16, message: String },

    #[error("Unexpected response from {path}: {message}")]
    UnexpectedResponse { path: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Login parameters
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant_id: String,
    pub user_type: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str, tenant_id: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            tenant_id: tenant_id.to_string(),
            user_type: "EMPLOYEE".to_string(),
        }
    }
}

/// Token and user block returned by a login
#[derive(Debug, Clone)]
pub struct Session {
    pub auth_token: String,
    pub user_info: Value,
}

/// Holds the transport, gateway URL and, once logged in, the session
pub struct DigitClient<T: Transport> {
    transport: T,
    base_url: String,
    session: Option<Session>,
}

impl<T: Transport> DigitClient<T> {
    pub fn new(transport: T, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Use an existing session instead of logging in
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or(ClientError::NotAuthenticated)
    }

    /// Password grant against the user service
    pub fn login(&mut self, creds: &Credentials) -> Result<&Session, ClientError> {
        let basic = base64::engine::general_purpose::STANDARD.encode(OAUTH_CLIENT);
        let auth_header = format!("Basic {}", basic);
        let form = [
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
            ("userType", creds.user_type.as_str()),
            ("tenantId", creds.tenant_id.as_str()),
            ("scope", "read"),
            ("grant_type", "password"),
        ];

        let resp = self.transport.post_form(
            &self.url(LOGIN_PATH),
            &[("Authorization", auth_header.as_str())],
            &form,
        )?;
        if !resp.is_success() {
            return Err(ClientError::LoginFailed {
                status: resp.status,
                message: resp.body.chars().take(200).collect(),
            });
        }

        let body = resp.json().ok_or_else(|| ClientError::UnexpectedResponse {
            path: LOGIN_PATH.to_string(),
            message: "response is not JSON".to_string(),
        })?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::UnexpectedResponse {
                path: LOGIN_PATH.to_string(),
                message: "missing access_token".to_string(),
            })?;
        let user_info = body
            .get("UserRequest")
            .filter(|u| u.is_object())
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedResponse {
                path: LOGIN_PATH.to_string(),
                message: "missing UserRequest".to_string(),
            })?;

        tracing::info!(user = %creds.username, tenant = %creds.tenant_id, "logged in");
        Ok(self.session.insert(Session {
            auth_token: token.to_string(),
            user_info,
        }))
    }

    /// `RequestInfo` block for the current session
    pub fn request_info(&self) -> Result<Value, ClientError> {
        let session = self.session()?;
        Ok(envelope::request_info(&session.auth_token, &session.user_info))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST JSON to a gateway path
    pub fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        self.transport.post_json(&self.url(path), query, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::transport::fake::ScriptedTransport;

    #[test]
    fn test_request_info_requires_login() {
        let client = DigitClient::new(ScriptedTransport::new(), "http://digit.test/");
        assert!(matches!(client.request_info(), Err(ClientError::NotAuthenticated)));
        assert_eq!(client.url("/x"), "http://digit.test/x");
    }

    #[test]
    fn test_login_stores_session() {
        let transport = ScriptedTransport::new();
        transport.reply(
            200,
            r#"{"access_token":"abc","UserRequest":{"userName":"ADMIN","tenantId":"pg"}}"#,
        );
        let mut client = DigitClient::new(transport, "http://digit.test");
        client
            .login(&Credentials::new("ADMIN", "secret", "pg"))
            .unwrap();

        let info = client.request_info().unwrap();
        assert_eq!(info["authToken"], "abc");
        assert_eq!(info["userInfo"]["userName"], "ADMIN");

        let sent = client.transport().sent.borrow();
        assert_eq!(sent[0].url, "http://digit.test/user/oauth/token");
        assert_eq!(sent[0].body["grant_type"], "password");
        assert_eq!(sent[0].body["userType"], "EMPLOYEE");
    }

    #[test]
    fn test_login_failure() {
        let transport = ScriptedTransport::new();
        transport.reply(401, "bad credentials");
        let mut client = DigitClient::new(transport, "http://digit.test");
        let err = client
            .login(&Credentials::new("ADMIN", "wrong", "pg"))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::LoginFailed { status: 401, .. }));
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_login_without_user_request_fails() {
        let transport = ScriptedTransport::new();
        transport.reply(200, r#"{"access_token":"abc"}"#);
        let mut client = DigitClient::new(transport, "http://digit.test");
        let err = client
            .login(&Credentials::new("ADMIN", "secret", "pg"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ClientError::UnexpectedResponse { ref message, .. } if message.contains("UserRequest")
        ));
        assert!(!client.is_authenticated());
    }
}
