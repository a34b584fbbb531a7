//! Credential exchange against `POST /api/login`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use podium_client_core::auth::AuthSession;

use crate::{StreamClientConfig, error_detail};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Error)]
pub enum LoginError {
    /// The request never produced a response.
    #[error("login request failed: {message}")]
    Request { message: String },
    /// The backend refused the credentials; `detail` is its own message.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("login response could not be decoded: {message}")]
    Decode { message: String },
}

/// Exchanges credentials for a bearer token. The caller is expected to
/// have normalized the email already.
pub async fn login(
    http: &reqwest::Client,
    config: &StreamClientConfig,
    email: &str,
    password: &str,
) -> Result<AuthSession, LoginError> {
    let request = LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };
    let response = http
        .post(config.login_url())
        .json(&request)
        .send()
        .await
        .map_err(|error| LoginError::Request {
            message: error.to_string(),
        })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|error| LoginError::Request {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        let detail =
            error_detail(&body).unwrap_or_else(|| format!("login failed with status {status}"));
        return Err(LoginError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }

    let decoded: LoginResponse =
        serde_json::from_slice(&body).map_err(|error| LoginError::Decode {
            message: error.to_string(),
        })?;

    Ok(AuthSession {
        access_token: decoded.access_token,
        token_type: decoded.token_type,
        email: email.to_string(),
        logged_in_at: Some(Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_serializes_credentials_verbatim() {
        let request = LoginRequest {
            email: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"email": "user@example.com", "password": "hunter2"})
        );
    }

    #[test]
    fn login_response_decodes_token_fields() {
        let decoded: LoginResponse = serde_json::from_str(
            r#"{"access_token": "abc123", "token_type": "bearer"}"#,
        )
        .expect("decode");
        assert_eq!(decoded.access_token, "abc123");
        assert_eq!(decoded.token_type, "bearer");
    }

    #[test]
    fn rejected_errors_surface_the_backend_detail_verbatim() {
        let error = LoginError::Rejected {
            status: 401,
            detail: "Incorrect email or password".to_string(),
        };
        assert_eq!(error.to_string(), "Incorrect email or password");
    }
}
