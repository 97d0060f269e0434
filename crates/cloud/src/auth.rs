//! Session-based authentication against the backend's auth endpoints.
//!
//! The session lives in memory. Every change of signed-in user is broadcast
//! on a watch channel so deed tables can reconnect under the new identity.

use std::sync::RwLock;
use std::time::Duration;

use deedbook_core::deeds::AuthProviderTrait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::watch;

use crate::client::{parse_response, DEFAULT_TIMEOUT_SECS};
use crate::error::{CloudError, Result};
use crate::types::{AuthUser, PasswordGrantRequest, Session};

/// Auth client holding the current session.
#[derive(Debug)]
pub struct SessionAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    user_tx: watch::Sender<Option<String>>,
}

impl SessionAuth {
    /// Create a signed-out auth client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The project URL (e.g., "https://xyz.example.co")
    /// * `anon_key` - The project's public API key
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        let (user_tx, _) = watch::channel(None);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session: RwLock::new(None),
            user_tx,
        })
    }

    fn headers(&self, bearer: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| CloudError::auth("Invalid API key format"))?;
        headers.insert("apikey", api_key);

        if let Some(token) = bearer {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| CloudError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    /// Sign in with email and password.
    ///
    /// POST /auth/v1/token?grant_type=password
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        if email.trim().is_empty() {
            return Err(CloudError::invalid_request("Email is required"));
        }
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        debug!("Signing in as {}", email);

        let response = self
            .client
            .post(&url)
            .headers(self.headers(None)?)
            .json(&PasswordGrantRequest { email, password })
            .send()
            .await?;

        let session: Session = parse_response(response).await?;
        info!("Signed in as user {}", session.user.id);
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Adopt an access token issued elsewhere, validating it first.
    ///
    /// GET /auth/v1/user
    pub async fn restore_session(&self, access_token: &str) -> Result<Session> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(Some(access_token))?)
            .send()
            .await?;

        let user: AuthUser = parse_response(response).await?;
        info!("Restored session for user {}", user.id);
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            user,
        };
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Sign out. The local session is cleared even if the request fails.
    ///
    /// POST /auth/v1/logout
    pub async fn sign_out(&self) -> Result<()> {
        let Some(token) = self.access_token() else {
            return Ok(());
        };
        let url = format!("{}/auth/v1/logout", self.base_url);
        let result = self
            .client
            .post(&url)
            .headers(self.headers(Some(&token))?)
            .send()
            .await;
        self.set_session(None);

        let response = result?;
        if !response.status().is_success() {
            warn!("Sign-out returned {}", response.status());
        }
        Ok(())
    }

    /// Bearer token for data requests, if signed in.
    pub fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    fn set_session(&self, session: Option<Session>) {
        let user_id = session.as_ref().map(|s| s.user.id.clone());
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
        self.user_tx.send_if_modified(|current| {
            if *current == user_id {
                return false;
            }
            *current = user_id;
            true
        });
    }
}

impl AuthProviderTrait for SessionAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user_tx.borrow().clone()
    }

    fn watch_user_id(&self) -> watch::Receiver<Option<String>> {
        self.user_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str) -> Session {
        Session {
            access_token: format!("token-{}", user),
            refresh_token: None,
            user: AuthUser {
                id: user.to_string(),
                email: None,
            },
        }
    }

    #[test]
    fn test_new_client_is_signed_out() {
        let auth = SessionAuth::new("https://example.test/", "anon").unwrap();
        assert_eq!(auth.current_user_id(), None);
        assert_eq!(auth.access_token(), None);
        assert_eq!(auth.base_url, "https://example.test");
    }

    #[test]
    fn test_identity_changes_are_broadcast_once() {
        let auth = SessionAuth::new("https://example.test", "anon").unwrap();
        let mut rx = auth.watch_user_id();

        auth.set_session(Some(session("u1")));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("u1"));
        assert_eq!(auth.access_token().as_deref(), Some("token-u1"));

        // refreshing the token for the same user is not an identity change
        auth.set_session(Some(session("u1")));
        assert!(!rx.has_changed().unwrap());

        auth.set_session(None);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[test]
    fn test_session_deserializes_token_response() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r1",
            "user": { "id": "u1", "email": "a@b.c", "aud": "authenticated" }
        }"#;
        let session: Session = serde_json::from_str(body).unwrap();
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_sign_in_requires_email() {
        let auth = SessionAuth::new("https://example.test", "anon").unwrap();
        assert!(matches!(
            auth.sign_in_with_password(" ", "secret").await,
            Err(CloudError::InvalidRequest(_))
        ));
    }
}
