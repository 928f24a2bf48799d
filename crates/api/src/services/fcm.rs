//! Firebase Cloud Messaging (FCM) notification service.
//!
//! Delivers location requests to student devices as data-only messages
//! through the FCM HTTP v1 API.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use domain::services::{LocationRequestPayload, NotificationResult, NotificationService};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::FcmConfig;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// FCM notification service using the HTTP v1 API.
pub struct FcmNotificationService {
    client: Client,
    config: FcmConfig,
    credentials: ServiceAccountCredentials,
    token_cache: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Google service account credentials (subset of the JSON key file).
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    token_uri: String,
}

/// JWT claims for the service account token exchange.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct FcmMessage {
    message: MessagePayload,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    token: String,
    data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android: Option<AndroidConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    apns: Option<ApnsConfig>,
}

#[derive(Debug, Serialize)]
struct AndroidConfig {
    priority: &'static str,
}

#[derive(Debug, Serialize)]
struct ApnsConfig {
    headers: ApnsHeaders,
}

#[derive(Debug, Serialize)]
struct ApnsHeaders {
    #[serde(rename = "apns-priority")]
    priority: &'static str,
    #[serde(rename = "apns-push-type")]
    push_type: &'static str,
}

/// Error type for FCM operations.
#[derive(Debug, thiserror::Error)]
pub enum FcmError {
    #[error("Failed to parse credentials: {0}")]
    Credentials(String),

    #[error("Failed to create JWT: {0}")]
    Jwt(String),

    #[error("Failed to get access token: {0}")]
    Token(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FCM API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Push token is no longer valid")]
    InvalidToken,

    #[error("FCM is not enabled")]
    NotEnabled,
}

impl FcmNotificationService {
    /// Builds the service from configuration.
    ///
    /// Fails when FCM is disabled or the credentials cannot be read.
    pub fn new(config: FcmConfig) -> Result<Self, FcmError> {
        if !config.enabled {
            return Err(FcmError::NotEnabled);
        }

        let credentials = Self::load_credentials(&config.credentials)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            config,
            credentials,
            token_cache: RwLock::new(None),
        })
    }

    /// Accepts inline JSON or a path to the key file.
    fn load_credentials(source: &str) -> Result<ServiceAccountCredentials, FcmError> {
        let content = if source.trim_start().starts_with('{') {
            source.to_string()
        } else {
            std::fs::read_to_string(source).map_err(|e| {
                FcmError::Credentials(format!("Failed to read credentials file: {}", e))
            })?
        };
        serde_json::from_str(&content)
            .map_err(|e| FcmError::Credentials(format!("Invalid credentials JSON: {}", e)))
    }

    async fn access_token(&self) -> Result<String, FcmError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.as_ref() {
                if token.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let (access_token, expires_at) = self.fetch_access_token().await?;
        *self.token_cache.write().await = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at,
        });
        Ok(access_token)
    }

    async fn fetch_access_token(&self) -> Result<(String, Instant), FcmError> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| FcmError::Jwt(format!("Invalid private key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| FcmError::Jwt(e.to_string()))?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FcmError::Token(body));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        Ok((token.access_token, expires_at))
    }

    fn build_message(&self, push_token: &str, payload: &LocationRequestPayload) -> FcmMessage {
        let high_priority = self.config.high_priority;
        FcmMessage {
            message: MessagePayload {
                token: push_token.to_string(),
                data: payload.to_data_map(),
                android: high_priority.then_some(AndroidConfig { priority: "high" }),
                apns: high_priority.then_some(ApnsConfig {
                    headers: ApnsHeaders {
                        priority: "10",
                        push_type: "background",
                    },
                }),
            },
        }
    }

    async fn send_message(&self, message: &FcmMessage) -> Result<(), FcmError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.config.project_id
        );

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // 100ms, 200ms, 400ms, ...
                tokio::time::sleep(Duration::from_millis(100 * (1 << (attempt - 1)))).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&access_token)
                .json(message)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(FcmError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                tracing::debug!(attempt, "FCM message accepted");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            if is_invalid_token(status, &body) {
                return Err(FcmError::InvalidToken);
            }
            let error = FcmError::Api {
                status: status.as_u16(),
                body,
            };
            if !status.is_server_error() {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(FcmError::Api {
            status: 0,
            body: "no attempt made".to_string(),
        }))
    }
}

/// FCM reports a dead registration as 404 UNREGISTERED or 400 INVALID_ARGUMENT.
fn is_invalid_token(status: StatusCode, body: &str) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST)
        && (body.contains("UNREGISTERED") || body.contains("INVALID_ARGUMENT"))
}

#[async_trait::async_trait]
impl NotificationService for FcmNotificationService {
    async fn send_location_request(
        &self,
        push_token: &str,
        payload: LocationRequestPayload,
    ) -> NotificationResult {
        let message = self.build_message(push_token, &payload);

        match self.send_message(&message).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %payload.user_id,
                    subject_id = %payload.subject_id,
                    correlation_id = %payload.correlation_id,
                    "Location request sent"
                );
                NotificationResult::Sent
            }
            Err(FcmError::InvalidToken) => {
                tracing::warn!(
                    user_id = %payload.user_id,
                    correlation_id = %payload.correlation_id,
                    "Push token rejected by FCM; device must re-register"
                );
                NotificationResult::NoToken
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = %payload.user_id,
                    correlation_id = %payload.correlation_id,
                    "Failed to send location request"
                );
                NotificationResult::Failed(e.to_string())
            }
        }
    }
}
