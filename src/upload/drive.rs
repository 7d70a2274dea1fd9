use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{UploadReceipt, Uploader};
use crate::config::DriveConfig;
use crate::error::UploadError;

const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MAX_RETRIES: u32 = 3;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: i64,
}

fn default_expiry() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    id: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct DriveUploader {
    client: Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    folder_id: String,
    token: Mutex<Option<CachedToken>>,
}

impl DriveUploader {
    pub fn from_config(config: &DriveConfig) -> Result<Self, UploadError> {
        let path = config.service_account_file.display().to_string();
        let raw = std::fs::read_to_string(&config.service_account_file)
            .map_err(|source| UploadError::Read { path: path.clone(), source })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| UploadError::Credentials(format!("{}: {}", path, e)))?;
        Self::new(key, config.folder_id.clone())
    }

    pub fn new(key: ServiceAccountKey, folder_id: String) -> Result<Self, UploadError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| UploadError::Credentials(format!("private_key: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            key,
            signing_key,
            folder_id,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, UploadError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + ChronoDuration::hours(1)).timestamp(),
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::Credentials(format!("token response: {}", e)))?;
        // Refresh a minute early.
        let expires_at = now + ChronoDuration::seconds((token.expires_in - 60).max(0));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl Uploader for DriveUploader {
    async fn upload(
        &self,
        local_path: &Path,
        destination_name: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let data = tokio::fs::read(local_path).await.map_err(|source| UploadError::Read {
            path: local_path.display().to_string(),
            source,
        })?;
        let content_type = mime_guess::from_path(local_path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        let metadata = json!({
            "name": destination_name,
            "parents": [self.folder_id],
        });

        let mut retry_count = 0;
        let mut backoff = 2u64;

        loop {
            let token = self.access_token().await?;
            let boundary = format!("certgen-{}", Uuid::new_v4().simple());
            let body = multipart_related(&boundary, &metadata, content_type, &data);

            let response = self
                .client
                .post(UPLOAD_URL)
                .query(&[
                    ("uploadType", "multipart"),
                    ("fields", "id"),
                    ("supportsAllDrives", "true"),
                ])
                .bearer_auth(&token)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    format!("multipart/related; boundary={}", boundary),
                )
                .body(body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                let file: FileResponse =
                    serde_json::from_str(&text).map_err(|e| UploadError::Status {
                        status: status.as_u16(),
                        body: format!("unparseable upload response ({}): {}", e, text),
                    })?;
                info!("Uploaded file to Google Drive: {}", file.id);
                return Ok(receipt(file.id));
            }

            if status == StatusCode::UNAUTHORIZED {
                self.token.lock().await.take();
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::UNAUTHORIZED
                || status.is_server_error();
            if !retryable || retry_count >= MAX_RETRIES {
                return Err(UploadError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            retry_count += 1;
            warn!(
                "Drive upload of {} returned {}, retrying in {}s ({}/{})",
                destination_name, status, backoff, retry_count, MAX_RETRIES
            );
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

fn receipt(file_id: String) -> UploadReceipt {
    UploadReceipt {
        view_url: format!("https://drive.google.com/file/d/{}/view?usp=sharing", file_id),
        download_url: format!("https://drive.google.com/uc?export=download&id={}", file_id),
        file_id,
    }
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
            b = boundary,
            m = metadata,
            t = content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
