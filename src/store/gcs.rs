// src/store/gcs.rs

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

use crate::{
    config::StorageConfig,
    error::AppError,
    store::{BlobStore, discard_on_error, partial_path},
};

const READ_ONLY_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service account key file this store needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Accepts either the key JSON itself or a path to the key file.
    pub fn from_setting(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            std::fs::read_to_string(trimmed).map_err(|e| {
                AppError::Configuration(format!(
                    "cannot read service account key '{}': {}",
                    trimmed, e
                ))
            })?
        };
        serde_json::from_str(&json).map_err(|e| {
            AppError::Configuration(format!("invalid service account key: {}", e))
        })
    }
}

/// JWT claims for the OAuth 2.0 service account flow.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Google Cloud Storage over the JSON API.
pub struct GcsStore {
    base_url: Url,
    bucket: String,
    key: ServiceAccountKey,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GcsStore {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self, AppError> {
        let key = ServiceAccountKey::from_setting(&config.service_account)?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Configuration(format!("invalid STORAGE_BASE_URL '{}': {}", config.base_url, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        Ok(Self {
            base_url,
            bucket: config.bucket.clone(),
            key,
            client,
            token: Mutex::new(None),
        })
    }

    /// `{base}/storage/v1/b/{bucket}/o/{object}?alt=media`, with the object
    /// name encoded as a single path segment.
    fn object_url(&self, object: &str) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::Configuration(format!("'{}' cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn signed_assertion(&self) -> Result<String, AppError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: READ_ONLY_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + 3600,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &signing_key)?)
    }

    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting access token for {}", self.key.client_email);
        let assertion = self.signed_assertion()?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Storage(format!(
                "token exchange failed status={}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get_object(&self, object: &str) -> Result<reqwest::Response, AppError> {
        let url = self.object_url(object)?;
        let token = self.access_token().await?;
        let resp = self.client.get(url).bearer_auth(token).send().await?;

        match resp.status() {
            status if status.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(AppError::Storage(format!(
                "object '{}' not found in bucket '{}'",
                object, self.bucket
            ))),
            status => Err(AppError::Storage(format!(
                "download of '{}' failed status={}",
                object, status
            ))),
        }
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    fn backend_tag(&self) -> &'static str {
        "gcs"
    }

    async fn fetch_bytes(&self, object: &str) -> Result<Vec<u8>, AppError> {
        let resp = self.get_object(object).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Streams the body to disk instead of buffering the whole dataset.
    async fn download_to(&self, object: &str, dest: &Path) -> Result<u64, AppError> {
        let resp = self.get_object(object).await?;
        let tmp = partial_path(dest);
        let written = discard_on_error(&tmp, stream_to_file(resp, &tmp).await).await?;
        tokio::fs::rename(&tmp, dest).await?;
        Ok(written)
    }
}

async fn stream_to_file(mut resp: reqwest::Response, path: &Path) -> Result<u64, AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
