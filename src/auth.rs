//! OAuth2 device-code authentication (RFC 8628) against Microsoft identity.
//!
//! The flow is the interactive half of the Graph variant: request a device
//! code, show the user the verification URL and code, poll until they
//! approve. Acquired tokens are cached on disk so subsequent runs reuse
//! them silently, refreshing through the cached refresh token when the
//! access token has expired.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ExportError, Result};

/// Graph scopes requested by the export. offline_access yields a refresh
/// token so later runs skip the interactive flow.
pub const SCOPES: &[&str] = &["https://graph.microsoft.com/Mail.Read", "offline_access"];

/// Subtracted from expires_in when caching so a token near expiry is not
/// reused mid-run.
const CACHE_SKEW_SECONDS: i64 = 60;

const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// RFC 8628 device authorization grant type.
const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Response from the device authorization endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    /// Code the user types at the verification URI.
    pub user_code: String,
    pub verification_uri: String,
    /// Human-readable instructions from the provider, shown verbatim.
    #[serde(default)]
    pub message: Option<String>,
    /// Lifetime in seconds of the device_code and user_code.
    pub expires_in: u64,
    /// Minimum polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Error body returned by the token endpoint while polling.
#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// On-disk token cache contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn from_response(token: &TokenResponse) -> Self {
        let lifetime = token.expires_in.unwrap_or(0) as i64;
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: Utc::now()
                + Duration::seconds(lifetime.saturating_sub(CACHE_SKEW_SECONDS)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Device-flow handler bound to one tenant's endpoints.
pub struct DeviceFlowAuth {
    client: Client,
    device_auth_url: String,
    token_url: String,
}

impl DeviceFlowAuth {
    /// Endpoints under `{authority}/{tenant}/oauth2/v2.0`.
    pub fn for_tenant(authority: &str, tenant_id: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExportError::Auth(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            device_auth_url: format!("{}/{}/oauth2/v2.0/devicecode", authority, tenant_id),
            token_url: format!("{}/{}/oauth2/v2.0/token", authority, tenant_id),
        })
    }

    /// Step 1: request a device code and user code.
    pub async fn request_device_code(&self, client_id: &str) -> Result<DeviceCodeResponse> {
        let scope = SCOPES.join(" ");
        debug!("Requesting device code from {}", self.device_auth_url);

        let response = self
            .client
            .post(&self.device_auth_url)
            .form(&[("client_id", client_id), ("scope", &scope)])
            .send()
            .await
            .map_err(|e| ExportError::Auth(format!("device code request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Auth(format!(
                "device code request failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        let device_code: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| ExportError::Auth(format!("failed to parse device code: {}", e)))?;

        info!(
            "Device code received; user code {} at {}",
            device_code.user_code, device_code.verification_uri
        );
        Ok(device_code)
    }

    /// Step 2: poll the token endpoint until the user approves, the code
    /// expires, or the provider reports a terminal error.
    ///
    /// This is a public-client grant: only the client id is sent, never a
    /// secret.
    pub async fn poll_for_token(
        &self,
        device_code: &DeviceCodeResponse,
        client_id: &str,
    ) -> Result<TokenResponse> {
        let deadline =
            std::time::Instant::now() + StdDuration::from_secs(device_code.expires_in.max(5));
        let mut interval = StdDuration::from_secs(device_code.interval.max(1));
        let max_interval = StdDuration::from_secs(30);

        info!(
            "Waiting for user authorization (expires in {}s)",
            device_code.expires_in
        );

        loop {
            if std::time::Instant::now() > deadline {
                return Err(ExportError::Auth(
                    "device code expired before authorization completed".to_string(),
                ));
            }

            tokio::time::sleep(interval).await;

            let response = self
                .client
                .post(&self.token_url)
                .form(&[
                    ("client_id", client_id),
                    ("device_code", &device_code.device_code),
                    ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ])
                .send()
                .await
                .map_err(|e| ExportError::Auth(format!("token request failed: {}", e)))?;

            if response.status().is_success() {
                let token: TokenResponse = response.json().await.map_err(|e| {
                    ExportError::Auth(format!("failed to parse token response: {}", e))
                })?;
                info!("Authentication successful");
                return Ok(token);
            }

            let error: TokenErrorResponse = response.json().await.map_err(|e| {
                ExportError::Auth(format!("failed to parse token error response: {}", e))
            })?;

            match error.error.as_str() {
                "authorization_pending" => {
                    debug!("Authorization pending, continuing to poll");
                }
                "slow_down" => {
                    // RFC 8628 section 3.5: add 5 seconds to the interval
                    interval = (interval + StdDuration::from_secs(5)).min(max_interval);
                    warn!("Provider requested slow down, new interval {:?}", interval);
                }
                "expired_token" => {
                    return Err(ExportError::Auth(
                        "device code expired before authorization completed".to_string(),
                    ));
                }
                "access_denied" => {
                    return Err(ExportError::Auth(
                        "user denied the authorization request".to_string(),
                    ));
                }
                _ => {
                    return Err(ExportError::Auth(format!(
                        "token request error: {} - {}",
                        error.error,
                        error.error_description.unwrap_or_default()
                    )));
                }
            }
        }
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<TokenResponse> {
        debug!("Refreshing access token");

        let scope = SCOPES.join(" ");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", client_id),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("scope", &scope),
            ])
            .send()
            .await
            .map_err(|e| ExportError::Auth(format!("token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Auth(format!(
                "token refresh failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExportError::Auth(format!("failed to parse refresh response: {}", e)))
    }
}

/// Acquire a bearer token for the Graph variant.
///
/// Order of attempts: cached unexpired token, refresh with the cached
/// refresh token, full interactive device flow. The cache is rewritten on
/// every successful non-silent path.
pub async fn acquire_token(config: &Config) -> Result<String> {
    if let Some(cached) = load_token_cache(&config.token_cache).await? {
        if !cached.is_expired() {
            info!("Using cached authentication");
            return Ok(cached.access_token);
        }

        if let Some(refresh_token) = cached.refresh_token.as_deref() {
            let auth = DeviceFlowAuth::for_tenant(&config.authority, &config.tenant_id)?;
            match auth.refresh_access_token(refresh_token, &config.client_id).await {
                Ok(token) => {
                    let fresh = CachedToken::from_response(&token);
                    save_token_cache(&config.token_cache, &fresh).await?;
                    return Ok(fresh.access_token);
                }
                Err(e) => {
                    warn!("Token refresh failed ({}); starting device flow", e);
                }
            }
        }
    }

    let auth = DeviceFlowAuth::for_tenant(&config.authority, &config.tenant_id)?;
    let device_code = auth.request_device_code(&config.client_id).await?;

    println!("\n{:=<60}", "");
    println!("AUTHENTICATION REQUIRED");
    println!("{:=<60}", "");
    match &device_code.message {
        Some(message) => println!("{}", message),
        None => println!(
            "Visit {} and enter the code {}",
            device_code.verification_uri, device_code.user_code
        ),
    }
    println!("{:=<60}", "");

    // Opening the browser is a courtesy; the printed URL is the contract.
    if let Err(e) = open::that(&device_code.verification_uri) {
        debug!("Could not open browser: {}", e);
    }

    let token = auth.poll_for_token(&device_code, &config.client_id).await?;
    let fresh = CachedToken::from_response(&token);
    save_token_cache(&config.token_cache, &fresh).await?;
    Ok(fresh.access_token)
}

/// Load the token cache, tolerating a missing file. An unreadable cache is
/// discarded with a warning rather than failing the run.
pub async fn load_token_cache(path: &Path) -> Result<Option<CachedToken>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(token) => Ok(Some(token)),
        Err(e) => {
            warn!("Discarding unreadable token cache at {:?}: {}", path, e);
            Ok(None)
        }
    }
}

/// Persist the token cache, creating the parent directory if needed.
pub async fn save_token_cache(path: &Path, token: &CachedToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(token)?;
    tokio::fs::write(path, json).await?;
    secure_token_file(path).await?;
    debug!("Token cached at {:?}", path);
    Ok(())
}

/// Restrict the token cache to owner read/write on Unix.
#[cfg(unix)]
async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; nothing to tighten here.
#[cfg(windows)]
async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

fn truncate_error_body(body: &str) -> String {
    const MAX_LEN: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() > MAX_LEN {
        format!("{}... (truncated)", &trimmed[..MAX_LEN])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scopes_request_mail_read_and_offline_access() {
        assert!(SCOPES.contains(&"https://graph.microsoft.com/Mail.Read"));
        assert!(SCOPES.contains(&"offline_access"));
    }

    #[test]
    fn test_device_code_response_deserializes_with_default_interval() {
        let payload = r#"{
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900
        }"#;
        let decoded: DeviceCodeResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded.user_code, "ABCD-EFGH");
        assert_eq!(decoded.interval, 5);
        assert!(decoded.message.is_none());
    }

    #[test]
    fn test_cached_token_expiry() {
        let expired = CachedToken {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::minutes(1),
        };
        assert!(expired.is_expired());

        let live = CachedToken {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::minutes(10),
        };
        assert!(!live.is_expired());
    }

    #[test]
    fn test_cached_token_applies_expiry_skew() {
        let response = TokenResponse {
            access_token: "t".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
        };
        let cached = CachedToken::from_response(&response);
        let lifetime = cached.expires_at - Utc::now();
        assert!(lifetime <= Duration::seconds(3600 - CACHE_SKEW_SECONDS));
        assert!(lifetime > Duration::seconds(3600 - CACHE_SKEW_SECONDS - 10));
    }

    #[tokio::test]
    async fn test_token_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token.json");

        let token = CachedToken {
            access_token: "access-abc".to_string(),
            refresh_token: Some("refresh-xyz".to_string()),
            expires_at: Utc::now() + Duration::minutes(30),
        };
        save_token_cache(&path, &token).await.unwrap();

        let loaded = load_token_cache(&path).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-abc");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-xyz"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
            assert_eq!(perms.mode() & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_missing_token_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_token_cache(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_token_cache_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let loaded = load_token_cache(&path).await.unwrap();
        assert!(loaded.is_none());
    }
}
