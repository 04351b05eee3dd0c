//! Google OAuth for installed apps.
//!
//! [`GoogleCredentials`] is acquired once per run (cached token, or the
//! interactive loopback flow) and refreshes itself on demand, so callers
//! only ever ask for [`GoogleCredentials::access_token`].

use crate::platform;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const YOUTUBE_UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);
const REFRESH_MARGIN_SECS: i64 = 60;

const DONE_PAGE: &str = "<html><body><h3>Authorization complete. You can close this window.</h3></body></html>";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Accepts Google's downloaded JSON (`installed` or `web` section).
    pub fn from_json(text: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(text).context("Failed to parse client secret JSON")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow::anyhow!("client secret has no 'installed' or 'web' section"))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read OAuth client secret: {}", path.display()))?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > ChronoDuration::seconds(REFRESH_MARGIN_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + ChronoDuration::seconds(self.expires_in),
            scope: self.scope,
        }
    }
}

pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        Self::from_verifier(random_token(64))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn authorization_url(
    secret: &ClientSecret,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
    challenge: &str,
) -> Result<String> {
    let scope = scopes.join(" ");
    let url = reqwest::Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .with_context(|| format!("Invalid auth_uri: {}", secret.auth_uri))?;
    Ok(url.to_string())
}

/// Reads the request target of the loopback redirect. `Ok(None)` for
/// unrelated requests such as `/favicon.ico`.
pub fn parse_redirect(target: &str, expected_state: &str) -> Result<Option<String>> {
    let url = reqwest::Url::parse(&format!("http://127.0.0.1{target}"))
        .with_context(|| format!("Bad redirect target: {target}"))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(anyhow::anyhow!("Authorization denied: {}", error));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(anyhow::anyhow!("OAuth state mismatch on redirect"));
    }
    Ok(Some(code))
}

async fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String> {
    loop {
        let (stream, _) = listener.accept().await.context("OAuth loopback accept failed")?;
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        loop {
            let mut header = String::new();
            let n = reader.read_line(&mut header).await?;
            if n == 0 || header.trim().is_empty() {
                break;
            }
        }

        let target = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
        let outcome = parse_redirect(&target, state);

        let mut stream = reader.into_inner();
        let (status, page) = match &outcome {
            Ok(Some(_)) => ("200 OK", DONE_PAGE.to_string()),
            Ok(None) => ("404 Not Found", String::new()),
            Err(err) => ("400 Bad Request", format!("<html><body>{}</body></html>", err)),
        };
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n{}{}",
            status,
            page.len(),
            "Connection: close\r\n\r\n",
            page
        );
        let _ = stream.write_all(reply.as_bytes()).await;
        let _ = stream.shutdown().await;

        if let Some(code) = outcome? {
            return Ok(code);
        }
    }
}

async fn post_token(
    client: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let resp = client
        .post(token_uri)
        .form(form)
        .send()
        .await
        .context("OAuth token request failed")?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow::anyhow!("OAuth token endpoint HTTP {}: {}", status.as_u16(), body));
    }
    serde_json::from_str(&body).context("Failed to parse OAuth token response")
}

pub struct GoogleCredentials {
    client: reqwest::Client,
    secret: ClientSecret,
    cache_path: PathBuf,
    token: Mutex<StoredToken>,
}

impl GoogleCredentials {
    /// Loads the cached token, or runs the browser consent flow and caches
    /// the result.
    pub async fn acquire(
        client: reqwest::Client,
        secret_path: &Path,
        cache_path: &Path,
        scopes: &[&str],
    ) -> Result<Self> {
        let secret = ClientSecret::load(secret_path).await?;

        let token = match load_cached(cache_path).await {
            Some(token) if token.is_fresh(Utc::now()) || token.refresh_token.is_some() => {
                logok(format!("Using cached YouTube credentials: {}", cache_path.display()));
                token
            }
            _ => {
                let token = interactive_flow(&client, &secret, scopes).await?;
                save_cached(cache_path, &token).await?;
                token
            }
        };

        Ok(Self::from_parts(client, secret, cache_path.to_path_buf(), token))
    }

    pub fn from_parts(
        client: reqwest::Client,
        secret: ClientSecret,
        cache_path: PathBuf,
        token: StoredToken,
    ) -> Self {
        Self {
            client,
            secret,
            cache_path,
            token: Mutex::new(token),
        }
    }

    /// A currently valid bearer token, refreshed if close to expiry.
    pub async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_fresh(Utc::now()) {
            return Ok(token.access_token.clone());
        }

        let refresh = token.refresh_token.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "YouTube token expired and has no refresh token; delete {} to re-authorize",
                self.cache_path.display()
            )
        })?;

        logi("Refreshing YouTube access token...");
        let resp = post_token(
            &self.client,
            &self.secret.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
            ],
        )
        .await?;

        *token = resp.into_stored(Some(refresh), Utc::now());
        if let Err(err) = save_cached(&self.cache_path, &token).await {
            logw(format!("Could not update token cache: {:#}", err));
        }
        Ok(token.access_token.clone())
    }
}

async fn interactive_flow(
    client: &reqwest::Client,
    secret: &ClientSecret,
    scopes: &[&str],
) -> Result<StoredToken> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to open OAuth loopback listener")?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");

    let pkce = Pkce::generate();
    let state = random_token(24);
    let url = authorization_url(secret, &redirect_uri, scopes, &state, &pkce.challenge)?;

    logi(format!("Authorize YouTube uploads in your browser: {}", url));
    platform::open_url(&url);

    let code = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_code(&listener, &state))
        .await
        .map_err(|_| anyhow::anyhow!("Timed out waiting for OAuth consent"))??;

    let resp = post_token(
        client,
        &secret.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ],
    )
    .await?;

    logok("YouTube authorization complete.");
    Ok(resp.into_stored(None, Utc::now()))
}

async fn load_cached(path: &Path) -> Option<StoredToken> {
    let text = fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&text) {
        Ok(token) => Some(token),
        Err(err) => {
            logw(format!("Ignoring unreadable token cache {}: {}", path.display(), err));
            None
        }
    }
}

async fn save_cached(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(token)?;
    fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write token cache {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await;
    }
    Ok(())
}
