use chrono::{DateTime, Utc};
use likewatch_core::{CoreError, FeedApiError, FeedCredentials};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RequestTokenError, TokenResponse, TokenUrl};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_AUTH_URL: &str = "https://api.twitter.com/oauth/authenticate";
pub const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/oauth2/token";

/// Bearer credentials obtained from a login.
#[derive(Clone)]
pub struct SessionToken {
    pub access_token: String,
    pub obtained_at: DateTime<Utc>,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("access_token", &"***")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Authentication state of the feed gateway
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NotAuthenticated,
    Authenticated { since: DateTime<Utc> },
    /// The upstream rejected the last token; the next request logs in again.
    Invalidated,
}

/// Owns the upstream session and its re-authentication.
#[derive(Debug)]
pub struct SessionManager {
    oauth_client: BasicClient,
    token: Mutex<Option<SessionToken>>,
    state: std::sync::Mutex<AuthState>,
}

impl SessionManager {
    pub fn new(credentials: &FeedCredentials) -> Result<Self, CoreError> {
        Self::with_token_url(credentials, DEFAULT_TOKEN_URL)
    }

    pub fn with_token_url(
        credentials: &FeedCredentials,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(DEFAULT_AUTH_URL.to_string())
            .map_err(|e| invalid_url(DEFAULT_AUTH_URL, e))?;
        let token_url =
            TokenUrl::new(token_url.to_string()).map_err(|e| invalid_url(token_url, e))?;

        let oauth_client = BasicClient::new(
            ClientId::new(credentials.api_key.expose().to_string()),
            Some(ClientSecret::new(credentials.api_secret.expose().to_string())),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            oauth_client,
            token: Mutex::new(None),
            state: std::sync::Mutex::new(AuthState::NotAuthenticated),
        })
    }

    /// Exchange the API credentials for a fresh bearer session.
    pub async fn login(&self) -> Result<SessionToken, CoreError> {
        info!("Logging in to the upstream feed API");
        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    CoreError::FeedApi(FeedApiError::AuthenticationFailed {
                        reason: response.to_string(),
                    })
                }
                RequestTokenError::Request(err) => CoreError::FeedApi(FeedApiError::Unreachable {
                    reason: err.to_string(),
                }),
                other => CoreError::FeedApi(FeedApiError::InvalidResponse {
                    details: other.to_string(),
                }),
            })?;

        let token = SessionToken {
            access_token: response.access_token().secret().to_string(),
            obtained_at: Utc::now(),
        };
        self.set_state(AuthState::Authenticated {
            since: token.obtained_at,
        });
        debug!("Upstream session established");
        Ok(token)
    }

    /// Current bearer token, logging in first when there is none.
    pub async fn bearer(&self) -> Result<String, CoreError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.access_token.clone());
        }
        let token = self.login().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    /// Drop the cached session so the next request logs in again.
    pub async fn invalidate(&self) {
        warn!("Upstream session rejected, dropping cached token");
        *self.token.lock().await = None;
        self.set_state(AuthState::Invalidated);
    }

    pub async fn set_token(&self, token: SessionToken) {
        self.set_state(AuthState::Authenticated {
            since: token.obtained_at,
        });
        *self.token.lock().await = Some(token);
    }

    pub fn auth_state(&self) -> AuthState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or(AuthState::NotAuthenticated)
    }

    fn set_state(&self, state: AuthState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}

fn invalid_url(url: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::InvalidInput {
        message: format!("invalid URL {url}: {err}"),
    }
}
