//! Transfer backend access.
//!
//! [`TransferBackend`] is the seam between the flows and the network. The
//! production implementation is [`HttpBackend`], which keeps a cookie-backed
//! session and the anti-forgery token read from the backend's index page.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::{
    CSRF_HEADER, CompleteAuthRequest, CompleteAuthResponse, ErrorBody, ResolveRequest,
    ResolvedPlaylist, TrackRequest, TrackResponse, endpoints,
};
use crate::error::{
    AuthError, BackendError, Error, GENERIC_AUTH_FAILURE, GENERIC_TRANSFER_FAILURE, Result,
};

/// Message used when a 401 answer carries no error text.
const NOT_AUTHENTICATED: &str = "Not authenticated. Please reconnect your YouTube account.";

/// Operations the transfer and authorization flows need from the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Load the index page: refreshes the session cookie and anti-forgery token.
    async fn reload(&self) -> Result<()>;

    /// Resolve a playlist link into its tracks and the target playlist.
    async fn resolve_playlist(&self, playlist_url: &str) -> Result<ResolvedPlaylist>;

    /// Search and add a single track to the target playlist.
    async fn transfer_track(&self, track_name: &str, playlist_id: &str) -> Result<TrackResponse>;

    /// Exchange the popup's state token for a session.
    async fn complete_auth(&self, state: &str) -> Result<()>;

    /// Clear the backend session.
    async fn disconnect(&self) -> Result<()>;

    /// URL of the authorization page, pointing its completion message at `callback_url`.
    fn authorize_url(&self, callback_url: &str) -> Result<String>;
}

/// Extract the anti-forgery token from `<meta name="csrf-token" content="...">`.
#[must_use]
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let name_first =
        Regex::new(r#"<meta\s+[^>]*name=["']csrf-token["'][^>]*content=["']([^"']*)["']"#).ok()?;
    let content_first =
        Regex::new(r#"<meta\s+[^>]*content=["']([^"']*)["'][^>]*name=["']csrf-token["']"#).ok()?;

    name_first
        .captures(html)
        .or_else(|| content_first.captures(html))
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
        .filter(|token| !token.is_empty())
}

/// HTTP implementation of [`TransferBackend`].
pub struct HttpBackend {
    client: Client,
    base_url: String,
    origin: Url,
    cookies: Arc<Jar>,
    csrf_token: RwLock<Option<String>>,
}

impl HttpBackend {
    /// Create a backend client for `base_url`. No request is made.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let origin = Url::parse(trimmed).map_err(|e| BackendError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .user_agent(concat!("spottransfer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Request {
                endpoint: endpoints::INDEX.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
            origin,
            cookies,
            csrf_token: RwLock::new(None),
        })
    }

    /// Seed the cookie jar from a saved `Cookie` header value (`a=1; b=2`).
    pub fn restore_cookies(&self, cookie_header: &str) {
        for pair in cookie_header
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
        {
            self.cookies.add_cookie_str(pair, &self.origin);
        }
        debug!("Restored session cookies for {}", self.base_url);
    }

    /// Cookies the backend would currently receive, as a `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        self.cookies
            .cookies(&self.origin)
            .and_then(|value| value.to_str().ok().map(ToString::to_string))
    }

    /// Create a backend client and load the index page once.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the page cannot be loaded.
    pub async fn connect(base_url: &str) -> Result<Self> {
        let backend = Self::new(base_url)?;
        backend.reload().await?;
        Ok(backend)
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Currently held anti-forgery token.
    pub async fn csrf_token(&self) -> Option<String> {
        self.csrf_token.read().await.clone()
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// POST a JSON body and read the raw answer.
    async fn post<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(StatusCode, String)> {
        debug!("POST {}", endpoint);
        let mut request = self.client.post(self.endpoint_url(endpoint)).json(body);
        if let Some(token) = self.csrf_token.read().await.as_deref() {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await.map_err(|e| BackendError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| BackendError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        debug!("{} answered {}", endpoint, status);

        Ok((status, text))
    }

    /// POST a JSON body, map error statuses and decode the answer.
    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let (status, text) = self.post(endpoint, body).await?;
        check_status(endpoint, status, &text)?;
        decode(endpoint, &text)
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn check_status(endpoint: &str, status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthorized {
            endpoint: endpoint.to_string(),
            message: ErrorBody::message_from(body)
                .unwrap_or_else(|| NOT_AUTHENTICATED.to_string()),
        }
        .into());
    }

    if !status.is_success() {
        return Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: ErrorBody::message_from(body)
                .unwrap_or_else(|| GENERIC_TRANSFER_FAILURE.to_string()),
        }
        .into());
    }

    Ok(())
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        BackendError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl TransferBackend for HttpBackend {
    async fn reload(&self) -> Result<()> {
        let endpoint = endpoints::INDEX;
        debug!("GET {}", endpoint);
        let response = self
            .client
            .get(self.endpoint_url(endpoint))
            .send()
            .await
            .map_err(|e| BackendError::Request {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        let html = response.text().await.map_err(|e| BackendError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        check_status(endpoint, status, &html)?;

        let token = extract_csrf_token(&html);
        if token.is_none() {
            warn!("Index page carries no csrf-token meta tag");
        }
        *self.csrf_token.write().await = token;

        info!("Loaded backend page from {}", self.base_url);
        Ok(())
    }

    async fn resolve_playlist(&self, playlist_url: &str) -> Result<ResolvedPlaylist> {
        self.post_json(endpoints::TRANSFER, &ResolveRequest { playlist_url })
            .await
    }

    async fn transfer_track(&self, track_name: &str, playlist_id: &str) -> Result<TrackResponse> {
        self.post_json(
            endpoints::TRANSFER_TRACK,
            &TrackRequest {
                track_name,
                playlist_id,
            },
        )
        .await
    }

    async fn complete_auth(&self, state: &str) -> Result<()> {
        let endpoint = endpoints::COMPLETE_AUTH;
        let (status, text) = self.post(endpoint, &CompleteAuthRequest { state }).await?;

        // The answer body decides, whatever the status.
        let answer: CompleteAuthResponse = match decode(endpoint, &text) {
            Ok(answer) => answer,
            Err(e) if status.is_success() => return Err(e),
            Err(_) => CompleteAuthResponse::default(),
        };

        if answer.success {
            info!("Authorization completed");
            Ok(())
        } else {
            let message = answer
                .error
                .filter(|error| !error.trim().is_empty())
                .unwrap_or_else(|| GENERIC_AUTH_FAILURE.to_string());
            Err(Error::Auth(AuthError::Rejected(message)))
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let endpoint = endpoints::DISCONNECT;
        debug!("GET {}", endpoint);
        self.client
            .get(self.endpoint_url(endpoint))
            .send()
            .await
            .map_err(|e| BackendError::Request {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        *self.csrf_token.write().await = None;
        info!("Disconnected from backend");
        Ok(())
    }

    fn authorize_url(&self, callback_url: &str) -> Result<String> {
        let page = self.endpoint_url(endpoints::AUTHORIZE);
        let url = Url::parse_with_params(&page, &[("opener", callback_url)]).map_err(|e| {
            BackendError::InvalidUrl {
                url: page.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(url.into())
    }
}
