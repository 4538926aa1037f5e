use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};

/// Only this exact status line counts as success; other 2xx replies
/// surface as [`ExchangeError::BadStatus`] with the raw body.
pub const ACCEPTED_STATUS: &str = "200 OK";

/// HTTP transport used by the adapters.
///
/// The exchange specific authentication lives behind the implementation, so
/// adapters only name an endpoint, its parameters and the reply type.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// GET with query parameters, signed when `authenticated`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError>;

    /// POST with a JSON body.
    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<T, ExchangeError>;

    /// Any method, signature appended to the query string.
    async fn signed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError>;

    /// Any method, key headers only (bnf listen key calls).
    async fn keyed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(20u32);

#[derive(Debug, Clone, Copy)]
enum Auth {
    None,
    KeyOnly,
    Signed,
}

/// Assembles a [`ReqwestRest`] for one exchange host.
pub struct RestBuilder {
    base_url: String,
    exchange: String,
    timeout: Duration,
    requests_per_second: NonZeroU32,
    signer: Option<Arc<dyn Signer>>,
}

impl RestBuilder {
    pub fn new(base_url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            exchange: exchange.into(),
            timeout: DEFAULT_TIMEOUT,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            signer: None,
        }
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client side budget; zero falls back to the default.
    pub fn requests_per_second(mut self, limit: u32) -> Self {
        self.requests_per_second = NonZeroU32::new(limit).unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("http client for {}: {}", self.exchange, e))
            })?;

        Ok(ReqwestRest {
            client,
            base_url: self.base_url,
            exchange: self.exchange,
            signer: self.signer,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(
                self.requests_per_second,
            ))),
        })
    }
}

const USER_AGENT: &str = concat!("lfg-connect/", env!("CARGO_PKG_VERSION"));

/// [`RestClient`] over a shared reqwest connection pool, throttled by governor.
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    base_url: String,
    exchange: String,
    signer: Option<Arc<dyn Signer>>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("exchange", &self.exchange)
            .field("base_url", &self.base_url)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Unsigned client for public market data.
    pub fn public(
        base_url: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Result<Self, ExchangeError> {
        RestBuilder::new(base_url, exchange).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> Result<Url, ExchangeError> {
        Url::parse(&format!("{}{}", self.base_url, endpoint)).map_err(|e| {
            ExchangeError::ConfigurationError(format!("{}{}: {}", self.base_url, endpoint, e))
        })
    }

    /// Reject everything but an exact `200 OK` and decode the body.
    #[instrument(skip(self, response), fields(exchange = %self.exchange, status = %response.status()))]
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("reading body: {}", e)))?;
        trace!(%body, "reply");

        if status != ACCEPTED_STATUS {
            return Err(ExchangeError::BadStatus { status, body });
        }
        serde_json::from_str(&body)
            .map_err(|e| ExchangeError::DeserializationError(format!("{}: {}", e, body)))
    }

    #[instrument(skip(self, body, query_params, auth), fields(exchange = %self.exchange, method = %method, endpoint = %endpoint))]
    async fn make_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: Option<Vec<u8>>,
        auth: Auth,
    ) -> Result<T, ExchangeError> {
        let mut url = self.url(endpoint)?;
        if !query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(query_params.iter());
        }

        let mut headers = Vec::new();
        if !matches!(auth, Auth::None) {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(format!("{} {} needs a signer", method, endpoint))
            })?;
            let timestamp = Utc::now().timestamp_millis() as u64;
            // sign the query exactly as it will be sent, percent-encoding included
            let query_string = url.query().unwrap_or_default().to_string();
            let (signed_headers, signed_params) = signer.sign_request(
                method.as_str(),
                endpoint,
                &query_string,
                body.as_deref().unwrap_or_default(),
                timestamp,
            )?;
            headers.extend(signed_headers);
            if matches!(auth, Auth::Signed) {
                url.query_pairs_mut().extend_pairs(signed_params);
            }
        }

        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        self.limiter.until_ready().await;
        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("{} {}: {}", self.exchange, endpoint, e)))?;

        self.handle_response(response).await
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let auth = if authenticated { Auth::Signed } else { Auth::None };
        self.make_request(Method::GET, endpoint, query_params, None, auth)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let body_bytes = serde_json::to_vec(body)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))?;
        let auth = if authenticated { Auth::Signed } else { Auth::None };
        self.make_request(Method::POST, endpoint, &[], Some(body_bytes), auth)
            .await
    }

    async fn signed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        self.make_request(method, endpoint, query_params, None, Auth::Signed)
            .await
    }

    async fn keyed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        self.make_request(method, endpoint, query_params, None, Auth::KeyOnly)
            .await
    }
}
