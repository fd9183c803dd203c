// # Netcup DNS Provider
//
// Client for the Netcup CCP JSON API, implementing `DnsApi`.
//
// ## Behaviour
//
// - Every exchange is one JSON POST to a single endpoint
// - Each attempt runs through the shared `ResilientExecutor` (timeout,
//   circuit breaker, retry with exponential backoff)
// - HTTP 401/403 map to authentication errors, 429 to rate limiting,
//   other non-success statuses to `Error::Http`
// - An `error` status inside a successful HTTP response is an application
//   error and is never retried
// - Logout is attempted once, never retried
//
// ## Security Requirements
//
// - API key, API password and session ID NEVER appear in logs
// - Credentials MUST be provided via environment variables only
// - The client MUST fail fast if any credential is empty
//
// ## API Reference
//
// - Endpoint: POST `https://ccp.netcup.net/run/webservice/servers/endpoint.php?JSON`
// - Actions: `login`, `logout`, `infoDnsZone`, `infoDnsRecords`,
//   `updateDnsZone`, `updateDnsRecords`

pub mod protocol;
mod session;

use async_trait::async_trait;
use companion_core::config::CompanionConfig;
use companion_core::traits::{DnsApi, DnsSession};
use companion_core::{CircuitBreaker, Error, ResilientExecutor, Result, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use protocol::{Action, Envelope, LoginData, Params, Request};
pub use protocol::DEFAULT_ENDPOINT;
pub use session::NetcupSession;

/// Connect timeout for the underlying HTTP client
///
/// The overall per-attempt deadline is enforced by the executor.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of response body bytes kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Account credentials for the CCP API
#[derive(Clone)]
pub struct NetcupCredentials {
    pub customer_number: u64,
    pub api_key: String,
    pub api_password: String,
}

impl NetcupCredentials {
    pub fn new(
        customer_number: u64,
        api_key: impl Into<String>,
        api_password: impl Into<String>,
    ) -> Self {
        Self {
            customer_number,
            api_key: api_key.into(),
            api_password: api_password.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.customer_number == 0 {
            return Err(Error::config("Netcup customer number cannot be zero"));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::config("Netcup API key cannot be empty"));
        }
        if self.api_password.trim().is_empty() {
            return Err(Error::config("Netcup API password cannot be empty"));
        }
        Ok(())
    }
}

// Custom Debug implementation that redacts the secrets
impl fmt::Debug for NetcupCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcupCredentials")
            .field("customer_number", &self.customer_number)
            .field("api_key", &"<REDACTED>")
            .field("api_password", &"<REDACTED>")
            .finish()
    }
}

/// Netcup CCP API client
///
/// Cloning is cheap; clones share the HTTP connection pool and the
/// circuit breaker.
#[derive(Clone)]
pub struct NetcupClient {
    credentials: Arc<NetcupCredentials>,
    endpoint: String,
    http: reqwest::Client,
    executor: ResilientExecutor,
    /// Same breaker, no retries; used for logout
    single_shot: ResilientExecutor,
}

impl fmt::Debug for NetcupClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcupClient")
            .field("credentials", &self.credentials)
            .field("endpoint", &self.endpoint)
            .field("retry", self.executor.policy())
            .finish()
    }
}

impl NetcupClient {
    /// Create a client against the production endpoint
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a credential is missing or the HTTP
    /// client cannot be built.
    pub fn new(credentials: NetcupCredentials, executor: ResilientExecutor) -> Result<Self> {
        credentials.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let single_shot = ResilientExecutor::new(RetryPolicy::no_retry(), executor.breaker().clone())
            .with_request_timeout(executor.request_timeout());

        Ok(Self {
            credentials: Arc::new(credentials),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http,
            executor,
            single_shot,
        })
    }

    /// Create a client with retry, breaker and timeout taken from `config`
    pub fn from_config(credentials: NetcupCredentials, config: &CompanionConfig) -> Result<Self> {
        let breaker = Arc::new(CircuitBreaker::from_config(&config.circuit_breaker));
        let executor = ResilientExecutor::new(RetryPolicy::from_config(&config.retry), breaker)
            .with_request_timeout(config.engine.request_timeout());
        Self::new(credentials, executor)
    }

    /// Point the client at a different endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn credentials(&self) -> &NetcupCredentials {
        &self.credentials
    }

    /// Send `request` with retries; the envelope status is not inspected
    pub(crate) async fn post(&self, request: &Request<'_>) -> Result<Envelope> {
        self.executor
            .execute(request.action.as_str(), || self.send_once(request))
            .await
    }

    /// Send `request` once through the circuit breaker
    pub(crate) async fn post_once(&self, request: &Request<'_>) -> Result<Envelope> {
        self.single_shot
            .execute(request.action.as_str(), || self.send_once(request))
            .await
    }

    async fn send_once(&self, request: &Request<'_>) -> Result<Envelope> {
        tracing::debug!(action = request.action.as_str(), "POST {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let body = truncate(&body);
            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!(
                    "{} rejected with status {}",
                    request.action.as_str(),
                    status
                )),
                429 => Error::rate_limited(format!(
                    "{} rate limited (status {})",
                    request.action.as_str(),
                    status
                )),
                code => Error::Http { status: code, body },
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)?;
        Ok(envelope)
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(e.to_string())
    } else {
        Error::transport(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[async_trait]
impl DnsApi for NetcupClient {
    async fn login(&self) -> Result<Box<dyn DnsSession>> {
        let credentials = self.credentials();
        let request = Request {
            action: Action::Login,
            param: Params {
                customer_number: credentials.customer_number,
                api_key: &credentials.api_key,
                api_password: Some(&credentials.api_password),
                client_request_id: "",
                ..Params::default()
            },
        };

        let envelope = self.post(&request).await?;
        if envelope.is_error() {
            return Err(Error::auth(format!(
                "login rejected ({}): {}",
                envelope.status_code, envelope.short_message
            )));
        }
        envelope.check(Action::Login)?;

        let data: LoginData = envelope.data()?;
        if data.api_session_id.is_empty() {
            return Err(Error::auth("login response carried no session ID"));
        }

        tracing::debug!(customer = credentials.customer_number, "Logged in to Netcup CCP API");
        Ok(Box::new(NetcupSession::new(
            self.clone(),
            data.api_session_id,
            envelope.client_request_id,
        )))
    }

    fn provider_name(&self) -> &'static str {
        "netcup"
    }
}
