//! Injectable HTTP transport.
//!
//! Adapters talk to the network only through a [`Fetch`] closure so tests can
//! substitute recorded responses, and so the per-request deadline is enforced
//! here rather than by whichever transport sits underneath.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("agentbar/", env!("CARGO_PKG_VERSION"));
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Form(
                fields
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            ),
            timeout: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            RequestBody::Empty => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
}

pub type Fetch = Arc<dyn Fn(&HttpRequest) -> std::result::Result<HttpResponse, FetchError> + Send + Sync>;

/// Caller-owned cancellation flag shared with in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Default transport: one blocking reqwest client shared by every request.
pub fn reqwest_fetch() -> Result<Fetch> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| Error::Http(format!("failed to build HTTP client: {}", err)))?;

    Ok(Arc::new(move |request: &HttpRequest| -> std::result::Result<HttpResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let RequestBody::Form(fields) = &request.body {
            builder = builder.form(fields);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }))
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Bounds every request made through `fetch` by `timeout` and `cancel`.
///
/// The inner call runs on a helper thread; when the deadline passes or the
/// token is cancelled the caller gets `Timeout`/`Cancelled` immediately and
/// the helper's eventual result is discarded. A zero timeout without a
/// cancel token returns `fetch` unchanged.
pub fn with_timeout(fetch: Fetch, timeout: Duration, cancel: Option<CancelToken>) -> Fetch {
    if timeout.is_zero() && cancel.is_none() {
        return fetch;
    }

    Arc::new(move |request: &HttpRequest| -> std::result::Result<HttpResponse, FetchError> {
        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(FetchError::Cancelled);
        }

        let deadline = if timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(timeout)
        };
        let mut request = request.clone();
        if deadline.is_some() {
            request.timeout = Some(timeout);
        }

        let (sender, receiver) = mpsc::channel();
        let inner = Arc::clone(&fetch);
        thread::spawn(move || {
            let _ = sender.send(inner(&request));
        });

        loop {
            let mut wait = CANCEL_POLL_INTERVAL;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                    return Err(FetchError::Timeout);
                }
                wait = wait.min(remaining);
            }

            match receiver.recv_timeout(wait) {
                Ok(result) => return result,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                        return Err(FetchError::Cancelled);
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(FetchError::Network("transport worker exited".to_string()));
                }
            }
        }
    })
}
