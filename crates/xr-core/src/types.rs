//! Core domain types

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Network location of one RPC server
///
/// Parsing normalizes the URI: scheme and host are case-insensitive and an
/// empty path becomes `/`. Two endpoints are equal when their normalized
/// forms are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parse an endpoint URI (`http` or `https`, with a host)
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            uri: uri.to_string(),
            reason,
        };

        let url = Url::parse(uri.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {:?}", other))),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }

        Ok(Self(url))
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Explicit or scheme-default port
    pub fn port(&self) -> Option<u16> {
        self.0.port_or_known_default()
    }

    /// Whether calls to this endpoint use TLS
    pub fn is_tls(&self) -> bool {
        self.0.scheme() == "https"
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Same scheme, port and path on a different host
    pub fn with_host(&self, host: &str) -> Result<Self, ConfigError> {
        let mut url = self.0.clone();
        url.set_host(Some(host))
            .map_err(|e| ConfigError::InvalidEndpoint {
                uri: host.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self(url))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

/// Ordered, de-duplicated, never-empty list of candidate endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    /// Build a pool, keeping the first occurrence of each endpoint
    pub fn new<I>(endpoints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Endpoint>,
    {
        let mut pool = Self {
            endpoints: Vec::new(),
        };
        for endpoint in endpoints {
            if !pool.contains(&endpoint) {
                pool.endpoints.push(endpoint);
            }
        }

        if pool.endpoints.is_empty() {
            return Err(ConfigError::MissingField("endpoints".into()));
        }
        Ok(pool)
    }

    /// Parse and pool a list of URIs
    pub fn parse<I, S>(uris: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = uris
            .into_iter()
            .map(|uri| Endpoint::parse(uri.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints)
    }

    /// Move (or insert) an endpoint to the front
    pub fn push_front(&mut self, endpoint: Endpoint) {
        self.endpoints.retain(|e| e != &endpoint);
        self.endpoints.insert(0, endpoint);
    }

    pub fn first(&self) -> &Endpoint {
        // Non-empty by construction
        &self.endpoints[0]
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// Endpoints not in `excluded`, in pool order
    pub fn candidates<'a>(&'a self, excluded: &'a [Endpoint]) -> impl Iterator<Item = &'a Endpoint> {
        self.endpoints.iter().filter(move |e| !excluded.contains(e))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

static OPAQUE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"OpaqueRef:[^<>\s"']+"#).expect("static regex is valid")
});

/// Opaque server-assigned identifier for a remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference(pub String);

impl Reference {
    /// The null reference the server uses for "no object"
    pub const NULL: &'static str = "OpaqueRef:NULL";

    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Find the first `OpaqueRef:` token in a piece of text, whatever wraps it
    pub fn extract(text: &str) -> Option<Self> {
        OPAQUE_REF.find(text).map(|m| Self(m.as_str().to_string()))
    }

    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Reference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a server-side task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Success,
    Failure,
    Cancelling,
    Cancelled,
    /// A status string this client does not know
    Other(String),
}

impl TaskStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "pending" => TaskStatus::Pending,
            "success" => TaskStatus::Success,
            "failure" => TaskStatus::Failure,
            "cancelling" => TaskStatus::Cancelling,
            "cancelled" => TaskStatus::Cancelled,
            other => TaskStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
            TaskStatus::Cancelling => "cancelling",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Other(s) => s,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which login call authenticated the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// Normal login against the pool master
    WithPassword,
    /// Local/emergency login against a slave host
    SlaveLocal,
}

impl LoginMethod {
    /// Method name inside the `session` namespace
    pub fn name(&self) -> &'static str {
        match self {
            LoginMethod::WithPassword => "login_with_password",
            LoginMethod::SlaveLocal => "slave_local_login_with_password",
        }
    }

    /// Full RPC method name
    pub fn rpc_name(&self) -> String {
        format!("session.{}", self.name())
    }

    /// Matching logout RPC
    pub fn logout_rpc_name(&self) -> &'static str {
        match self {
            LoginMethod::WithPassword => "session.logout",
            LoginMethod::SlaveLocal => "session.local_logout",
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Username and password for password logins
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
