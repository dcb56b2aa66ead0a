//! Session client state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use xr_core::config::{ClientConfig, RetryConfig};
use xr_core::{
    ApiError, Connector, Endpoint, EndpointPool, ErrorKind, LoginMethod, Reference, Transport,
    TransportError, XapiError, XapiResult,
};
use xr_protocol::{Envelope, ProtocolError, Value};

use super::retry::RetryBudget;
use crate::dispatch::{AsyncDispatcher, Dispatcher, MethodName, Namespace};
use crate::transport::HttpConnector;

/// Callback invoked with the endpoint a login or reconnect concerns
///
/// The state is the client's own at the moment of the call: hooks run during
/// a reconnection episode see [`ClientState::Reconnecting`].
pub type Hook = Box<dyn Fn(&Endpoint, ClientState) + Send + Sync>;

/// Observable state of a [`SessionClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No session token held
    Unauthenticated,
    /// Holding a session token for the current endpoint
    Authenticated,
    /// A reconnection episode is in progress; visible to hooks
    Reconnecting,
}

/// The login call replayed on re-authentication
#[derive(Clone)]
struct LoginDescriptor {
    method: LoginMethod,
    args: Vec<Value>,
}

/// Holds the reconnecting flag; clears it when dropped
struct ReconnectGuard(Arc<AtomicBool>);

impl ReconnectGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What a failed call does next
enum Recovery {
    /// Same endpoint, fresh transport
    Retry,
    /// Log in again, then retry
    Relogin,
    /// Move to another endpoint, then retry
    Reconnect,
    /// Surface the error
    Fail,
}

/// Client holding one session against one current endpoint of a pool
///
/// Every state-changing operation takes `&mut self`, so the session token and
/// the transport it was issued through always change together. To share one
/// client between tasks, wrap it in a `tokio::sync::Mutex`.
pub struct SessionClient<C: Connector = HttpConnector> {
    connector: C,
    pool: EndpointPool,
    current: Endpoint,
    transport: Option<C::Transport>,
    session: Option<Reference>,
    login: Option<LoginDescriptor>,
    reconnecting: Arc<AtomicBool>,
    retry: RetryConfig,
    api_version: Option<String>,
    after_login: Option<Hook>,
    before_reconnect: Option<Hook>,
}

impl SessionClient<HttpConnector> {
    /// Build an HTTP client from configuration
    pub fn from_config(config: &ClientConfig) -> XapiResult<Self> {
        config.validate()?;
        let client = Self::new(config.endpoint_pool()?, HttpConnector::from_config(config))
            .with_retry(config.retry.clone());
        Ok(client)
    }
}

impl<C: Connector> SessionClient<C> {
    /// Create an unauthenticated client; the first pool entry becomes current
    pub fn new(pool: EndpointPool, connector: C) -> Self {
        let current = pool.first().clone();
        Self {
            connector,
            pool,
            current,
            transport: None,
            session: None,
            login: None,
            reconnecting: Arc::new(AtomicBool::new(false)),
            retry: RetryConfig::default(),
            api_version: None,
            after_login: None,
            before_reconnect: None,
        }
    }

    /// Replace the retry bounds
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Current session token
    pub fn session(&self) -> Option<&Reference> {
        self.session.as_ref()
    }

    /// Endpoint calls are currently sent to
    pub fn endpoint(&self) -> &Endpoint {
        &self.current
    }

    /// All known endpoints, in preference order
    pub fn endpoints(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn state(&self) -> ClientState {
        if self.reconnecting.load(Ordering::Acquire) {
            ClientState::Reconnecting
        } else if self.session.is_some() {
            ClientState::Authenticated
        } else {
            ClientState::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == ClientState::Authenticated
    }

    /// Login method of the stored descriptor
    pub fn login_method(&self) -> Option<LoginMethod> {
        self.login.as_ref().map(|l| l.method)
    }

    /// Run `hook` after every successful login, including re-logins
    pub fn on_after_login<F>(&mut self, hook: F)
    where
        F: Fn(&Endpoint, ClientState) + Send + Sync + 'static,
    {
        self.after_login = Some(Box::new(hook));
    }

    /// Run `hook` before each endpoint a reconnection tries
    pub fn on_before_reconnect<F>(&mut self, hook: F)
    where
        F: Fn(&Endpoint, ClientState) + Send + Sync + 'static,
    {
        self.before_reconnect = Some(Box::new(hook));
    }

    /// Log in with username and password against the pool master
    pub async fn login_with_password(
        &mut self,
        username: &str,
        password: &str,
        api_version: Option<&str>,
    ) -> XapiResult<()> {
        self.login(LoginMethod::WithPassword, login_args(username, password, api_version))
            .await
    }

    /// Emergency login against a slave host that lost its master
    pub async fn slave_local_login_with_password(
        &mut self,
        username: &str,
        password: &str,
        api_version: Option<&str>,
    ) -> XapiResult<()> {
        self.login(LoginMethod::SlaveLocal, login_args(username, password, api_version))
            .await
    }

    /// Authenticate and remember how, so the session can be re-established
    ///
    /// `HOST_IS_SLAVE` answers redirect the login to the named master. If the
    /// current endpoint cannot be reached and the pool has other members,
    /// they are tried in order.
    pub async fn login(&mut self, method: LoginMethod, args: Vec<Value>) -> XapiResult<()> {
        let login = LoginDescriptor { method, args };

        let err = match self.login_at_current(&login).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !matches!(err, XapiError::Transport(_)) || self.pool.len() < 2 {
            return Err(err);
        }

        tracing::warn!("Login to {} failed: {}; trying other endpoints", self.current, err);
        self.transport = None;
        let previous = self.login.replace(login);

        match self.reconnect().await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.login = previous;
                Err(err)
            }
            Err(e) => {
                self.login = previous;
                Err(e)
            }
        }
    }

    /// Call a namespaced method with the session token prepended
    pub async fn call(&mut self, method: &MethodName, args: &[Value]) -> XapiResult<Value> {
        self.call_raw(&method.to_string(), args).await
    }

    /// Call any method by its full wire name
    ///
    /// Recovery is bounded per call: an expired session is re-established up
    /// to `relogin_attempts` times, each transient failure kind earns
    /// `transient_retries` retries on a fresh transport, and at most one
    /// reconnection episode runs. Application errors are never retried.
    pub async fn call_raw(&mut self, method: &str, args: &[Value]) -> XapiResult<Value> {
        let mut budget = RetryBudget::from_config(&self.retry);

        loop {
            if self.session.is_none() {
                self.relogin().await?;
            }
            let session = self.session.clone().ok_or(XapiError::LoginRequired)?;

            let mut params = Vec::with_capacity(args.len() + 1);
            params.push(Value::from(session.as_str()));
            params.extend_from_slice(args);

            let err = match self.round_trip(method, &params).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.recovery(&err, &mut budget) {
                Recovery::Fail => return Err(err),
                Recovery::Retry => {
                    tracing::debug!("Retrying {} on {} after: {}", method, self.current, err);
                }
                Recovery::Relogin => {
                    tracing::info!("Session expired during {}, logging in again", method);
                    self.relogin().await?;
                }
                Recovery::Reconnect => {
                    if !budget.try_reconnect() {
                        return Err(err);
                    }
                    tracing::warn!("{} failed on {}: {}; reconnecting", method, self.current, err);
                    if !self.reconnect().await? {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Move the session to another endpoint of the pool
    ///
    /// Returns `Ok(false)` without doing anything when a reconnection is
    /// already running. Endpoints are tried in pool order, skipping the
    /// current one and any that failed during this episode.
    pub async fn reconnect(&mut self) -> XapiResult<bool> {
        let Some(_guard) = ReconnectGuard::acquire(&self.reconnecting) else {
            tracing::debug!("Reconnect already in progress");
            return Ok(false);
        };
        let login = self.login.clone().ok_or(XapiError::LoginRequired)?;

        let mut failed = vec![self.current.clone()];
        loop {
            let next = self.pool.candidates(&failed).next().cloned();
            let Some(candidate) = next else {
                break;
            };
            self.current = candidate.clone();
            self.transport = None;

            if let Some(hook) = &self.before_reconnect {
                hook(&self.current, self.state());
            }
            tracing::info!("Reconnecting to {}", self.current);

            match self.login_at_current(&login).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_fatal_config() => return Err(e),
                Err(e) => {
                    tracing::warn!("Reconnect to {} failed: {}", candidate, e);
                    if self.current != candidate && !failed.contains(&self.current) {
                        failed.push(self.current.clone());
                    }
                    failed.push(candidate);
                }
            }
        }

        self.session = None;
        self.transport = None;
        tracing::error!("No server reachable, tried {} endpoint(s)", failed.len());
        Err(XapiError::NoHostsAvailable {
            tried: failed.iter().map(ToString::to_string).collect(),
        })
    }

    /// End the session
    ///
    /// The logout call is best effort; its failures are ignored. Afterwards no
    /// session, login descriptor or cached API version remains.
    pub async fn logout(&mut self) {
        let method = self.login_method().unwrap_or(LoginMethod::WithPassword);

        if let Some(session) = self.session.take() {
            let params = [Value::from(session.as_str())];
            match self.round_trip(method.logout_rpc_name(), &params).await {
                Ok(_) => tracing::debug!("Logged out of {}", self.current),
                Err(e) => tracing::debug!("Ignoring logout failure on {}: {}", self.current, e),
            }
        }

        self.login = None;
        self.api_version = None;
    }

    /// API version of the pool master as `"major.minor"`, fetched once per session
    pub async fn api_version(&mut self) -> XapiResult<String> {
        if let Some(version) = &self.api_version {
            return Ok(version.clone());
        }

        let pool = self
            .call_raw("pool.get_all", &[])
            .await?
            .into_array()?
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::MissingReference("pool.get_all result".into()))?;
        let master = self.call_raw("pool.get_master", &[pool]).await?;
        let major = self
            .call_raw("host.get_API_version_major", &[master.clone()])
            .await?;
        let minor = self.call_raw("host.get_API_version_minor", &[master]).await?;

        let version = format!("{}.{}", major, minor);
        self.api_version = Some(version.clone());
        Ok(version)
    }

    /// Synchronous calls within a namespace
    pub fn dispatch(&mut self, namespace: impl Into<Namespace>) -> Dispatcher<'_, C> {
        Dispatcher::new(self, namespace.into())
    }

    /// Asynchronous calls within a namespace; each returns a task
    pub fn async_dispatch(&mut self, namespace: impl Into<Namespace>) -> AsyncDispatcher<'_, C> {
        AsyncDispatcher::new(self, namespace.into())
    }

    async fn relogin(&mut self) -> XapiResult<()> {
        let login = self.login.clone().ok_or(XapiError::LoginRequired)?;
        self.login_at_current(&login).await
    }

    /// Log in against the current endpoint, following master redirects
    async fn login_at_current(&mut self, login: &LoginDescriptor) -> XapiResult<()> {
        let method = login.method.rpc_name();
        let mut visited = vec![self.current.clone()];

        loop {
            tracing::debug!("Logging in to {} via {}", self.current, login.method);

            let err = match self.round_trip(&method, &login.args).await {
                Ok(token) => {
                    self.session = Some(Reference::new(token.into_string()?));
                    self.login = Some(login.clone());
                    tracing::info!("Authenticated to {}", self.current);

                    if let Some(hook) = &self.after_login {
                        hook(&self.current, self.state());
                    }
                    return Ok(());
                }
                Err(XapiError::Api(err)) if err.kind == ErrorKind::HostIsSlave => err,
                Err(err) => return Err(err),
            };

            let Some(master_host) = err.master_host() else {
                return Err(err.into());
            };
            let master = self.current.with_host(master_host)?;
            if visited.contains(&master) {
                tracing::warn!("Master redirect loop at {}", master);
                return Err(err.into());
            }

            tracing::info!("{} is a slave, redirecting login to {}", self.current, master);
            self.pool.push_front(master.clone());
            self.current = master.clone();
            self.transport = None;
            visited.push(master);
        }
    }

    /// Decide how to recover from a failed call
    fn recovery(&mut self, err: &XapiError, budget: &mut RetryBudget) -> Recovery {
        if err.is_session_invalid() {
            return if budget.try_relogin() {
                Recovery::Relogin
            } else {
                Recovery::Reconnect
            };
        }

        let XapiError::Transport(transport_err) = err else {
            return Recovery::Fail;
        };

        if let Some(class) = transport_err.retry_class() {
            self.transport = None;
            if budget.try_transient(class) {
                Recovery::Retry
            } else {
                Recovery::Reconnect
            }
        } else if transport_err.is_unreachable() {
            self.transport = None;
            Recovery::Reconnect
        } else {
            Recovery::Fail
        }
    }

    /// One call through the transport, unwrapped from its envelope
    async fn round_trip(&mut self, method: &str, params: &[Value]) -> XapiResult<Value> {
        let response = self
            .transport()?
            .call(method, params)
            .await
            .map_err(|e| match e {
                TransportError::Decode(p) => XapiError::Protocol(p),
                other => XapiError::Transport(other),
            })?;

        match Envelope::from_response(response)? {
            Envelope::Success(value) => Ok(value),
            Envelope::Failure(description) => Err(ApiError::from_description(description).into()),
        }
    }

    /// Transport for the current endpoint, binding one if needed
    fn transport(&mut self) -> Result<&C::Transport, TransportError> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                tracing::debug!("Binding transport to {}", self.current);
                self.connector.bind(&self.current)?
            }
        };
        let transport: &C::Transport = self.transport.insert(transport);
        Ok(transport)
    }
}

fn login_args(username: &str, password: &str, api_version: Option<&str>) -> Vec<Value> {
    let mut args = vec![Value::from(username), Value::from(password)];
    if let Some(version) = api_version {
        args.push(Value::from(version));
    }
    args
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use super::*;
    use crate::testing::{always_ok, endpoint, fail, ok, MockConnector};

    const LOGIN: &str = "session.login_with_password";

    fn client(uris: &[&str], connector: &MockConnector) -> SessionClient<MockConnector> {
        SessionClient::new(EndpointPool::parse(uris).unwrap(), connector.clone())
    }

    async fn logged_in(uris: &[&str], connector: &MockConnector) -> SessionClient<MockConnector> {
        let mut client = client(uris, connector);
        client.login_with_password("root", "secret", None).await.unwrap();
        client
    }

    fn recorder(client: &mut SessionClient<MockConnector>) -> Arc<Mutex<Vec<Endpoint>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_before_reconnect(move |e, _| sink.lock().unwrap().push(e.clone()));
        seen
    }

    #[tokio::test]
    async fn test_login_stores_session_and_runs_hook() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&["http://a/"], &connector);
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logins);
        client.on_after_login(move |_, state| {
            assert_eq!(state, ClientState::Authenticated);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(client.state(), ClientState::Unauthenticated);
        client
            .login_with_password("root", "secret", Some("1.2"))
            .await
            .unwrap();

        assert_eq!(client.state(), ClientState::Authenticated);
        assert_eq!(client.session().unwrap().as_str(), "OpaqueRef:session");
        assert_eq!(client.login_method(), Some(LoginMethod::WithPassword));
        assert_eq!(logins.load(Ordering::SeqCst), 1);

        let calls = connector.calls();
        assert_eq!(calls[0].method, LOGIN);
        assert_eq!(
            calls[0].params,
            vec![Value::from("root"), Value::from("secret"), Value::from("1.2")]
        );
    }

    #[tokio::test]
    async fn test_call_prepends_session() {
        let connector = MockConnector::new(always_ok);
        let mut client = logged_in(&["http://a/"], &connector).await;

        let value = client
            .call_raw("VM.get_record", &[Value::from("OpaqueRef:vm")])
            .await
            .unwrap();

        assert_eq!(value, Value::from("ok"));
        let call = connector.calls().pop().unwrap();
        assert_eq!(call.method, "VM.get_record");
        assert_eq!(
            call.params,
            vec![Value::from("OpaqueRef:session"), Value::from("OpaqueRef:vm")]
        );
    }

    #[tokio::test]
    async fn test_call_without_login_requires_login() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&["http://a/"], &connector);

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();
        assert!(matches!(err, XapiError::LoginRequired));
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn test_session_invalid_once_relogs_in_and_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let connector = MockConnector::new(move |e, method, params| match method {
            "VM.get_all" if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
                fail(&["SESSION_INVALID", "OpaqueRef:session"])
            }
            "VM.get_all" => ok(vec![Value::from("OpaqueRef:vm1")]),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/"], &connector).await;

        let value = client.call_raw("VM.get_all", &[]).await.unwrap();

        assert_eq!(value, Value::Array(vec![Value::from("OpaqueRef:vm1")]));
        assert_eq!(connector.count(LOGIN), 2);
        assert_eq!(connector.count("VM.get_all"), 2);
    }

    #[tokio::test]
    async fn test_session_invalid_always_reconnects_then_fails() {
        let connector = MockConnector::new(|e, method, params| match method {
            "VM.get_all" => fail(&["SESSION_INVALID", "OpaqueRef:session"]),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;
        let attempted = recorder(&mut client);

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();

        assert!(err.is_session_invalid());
        // initial login, two re-logins, one login during reconnection
        assert_eq!(connector.count(LOGIN), 4);
        assert_eq!(*attempted.lock().unwrap(), vec![endpoint("http://b/")]);
        assert_eq!(client.endpoint(), &endpoint("http://b/"));
        assert_eq!(connector.count("VM.get_all"), 4);
    }

    #[tokio::test]
    async fn test_session_invalid_on_single_endpoint_exhausts_pool() {
        let connector = MockConnector::new(|e, method, params| match method {
            "VM.get_all" => fail(&["SESSION_INVALID", "OpaqueRef:session"]),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/"], &connector).await;

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();

        match err {
            XapiError::NoHostsAvailable { tried } => assert_eq!(tried, vec!["http://a/"]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(connector.count(LOGIN), 3);
        assert_eq!(client.state(), ClientState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_timeout_retries_once_on_fresh_transport() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let connector = MockConnector::new(move |e, method, params| match method {
            "host.get_servertime" if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
                Err(TransportError::Timeout)
            }
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        client.call_raw("host.get_servertime", &[]).await.unwrap();

        assert_eq!(connector.count("host.get_servertime"), 2);
        assert_eq!(connector.binds(), vec![endpoint("http://a/"), endpoint("http://a/")]);
        assert_eq!(connector.count(LOGIN), 1);
        assert_eq!(client.endpoint(), &endpoint("http://a/"));
    }

    #[tokio::test]
    async fn test_repeated_end_of_stream_reconnects() {
        let connector = MockConnector::new(|e, method, params| {
            if e.host() == "a" && method == "VM.get_all" {
                Err(TransportError::EndOfStream)
            } else {
                always_ok(e, method, params)
            }
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        client.call_raw("VM.get_all", &[]).await.unwrap();

        let hosts: Vec<_> = connector
            .calls()
            .into_iter()
            .filter(|c| c.method == "VM.get_all")
            .map(|c| c.endpoint.host().to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "a", "b"]);
        assert_eq!(client.endpoint(), &endpoint("http://b/"));
    }

    #[tokio::test]
    async fn test_unreachable_host_goes_straight_to_reconnect() {
        let connector = MockConnector::new(|e, method, params| {
            if e.host() == "a" && method == "VM.get_all" {
                Err(TransportError::HostUnreachable(e.to_string()))
            } else {
                always_ok(e, method, params)
            }
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        client.call_raw("VM.get_all", &[]).await.unwrap();

        let on_a = connector
            .calls()
            .iter()
            .filter(|c| c.method == "VM.get_all" && c.endpoint.host() == "a")
            .count();
        assert_eq!(on_a, 1);
        assert_eq!(client.endpoint(), &endpoint("http://b/"));
    }

    #[tokio::test]
    async fn test_failure_after_reconnect_is_surfaced() {
        let connector = MockConnector::new(|e, method, params| match method {
            "VM.get_all" => Err(TransportError::ConnectionRefused(e.to_string())),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/", "http://c/"], &connector).await;
        let attempted = recorder(&mut client);

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();

        assert!(matches!(
            err,
            XapiError::Transport(TransportError::ConnectionRefused(_))
        ));
        assert_eq!(attempted.lock().unwrap().len(), 1);
        assert_eq!(connector.count("VM.get_all"), 2);
    }

    #[tokio::test]
    async fn test_application_error_is_not_retried() {
        let connector = MockConnector::new(|e, method, params| match method {
            "VM.start" => fail(&["VM_BAD_POWER_STATE", "OpaqueRef:vm", "halted", "running"]),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        let err = client.call_raw("VM.start", &[]).await.unwrap_err();

        let api = err.api_error().unwrap();
        assert_eq!(api.kind, ErrorKind::VmBadPowerState);
        assert_eq!(api.params, vec!["OpaqueRef:vm", "halted", "running"]);
        assert_eq!(connector.count("VM.start"), 1);
        assert_eq!(connector.count(LOGIN), 1);
    }

    #[tokio::test]
    async fn test_protocol_violation_is_fatal() {
        let connector = MockConnector::new(|e, method, params| match method {
            "VM.get_all" => Ok(Value::structure([("Value", Value::from("x"))])),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();

        assert!(matches!(
            err,
            XapiError::Protocol(ProtocolError::MissingStatusField)
        ));
        assert_eq!(connector.count("VM.get_all"), 1);
    }

    #[tokio::test]
    async fn test_reconnect_walks_pool_until_success() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("b" | "c", LOGIN) => Err(TransportError::ConnectionRefused(e.to_string())),
            _ => always_ok(e, method, params),
        });
        let mut client =
            logged_in(&["http://a/", "http://b/", "http://c/", "http://d/"], &connector).await;
        let attempted = recorder(&mut client);

        assert!(client.reconnect().await.unwrap());

        assert_eq!(client.endpoint(), &endpoint("http://d/"));
        assert_eq!(client.state(), ClientState::Authenticated);
        assert_eq!(
            *attempted.lock().unwrap(),
            vec![endpoint("http://b/"), endpoint("http://c/"), endpoint("http://d/")]
        );
    }

    #[tokio::test]
    async fn test_reconnect_without_login_requires_login() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&["http://a/", "http://b/"], &connector);

        let err = client.reconnect().await.unwrap_err();
        assert!(matches!(err, XapiError::LoginRequired));
        assert_eq!(client.state(), ClientState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_reentrant_reconnect_returns_immediately() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("a", "VM.get_all") => Err(TransportError::HostUnreachable(e.to_string())),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;
        let attempted = recorder(&mut client);

        client.reconnecting.store(true, Ordering::SeqCst);
        assert_eq!(client.state(), ClientState::Reconnecting);
        assert!(!client.reconnect().await.unwrap());

        // A call needing reconnection surfaces its own error instead
        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            XapiError::Transport(TransportError::HostUnreachable(_))
        ));

        assert!(attempted.lock().unwrap().is_empty());
        assert_eq!(connector.count(LOGIN), 1);
        assert_eq!(client.endpoint(), &endpoint("http://a/"));
    }

    #[tokio::test]
    async fn test_pool_exhaustion_clears_state_and_flag() {
        let logged_in_once = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&logged_in_once);
        let connector = MockConnector::new(move |e, method, params| match method {
            LOGIN if flag.swap(true, Ordering::SeqCst) => {
                Err(TransportError::HostUnreachable(e.to_string()))
            }
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        let err = client.reconnect().await.unwrap_err();

        match err {
            XapiError::NoHostsAvailable { tried } => {
                assert_eq!(tried, vec!["http://a/", "http://b/"])
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(client.state(), ClientState::Unauthenticated);
        assert!(client.session().is_none());

        // The flag was released, so a second episode runs again
        assert!(client.reconnect().await.is_err());
        assert_eq!(connector.count(LOGIN), 3);
    }

    #[tokio::test]
    async fn test_host_is_slave_redirects_to_master() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("slave", LOGIN) => fail(&["HOST_IS_SLAVE", "master"]),
            _ => always_ok(e, method, params),
        });
        let mut client = client(&["http://slave:8080/"], &connector);

        client.login_with_password("root", "secret", None).await.unwrap();

        assert_eq!(client.endpoint(), &endpoint("http://master:8080/"));
        let pool: Vec<_> = client.endpoints().iter().map(Endpoint::as_str).collect();
        assert_eq!(pool, vec!["http://master:8080/", "http://slave:8080/"]);
        assert!(client.is_authenticated());
        assert_eq!(
            connector.binds(),
            vec![endpoint("http://slave:8080/"), endpoint("http://master:8080/")]
        );
    }

    #[tokio::test]
    async fn test_host_is_slave_loop_is_bounded() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("a", LOGIN) => fail(&["HOST_IS_SLAVE", "b"]),
            ("b", LOGIN) => fail(&["HOST_IS_SLAVE", "a"]),
            _ => always_ok(e, method, params),
        });
        let mut client = client(&["http://a/"], &connector);

        let err = client
            .login_with_password("root", "secret", None)
            .await
            .unwrap_err();

        assert_eq!(err.api_error().unwrap().kind, ErrorKind::HostIsSlave);
        assert_eq!(connector.count(LOGIN), 2);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_initial_login_fails_over() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("a", _) => Err(TransportError::ConnectionRefused(e.to_string())),
            _ => always_ok(e, method, params),
        });
        let mut client = client(&["http://a/", "http://b/"], &connector);

        client.login_with_password("root", "secret", None).await.unwrap();

        assert_eq!(client.endpoint(), &endpoint("http://b/"));
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_failover_keeps_previous_descriptor() {
        let connector = MockConnector::new(|e, method, params| match method {
            "session.slave_local_login_with_password" => {
                Err(TransportError::HostUnreachable(e.to_string()))
            }
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        let err = client
            .slave_local_login_with_password("root", "secret", None)
            .await
            .unwrap_err();

        assert!(matches!(err, XapiError::NoHostsAvailable { .. }));
        assert_eq!(client.login_method(), Some(LoginMethod::WithPassword));

        // The earlier descriptor still drives re-authentication
        client.call_raw("VM.get_all", &[]).await.unwrap();
        assert!(client.is_authenticated());
        assert_eq!(connector.count(LOGIN), 2);
    }

    #[tokio::test]
    async fn test_hooks_observe_reconnecting_state() {
        let connector = MockConnector::new(|e, method, params| match (e.host(), method) {
            ("a", "VM.get_all") => Err(TransportError::HostUnreachable(e.to_string())),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/", "http://b/"], &connector).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let before = Arc::clone(&seen);
        client.on_before_reconnect(move |e, state| {
            before.lock().unwrap().push(("before", e.host().to_string(), state))
        });
        let after = Arc::clone(&seen);
        client.on_after_login(move |e, state| {
            after.lock().unwrap().push(("after", e.host().to_string(), state))
        });

        client.call_raw("VM.get_all", &[]).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("before", "b".to_string(), ClientState::Reconnecting),
                ("after", "b".to_string(), ClientState::Reconnecting),
            ]
        );
        assert_eq!(client.state(), ClientState::Authenticated);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_not_failed_over() {
        let connector = MockConnector::new(|e, method, params| match method {
            LOGIN => fail(&["SESSION_AUTHENTICATION_FAILED", "root", "bad password"]),
            _ => always_ok(e, method, params),
        });
        let mut client = client(&["http://a/", "http://b/"], &connector);

        let err = client
            .login_with_password("root", "wrong", None)
            .await
            .unwrap_err();

        assert_eq!(
            err.api_error().unwrap().kind,
            ErrorKind::SessionAuthenticationFailed
        );
        assert_eq!(connector.count(LOGIN), 1);
        assert!(client.login_method().is_none());
    }

    #[tokio::test]
    async fn test_slave_local_logout_uses_local_logout() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&["http://a/"], &connector);
        client
            .slave_local_login_with_password("root", "secret", None)
            .await
            .unwrap();
        assert_eq!(connector.calls()[0].method, "session.slave_local_login_with_password");

        client.logout().await;

        let call = connector.calls().pop().unwrap();
        assert_eq!(call.method, "session.local_logout");
        assert_eq!(call.params, vec![Value::from("OpaqueRef:session")]);
        assert_eq!(client.state(), ClientState::Unauthenticated);
        assert!(client.login_method().is_none());

        let err = client.call_raw("VM.get_all", &[]).await.unwrap_err();
        assert!(matches!(err, XapiError::LoginRequired));
    }

    #[tokio::test]
    async fn test_logout_failure_is_swallowed() {
        let connector = MockConnector::new(|e, method, params| match method {
            "session.logout" => Err(TransportError::Timeout),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/"], &connector).await;

        client.logout().await;

        assert_eq!(connector.count("session.logout"), 1);
        assert!(client.session().is_none());
        assert!(client.login_method().is_none());
    }

    #[tokio::test]
    async fn test_api_version_is_cached_until_logout() {
        let connector = MockConnector::new(|e, method, params| match method {
            "pool.get_all" => ok(vec![Value::from("OpaqueRef:pool")]),
            "pool.get_master" => ok("OpaqueRef:host"),
            "host.get_API_version_major" => ok(2_i64),
            "host.get_API_version_minor" => ok(21_i64),
            _ => always_ok(e, method, params),
        });
        let mut client = logged_in(&["http://a/"], &connector).await;

        assert_eq!(client.api_version().await.unwrap(), "2.21");
        assert_eq!(client.api_version().await.unwrap(), "2.21");
        assert_eq!(connector.count("pool.get_all"), 1);

        let master = connector
            .calls()
            .into_iter()
            .find(|c| c.method == "host.get_API_version_major")
            .unwrap();
        assert_eq!(master.params[1], Value::from("OpaqueRef:host"));

        client.logout().await;
        client.login_with_password("root", "secret", None).await.unwrap();
        client.api_version().await.unwrap();
        assert_eq!(connector.count("pool.get_all"), 2);
    }
}
