//! Scripted in-memory transport for unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use xr_core::{Connector, Endpoint, Transport, TransportError};
use xr_protocol::{Envelope, Value};

type Handler = dyn Fn(&Endpoint, &str, &[Value]) -> Result<Value, TransportError> + Send + Sync;

/// One call observed by a [`MockTransport`]
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub endpoint: Endpoint,
    pub method: String,
    pub params: Vec<Value>,
}

struct MockState {
    handler: Box<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    binds: Mutex<Vec<Endpoint>>,
}

/// Connector whose transports answer through a closure
#[derive(Clone)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Endpoint, &str, &[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(MockState {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
                binds: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Number of calls made to `method`
    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn binds(&self) -> Vec<Endpoint> {
        self.state.binds.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn bind(&self, endpoint: &Endpoint) -> Result<MockTransport, TransportError> {
        self.state.binds.lock().unwrap().push(endpoint.clone());
        Ok(MockTransport {
            endpoint: endpoint.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct MockTransport {
    endpoint: Endpoint,
    state: Arc<MockState>,
}

#[async_trait]
impl Transport for MockTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        self.state.calls.lock().unwrap().push(RecordedCall {
            endpoint: self.endpoint.clone(),
            method: method.to_string(),
            params: params.to_vec(),
        });
        (self.state.handler)(&self.endpoint, method, params)
    }
}

/// Successful response envelope
pub(crate) fn ok(value: impl Into<Value>) -> Result<Value, TransportError> {
    Ok(Envelope::Success(value.into()).into_value())
}

/// Failure response envelope
pub(crate) fn fail(description: &[&str]) -> Result<Value, TransportError> {
    Ok(Envelope::failure(description.iter().copied()).into_value())
}

/// Handler answering logins with a session token and everything else with `"ok"`
pub(crate) fn always_ok(_: &Endpoint, method: &str, _: &[Value]) -> Result<Value, TransportError> {
    if method.starts_with("session.") && method.contains("login") {
        ok("OpaqueRef:session")
    } else {
        ok("ok")
    }
}

pub(crate) fn endpoint(uri: &str) -> Endpoint {
    Endpoint::parse(uri).unwrap()
}
