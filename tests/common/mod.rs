//! In-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bugtracker::config::Config;
use bugtracker::http::{FetchError, Transport};
use bugtracker::traits::BackendRegistry;

/// Canned responses keyed by URL. Unknown URLs fail like an unreachable
/// host; every request is recorded so tests can assert on the call order.
#[derive(Default)]
pub struct MockTransport {
    responses: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), (200, body.to_string()));
        self
    }

    pub fn status(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses.insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Requests made so far, as `"GET <url>"` / `"POST <url>"`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(&self, method: &str, url: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(format!("{} {}", method, url));
        match self.responses.get(url) {
            Some((200, body)) => Ok(body.clone()),
            Some((status, body)) => Err(FetchError::Status {
                status: *status,
                body: body.clone(),
            }),
            None => Err(FetchError::Transport(format!("no route to {}", url))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.answer("GET", url)
    }

    async fn post(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        _body: String,
    ) -> Result<String, FetchError> {
        self.answer("POST", url)
    }
}

/// Registry over `transport` with the given config.
pub fn registry_with(config: &Config, transport: &Arc<MockTransport>) -> BackendRegistry {
    let transport: Arc<dyn Transport> = transport.clone();
    BackendRegistry::from_config_with_transport(config, transport)
}

/// Registry over `transport` with default config.
pub fn registry(transport: &Arc<MockTransport>) -> BackendRegistry {
    registry_with(&Config::default(), transport)
}

/// Wrap a SOAP result element in a response envelope.
pub fn soap_response(method: &str, result: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<soap:Body><{m}Response>{r}</{m}Response></soap:Body></soap:Envelope>"#
        ),
        m = method,
        r = result
    )
}

pub fn soap_fault(message: &str) -> String {
    format!(
        concat!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<soap:Body><soap:Fault><faultcode>SOAP-ENV:Client</faultcode>"#,
            r#"<faultstring>{}</faultstring></soap:Fault></soap:Body></soap:Envelope>"#
        ),
        message
    )
}
