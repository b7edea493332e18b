//! Minimal SOAP 1.1 client: one endpoint, one namespace, string parameters.
//!
//! Debbugs and legacy Mantis only ever need a single RPC each, so this is
//! deliberately narrow: build an envelope, POST it through the shared
//! [`Transport`], and hand back the result element as an [`XmlNode`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quick_xml::escape::escape;
use thiserror::Error;

use crate::http::{FetchError, Transport};
use crate::xml::{XmlError, XmlNode};

#[derive(Debug, Error)]
pub enum SoapError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("SOAP fault: {0}")]
    Fault(String),
    #[error("malformed SOAP response: {0}")]
    Malformed(String),
}

impl From<XmlError> for SoapError {
    fn from(e: XmlError) -> Self {
        SoapError::Malformed(e.to_string())
    }
}

/// A SOAP client bound to one endpoint and namespace.
#[derive(Debug, Clone)]
pub struct SoapClient {
    endpoint: String,
    namespace: String,
}

impl SoapClient {
    pub fn new(endpoint: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Render the request envelope for `method(params...)`.
    pub fn envelope(&self, method: &str, params: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in params {
            body.push_str(&format!("<{0}>{1}</{0}>", name, escape(*value)));
        }
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" "#,
                r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
                r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
                r#"<soap:Body><{method} xmlns="{ns}">{body}</{method}></soap:Body>"#,
                r#"</soap:Envelope>"#
            ),
            method = method,
            ns = escape(self.namespace.as_str()),
            body = body,
        )
    }

    /// Invoke `method` and return the first child of the response element.
    ///
    /// A response element with no children yields an empty node, so callers
    /// can tell "nothing came back" apart from a transport failure.
    pub async fn call(
        &self,
        transport: &dyn Transport,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<XmlNode, SoapError> {
        let action = format!("\"{}#{}\"", self.namespace, method);
        let headers = [
            ("Content-Type", "text/xml; charset=utf-8"),
            ("SOAPAction", action.as_str()),
        ];
        let raw = match transport
            .post(&self.endpoint, &headers, self.envelope(method, params))
            .await
        {
            Ok(raw) => raw,
            // Faults usually arrive with HTTP 500.
            Err(FetchError::Status { status, body }) => {
                if let Some(fault) = fault_string(&body) {
                    return Err(SoapError::Fault(fault));
                }
                return Err(SoapError::Fetch(FetchError::Status { status, body }));
            }
            Err(e) => return Err(e.into()),
        };
        parse_response(&raw)
    }
}

/// Extract the result element from a response envelope.
pub fn parse_response(raw: &str) -> Result<XmlNode, SoapError> {
    let envelope = XmlNode::parse(raw)?;
    let body = envelope
        .child("Body")
        .ok_or_else(|| SoapError::Malformed("missing Body".to_string()))?;
    if let Some(fault) = body.child("Fault") {
        return Err(SoapError::Fault(fault_text(fault)));
    }
    let response = body
        .children
        .first()
        .ok_or_else(|| SoapError::Malformed("empty Body".to_string()))?;
    Ok(response.children.first().cloned().unwrap_or_default())
}

fn fault_string(raw: &str) -> Option<String> {
    let envelope = XmlNode::parse(raw).ok()?;
    envelope.descendant("Fault").map(fault_text)
}

fn fault_text(fault: &XmlNode) -> String {
    fault
        .child("faultstring")
        .map(|f| f.text().to_string())
        .unwrap_or_else(|| "unknown fault".to_string())
}

/// Lazily created SOAP clients, one per tracker base URL.
///
/// A client is built the first time an identity needs it and reused for
/// every later call against the same base URL; clients are never shared
/// between different base URLs.
pub struct SoapSessions {
    path: &'static str,
    namespace: &'static str,
    clients: Mutex<HashMap<String, Arc<SoapClient>>>,
}

impl SoapSessions {
    /// `path` is appended to the tracker base URL to form the endpoint.
    pub fn new(path: &'static str, namespace: &'static str) -> Self {
        Self {
            path,
            namespace,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn client_for(&self, base_url: &str) -> Arc<SoapClient> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(base_url.to_string())
            .or_insert_with(|| {
                Arc::new(SoapClient::new(
                    format!("{}{}", base_url, self.path),
                    self.namespace,
                ))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_escapes_parameters() {
        let client = SoapClient::new("https://bugs.debian.org/cgi-bin/soap.cgi", "Debbugs/SOAP");
        let env = client.envelope("get_status", &[("bugs", "1<2")]);
        assert!(env.contains(r#"<get_status xmlns="Debbugs/SOAP"><bugs>1&lt;2</bugs></get_status>"#));
    }

    #[test]
    fn response_yields_first_result_child() {
        let raw = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
<soap:Body><get_statusResponse xmlns="Debbugs/SOAP"><s-gensym3><item><key>7</key></item></s-gensym3></get_statusResponse></soap:Body>
</soap:Envelope>"#;
        let result = parse_response(raw).unwrap();
        assert_eq!(result.name, "s-gensym3");
        assert!(result.child("item").is_some());
    }

    #[test]
    fn empty_response_element_gives_empty_node() {
        let raw = r#"<Envelope><Body><get_statusResponse/></Body></Envelope>"#;
        let result = parse_response(raw).unwrap();
        assert!(result.child("item").is_none());
    }

    #[test]
    fn fault_is_reported() {
        let raw = r#"<Envelope><Body><Fault><faultcode>Client</faultcode><faultstring>Issue #9 not found.</faultstring></Fault></Body></Envelope>"#;
        match parse_response(raw) {
            Err(SoapError::Fault(msg)) => assert_eq!(msg, "Issue #9 not found."),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn sessions_are_per_base_url() {
        let sessions = SoapSessions::new("/cgi-bin/soap.cgi", "Debbugs/SOAP");
        let a = sessions.client_for("https://bugs.debian.org");
        let b = sessions.client_for("https://bugs.debian.org");
        let c = sessions.client_for("https://debbugs.gnu.org");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.endpoint(), "https://debbugs.gnu.org/cgi-bin/soap.cgi");
    }
}
