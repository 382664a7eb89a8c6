//! Transport envelope: opaque payload plus routing metadata.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Routing attributes of a message or the filter of an endpoint.
///
/// Keys are unique; insertion order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingHeaders(BTreeMap<String, String>);

impl RoutingHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when at least one entry of `self` is present in `other` with an
    /// equal value. Two empty header sets never match.
    pub fn accepts(&self, other: &RoutingHeaders) -> bool {
        self.iter().any(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K, V> FromIterator<(K, V)> for RoutingHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A message as carried by a pipeline.
///
/// The body is opaque to the transport; `Bytes` keeps fan-out to several
/// endpoints a reference-count bump instead of a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMessage {
    message_type: String,
    body: Bytes,
    routing_headers: RoutingHeaders,
}

impl EndpointMessage {
    pub fn new(message_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            message_type: message_type.into(),
            body: body.into(),
            routing_headers: RoutingHeaders::new(),
        }
    }

    pub fn with_routing_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.routing_headers.insert(key, value);
        self
    }

    pub fn with_routing_headers(mut self, headers: RoutingHeaders) -> Self {
        self.routing_headers = headers;
        self
    }

    /// Contract name of the payload.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn routing_headers(&self) -> &RoutingHeaders {
        &self.routing_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_on_any_single_matching_entry() {
        let endpoint = RoutingHeaders::new().with("tenant", "A");
        let message = RoutingHeaders::new().with("tenant", "A").with("kind", "X");
        assert!(endpoint.accepts(&message));
    }

    #[test]
    fn rejects_same_key_with_other_value() {
        let endpoint = RoutingHeaders::new().with("tenant", "A");
        let message = RoutingHeaders::new().with("tenant", "B");
        assert!(!endpoint.accepts(&message));
    }

    #[test]
    fn one_match_is_enough_even_if_other_keys_differ() {
        let endpoint = RoutingHeaders::new().with("tenant", "A").with("kind", "Y");
        let message = RoutingHeaders::new().with("tenant", "B").with("kind", "Y");
        assert!(endpoint.accepts(&message));
    }

    #[test]
    fn empty_headers_never_match() {
        let endpoint = RoutingHeaders::new();
        let message = RoutingHeaders::new().with("tenant", "A");
        assert!(!endpoint.accepts(&message));
        assert!(!message.accepts(&RoutingHeaders::new()));
    }
}
