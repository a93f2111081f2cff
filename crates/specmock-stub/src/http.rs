//! HTTP request/response values as seen by the matching engine.
//!
//! Bodies are parsed once, at the edge, into [`Value`]s: JSON bodies become
//! JSON-shaped values, XML bodies become [`XmlNode`]s (via `sxd-document`),
//! anything else stays text. Header names are stored lowercased.

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde_json::json;
use specmock_core::{Value, XmlContent, XmlNode};

pub const CONTENT_TYPE: &str = "content-type";

/// An incoming (or stub-declared) request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: IndexMap<String, String>,
    pub headers: IndexMap<String, String>,
    pub body: Value,
}

/// A response to send, or one declared by a stub.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Value,
}

impl HttpRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Build a request from raw parts as received on the wire.
    pub fn from_parts<'a>(
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: &[u8],
    ) -> Self {
        let headers: IndexMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        let content_type = headers.get(CONTENT_TYPE).map(String::as_str);
        let body = parse_body(content_type, body);
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: query.map(parse_query).unwrap_or_default(),
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the request declared an XML content type.
    pub fn is_xml(&self) -> bool {
        self.header(CONTENT_TYPE).is_some_and(is_xml_content_type)
    }

    /// Path segments without empty pieces; `/items/10/` → `["items", "10"]`.
    pub fn path_segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "method": self.method,
            "path": self.path,
            "query": self.query,
            "headers": self.headers,
            "body": self.body.to_json(),
        })
    }
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: Value::Null,
        }
    }

    /// A JSON response with `Content-Type: application/json`.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(Value::from(body))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the body, returning it with the content type it implies.
    ///
    /// An explicit `Content-Type` header wins over the inferred one.
    pub fn render_body(&self) -> (Option<String>, Bytes) {
        let (inferred, bytes) = match &self.body {
            Value::Null => (None, Bytes::new()),
            Value::String(text) => (Some("text/plain"), Bytes::from(text.clone())),
            Value::Xml(node) => (Some("application/xml"), Bytes::from(node.to_xml_string())),
            other => (
                Some("application/json"),
                Bytes::from(other.to_json().to_string()),
            ),
        };
        let content_type = self
            .header(CONTENT_TYPE)
            .map(str::to_string)
            .or_else(|| inferred.map(str::to_string));
        (content_type, bytes)
    }

    /// Re-shape a JSON-like body as XML, leaving text and XML bodies alone.
    /// Bodies with keys that cannot be XML names stay JSON.
    pub fn soft_cast_to_xml(mut self) -> Self {
        if matches!(self.body, Value::Object(_) | Value::Array(_)) && has_xml_names(&self.body) {
            self.body = Value::Xml(value_to_xml(&self.body));
            self.headers.retain(|k, _| !k.eq_ignore_ascii_case(CONTENT_TYPE));
            self.headers
                .insert("Content-Type".to_string(), "application/xml".to_string());
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body.to_json(),
        })
    }
}

pub fn is_xml_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media.ends_with("/xml") || media.ends_with("+xml")
}

fn is_json_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media.ends_with("/json") || media.ends_with("+json")
}

/// Parse a body according to its content type.
///
/// Without a content type, JSON is tried first, then XML, then plain text.
/// An empty body is [`Value::Null`].
pub fn parse_body(content_type: Option<&str>, bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    let text = String::from_utf8_lossy(bytes);
    let parse_json = || {
        serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .map(Value::from)
    };
    let parsed = match content_type {
        Some(ct) if is_xml_content_type(ct) => parse_xml(&text).map(Value::Xml),
        Some(ct) if is_json_content_type(ct) => parse_json(),
        _ => parse_json().or_else(|| {
            text.trim_start()
                .starts_with('<')
                .then(|| parse_xml(&text).map(Value::Xml))
                .flatten()
        }),
    };
    parsed.unwrap_or_else(|| Value::String(text.into_owned()))
}

/// Parse an XML document into its root element.
pub fn parse_xml(text: &str) -> Option<XmlNode> {
    use sxd_document::dom::ChildOfRoot;
    use sxd_document::parser;

    let package = parser::parse(text).ok()?;
    let document = package.as_document();
    let root = document.root().children().into_iter().find_map(|child| match child {
        ChildOfRoot::Element(element) => Some(element),
        _ => None,
    })?;
    Some(element_to_node(root))
}

fn element_to_node(element: sxd_document::dom::Element<'_>) -> XmlNode {
    use sxd_document::dom::ChildOfElement;

    let mut node = XmlNode::new(element.name().local_part());
    for attribute in element.attributes() {
        node = node.with_attribute(attribute.name().local_part(), attribute.value());
    }
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => node.children.push(XmlContent::Element(element_to_node(e))),
            ChildOfElement::Text(t) if !t.text().trim().is_empty() => {
                node.children.push(XmlContent::Text(t.text().to_string()));
            }
            _ => {}
        }
    }
    node
}

/// Convert a JSON-shaped value to XML.
///
/// A single-key object names the root element; otherwise the root is
/// `<root>`. Arrays repeat their parent element (or `<item>` at the top
/// level) and keys starting with `@` become attributes.
pub fn value_to_xml(value: &Value) -> XmlNode {
    match value {
        Value::Object(map) if map.len() == 1 => match map.first() {
            Some((name, inner @ Value::Array(_))) => fill_element(XmlNode::new("root"), name, inner),
            Some((name, inner)) => fill(XmlNode::new(name.as_str()), inner),
            None => XmlNode::new("root"),
        },
        Value::Array(_) => fill_element(XmlNode::new("root"), "item", value),
        other => fill(XmlNode::new("root"), other),
    }
}

/// Whether every object key in `value` can be used as an XML element or
/// attribute name.
pub fn has_xml_names(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().all(|(key, child)| {
            is_xml_name(key.strip_prefix('@').unwrap_or(key)) && has_xml_names(child)
        }),
        Value::Array(items) => items.iter().all(has_xml_names),
        _ => true,
    }
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

/// Check that a header can be sent as-is.
pub fn check_header(name: &str, value: &str) -> Result<(), String> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| format!("invalid header name '{name}'"))?;
    HeaderValue::from_str(value).map_err(|_| format!("invalid value for header '{name}': {value:?}"))?;
    Ok(())
}

fn fill(mut node: XmlNode, value: &Value) -> XmlNode {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                if let Some(attribute) = key.strip_prefix('@') {
                    node = node.with_attribute(attribute, scalar_text(child));
                } else {
                    node = fill_element(node, key, child);
                }
            }
        }
        Value::Array(_) => node = fill_element(node, "item", value),
        Value::Xml(inner) => node = node.with_child(inner.clone()),
        scalar => node = node.with_text(scalar_text(scalar)),
    }
    node
}

fn fill_element(mut parent: XmlNode, name: &str, value: &Value) -> XmlNode {
    match value {
        Value::Array(items) => {
            for item in items {
                parent = parent.with_child(fill(XmlNode::new(name), item));
            }
        }
        other => parent = parent.with_child(fill(XmlNode::new(name), other)),
    }
    parent
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode a query string into an ordered map; repeated keys keep the last value.
pub fn parse_query(query: &str) -> IndexMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(text: &str) -> String {
    let spaced = text.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_decodes() {
        let query = parse_query("name=John%20Doe&tag=a+b&flag");
        assert_eq!(query["name"], "John Doe");
        assert_eq!(query["tag"], "a b");
        assert_eq!(query["flag"], "");
    }

    #[test]
    fn test_parse_body_by_content_type() {
        let json = parse_body(Some("application/json"), br#"{"id": 1}"#);
        assert_eq!(json, Value::from(serde_json::json!({"id": 1})));

        let xml = parse_body(Some("text/xml; charset=utf-8"), b"<pet><id>1</id></pet>");
        let Value::Xml(node) = xml else {
            panic!("expected xml, got {xml:?}");
        };
        assert_eq!(node.name, "pet");
        assert_eq!(node.elements().next().map(XmlNode::text), Some("1".to_string()));

        assert_eq!(parse_body(None, b"plain words"), Value::from("plain words"));
        assert_eq!(parse_body(None, b"  "), Value::Null);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let request = HttpRequest::from_parts(
            "get",
            "/items/1",
            Some("a=1"),
            [("X-Flag", "1"), ("Content-Type", "text/xml")],
            b"",
        );
        assert_eq!(request.method, "GET");
        assert_eq!(request.header("x-flag"), Some("1"));
        assert!(request.is_xml());
        assert_eq!(request.path_segments(), vec!["items", "1"]);
    }

    #[test]
    fn test_soft_cast_single_key_object() {
        let response = HttpResponse::json(200, serde_json::json!({"pet": {"id": 1, "tags": ["a", "b"]}}))
            .soft_cast_to_xml();
        assert_eq!(response.header("content-type"), Some("application/xml"));
        let Value::Xml(node) = &response.body else {
            panic!("expected xml body");
        };
        assert_eq!(
            node.to_xml_string(),
            "<pet><id>1</id><tags>a</tags><tags>b</tags></pet>"
        );
    }

    #[test]
    fn test_soft_cast_leaves_text_alone() {
        let response = HttpResponse::new(200).with_body("hello").soft_cast_to_xml();
        assert_eq!(response.body, Value::from("hello"));
    }

    #[test]
    fn test_soft_cast_keeps_json_for_bad_element_names() {
        for body in [
            serde_json::json!({"first name": "Ada"}),
            serde_json::json!({"person": {"1abc": 1}}),
            serde_json::json!([{"@bad attr": "x"}]),
        ] {
            let response = HttpResponse::json(200, body.clone()).soft_cast_to_xml();
            assert_eq!(response.header("content-type"), Some("application/json"));
            assert_eq!(response.body, Value::from(body));
        }
        assert!(has_xml_names(&Value::from(serde_json::json!({"ns:item": {"@id": 1, "x-y.z": 2}}))));
    }

    #[test]
    fn test_check_header() {
        assert!(check_header("X-Trace", "abc").is_ok());
        assert!(check_header("X-Bad", "a\nb").is_err());
        assert!(check_header("Bad Name", "x").is_err());
    }

    #[test]
    fn test_render_body_infers_content_type() {
        let (ct, bytes) = HttpResponse::new(200)
            .with_body(Value::from(serde_json::json!([1, 2])))
            .render_body();
        assert_eq!(ct.as_deref(), Some("application/json"));
        assert_eq!(&bytes[..], b"[1,2]");

        let (ct, bytes) = HttpResponse::new(204).render_body();
        assert_eq!(ct, None);
        assert!(bytes.is_empty());
    }
}
