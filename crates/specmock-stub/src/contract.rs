//! Contract documents: named types plus the operations a service exposes.
//!
//! A contract is YAML or JSON:
//!
//! ```yaml
//! types:
//!   Item: { id: "(number)", name: "(string)", "tag?": "(string)" }
//! operations:
//!   - id: getItem
//!     method: GET
//!     path: /items/(id:number)
//!     request:
//!       headers: { "X-Trace?": "(string)" }
//!     response:
//!       status: 200
//!       body: "(Item)"
//! ```
//!
//! Every string in a template may be a type token; see
//! [`Pattern::from_template`].

use crate::error::ContractError;
use crate::http::check_header;
use crate::pattern::{text_constraints, HttpRequestPattern, HttpResponsePattern, PathPattern};
use indexmap::IndexMap;
use serde::Deserialize;
use specmock_core::{Pattern, Resolver};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContractDocument {
    #[serde(default)]
    types: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    operations: Vec<OperationDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperationDocument {
    #[serde(default)]
    id: Option<String>,
    method: String,
    path: String,
    #[serde(default)]
    request: RequestDocument,
    response: ResponseDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestDocument {
    #[serde(default)]
    headers: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    query: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseDocument {
    status: u16,
    #[serde(default)]
    headers: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

/// One declared request/response pair.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    /// Contract the operation was declared in.
    pub source: String,
    pub request: HttpRequestPattern,
    pub response: HttpResponsePattern,
}

/// A set of operations sharing one type registry.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    types: IndexMap<String, Pattern>,
    operations: Vec<Operation>,
    resolver: Resolver,
}

impl Contract {
    /// A contract with no types and no operations. Stubs are not validated
    /// against it and nothing can be generated from it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a contract document. `source` names it in diagnostics.
    pub fn parse(source: &str, text: &str) -> Result<Self, ContractError> {
        let document: ContractDocument = if source.ends_with(".json") {
            serde_json::from_str(text).map_err(|e| ContractError::Parse(format!("{source}: {e}")))?
        } else {
            serde_yaml::from_str(text).map_err(|e| ContractError::Parse(format!("{source}: {e}")))?
        };

        let mut types = IndexMap::new();
        for (name, template) in &document.types {
            let name = specmock_core::type_name_of(name).to_string();
            let pattern = match Pattern::from_template(template)? {
                Pattern::ObjectOf(object) => Pattern::ObjectOf(object.with_alias(name.clone())),
                other => other,
            };
            if types.insert(name.clone(), pattern).is_some() {
                return Err(ContractError::DuplicateType(name));
            }
        }

        let operations = document
            .operations
            .iter()
            .map(|op| build_operation(source, op))
            .collect::<Result<Vec<_>, _>>()?;

        let contract = Self::assemble(types, operations);
        contract.check()?;
        debug!(
            source,
            types = contract.types.len(),
            operations = contract.operations.len(),
            "Parsed contract"
        );
        Ok(contract)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ContractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&path.display().to_string(), &text)
    }

    /// Load several contracts into one; type names must be unique across them.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ContractError> {
        let mut merged = Self::empty();
        for path in paths {
            let contract = Self::from_file(path)?;
            info!(
                path = %path.as_ref().display(),
                operations = contract.operations.len(),
                "Loaded contract"
            );
            merged = merged.merge(contract)?;
        }
        Ok(merged)
    }

    pub fn merge(self, other: Contract) -> Result<Self, ContractError> {
        let mut types = self.types;
        for (name, pattern) in other.types {
            if types.contains_key(&name) {
                return Err(ContractError::DuplicateType(name));
            }
            types.insert(name, pattern);
        }
        let mut operations = self.operations;
        operations.extend(other.operations);
        Ok(Self::assemble(types, operations))
    }

    fn assemble(types: IndexMap<String, Pattern>, operations: Vec<Operation>) -> Self {
        let resolver = Resolver::with_patterns(types.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            types,
            operations,
            resolver,
        }
    }

    /// Every referenced type must exist and every response must be
    /// producible.
    fn check(&self) -> Result<(), ContractError> {
        for operation in &self.operations {
            operation
                .response
                .generate(&self.resolver)
                .map_err(|e| ContractError::InvalidOperation {
                    operation: operation.id.clone(),
                    reason: e.to_string(),
                })?;
            operation
                .request
                .body
                .generate(&self.resolver)
                .map_err(|e| ContractError::InvalidOperation {
                    operation: operation.id.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

fn build_operation(source: &str, op: &OperationDocument) -> Result<Operation, ContractError> {
    let id = op
        .id
        .clone()
        .unwrap_or_else(|| format!("{} {}", op.method.to_ascii_uppercase(), op.path));
    let invalid = |reason: String| ContractError::InvalidOperation {
        operation: id.clone(),
        reason,
    };

    if !op.path.starts_with('/') {
        return Err(invalid(format!("path '{}' must start with '/'", op.path)));
    }
    if op.method.trim().is_empty() {
        return Err(invalid("method is empty".to_string()));
    }
    if !(100..=599).contains(&op.response.status) {
        return Err(invalid(format!("invalid status {}", op.response.status)));
    }

    for (key, value) in &op.response.headers {
        let name = key.strip_suffix('?').unwrap_or(key);
        let text = match value {
            serde_json::Value::String(text) if Pattern::is_token(text) => String::new(),
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        check_header(name, &text).map_err(&invalid)?;
    }

    let mut request = HttpRequestPattern::new(&op.method, PathPattern::parse(&op.path)?)
        .with_headers(text_constraints(&op.request.headers, true)?)
        .with_query(text_constraints(&op.request.query, false)?);
    if let Some(body) = &op.request.body {
        request = request.with_body(Pattern::from_template(body)?);
    }

    let mut response = HttpResponsePattern::new(op.response.status)
        .with_headers(text_constraints(&op.response.headers, true)?);
    if let Some(body) = &op.response.body {
        response = response.with_body(Pattern::from_template(body)?);
    }

    Ok(Operation {
        id,
        source: source.to_string(),
        request,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use specmock_core::Value;

    const ITEMS: &str = r#"
types:
  Item:
    id: "(number)"
    name: "(string)"
    "tag?": "(string)"
operations:
  - id: getItem
    method: GET
    path: /items/(id:number)
    response:
      status: 200
      body: "(Item)"
  - method: POST
    path: /items
    request:
      body: "(Item)"
    response:
      status: 201
"#;

    #[test]
    fn test_parse_yaml_contract() {
        let contract = Contract::parse("items.yaml", ITEMS).unwrap();
        assert_eq!(contract.operations().len(), 2);
        assert_eq!(contract.operations()[0].id, "getItem");
        assert_eq!(contract.operations()[1].id, "POST /items");
        assert_eq!(contract.type_names().collect::<Vec<_>>(), vec!["Item"]);

        let op = &contract.operations()[0];
        let request = HttpRequest::new("GET", "/items/7");
        assert!(op.request.matches(&request, contract.resolver()).unwrap().is_success());

        let response = op.response.generate(contract.resolver()).unwrap();
        assert!(response.body.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn test_request_body_uses_named_type() {
        let contract = Contract::parse("items.yaml", ITEMS).unwrap();
        let op = &contract.operations()[1];
        let bad = HttpRequest::new("POST", "/items")
            .with_body(Value::from(serde_json::json!({"id": "one", "name": "x"})));
        let result = op.request.matches(&bad, contract.resolver()).unwrap();
        assert_eq!(result.entries()[0].breadcrumb, "REQUEST.BODY.id");
    }

    #[test]
    fn test_undefined_type_is_rejected_at_load() {
        let text = r#"
operations:
  - method: GET
    path: /things
    response:
      status: 200
      body: "(Thing)"
"#;
        let err = Contract::parse("things.yaml", text).unwrap_err();
        assert!(matches!(err, ContractError::InvalidOperation { .. }));
        assert!(err.to_string().contains("(Thing)"));
    }

    #[test]
    fn test_duplicate_types_across_contracts() {
        let a = Contract::parse("a.yaml", "types:\n  Item: \"(string)\"\n").unwrap();
        let b = Contract::parse("b.yaml", "types:\n  Item: \"(number)\"\n").unwrap();
        assert!(matches!(a.merge(b), Err(ContractError::DuplicateType(name)) if name == "Item"));
    }

    #[test]
    fn test_unsendable_response_header_is_rejected() {
        let text = r#"
operations:
  - method: GET
    path: /things
    response:
      status: 200
      headers: { "X-Bad": "a\nb" }
"#;
        let err = Contract::parse("things.yaml", text).unwrap_err();
        assert!(matches!(err, ContractError::InvalidOperation { .. }));
        assert!(err.to_string().contains("X-Bad"), "{err}");

        let tokens = "operations:\n  - method: GET\n    path: /things\n    response:\n      status: 200\n      headers: { \"X-Id?\": \"(uuid)\" }\n";
        assert!(Contract::parse("things.yaml", tokens).is_ok());
    }

    #[test]
    fn test_json_contract_and_bad_path() {
        let text = r#"{"operations": [{"method": "GET", "path": "items", "response": {"status": 200}}]}"#;
        let err = Contract::parse("c.json", text).unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }
}
