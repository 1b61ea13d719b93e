//! Mapping between domain values and the documents the API server accepts.

use crate::api::error::Error;
use serde_json::{json, Value};

/// An open string keyed map, used for metadata, status and parameters.
pub type Fields = serde_json::Map<String, Value>;

pub const GROUP: &str = "ml.intel.com";
pub const VERSION: &str = "v1";

/// `apiVersion` of the experiment custom resources.
pub fn api_version() -> String {
    format!("{}/{}", GROUP, VERSION)
}

/// A namespaced object that can be sent to and read from the API server.
pub trait Resource: Sized {
    /// Path prefix of the API group, relative to the server root.
    const API_PATH: &'static str;
    const KIND: &'static str;
    const PLURAL: &'static str;

    fn name(&self) -> &str;

    /// Build the wire document from the current state.
    fn to_body(&self) -> Value;

    fn from_body(body: Value) -> Result<Self, Error>;
}

/// Owner reference pointing at an experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub name: String,
    pub uid: String,
}

impl OwnerReference {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        OwnerReference {
            name: name.into(),
            uid: uid.into(),
        }
    }

    pub(crate) fn to_value(&self, block_owner_deletion: bool) -> Value {
        let mut reference = json!({
            "apiVersion": api_version(),
            "controller": true,
            "kind": "Experiment",
            "name": self.name,
            "uid": self.uid,
        });
        if block_owner_deletion {
            reference["blockOwnerDeletion"] = Value::Bool(true);
        }
        reference
    }

    /// Read the first entry of `metadata.ownerReferences`.
    pub(crate) fn from_meta(kind: &'static str, meta: &Fields) -> Result<Self, Error> {
        let first = meta
            .get("ownerReferences")
            .and_then(Value::as_array)
            .and_then(|references| references.first())
            .ok_or_else(|| Error::malformed(kind, "metadata.ownerReferences is missing or empty"))?;
        let field = |key: &str| {
            first
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| Error::malformed(kind, format!("owner reference has no {}", key)))
        };
        Ok(OwnerReference {
            name: field("name")?,
            uid: field("uid")?,
        })
    }
}

/// The parts every document shares, taken apart.
pub(crate) struct Document {
    pub name: String,
    pub meta: Fields,
    pub spec: Fields,
    pub status: Fields,
}

impl Document {
    /// Split a wire document, tolerating missing `spec` and `status`.
    ///
    /// A `kind` that is present must match `kind`; list items usually omit it.
    pub fn parse(kind: &'static str, body: Value) -> Result<Self, Error> {
        let mut body = match body {
            Value::Object(body) => body,
            other => {
                return Err(Error::malformed(kind, format!("expected an object, found {}", other)))
            }
        };
        match body.get("kind").and_then(Value::as_str) {
            Some(found) if found != kind => {
                return Err(Error::InvalidArgument(format!(
                    "expected a {} document, found {}",
                    kind, found
                )))
            }
            _ => {}
        }
        let meta = match body.remove("metadata") {
            Some(Value::Object(meta)) => meta,
            _ => return Err(Error::malformed(kind, "metadata is missing")),
        };
        let name = meta
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::malformed(kind, "metadata.name is missing"))?;
        Ok(Document {
            name,
            meta,
            spec: optional_map(kind, "spec", body.remove("spec"))?,
            status: optional_map(kind, "status", body.remove("status"))?,
        })
    }
}

/// An absent or null field becomes an empty map, anything else must be a map.
pub(crate) fn optional_map(
    kind: &'static str,
    field: &str,
    value: Option<Value>,
) -> Result<Fields, Error> {
    match value {
        None | Some(Value::Null) => Ok(Fields::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::malformed(
            kind,
            format!("{} must be a map, found {}", field, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tolerates_missing_spec_and_status() {
        let document = Document::parse("Experiment", json!({"metadata": {"name": "a"}})).unwrap();
        assert_eq!(document.name, "a");
        assert!(document.spec.is_empty());
        assert!(document.status.is_empty());
    }

    #[test]
    fn parse_rejects_other_kinds() {
        let body = json!({"kind": "Pod", "metadata": {"name": "a"}});
        assert!(matches!(
            Document::parse("Job", body),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn parse_requires_a_name() {
        let body = json!({"metadata": {"uid": "1"}});
        assert!(matches!(
            Document::parse("Job", body),
            Err(Error::MalformedDocument { kind: "Job", .. })
        ));
    }

    #[test]
    fn owner_reference_requires_an_entry() {
        let meta = json!({"name": "r", "ownerReferences": []});
        let error = OwnerReference::from_meta("Result", meta.as_object().unwrap()).unwrap_err();
        assert!(matches!(error, Error::MalformedDocument { kind: "Result", .. }));
    }

    #[test]
    fn owner_reference_value() {
        let owner = OwnerReference::new("exp", "1234");
        let value = owner.to_value(true);
        assert_eq!(value["apiVersion"], "ml.intel.com/v1");
        assert_eq!(value["kind"], "Experiment");
        assert_eq!(value["blockOwnerDeletion"], true);
        assert!(owner.to_value(false).get("blockOwnerDeletion").is_none());
    }
}
