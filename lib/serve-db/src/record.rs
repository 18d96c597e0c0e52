//! Serve records and the serve file parser
//!
//! A serve file is a JSON object with a `serves` list:
//!
//! ```text
//! {"serves": [
//!     {"i": "identity1", "t": "token1", "p": "/var/run/cluster1/log.sock"},
//!     {"i": "identity2", "t": "token2", "p": "/var/run/cluster2/log.sock"}
//! ]}
//! ```
//!
//! Sibling keys of `serves` are ignored so that external tooling can keep
//! bookkeeping data in the same file.

use crate::error::ValidationError;
use crate::table::ServeTable;
use serde_json::{Map, Value};

const SERVES_FIELD: &str = "serves";
const IDENTITY_FIELD: &str = "i";
const PATH_FIELD: &str = "p";
const TOKEN_FIELD: &str = "t";

/// Routing key: the client's self-asserted identity and the socket it uses
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServeKey {
    pub identity: String,
    pub path: String,
}

impl ServeKey {
    pub fn new(identity: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
        }
    }
}

/// One routing entry. The key is part of the record, never stored apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeRecord {
    key: ServeKey,
    token: String,
}

impl ServeRecord {
    pub fn new(
        identity: impl Into<String>,
        path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            key: ServeKey::new(identity, path),
            token: token.into(),
        }
    }

    pub fn key(&self) -> &ServeKey {
        &self.key
    }

    pub fn identity(&self) -> &str {
        &self.key.identity
    }

    pub fn path(&self) -> &str {
        &self.key.path
    }

    /// Upstream credential, opaque to the store
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Parse and validate the contents of a serve file.
///
/// Either every element of the `serves` list is a valid record or the whole
/// document is refused. Later duplicates of a key replace earlier ones.
pub fn parse(contents: &[u8]) -> Result<ServeTable, ValidationError> {
    let document: Value = serde_json::from_slice(contents)?;

    let object = match document {
        Value::Object(object) => object,
        other => {
            return Err(ValidationError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let serves = match object.get(SERVES_FIELD) {
        Some(Value::Array(serves)) => serves,
        Some(other) => {
            return Err(ValidationError::ServesNotList {
                found: json_kind(other),
            })
        }
        None => return Err(ValidationError::ServesNotList { found: "nothing" }),
    };

    let mut table = ServeTable::with_capacity(serves.len());
    for (index, value) in serves.iter().enumerate() {
        table.insert(project_record(index, value)?);
    }

    Ok(table)
}

fn project_record(index: usize, value: &Value) -> Result<ServeRecord, ValidationError> {
    let fields = value.as_object().ok_or_else(|| ValidationError::RecordNotObject {
        index,
        value: value.to_string(),
    })?;

    let identity = string_field(fields, index, IDENTITY_FIELD)?;
    let path = string_field(fields, index, PATH_FIELD)?;
    let token = string_field(fields, index, TOKEN_FIELD)?;

    Ok(ServeRecord::new(identity, path, token))
}

fn string_field<'a>(
    fields: &'a Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match fields.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::NonStringField { index, field }),
        None => Err(ValidationError::MissingField { index, field }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
