use crate::engine::error::{Result, StormError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque payload carried in a tuple slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::List(_) => None,
        }
    }

    /// Bytes used for hashing and for printing; lists are joined with ','
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::List(items) => items.join(","),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

/// Ordered list of field names without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Fields(Vec<String>);

impl Fields {
    /// Later repeats of a name are dropped, first occurrence wins
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Fields(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Fields {
    fn from(names: Vec<String>) -> Self {
        Fields::new(names)
    }
}

impl From<Fields> for Vec<String> {
    fn from(fields: Fields) -> Self {
        fields.0
    }
}

/// Identity of one live executor, generated once and kept for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    pub fn generate() -> Self {
        ExecutorId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        ExecutorId(s.to_string())
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of data flowing between executors
///
/// A tuple is immutable once built. End-of-stream markers carry no fields or
/// values; they only tell the receiver which executor has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tuple {
    fields: Fields,
    values: Vec<Value>,
    source_executor: ExecutorId,
    #[serde(default)]
    end_of_stream: bool,
}

impl Tuple {
    /// Builds a data tuple; `values` must line up one-to-one with `fields`
    pub fn new(fields: Fields, values: Vec<Value>, source_executor: ExecutorId) -> Result<Self> {
        if fields.len() != values.len() {
            return Err(StormError::execution(
                format!(
                    "tuple has {} fields but {} values",
                    fields.len(),
                    values.len()
                ),
                None,
            ));
        }
        Ok(Tuple {
            fields,
            values,
            source_executor,
            end_of_stream: false,
        })
    }

    pub fn end_of_stream(source_executor: ExecutorId) -> Self {
        Tuple {
            fields: Fields::default(),
            values: Vec::new(),
            source_executor,
            end_of_stream: true,
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn source_executor(&self) -> &ExecutorId {
        &self.source_executor
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn get_by_field(&self, name: &str) -> Option<&Value> {
        self.fields.index_of(name).and_then(|i| self.values.get(i))
    }

    /// String value of a field, or an execution error naming the field
    pub fn string_by_field(&self, name: &str) -> Result<String> {
        self.get_by_field(name)
            .map(Value::to_key_string)
            .ok_or_else(|| StormError::execution(format!("tuple has no field '{}'", name), None))
    }
}
