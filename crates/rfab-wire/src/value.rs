use serde::{Deserialize, Serialize};

use crate::sid::Sid;

/// The wire value type: the practical static-language analogue of an
/// arbitrary encodable value (spec.md §3's "any-encodable" key/value,
/// §4.2's plugged codec payload). Closed sum in the spirit of
/// `serde_json::Value`, extended with a `Handle` variant for cross-process
/// reference relay (spec.md §4.7).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Handle(HandleRef),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// A single step in a handle address: either attribute access (`.name`) or
/// item access (`[key]`). Pure data; the wire form of one hop of a remote
/// reference (spec.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Attr(String),
    Item(Value),
}

/// `[root, step1, step2, …]`; the empty-tail form `[root]` denotes the
/// wrapped value itself (spec.md §3).
pub type Address = Vec<Step>;

pub fn root_of(address: &Address) -> Option<u64> {
    address.first().and_then(|step| match step {
        Step::Item(Value::Int(root)) => Some(*root as u64),
        _ => None,
    })
}

/// Builds the canonical address for a freshly registered root: `[Item(root)]`,
/// matching `processional`'s `((host.ITEM, remote),)` address tuple.
pub fn root_address(root: u64) -> Address {
    vec![Step::Item(Value::Int(root as i64))]
}

/// A reference to a value living in a server process, as it appears on the
/// wire: the owning process's identity plus the address within it
/// (spec.md §4.7 "cross-process relay").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandleRef {
    pub sid: Sid,
    pub address: Address,
}
