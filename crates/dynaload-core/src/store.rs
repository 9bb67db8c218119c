//! The host associative store passed to every plugin call.

use std::collections::{BTreeMap, HashMap};
use std::ffi::{CString, c_void};
use std::fmt;
use std::str::FromStr;

/// Key/value bag read and written by plugin functions.
pub trait ArgStore {
    fn get(&self, key: &str) -> Option<&Value>;

    fn insert(&mut self, key: String, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl ArgStore for HashMap<String, Value> {
    fn get(&self, key: &str) -> Option<&Value> {
        HashMap::get(self, key)
    }

    fn insert(&mut self, key: String, value: Value) {
        HashMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        HashMap::remove(self, key)
    }
}

impl ArgStore for BTreeMap<String, Value> {
    fn get(&self, key: &str) -> Option<&Value> {
        BTreeMap::get(self, key)
    }

    fn insert(&mut self, key: String, value: Value) {
        BTreeMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        BTreeMap::remove(self, key)
    }
}

/// An opaque host object with its class lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    class: String,
    parents: Vec<String>,
    ptr: *mut c_void,
}

impl HostObject {
    pub fn new(class: impl Into<String>, ptr: *mut c_void) -> Self {
        Self {
            class: class.into(),
            parents: Vec::new(),
            ptr,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// True when the object is of class `class` or derives from it.
    pub fn derives_from(&self, class: &str) -> bool {
        self.class == class || self.parents.iter().any(|p| p == class)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }
}

/// A value held in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(CString),
    Pointer(*mut c_void),
    Object(HostObject),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "str",
            Value::Pointer(_) => "ptr",
            Value::Object(_) => "object",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => v.to_str().ok(),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<*mut c_void> {
        match self {
            Value::Pointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<CString> for Value {
    fn from(v: CString) -> Self {
        Value::Str(v)
    }
}

impl From<HostObject> for Value {
    fn from(v: HostObject) -> Self {
        Value::Object(v)
    }
}

impl From<*mut c_void> for Value {
    fn from(v: *mut c_void) -> Self {
        Value::Pointer(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "int:{}", v),
            Value::Double(v) => write!(f, "double:{}", v),
            Value::Str(v) => write!(f, "str:{}", v.to_string_lossy()),
            Value::Pointer(v) => write!(f, "ptr:{:#x}", *v as usize),
            Value::Object(o) => write!(f, "object:{}@{:#x}", o.class, o.ptr as usize),
        }
    }
}

/// Failure to parse a `type:text` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseValueError {
    #[error("expected `type:value`, got `{0}`")]
    MissingType(String),
    #[error("unknown value type `{0}` (expected int, double, str or ptr)")]
    UnknownType(String),
    #[error("invalid {kind} value `{text}`")]
    Invalid { kind: &'static str, text: String },
}

impl FromStr for Value {
    type Err = ParseValueError;

    /// Parses `int:5`, `double:1.5`, `str:text` or `ptr:0x10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, text) = s
            .split_once(':')
            .ok_or_else(|| ParseValueError::MissingType(s.to_string()))?;
        let invalid = |kind: &'static str| ParseValueError::Invalid {
            kind,
            text: text.to_string(),
        };
        match kind {
            "int" => text.trim().parse().map(Value::Int).map_err(|_| invalid("int")),
            "double" => text.trim().parse().map(Value::Double).map_err(|_| invalid("double")),
            "str" => CString::new(text).map(Value::Str).map_err(|_| invalid("str")),
            "ptr" => {
                let digits = text.trim();
                let digits = digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                    .unwrap_or(digits);
                usize::from_str_radix(digits, 16)
                    .map(|addr| Value::Pointer(addr as *mut c_void))
                    .map_err(|_| invalid("ptr"))
            }
            other => Err(ParseValueError::UnknownType(other.to_string())),
        }
    }
}

/// Default map-backed store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    values: HashMap<String, Value>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries sorted by key.
    pub fn sorted(&self) -> Vec<(&str, &Value)> {
        let mut entries: Vec<_> = self.values.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl ArgStore for Store {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn insert(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}
