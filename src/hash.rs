//! Structural Hashing
//!
//! Derives stable string keys from arbitrary values for memoization.
//!
//! # Encoding
//!
//! | Value        | Key                          |
//! |--------------|------------------------------|
//! | `Null`       | `null`                       |
//! | `Undefined`  | `undefined`                  |
//! | `Bool`       | `b:true` / `b:false`         |
//! | `Number`     | `n:<decimal>`                |
//! | `String`     | `s:<fnv-1a hex of the text>` |
//! | `List`       | `a:<16 hex digits>`          |
//! | `Map`        | `o:<16 hex digits>`          |
//!
//! Composite keys fold the keys of their children with 64-bit FNV-1a.
//!
//! # Limitations
//!
//! - Not collision-proof and not suitable for any security purpose.
//! - Maps hash their fields in insertion order, so two logically-equal maps
//!   populated in a different order may produce different keys.
//! - A node already on the current traversal path hashes to a fixed cycle
//!   marker. Shared (non-cyclic) children hash the same as copies would.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::Result;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Marker folded in place of a node that is already being hashed
const CYCLE_MARKER: &str = "~cycle";

/// Shared, mutable node; the indirection is what allows cycles
pub type Shared<T> = Arc<RwLock<T>>;

/// Hashable value model
#[derive(Debug, Clone)]
pub enum Value {
    /// Explicit null
    Null,
    /// Absent value
    Undefined,
    /// Boolean
    Bool(bool),
    /// Number (all numbers are f64)
    Number(f64),
    /// String
    String(String),
    /// Ordered list
    List(Shared<Vec<Value>>),
    /// Insertion-ordered map
    Map(Shared<Vec<(String, Value)>>),
}

impl Value {
    /// Build a list node
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    /// Build a map node
    pub fn map<S: Into<String>>(fields: Vec<(S, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Append to a list node; no-op for other variants
    pub fn push(&self, item: Value) {
        if let Value::List(items) = self {
            items.write().push(item);
        }
    }

    /// Insert or replace a map field, keeping its original position
    ///
    /// No-op for other variants.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Value::Map(fields) = self {
            let key = key.into();
            let mut fields = fields.write();
            match fields.iter_mut().find(|(k, _)| *k == key) {
                Some((_, slot)) => *slot = value,
                None => fields.push((key, value)),
            }
        }
    }

    /// JSON form of the value
    ///
    /// `Undefined` becomes `null`; a node already on the current path
    /// becomes the cycle marker string.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        to_json_value(self, &mut path)
    }

    /// Identity of a composite node
    fn node_id(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(Arc::as_ptr(items) as *const () as usize),
            Value::Map(fields) => Some(Arc::as_ptr(fields) as *const () as usize),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// 64-bit FNV-1a over a byte slice
#[inline]
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    fnv1a_fold(FNV_OFFSET_BASIS, bytes)
}

#[inline]
fn fnv1a_fold(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Structural hash of a value
///
/// Deterministic for structurally identical inputs and always terminates,
/// including on self-referential values. See the module docs for the known
/// field-order limitation.
pub fn hash(value: &Value) -> String {
    let mut path = HashSet::new();
    hash_value(value, &mut path)
}

/// Structural hash of any serializable value, via its JSON form
pub fn hash_serialize<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value)?;
    Ok(hash(&Value::from(json)))
}

fn hash_value(value: &Value, path: &mut HashSet<usize>) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Number(n) => format!("n:{}", n),
        Value::String(s) => format!("s:{:016x}", fnv1a_64(s.as_bytes())),
        Value::List(items) => {
            let Some(id) = enter(value, path) else {
                return CYCLE_MARKER.to_string();
            };
            let mut acc = fnv1a_fold(FNV_OFFSET_BASIS, b"[");
            for item in items.read().iter() {
                acc = fnv1a_fold(acc, hash_value(item, path).as_bytes());
                acc = fnv1a_fold(acc, b",");
            }
            path.remove(&id);
            format!("a:{:016x}", acc)
        }
        Value::Map(fields) => {
            let Some(id) = enter(value, path) else {
                return CYCLE_MARKER.to_string();
            };
            let mut acc = fnv1a_fold(FNV_OFFSET_BASIS, b"{");
            for (key, field) in fields.read().iter() {
                acc = fnv1a_fold(acc, key.as_bytes());
                acc = fnv1a_fold(acc, b":");
                acc = fnv1a_fold(acc, hash_value(field, path).as_bytes());
                acc = fnv1a_fold(acc, b",");
            }
            path.remove(&id);
            format!("o:{:016x}", acc)
        }
    }
}

fn to_json_value(value: &Value, path: &mut HashSet<usize>) -> serde_json::Value {
    match value {
        Value::Null | Value::Undefined => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            let Some(id) = enter(value, path) else {
                return serde_json::Value::String(CYCLE_MARKER.to_string());
            };
            let json = items
                .read()
                .iter()
                .map(|item| to_json_value(item, path))
                .collect();
            path.remove(&id);
            serde_json::Value::Array(json)
        }
        Value::Map(fields) => {
            let Some(id) = enter(value, path) else {
                return serde_json::Value::String(CYCLE_MARKER.to_string());
            };
            let json = fields
                .read()
                .iter()
                .map(|(key, field)| (key.clone(), to_json_value(field, path)))
                .collect();
            path.remove(&id);
            serde_json::Value::Object(json)
        }
    }
}

/// Push a node onto the traversal path; `None` if it is already there
fn enter(value: &Value, path: &mut HashSet<usize>) -> Option<usize> {
    let id = value.node_id()?;
    path.insert(id).then_some(id)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(name: &str, age: i64) -> Value {
        Value::map(vec![("name", Value::from(name)), ("age", Value::from(age))])
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_primitive_sentinels() {
        assert_eq!(hash(&Value::Null), "null");
        assert_eq!(hash(&Value::Undefined), "undefined");
        assert_eq!(hash(&Value::Bool(true)), "b:true");
        assert_eq!(hash(&Value::Number(1.5)), "n:1.5");
        assert!(hash(&Value::from("x")).starts_with("s:"));
        assert_ne!(hash(&Value::Null), hash(&Value::Undefined));
    }

    #[test]
    fn test_deterministic() {
        let value = user("ada", 36);
        assert_eq!(hash(&value), hash(&value));
        assert_eq!(hash(&value), hash(&user("ada", 36)));
    }

    #[test]
    fn test_differs_on_one_field() {
        assert_ne!(hash(&user("ada", 36)), hash(&user("ada", 37)));
        assert_ne!(hash(&user("ada", 36)), hash(&user("bob", 36)));
    }

    #[test]
    fn test_list_and_map_distinguished() {
        let list = Value::list(vec![]);
        let map = Value::map::<&str>(vec![]);
        assert_ne!(hash(&list), hash(&map));
        assert!(hash(&list).starts_with("a:"));
        assert!(hash(&map).starts_with("o:"));
    }

    #[test]
    fn test_field_order_changes_hash() {
        // Documented limitation: fields are hashed in insertion order
        let a = Value::map(vec![("x", Value::from(1i64)), ("y", Value::from(2i64))]);
        let b = Value::map(vec![("y", Value::from(2i64)), ("x", Value::from(1i64))]);
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_self_referential_terminates() {
        let node = Value::map(vec![("name", Value::from("loop"))]);
        node.insert("self", node.clone());

        let key = hash(&node);
        assert!(key.starts_with("o:"));
        assert_eq!(key, hash(&node));
    }

    #[test]
    fn test_mutual_cycle_terminates() {
        let a = Value::list(vec![Value::from(1i64)]);
        let b = Value::list(vec![Value::from(2i64)]);
        a.push(b.clone());
        b.push(a.clone());

        assert!(hash(&a).starts_with("a:"));
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_shared_child_is_not_a_cycle() {
        let child = user("ada", 36);
        let shared = Value::list(vec![child.clone(), child.clone()]);
        let copies = Value::list(vec![user("ada", 36), user("ada", 36)]);
        assert_eq!(hash(&shared), hash(&copies));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let value = user("ada", 36);
        value.insert("name", Value::from("bob"));
        assert_eq!(hash(&value), hash(&user("bob", 36)));
    }

    #[test]
    fn test_to_json() {
        let value = user("ada", 36);
        assert_eq!(value.to_json(), json!({"name": "ada", "age": 36.0}));

        let node = Value::list(vec![Value::Undefined]);
        node.push(node.clone());
        assert_eq!(node.to_json(), json!([null, "~cycle"]));
    }

    #[test]
    fn test_hash_serialize_matches_json_value() {
        #[derive(Serialize)]
        struct Query {
            page: u32,
            filter: &'static str,
        }

        let from_struct = hash_serialize(&Query {
            page: 2,
            filter: "open",
        })
        .unwrap();
        let from_json = hash(&Value::from(json!({"page": 2, "filter": "open"})));
        assert_eq!(from_struct, from_json);
    }
}
