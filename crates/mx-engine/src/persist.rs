//! Flat JSON patch helpers
//!
//! Modules save into one flat object with entity-prefixed keys
//! (`id_t3_fadeRate`). Loading is lenient: a missing key keeps the current
//! (reset) value, a key of the wrong type is logged and skipped.

use mx_core::{MxError, MxResult};
use serde_json::{Map, Value};

use crate::survey::Label;

/// Key of a per-entity field, e.g. `key("t", 3, "fader")` → `id_t3_fader`
pub fn key(prefix: &str, index: usize, field: &str) -> String {
    format!("id_{prefix}{index}_{field}")
}

/// Key of a master field
pub fn master_key(field: &str) -> String {
    format!("id_m_{field}")
}

/// Parse a patch string, rejecting anything that is not an object
pub fn parse_object(json: &str) -> MxResult<Value> {
    let value: Value = serde_json::from_str(json)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(MxError::Serialization("patch root is not an object".into()))
    }
}

// ============ Writer ============

#[derive(Debug, Default)]
pub struct JsonWriter {
    map: Map<String, Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn f64(&mut self, key: impl Into<String>, v: f64) {
        // NaN/inf have no JSON form
        let v = if v.is_finite() { v } else { 0.0 };
        self.map.insert(key.into(), Value::from(v));
    }

    pub fn bool(&mut self, key: impl Into<String>, v: bool) {
        self.map.insert(key.into(), Value::Bool(v));
    }

    pub fn int(&mut self, key: impl Into<String>, v: i64) {
        self.map.insert(key.into(), Value::from(v));
    }

    pub fn label(&mut self, key: impl Into<String>, v: Label) {
        self.map.insert(key.into(), Value::String(v.as_str().to_owned()));
    }

    pub fn value(&mut self, key: impl Into<String>, v: Value) {
        self.map.insert(key.into(), v);
    }

    pub fn finish(self) -> Value {
        Value::Object(self.map)
    }
}

// ============ Reader ============

#[derive(Debug, Clone, Copy)]
pub struct JsonReader<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> JsonReader<'a> {
    pub fn new(value: &'a Value) -> Self {
        if !value.is_object() {
            log::debug!("Patch data is not an object, using defaults");
        }
        Self { map: value.as_object() }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key))
    }

    fn mistyped(key: &str, expected: &str) {
        log::debug!("Patch key {key} is not {expected}, keeping default");
    }

    pub fn f64(&self, key: &str, dst: &mut f64) {
        if let Some(v) = self.get(key) {
            match v.as_f64() {
                Some(x) => *dst = x,
                None => Self::mistyped(key, "a number"),
            }
        }
    }

    pub fn bool(&self, key: &str, dst: &mut bool) {
        if let Some(v) = self.get(key) {
            match v.as_bool() {
                Some(b) => *dst = b,
                None => Self::mistyped(key, "a bool"),
            }
        }
    }

    pub fn int(&self, key: &str, dst: &mut i64) {
        if let Some(v) = self.get(key) {
            match v.as_i64() {
                Some(i) => *dst = i,
                None => Self::mistyped(key, "an integer"),
            }
        }
    }

    /// Enum stored as its index
    pub fn index<T>(&self, key: &str, dst: &mut T, from_index: fn(usize) -> Option<T>) {
        if let Some(v) = self.get(key) {
            match v.as_u64().and_then(|i| from_index(i as usize)) {
                Some(e) => *dst = e,
                None => Self::mistyped(key, "a valid index"),
            }
        }
    }

    pub fn label(&self, key: &str, dst: &mut Label) {
        if let Some(v) = self.get(key) {
            match v.as_str() {
                Some(s) => *dst = Label::new(s),
                None => Self::mistyped(key, "a string"),
            }
        }
    }

    /// Any serde type stored under one key
    pub fn serde<T: serde::de::DeserializeOwned>(&self, key: &str, dst: &mut T) {
        if let Some(v) = self.get(key) {
            match <T as serde::Deserialize>::deserialize(v) {
                Ok(x) => *dst = x,
                Err(e) => log::debug!("Patch key {key} rejected: {e}"),
            }
        }
    }
}
