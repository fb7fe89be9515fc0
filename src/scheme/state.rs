use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// A single value read or derived while running a [`crate::scheme::Scheme`].
///
/// Any field a scheme can read: an integer, a signed integer, a flag, or a
/// nested list/mapping. `List`/`Map` exist so `for(...)` loops and nested
/// syntax (scaling lists, VUI, HRD parameters) can be represented without a
/// separate struct per NALU type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U(u64),
    S(i64),
    Bool(bool),
    List(Vec<FieldValue>),
    Map(HashMap<&'static str, FieldValue>),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U(v) => Some(*v),
            FieldValue::Bool(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::S(v) => Some(*v),
            FieldValue::U(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            FieldValue::U(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<&'static str, FieldValue>> {
        match self {
            FieldValue::Map(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-NALU scratch space. Cleared before each NALU's scheme runs.
#[derive(Debug, Default, Clone)]
pub struct LocalState {
    fields: HashMap<&'static str, FieldValue>,
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_u64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    pub fn merge(&mut self, other: &HashMap<&'static str, FieldValue>) {
        for (k, v) in other {
            self.fields.insert(k, v.clone());
        }
    }

    pub fn into_map(self) -> HashMap<&'static str, FieldValue> {
        self.fields
    }

    pub fn as_map(&self) -> &HashMap<&'static str, FieldValue> {
        &self.fields
    }
}

/// Cross-NALU parser state: the most recently seen SPS/PPS indexed by id.
/// Lives on the [`crate::nalu_parser::NaluParser`] and is never reset
/// mid-stream.
#[derive(Debug, Default)]
pub struct GlobalState {
    pub sps: FxHashMap<u8, HashMap<&'static str, FieldValue>>,
    pub pps: FxHashMap<u8, HashMap<&'static str, FieldValue>>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }
}
