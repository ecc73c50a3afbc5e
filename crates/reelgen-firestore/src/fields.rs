//! Field paths and masked partial updates.
//!
//! Only the leaves named in the update mask are written, so two writers
//! touching disjoint leaves of the same map never clobber each other.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;

use crate::types::{MapValue, ToFirestoreValue, Value};

/// Dotted path to a (possibly nested) document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(field: impl Into<String>) -> Self {
        Self(vec![field.into()])
    }

    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Map entry keyed by an integer, e.g. a scene index.
    pub fn index(self, index: u32) -> Self {
        self.child(index.to_string())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            if is_simple_segment(segment) {
                f.write_str(segment)?;
            } else {
                write!(f, "`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))?;
            }
        }
        Ok(())
    }
}

fn is_simple_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A set of leaf writes plus the matching update mask.
#[derive(Debug, Clone, Default)]
pub struct FieldUpdates {
    fields: HashMap<String, Value>,
    mask: Vec<String>,
}

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: FieldPath, value: impl ToFirestoreValue) -> Self {
        insert_nested(&mut self.fields, path.segments(), value.to_firestore_value());
        self.mask.push(path.to_string());
        self
    }

    /// Also stamp the top-level `updatedAt`.
    pub fn touch(self) -> Self {
        self.set(FieldPath::new("updatedAt"), Utc::now())
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn mask(&self) -> &[String] {
        &self.mask
    }

    pub fn into_parts(self) -> (HashMap<String, Value>, Vec<String>) {
        (self.fields, self.mask)
    }
}

fn insert_nested(fields: &mut HashMap<String, Value>, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(head.clone(), value);
        return;
    }

    let entry = fields
        .entry(head.clone())
        .or_insert_with(|| Value::MapValue(MapValue::default()));
    if !matches!(entry, Value::MapValue(_)) {
        *entry = Value::MapValue(MapValue::default());
    }
    if let Value::MapValue(map) = entry {
        insert_nested(map.fields.get_or_insert_with(HashMap::new), rest, value);
    }
}
