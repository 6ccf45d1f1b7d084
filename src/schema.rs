//! Declarative target schemas and the typed records they produce.
//!
//! A [`TargetSchema`] is an explicit field list — name, kind, required flag —
//! that a model's free-text reply must be coerced into. Validation is plain
//! data-driven code rather than a reflection-based model library, so the
//! result of a successful [`TargetSchema::validate`] is always a fully typed
//! [`StructuredResult`]: every declared field is present with its declared
//! kind, or validation fails naming the offending field. There is no partially
//! typed middle ground.
//!
//! Two deterministic byproducts come from the same declaration:
//!
//! * [`TargetSchema::fallback`] — the sentinel record substituted in
//!   best-effort mode when a reply cannot be parsed or validated.
//! * [`TargetSchema::json_schema`] — a JSON-schema rendering sent as Ollama's
//!   `format` field so models with structured-output support emit
//!   schema-shaped JSON directly.

use crate::error::ScanError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};

/// Marker text placed in the context field of a fallback record.
pub const FALLBACK_CONTEXT: &str = "analysis unavailable: response could not be parsed";

/// The declared kind of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Free-form text.
    Str,
    /// Strict boolean; string "true"/"false" is rejected.
    Bool,
    /// Integer; accepts JSON floats with a zero fractional part.
    Int,
    /// Floating point; accepts JSON integers.
    Float,
    /// One of a fixed set of string literals. The first literal doubles as
    /// the default/fallback value, so list the most conservative one first.
    Enum(Vec<String>),
    /// List of strings. Absent or null coerces to an empty list, never null.
    StrList,
    /// List of nested records, each validated against the given sub-schema.
    /// Absent or null coerces to an empty list.
    RecordList(Box<TargetSchema>),
}

/// One field of a [`TargetSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Required fields must be present and type-correct in the reply.
    /// Optional fields default per kind: empty string, `false`, `0`, the
    /// first enum literal, or an empty list.
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// A named record shape a model reply is coerced into.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSchema {
    /// Schema name, used in logs and report headings.
    pub name: String,
    /// Field declarations, in output order.
    pub fields: Vec<FieldSpec>,
    /// Name of the free-text field that carries the failure marker in a
    /// fallback record. Must refer to a `Str` field when set.
    pub context_field: Option<String>,
}

/// A typed value held by a [`StructuredResult`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    StrList(Vec<String>),
    Records(Vec<StructuredResult>),
}

impl FieldValue {
    /// Render as a `serde_json::Value`.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(n) => json!(n),
            FieldValue::Float(f) => json!(f),
            FieldValue::StrList(xs) => json!(xs),
            FieldValue::Records(rs) => Value::Array(rs.iter().map(|r| r.to_json()).collect()),
        }
    }
}

/// The validated output record: field name → typed value, in schema order.
///
/// Invariant: every field of the originating schema is present with its
/// declared kind. Serialises to a flat JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredResult {
    fields: Vec<(String, FieldValue)>,
}

impl StructuredResult {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn get_list(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            FieldValue::StrList(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Render as a `serde_json::Value` object.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }

    fn push(&mut self, name: &str, value: FieldValue) {
        self.fields.push((name.to_string(), value));
    }
}

impl Serialize for StructuredResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_json())?;
        }
        map.end()
    }
}

impl TargetSchema {
    /// Coerce a parsed JSON value against this schema.
    ///
    /// Every required field must be present with the declared kind; enum
    /// fields must match an allowed literal; list fields coerce absent/null
    /// to an empty list. Unknown fields in the reply are ignored.
    pub fn validate(&self, value: &Value) -> Result<StructuredResult, ScanError> {
        let obj = value.as_object().ok_or_else(|| ScanError::Validation {
            field: "<root>".into(),
            detail: format!("expected a JSON object, got {}", json_kind(value)),
        })?;

        let mut result = StructuredResult::default();
        for spec in &self.fields {
            let raw = obj.get(&spec.name).filter(|v| !v.is_null());
            let coerced = match (raw, &spec.kind) {
                // Lists always default to empty, required or not.
                (None, FieldKind::StrList) => FieldValue::StrList(Vec::new()),
                (None, FieldKind::RecordList(_)) => FieldValue::Records(Vec::new()),
                (None, _) if spec.required => {
                    return Err(ScanError::Validation {
                        field: spec.name.clone(),
                        detail: "missing required field".into(),
                    });
                }
                (None, kind) => default_value(kind),
                (Some(v), kind) => coerce(&spec.name, kind, v)?,
            };
            result.push(&spec.name, coerced);
        }
        Ok(result)
    }

    /// The deterministic sentinel record for this schema: booleans `false`,
    /// numerics `0`, lists empty, enums their first literal, and the context
    /// field set to [`FALLBACK_CONTEXT`].
    pub fn fallback(&self) -> StructuredResult {
        let mut result = StructuredResult::default();
        for spec in &self.fields {
            let value = if Some(&spec.name) == self.context_field.as_ref() {
                FieldValue::Str(FALLBACK_CONTEXT.to_string())
            } else {
                default_value(&spec.kind)
            };
            result.push(&spec.name, value);
        }
        result
    }

    /// JSON-schema rendering suitable for Ollama's `format` parameter.
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for spec in &self.fields {
            properties.insert(spec.name.clone(), kind_schema(&spec.kind));
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }
        json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
        })
    }
}

fn default_value(kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Str => FieldValue::Str(String::new()),
        FieldKind::Bool => FieldValue::Bool(false),
        FieldKind::Int => FieldValue::Int(0),
        FieldKind::Float => FieldValue::Float(0.0),
        FieldKind::Enum(allowed) => {
            FieldValue::Str(allowed.first().cloned().unwrap_or_default())
        }
        FieldKind::StrList => FieldValue::StrList(Vec::new()),
        FieldKind::RecordList(_) => FieldValue::Records(Vec::new()),
    }
}

fn coerce(field: &str, kind: &FieldKind, v: &Value) -> Result<FieldValue, ScanError> {
    let mismatch = |expected: &str| ScanError::Validation {
        field: field.to_string(),
        detail: format!("expected {expected}, got {}", json_kind(v)),
    };

    match kind {
        FieldKind::Str => v
            .as_str()
            .map(|s| FieldValue::Str(s.to_string()))
            .ok_or_else(|| mismatch("string")),
        FieldKind::Bool => v
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| mismatch("boolean")),
        FieldKind::Int => match v {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                    Ok(FieldValue::Int(f as i64))
                } else {
                    Err(mismatch("integer"))
                }
            }
            _ => Err(mismatch("integer")),
        },
        FieldKind::Float => v
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| mismatch("number")),
        FieldKind::Enum(allowed) => {
            let s = v.as_str().ok_or_else(|| mismatch("string"))?;
            if allowed.iter().any(|a| a == s) {
                Ok(FieldValue::Str(s.to_string()))
            } else {
                Err(ScanError::Validation {
                    field: field.to_string(),
                    detail: format!("'{s}' is not one of {allowed:?}"),
                })
            }
        }
        FieldKind::StrList => {
            let arr = v.as_array().ok_or_else(|| mismatch("array of strings"))?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item.as_str().ok_or_else(|| ScanError::Validation {
                    field: field.to_string(),
                    detail: format!("list element is {}, expected string", json_kind(item)),
                })?;
                out.push(s.to_string());
            }
            Ok(FieldValue::StrList(out))
        }
        FieldKind::RecordList(sub) => {
            let arr = v.as_array().ok_or_else(|| mismatch("array of objects"))?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                out.push(sub.validate(item).map_err(|e| match e {
                    ScanError::Validation {
                        field: inner,
                        detail,
                    } => ScanError::Validation {
                        field: format!("{field}.{inner}"),
                        detail,
                    },
                    other => other,
                })?);
            }
            Ok(FieldValue::Records(out))
        }
    }
}

fn kind_schema(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Str => json!({"type": "string"}),
        FieldKind::Bool => json!({"type": "boolean"}),
        FieldKind::Int => json!({"type": "integer"}),
        FieldKind::Float => json!({"type": "number"}),
        FieldKind::Enum(allowed) => json!({"type": "string", "enum": allowed}),
        FieldKind::StrList => json!({"type": "array", "items": {"type": "string"}}),
        FieldKind::RecordList(sub) => json!({"type": "array", "items": sub.json_schema()}),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Built-in schemas ─────────────────────────────────────────────────────

/// Security assessment of a scene: presence of people and weapons, scene
/// classification, and free-text context.
pub fn security_assessment() -> TargetSchema {
    TargetSchema {
        name: "security_assessment".into(),
        fields: vec![
            FieldSpec::required("image_context", FieldKind::Str),
            FieldSpec::required("has_weapon", FieldKind::Bool),
            FieldSpec::required("has_people", FieldKind::Bool),
            FieldSpec::required("confidence", FieldKind::Int),
            // "Other" first: it doubles as the fallback literal.
            FieldSpec::optional(
                "scene_type",
                FieldKind::Enum(
                    ["Other", "Indoor", "Outdoor", "Vehicle"]
                        .map(String::from)
                        .to_vec(),
                ),
            ),
            FieldSpec::optional("potential_threats", FieldKind::StrList),
            FieldSpec::optional("detected_objects", FieldKind::StrList),
        ],
        context_field: Some("image_context".into()),
    }
}

/// Named-entity extraction from text: organizations, products, people,
/// locations.
pub fn named_entities() -> TargetSchema {
    TargetSchema {
        name: "named_entities".into(),
        fields: vec![
            FieldSpec::required("organizations", FieldKind::StrList),
            FieldSpec::required("products", FieldKind::StrList),
            FieldSpec::required("people", FieldKind::StrList),
            FieldSpec::required("locations", FieldKind::StrList),
        ],
        context_field: None,
    }
}

/// Details of a music album read off a cover or liner photo, with a nested
/// track list.
pub fn album_details() -> TargetSchema {
    let track = TargetSchema {
        name: "track".into(),
        fields: vec![
            FieldSpec::required("title", FieldKind::Str),
            FieldSpec::optional("duration_seconds", FieldKind::Int),
        ],
        context_field: None,
    };
    TargetSchema {
        name: "album_details".into(),
        fields: vec![
            FieldSpec::required("album_title", FieldKind::Str),
            FieldSpec::required("artist", FieldKind::Str),
            FieldSpec::optional("release_year", FieldKind::Int),
            FieldSpec::optional("genres", FieldKind::StrList),
            FieldSpec::optional("track_list", FieldKind::RecordList(Box::new(track))),
            FieldSpec::optional("other_info", FieldKind::Str),
        ],
        context_field: Some("other_info".into()),
    }
}
