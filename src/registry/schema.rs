//! Structural parameter schemas.
//!
//! Leaf operations describe their parameters with `schemars`-derived structs.
//! The generated JSON Schema is flattened into a [`ParamSchema`] (field names,
//! types, required flags, defaults) which is what local validation runs
//! against. The original JSON Schema is kept alongside for the "full schema"
//! discovery view.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    fn from_json_type(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            _ => Self::Any,
        }
    }

    /// Whether `value` is acceptable for a field of this type. Integers also
    /// accept whole-valued floats (`2.0`).
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value
                        .as_f64()
                        .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }
}

/// Name of the JSON type of `value`, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where a typed parameter check failed: the path inside the argument object
/// (`targetIds[0]`, `position`) and serde's description of the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedMismatch {
    pub path: String,
    pub field: String,
    pub message: String,
}

/// Deserializes the final argument object into the operation's parameter type.
pub type TypedCheck = fn(&Value) -> Result<(), TypedMismatch>;

fn typed_check<T: DeserializeOwned>(args: &Value) -> Result<(), TypedMismatch> {
    serde_path_to_error::deserialize::<_, T>(args)
        .map(|_| ())
        .map_err(|e| {
            let field = e
                .path()
                .iter()
                .find_map(|segment| match segment {
                    serde_path_to_error::Segment::Map { key } => Some(key.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            TypedMismatch {
                path: e.path().to_string(),
                field,
                message: e.inner().to_string(),
            }
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSchema {
    pub fields: Vec<ParamField>,
    /// The JSON Schema this was derived from.
    pub json_schema: Value,
    #[serde(skip)]
    typed: Option<TypedCheck>,
}

pub(crate) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ParamSchema {
    /// Schema for an operation that takes no parameters.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            json_schema: empty_object_schema(),
            typed: None,
        }
    }

    /// Derive a schema from a parameter struct. Besides the structural field
    /// checks, arguments must deserialize into `T`, which covers element
    /// types, fixed array lengths, unsigned bounds and enum values.
    pub fn of<T: JsonSchema + DeserializeOwned>() -> Self {
        let root = schemars::schema_for!(T);
        let value = serde_json::to_value(root).unwrap_or_else(|_| empty_object_schema());
        Self {
            typed: Some(typed_check::<T>),
            ..Self::from_json_schema(value)
        }
    }

    /// Flatten a JSON Schema object into fields. Unrecognised shapes degrade to
    /// [`ParamType::Any`] rather than failing.
    pub fn from_json_schema(json_schema: Value) -> Self {
        let required: Vec<&str> = json_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = json_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| {
                        let (ty, nullable) = field_type(prop, &json_schema);
                        ParamField {
                            name: name.clone(),
                            ty,
                            required: required.contains(&name.as_str()),
                            nullable,
                            default: prop.get("default").cloned(),
                            description: prop
                                .get("description")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            fields,
            json_schema,
            typed: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&ParamField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `params` against the schema and return the argument object that
    /// should be sent: the caller's fields plus defaults for absent optional
    /// fields. Every offending field is reported in a single error.
    pub fn validate(&self, operation: &str, params: &Value) -> Result<Map<String, Value>, RelayError> {
        let mut args = match params {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(RelayError::validation(format!(
                    "Parameters for '{operation}' must be a JSON object, got {}",
                    json_type_name(other)
                )))
            }
        };

        let mut missing = Vec::new();
        let mut mismatched = Vec::new();

        for field in &self.fields {
            match args.get(&field.name) {
                None => {
                    if field.required {
                        missing.push(field.name.clone());
                    } else if let Some(default) = field.default.as_ref().filter(|d| !d.is_null()) {
                        args.insert(field.name.clone(), default.clone());
                    }
                }
                Some(Value::Null) if field.nullable || field.ty == ParamType::Any => {}
                Some(Value::Null) if field.required => missing.push(field.name.clone()),
                Some(value) if !field.ty.accepts(value) => {
                    mismatched.push((field.name.clone(), field.ty, json_type_name(value)));
                }
                Some(value) if field.ty == ParamType::Integer => {
                    if let Some(whole) = whole_number(value) {
                        args.insert(field.name.clone(), whole);
                    }
                }
                Some(_) => {}
            }
        }

        if missing.is_empty() && mismatched.is_empty() {
            if let Some(check) = self.typed {
                check(&Value::Object(args.clone())).map_err(|m| {
                    let fields = if m.field.is_empty() { Vec::new() } else { vec![m.field] };
                    RelayError::invalid_fields(
                        format!(
                            "Invalid parameters for '{operation}': field '{}': {}",
                            m.path, m.message
                        ),
                        fields,
                    )
                })?;
            }
            return Ok(args);
        }

        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("missing required field(s): {}", missing.join(", ")));
        }
        for (name, expected, got) in &mismatched {
            problems.push(format!(
                "field '{name}' expected {}, got {got}",
                expected.name()
            ));
        }

        let mut fields = missing;
        fields.extend(mismatched.into_iter().map(|(name, _, _)| name));

        Err(RelayError::invalid_fields(
            format!("Invalid parameters for '{operation}': {}", problems.join("; ")),
            fields,
        ))
    }
}

/// Resolve the type of one property, following `$ref`, single-entry `allOf`,
/// and `anyOf` with a `null` branch (how schemars encodes `Option<Struct>`).
fn field_type(prop: &Value, root: &Value) -> (ParamType, bool) {
    if let Some(reference) = prop.get("$ref").and_then(Value::as_str) {
        return lookup_ref(reference, root).map_or((ParamType::Any, false), |target| {
            field_type(target, root)
        });
    }

    match prop.get("type") {
        Some(Value::String(name)) => return (ParamType::from_json_type(name), false),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let non_null: Vec<&str> = names.into_iter().filter(|n| *n != "null").collect();
            let ty = match non_null.as_slice() {
                [single] => ParamType::from_json_type(single),
                _ => ParamType::Any,
            };
            return (ty, nullable);
        }
        _ => {}
    }

    for key in ["allOf", "anyOf", "oneOf"] {
        if let Some(branches) = prop.get(key).and_then(Value::as_array) {
            let nullable = branches.iter().any(is_null_schema);
            let rest: Vec<&Value> = branches.iter().filter(|b| !is_null_schema(b)).collect();
            if let [single] = rest.as_slice() {
                let (ty, inner_nullable) = field_type(single, root);
                return (ty, nullable || inner_nullable);
            }
            return (ParamType::Any, nullable);
        }
    }

    if let Some(values) = prop.get("enum").and_then(Value::as_array) {
        if values.iter().all(Value::is_string) {
            return (ParamType::String, false);
        }
    }

    (ParamType::Any, false)
}

/// `2.0` → `2`, so integer fields reach the host as integers.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn whole_number(value: &Value) -> Option<Value> {
    if value.is_i64() || value.is_u64() {
        return None;
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f <= u64::MAX as f64 {
        Some(Value::from(f as u64))
    } else if f >= i64::MIN as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn is_null_schema(v: &Value) -> bool {
    v.get("type").and_then(Value::as_str) == Some("null")
}

fn lookup_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    let path = reference.strip_prefix("#/")?;
    path.split('/').try_fold(root, |node, key| node.get(key))
}
