//! Reference expressions: `$.<stepId>.<field>[<index>]...`
//!
//! A string parameter starting with `$.` names a value inside an earlier step's
//! result. The grammar is a step id, then any mix of
//! `.field` and `[index]` segments. No wildcards, filters, or functions.
//! A missing field or out-of-range index is an error, never a silent null.

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::RelayError;
use crate::registry::schema::json_type_name;

pub const REFERENCE_PREFIX: &str = "$.";

pub fn is_reference(s: &str) -> bool {
    s.starts_with(REFERENCE_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, ".{name}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    pub step_id: String,
    pub segments: Vec<Segment>,
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REFERENCE_PREFIX}{}", self.step_id)?;
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl ReferencePath {
    /// Parse a reference expression. The error string explains what is wrong
    /// and where.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let body = expr
            .strip_prefix(REFERENCE_PREFIX)
            .ok_or_else(|| format!("'{expr}' does not start with '{REFERENCE_PREFIX}'"))?;

        let mut chars = body.char_indices().peekable();
        let step_id = take_name(&mut chars);
        if step_id.is_empty() {
            return Err(format!("'{expr}' is missing a step id after '{REFERENCE_PREFIX}'"));
        }

        let mut segments = Vec::new();
        while let Some((pos, c)) = chars.next() {
            let at = pos + REFERENCE_PREFIX.len();
            match c {
                '.' => {
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return Err(format!("'{expr}' has an empty field name at position {at}"));
                    }
                    segments.push(Segment::Field(name));
                }
                '[' => {
                    let mut digits = String::new();
                    let mut closed = false;
                    for (_, d) in chars.by_ref() {
                        if d == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(d);
                    }
                    if !closed {
                        return Err(format!("'{expr}' has an unclosed '[' at position {at}"));
                    }
                    let index = digits
                        .parse::<usize>()
                        .ok()
                        .filter(|_| digits.chars().all(|d| d.is_ascii_digit()))
                        .ok_or_else(|| {
                            format!("'{expr}' has an invalid index '[{digits}]' at position {at}")
                        })?;
                    segments.push(Segment::Index(index));
                }
                other => {
                    return Err(format!(
                        "'{expr}' has unexpected character '{other}' at position {at}"
                    ))
                }
            }
        }

        Ok(Self { step_id, segments })
    }

    /// Walk the segments from a step's result. Errors name the segment that
    /// could not be traversed and the path reached so far.
    pub fn evaluate<'a>(&self, root: &'a Value) -> Result<&'a Value, RelayError> {
        let mut current = root;
        let mut reached = format!("{REFERENCE_PREFIX}{}", self.step_id);

        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Field(name), Value::Object(map)) => map.get(name).ok_or_else(|| {
                    let available: Vec<&str> = map.keys().map(String::as_str).collect();
                    RelayError::resolution(format!(
                        "Reference '{}': field '{name}' not found at '{reached}' (available: {})",
                        self,
                        if available.is_empty() { "none".to_string() } else { available.join(", ") }
                    ))
                })?,
                (Segment::Index(i), Value::Array(items)) => items.get(*i).ok_or_else(|| {
                    RelayError::resolution(format!(
                        "Reference '{}': index {i} out of bounds at '{reached}' (length {})",
                        self,
                        items.len()
                    ))
                })?,
                (Segment::Field(name), other) => {
                    return Err(RelayError::resolution(format!(
                        "Reference '{}': cannot read field '{name}' of {} at '{reached}'",
                        self,
                        json_type_name(other)
                    )))
                }
                (Segment::Index(i), other) => {
                    return Err(RelayError::resolution(format!(
                        "Reference '{}': cannot index [{i}] into {} at '{reached}'",
                        self,
                        json_type_name(other)
                    )))
                }
            };
            reached.push_str(&segment.to_string());
        }

        Ok(current)
    }
}

fn take_name(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c == '.' || c == '[' || c == ']' {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

// ── Resolution ───────────────────────────────────────────────────

/// Replace every reference expression in `mapping` (at any depth) with the
/// value it names in `context`. The result contains only literals.
pub fn resolve(
    mapping: &Map<String, Value>,
    context: &ExecutionContext,
) -> Result<Map<String, Value>, RelayError> {
    mapping
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, context)?)))
        .collect()
}

fn resolve_value(value: &Value, context: &ExecutionContext) -> Result<Value, RelayError> {
    match value {
        Value::String(s) if is_reference(s) => {
            let path = ReferencePath::parse(s).map_err(RelayError::resolution)?;
            let root = context.get(&path.step_id).ok_or_else(|| {
                RelayError::resolution(format!(
                    "Reference '{s}': step '{}' has no result (it has not run or does not exist)",
                    path.step_id
                ))
            })?;
            path.evaluate(root).cloned()
        }
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve(map, context).map(Value::Object),
        literal => Ok(literal.clone()),
    }
}

// ── Dry validation ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationReason {
    /// The referenced step has not run before this one (or does not exist).
    UnknownStep(String),
    /// The expression does not parse.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceViolation {
    /// Where in the mapping the expression sits, e.g. `transform.position[0]`.
    pub location: String,
    pub expression: String,
    pub reason: ViolationReason,
}

impl fmt::Display for ReferenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ViolationReason::UnknownStep(step) => write!(
                f,
                "'{}' = '{}' references step '{step}', which does not run before this step",
                self.location, self.expression
            ),
            ViolationReason::Malformed(why) => {
                write!(f, "'{}' is not a valid reference: {why}", self.location)
            }
        }
    }
}

/// Check every reference in `mapping` against the ids of steps that run
/// strictly earlier. Nothing is resolved.
pub fn validate(mapping: &Map<String, Value>, known_step_ids: &HashSet<String>) -> Vec<ReferenceViolation> {
    let mut violations = Vec::new();
    for (key, value) in mapping {
        collect_violations(value, key.clone(), known_step_ids, &mut violations);
    }
    violations
}

fn collect_violations(
    value: &Value,
    location: String,
    known: &HashSet<String>,
    out: &mut Vec<ReferenceViolation>,
) {
    match value {
        Value::String(s) if is_reference(s) => {
            let reason = match ReferencePath::parse(s) {
                Ok(path) if known.contains(&path.step_id) => return,
                Ok(path) => ViolationReason::UnknownStep(path.step_id),
                Err(why) => ViolationReason::Malformed(why),
            };
            out.push(ReferenceViolation {
                location,
                expression: s.clone(),
                reason,
            });
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_violations(item, format!("{location}[{i}]"), known, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_violations(item, format!("{location}.{key}"), known, out);
            }
        }
        _ => {}
    }
}

/// Fold violations for one step into a single validation error.
pub fn violation_error(step_id: &str, violations: &[ReferenceViolation]) -> RelayError {
    let details: Vec<String> = violations.iter().map(ToString::to_string).collect();
    RelayError::invalid_fields(
        format!("Step '{step_id}' has invalid references: {}", details.join("; ")),
        violations.iter().map(|v| v.location.clone()).collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn ctx_with(step: &str, result: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.record(step, result).unwrap();
        ctx
    }

    fn mapping(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_fields_and_indices() {
        let path = ReferencePath::parse("$.scan.objects[2].name").unwrap();
        assert_eq!(path.step_id, "scan");
        assert_eq!(
            path.segments,
            vec![
                Segment::Field("objects".into()),
                Segment::Index(2),
                Segment::Field("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "$.scan.objects[2].name");
    }

    #[test]
    fn test_parse_step_only_and_direct_index() {
        assert!(ReferencePath::parse("$.c").unwrap().segments.is_empty());
        let path = ReferencePath::parse("$.0[1]").unwrap();
        assert_eq!(path.step_id, "0");
        assert_eq!(path.segments, vec![Segment::Index(1)]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["$.", "$..x", "$.a.", "$.a[x]", "$.a[-1]", "$.a[1", "$.a]b", "$.a[]"] {
            assert!(ReferencePath::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_resolve_field() {
        let ctx = ctx_with("a", json!({ "x": 5 }));
        let out = resolve(&mapping(json!({ "v": "$.a.x" })), &ctx).unwrap();
        assert_eq!(out["v"], json!(5));
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let ctx = ctx_with("a", json!({ "x": 5 }));
        let err = resolve(&mapping(json!({ "v": "$.a.y" })), &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionError);
        let msg = err.to_string();
        assert!(msg.contains("field 'y' not found"), "{msg}");
        assert!(msg.contains("available: x"), "{msg}");
    }

    #[test]
    fn test_index_out_of_bounds() {
        let ctx = ctx_with("scan", json!({ "ids": [1, 2] }));
        let err = resolve(&mapping(json!({ "v": "$.scan.ids[2]" })), &ctx).unwrap_err();
        assert!(err.to_string().contains("index 2 out of bounds"));
    }

    #[test]
    fn test_indexing_a_non_array() {
        let ctx = ctx_with("c", json!({ "id": 42 }));
        let err = resolve(&mapping(json!({ "v": "$.c.id[0]" })), &ctx).unwrap_err();
        assert!(err.to_string().contains("cannot index [0] into integer"));
    }

    #[test]
    fn test_unknown_step_is_resolution_error() {
        let ctx = ExecutionContext::new();
        let err = resolve(&mapping(json!({ "v": "$.ghost.id" })), &ctx).unwrap_err();
        assert!(err.to_string().contains("step 'ghost' has no result"));
    }

    #[test]
    fn test_resolves_nested_literals() {
        let ctx = ctx_with("c", json!({ "id": 42, "pos": [1.0, 2.0, 3.0] }));
        let out = resolve(
            &mapping(json!({
                "targets": ["$.c.id", 7],
                "transform": { "position": "$.c.pos", "scale": [1, 1, 1] },
                "name": "Box",
                "null_is_literal": null
            })),
            &ctx,
        )
        .unwrap();
        assert_eq!(out["targets"], json!([42, 7]));
        assert_eq!(out["transform"]["position"], json!([1.0, 2.0, 3.0]));
        assert_eq!(out["name"], "Box");
        assert_eq!(out["null_is_literal"], Value::Null);
    }

    #[test]
    fn test_whole_result_reference() {
        let ctx = ctx_with("c", json!({ "id": 42 }));
        let out = resolve(&mapping(json!({ "all": "$.c" })), &ctx).unwrap();
        assert_eq!(out["all"], json!({ "id": 42 }));
    }

    #[test]
    fn test_validate_reports_unknown_and_malformed() {
        let known: HashSet<String> = ["c".to_string()].into_iter().collect();
        let violations = validate(
            &mapping(json!({
                "ok": "$.c.id",
                "later": "$.r.id",
                "nested": { "list": ["$.x[0]", "$.c[oops]"] },
                "plain": "Box"
            })),
            &known,
        );
        assert_eq!(violations.len(), 3);

        let later = violations.iter().find(|v| v.location == "later").unwrap();
        assert_eq!(later.reason, ViolationReason::UnknownStep("r".into()));

        let unknown = violations
            .iter()
            .find(|v| v.location == "nested.list[0]")
            .unwrap();
        assert_eq!(unknown.reason, ViolationReason::UnknownStep("x".into()));

        let malformed = violations
            .iter()
            .find(|v| v.location == "nested.list[1]")
            .unwrap();
        assert!(matches!(malformed.reason, ViolationReason::Malformed(_)));

        let err = violation_error("r", &violations);
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("references step 'r'"));
    }
}
