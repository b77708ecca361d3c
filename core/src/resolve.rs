//! Reference Resolver (C2) — `{{NodeName.path}}` substitution over node
//! outputs and variables.
//!
//! Two operations per §4.2: [`Resolver::interpolate`] (stringifies every
//! `{{...}}` occurrence inline) and [`Resolver::resolve`] (returns the raw,
//! type-preserving value of a single reference). Resolution reads a
//! point-in-time snapshot of node outputs and variables; the scheduler's
//! single-threaded discipline (§5) guarantees nothing mutates mid-resolve.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ResolverError;
use crate::graph::GraphIndex;

/// `{{...}}` occurrences, non-greedy so adjacent references don't merge.
fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap())
}

/// A parsed `{{NodeName.path}}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub name: String,
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Split `NodeName.path` / `NodeName[0].path` into a name and a list of
/// dot/bracket path segments.
pub fn parse_reference(raw: &str) -> Result<ParsedReference, ResolverError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ResolverError::InvalidSyntax("empty reference".into()));
    }

    // Split the leading identifier (the node/variable name) from the
    // remaining path, which may start with `.` or `[`.
    let mut chars = raw.char_indices().peekable();
    let mut name_end = raw.len();
    while let Some(&(idx, ch)) = chars.peek() {
        if ch == '.' || ch == '[' {
            name_end = idx;
            break;
        }
        chars.next();
    }
    let name = raw[..name_end].to_string();
    if name.is_empty() {
        return Err(ResolverError::InvalidSyntax(format!("missing name in reference '{raw}'")));
    }

    let mut path = Vec::new();
    let rest = &raw[name_end..];
    let mut iter = rest.chars().peekable();
    while let Some(&c) = iter.peek() {
        match c {
            '.' => {
                iter.next();
                let mut field = String::new();
                while let Some(&c2) = iter.peek() {
                    if c2 == '.' || c2 == '[' {
                        break;
                    }
                    field.push(c2);
                    iter.next();
                }
                if field.is_empty() {
                    return Err(ResolverError::InvalidSyntax(format!("empty path segment in '{raw}'")));
                }
                path.push(PathSegment::Field(field));
            }
            '[' => {
                iter.next();
                let mut digits = String::new();
                while let Some(&c2) = iter.peek() {
                    if c2 == ']' {
                        break;
                    }
                    digits.push(c2);
                    iter.next();
                }
                if iter.peek() != Some(&']') {
                    return Err(ResolverError::InvalidSyntax(format!("unterminated index in '{raw}'")));
                }
                iter.next();
                let index: usize = digits
                    .parse()
                    .map_err(|_| ResolverError::InvalidSyntax(format!("invalid index '[{digits}]' in '{raw}'")))?;
                path.push(PathSegment::Index(index));
            }
            _ => {
                return Err(ResolverError::InvalidSyntax(format!("unexpected character near '{raw}'")));
            }
        }
    }

    Ok(ParsedReference { name, path })
}

/// Apply a parsed path to a JSON value, returning `None` on any missing
/// leaf (missing leaves are not errors, per §4.2).
fn apply_path(mut value: &Value, path: &[PathSegment]) -> Option<Value> {
    for segment in path {
        value = match (segment, value) {
            (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(value.clone())
}

/// Normalizes a raw node output the way §3 describes: string outputs
/// expose both `result` and `prompt`; objects expose their own fields;
/// everything else (numbers, bools, null, arrays) is left as-is so a
/// bare `{{Node}}` reference returns it verbatim.
fn normalize_output(output: &Value) -> Value {
    match output {
        Value::String(s) => serde_json::json!({ "result": s, "prompt": s }),
        other => other.clone(),
    }
}

/// Read-only view over the current execution state the resolver needs:
/// node outputs by node id, and the variable map. Kept separate from
/// [`crate::context::ExecutionContext`] so the resolver can be unit
/// tested without constructing a full context.
pub struct ResolveScope<'a> {
    pub graph: &'a GraphIndex<'a>,
    pub node_outputs: &'a HashMap<String, Value>,
    pub variables: &'a HashMap<String, Value>,
}

pub struct Resolver;

impl Resolver {
    /// Resolve a single `{{...}}` reference (braces included or not) to
    /// its raw, type-preserving value. Missing leaves resolve to `None`.
    pub fn resolve(scope: &ResolveScope<'_>, raw_ref: &str) -> Result<Option<Value>, ResolverError> {
        let inner = strip_braces(raw_ref);
        let parsed = parse_reference(inner)?;
        Ok(Self::resolve_parsed(scope, &parsed))
    }

    fn resolve_parsed(scope: &ResolveScope<'_>, parsed: &ParsedReference) -> Option<Value> {
        if let Some(node_id) = scope.graph.id_for_name(&parsed.name) {
            let output = scope.node_outputs.get(node_id)?;
            let normalized = normalize_output(output);
            return apply_path(&normalized, &parsed.path);
        }

        // Not a node name: treat the whole reference as a variable key.
        // `workflow.input` and other dotted variable keys are stored
        // verbatim in the variable map, so we look up the full original
        // string first before falling back to a field-path walk off the
        // first segment.
        let full_key = std::iter::once(parsed.name.clone())
            .chain(parsed.path.iter().filter_map(|s| match s {
                PathSegment::Field(f) => Some(f.clone()),
                PathSegment::Index(_) => None,
            }))
            .collect::<Vec<_>>()
            .join(".");
        if let Some(v) = scope.variables.get(&full_key) {
            return Some(v.clone());
        }
        if let Some(v) = scope.variables.get(&parsed.name) {
            return apply_path(v, &parsed.path);
        }
        None
    }

    /// Substitute every `{{...}}` occurrence in `text` with the
    /// stringified resolved value (`serde_json`'s compact form for
    /// non-strings, `""` for undefined / unresolved references).
    pub fn interpolate(scope: &ResolveScope<'_>, text: &str) -> String {
        let pattern = reference_pattern();
        let mut out = String::with_capacity(text.len());
        let mut last_end = 0;
        for caps in pattern.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            out.push_str(&text[last_end..whole.start()]);
            let inner = caps.get(1).unwrap().as_str();
            let rendered = match parse_reference(inner) {
                Ok(parsed) => match Self::resolve_parsed(scope, &parsed) {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
                Err(_) => String::new(),
            };
            out.push_str(&rendered);
            last_end = whole.end();
        }
        out.push_str(&text[last_end..]);
        out
    }

    /// True if `text` is *entirely* a single `{{...}}` reference with no
    /// surrounding characters — used by executors that must resolve
    /// type-preserving (condition operands, direct script inputs).
    pub fn is_direct_reference(text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.starts_with("{{") && trimmed.ends_with("}}") && {
            let inner = &trimmed[2..trimmed.len() - 2];
            !inner.contains("{{") && !inner.contains("}}")
        }
    }
}

fn strip_braces(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge as ModelEdge, Node, NodeData, Workflow};
    use serde_json::json;

    fn workflow() -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![
                Node { id: "in".into(), kind: "input".into(), position: None, data: NodeData { name: "Input".into(), config: json!({}) } },
                Node { id: "a".into(), kind: "agent-A".into(), position: None, data: NodeData { name: "A".into(), config: json!({}) } },
            ],
            edges: vec![],
        }
    }

    #[test]
    fn parses_field_and_index_paths() {
        let parsed = parse_reference("A.items[0].name").unwrap();
        assert_eq!(parsed.name, "A");
        assert_eq!(
            parsed.path,
            vec![PathSegment::Field("items".into()), PathSegment::Index(0), PathSegment::Field("name".into())]
        );
    }

    #[test]
    fn resolve_is_type_preserving() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({ "count": 3, "ok": true, "nested": null }));
        let variables = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &outputs, variables: &variables };

        assert_eq!(Resolver::resolve(&scope, "{{A.count}}").unwrap(), Some(json!(3)));
        assert_eq!(Resolver::resolve(&scope, "{{A.ok}}").unwrap(), Some(json!(true)));
        assert_eq!(Resolver::resolve(&scope, "{{A.nested}}").unwrap(), Some(Value::Null));
        assert_eq!(Resolver::resolve(&scope, "{{A.missing}}").unwrap(), None);
    }

    #[test]
    fn string_outputs_expose_result_and_prompt() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!("hello"));
        let variables = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &outputs, variables: &variables };

        assert_eq!(Resolver::resolve(&scope, "{{A.result}}").unwrap(), Some(json!("hello")));
        assert_eq!(Resolver::resolve(&scope, "{{A.prompt}}").unwrap(), Some(json!("hello")));
    }

    #[test]
    fn interpolate_stringifies_non_strings_and_blanks_undefined() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({ "count": 3 }));
        let variables = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &outputs, variables: &variables };

        assert_eq!(Resolver::interpolate(&scope, "n={{A.count}}!"), "n=3!");
        assert_eq!(Resolver::interpolate(&scope, "x={{A.missing}}."), "x=.");
    }

    #[test]
    fn variable_lookup_falls_back_when_not_a_node_name() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let mut variables = HashMap::new();
        variables.insert("workflow.input".to_string(), json!("hi"));
        let scope = ResolveScope { graph: &graph, node_outputs: &outputs, variables: &variables };

        assert_eq!(Resolver::resolve(&scope, "{{workflow.input}}").unwrap(), Some(json!("hi")));
    }

    #[test]
    fn direct_reference_detection() {
        assert!(Resolver::is_direct_reference("{{A.count}}"));
        assert!(!Resolver::is_direct_reference("n={{A.count}}"));
    }
}
