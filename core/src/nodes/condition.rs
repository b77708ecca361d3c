//! `condition` executor (§4.6): evaluates a rule list against the
//! current execution state and routes to the `"true"`/`"false"` handle.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::NodeError;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;
use crate::resolve::Resolver;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterThanOrEquals,
    LessThanOrEquals,
    IsEmpty,
    IsNotEmpty,
    Regex,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Joiner {
    And,
    Or,
}

impl Default for Joiner {
    fn default() -> Self {
        Self::And
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Rule {
    #[serde(rename = "inputReference")]
    input_reference: String,
    operator: Operator,
    #[serde(rename = "compareValue", default)]
    compare_value: Value,
    #[serde(default)]
    joiner: Joiner,
}

/// Parses `value` as an f64 either directly (JSON number) or by parsing a
/// string; used by the numeric operators' coerce-then-fall-back rule.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        other => as_display_string(other).contains(&as_display_string(needle)),
    }
}

fn evaluate(left: &Value, op: &Operator, right: &Value) -> bool {
    match op {
        Operator::Equals => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => as_display_string(left) == as_display_string(right),
        },
        Operator::NotEquals => !evaluate(left, &Operator::Equals, right),
        Operator::Contains => value_contains(left, right),
        Operator::NotContains => !value_contains(left, right),
        Operator::GreaterThan => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a > b,
            _ => as_display_string(left) > as_display_string(right),
        },
        Operator::LessThan => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a < b,
            _ => as_display_string(left) < as_display_string(right),
        },
        Operator::GreaterThanOrEquals => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a >= b,
            _ => as_display_string(left) >= as_display_string(right),
        },
        Operator::LessThanOrEquals => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a <= b,
            _ => as_display_string(left) <= as_display_string(right),
        },
        Operator::IsEmpty => is_empty_value(left),
        Operator::IsNotEmpty => !is_empty_value(left),
        Operator::Regex => {
            let pattern = as_display_string(right);
            match Regex::new(&pattern) {
                Ok(re) => re.is_match(&as_display_string(left)),
                Err(_) => false,
            }
        }
    }
}

/// Resolve a `{{...}}` operand type-preserving when it's nothing but a
/// single reference (§4.5); interpolate it as a string when it's text
/// with embedded references; otherwise treat it as a literal.
fn resolve_operand(view: &ExecutorView<'_>, value: &Value) -> Value {
    match value {
        Value::String(s) if Resolver::is_direct_reference(s) => view.resolve_reference(s).ok().flatten().unwrap_or(Value::Null),
        Value::String(s) if s.contains("{{") => Value::String(view.interpolate(s)),
        other => other.clone(),
    }
}

pub struct ConditionExecutor;

#[async_trait]
impl Executor for ConditionExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let rules: Vec<Rule> = serde_json::from_value(node.data.config.get("rules").cloned().unwrap_or(Value::Array(vec![])))
            .map_err(|e| NodeError::message(format!("invalid condition rules: {e}")))?;

        if rules.is_empty() {
            return Ok(ExecutorOutput::value(Value::Bool(true)));
        }

        // Fold left-to-right into AND-groups, split wherever a rule's
        // trailing joiner is `or`; the result is the OR of the groups.
        let mut groups: Vec<bool> = Vec::new();
        let mut current_group = true;
        for rule in &rules {
            let left = resolve_operand(view, &Value::String(format!("{{{{{}}}}}", rule.input_reference)));
            let right = resolve_operand(view, &rule.compare_value);
            let result = evaluate(&left, &rule.operator, &right);
            current_group = current_group && result;
            if rule.joiner == Joiner::Or {
                groups.push(current_group);
                current_group = true;
            }
        }
        groups.push(current_group);

        let passed = groups.into_iter().any(|g| g);
        Ok(ExecutorOutput::value(Value::Bool(passed)))
    }

    fn get_output_handle(&self, _node: &Node, result: &ExecutorOutput) -> Option<String> {
        Some(if result.output.as_bool().unwrap_or(false) { "true".to_string() } else { "false".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::approval::ApprovalCoordinator;
    use crate::context::AbortHandle;
    use crate::graph::GraphIndex;
    use crate::model::{Edge, NodeData, Workflow};

    fn workflow_with_condition(config: Value) -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![
                Node { id: "in".into(), kind: "input".into(), position: None, data: NodeData { name: "Input".into(), config: json!({}) } },
                Node { id: "c".into(), kind: "condition".into(), position: None, data: NodeData { name: "C".into(), config } },
            ],
            edges: vec![Edge { id: "e".into(), source: "in".into(), target: "c".into(), source_handle: None, target_handle: None, edge_type: None }],
        }
    }

    async fn run(wf: &Workflow, input: Value, outputs: HashMap<String, Value>) -> ExecutorOutput {
        let graph = GraphIndex::build(wf).unwrap();
        let variables = HashMap::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        );
        ConditionExecutor.execute(&wf.nodes[1], &view).await.unwrap()
    }

    #[tokio::test]
    async fn contains_matches_substring() {
        let wf = workflow_with_condition(json!({
            "rules": [{ "inputReference": "Input.result", "operator": "contains", "compareValue": "success" }]
        }));
        let mut outputs = HashMap::new();
        outputs.insert("in".to_string(), json!("big success"));
        let result = run(&wf, json!(null), outputs).await;
        assert_eq!(result.output, json!(true));
    }

    #[tokio::test]
    async fn numeric_operator_falls_back_to_string_comparison() {
        let wf = workflow_with_condition(json!({
            "rules": [{ "inputReference": "Input.result", "operator": "greater_than", "compareValue": "abc" }]
        }));
        let mut outputs = HashMap::new();
        outputs.insert("in".to_string(), json!("xyz"));
        let result = run(&wf, json!(null), outputs).await;
        assert_eq!(result.output, json!(true));
    }

    #[tokio::test]
    async fn and_groups_joined_by_or() {
        // (a=1 AND b=2) OR (c=3)
        let wf = workflow_with_condition(json!({
            "rules": [
                { "inputReference": "Input.a", "operator": "equals", "compareValue": 1, "joiner": "and" },
                { "inputReference": "Input.b", "operator": "equals", "compareValue": 99, "joiner": "or" },
                { "inputReference": "Input.c", "operator": "equals", "compareValue": 3 },
            ]
        }));
        let mut outputs = HashMap::new();
        outputs.insert("in".to_string(), json!({ "a": 1, "b": 2, "c": 3 }));
        let result = run(&wf, json!({ "a": 1, "b": 2, "c": 3 }), outputs).await;
        assert_eq!(result.output, json!(true));
    }

    #[tokio::test]
    async fn is_empty_treats_blank_string_as_empty() {
        let wf = workflow_with_condition(json!({
            "rules": [{ "inputReference": "Input.result", "operator": "is_empty" }]
        }));
        let mut outputs = HashMap::new();
        outputs.insert("in".to_string(), json!("   "));
        let result = run(&wf, json!(null), outputs).await;
        assert_eq!(result.output, json!(true));
    }

    #[tokio::test]
    async fn bad_regex_yields_false_not_an_error() {
        let wf = workflow_with_condition(json!({
            "rules": [{ "inputReference": "Input.result", "operator": "regex", "compareValue": "(unterminated" }]
        }));
        let mut outputs = HashMap::new();
        outputs.insert("in".to_string(), json!("anything"));
        let result = run(&wf, json!(null), outputs).await;
        assert_eq!(result.output, json!(false));
    }

    #[test]
    fn output_handle_routes_on_boolean_result() {
        let node = Node { id: "c".into(), kind: "condition".into(), position: None, data: NodeData { name: "C".into(), config: json!({}) } };
        assert_eq!(ConditionExecutor.get_output_handle(&node, &ExecutorOutput::value(json!(true))), Some("true".to_string()));
        assert_eq!(ConditionExecutor.get_output_handle(&node, &ExecutorOutput::value(json!(false))), Some("false".to_string()));
    }
}
