//! Property tests for the `{{Name.path}}` resolver (§4.2): generated
//! variable keys and JSON values should round-trip through `resolve`
//! and through `interpolate` when the whole text is one reference.

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::Value;

use flowmesh_core::model::{Edge, Node, NodeData, Workflow};
use flowmesh_core::graph::GraphIndex;
use flowmesh_core::resolve::{ResolveScope, Resolver};

fn empty_workflow() -> Workflow {
    Workflow { id: "wf".into(), name: "wf".into(), description: None, working_directory: None, nodes: vec![], edges: vec![] }
}

fn ident() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9]{0,12}"
}

fn leaf_json() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,20}".prop_map(Value::from),
    ]
}

proptest! {
    #[test]
    fn resolve_round_trips_an_arbitrary_variable(key in ident(), value in leaf_json()) {
        let workflow = empty_workflow();
        let graph = GraphIndex::build(&workflow).unwrap();
        let mut variables = HashMap::new();
        variables.insert(key.clone(), value.clone());
        let node_outputs = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &node_outputs, variables: &variables };

        let resolved = Resolver::resolve(&scope, &format!("{{{{{key}}}}}")).unwrap();
        prop_assert_eq!(resolved, Some(value));
    }

    #[test]
    fn interpolate_of_a_bare_reference_matches_resolve_stringified(key in ident(), value in leaf_json()) {
        let workflow = empty_workflow();
        let graph = GraphIndex::build(&workflow).unwrap();
        let mut variables = HashMap::new();
        variables.insert(key.clone(), value.clone());
        let node_outputs = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &node_outputs, variables: &variables };

        let text = format!("{{{{{key}}}}}");
        let interpolated = Resolver::interpolate(&scope, &text);
        let expected = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        prop_assert_eq!(interpolated, expected);
        prop_assert!(Resolver::is_direct_reference(&text));
    }

    #[test]
    fn unknown_reference_resolves_to_none_and_interpolates_empty(key in ident()) {
        let workflow = empty_workflow();
        let graph = GraphIndex::build(&workflow).unwrap();
        let variables = HashMap::new();
        let node_outputs = HashMap::new();
        let scope = ResolveScope { graph: &graph, node_outputs: &node_outputs, variables: &variables };

        let text = format!("{{{{{key}}}}}");
        prop_assert_eq!(Resolver::resolve(&scope, &text).unwrap(), None);
        prop_assert_eq!(Resolver::interpolate(&scope, &text), String::new());
    }
}

#[test]
fn node_output_string_exposes_both_result_and_prompt() {
    let workflow = Workflow {
        id: "wf".into(),
        name: "wf".into(),
        description: None,
        working_directory: None,
        nodes: vec![Node { id: "a".into(), kind: "script".into(), position: None, data: NodeData { name: "A".into(), config: serde_json::json!({}) } }],
        edges: vec![] as Vec<Edge>,
    };
    let graph = GraphIndex::build(&workflow).unwrap();
    let mut node_outputs = HashMap::new();
    node_outputs.insert("a".to_string(), Value::from("hello"));
    let variables = HashMap::new();
    let scope = ResolveScope { graph: &graph, node_outputs: &node_outputs, variables: &variables };

    assert_eq!(Resolver::resolve(&scope, "{{A.result}}").unwrap(), Some(Value::from("hello")));
    assert_eq!(Resolver::resolve(&scope, "{{A.prompt}}").unwrap(), Some(Value::from("hello")));
    assert_eq!(Resolver::resolve(&scope, "{{A}}").unwrap(), Some(Value::from("hello")));
}
