use serde_json::json;

use trigger_tree::{
    ComparerRegistry, Quantifier, RelationshipType, TriggerTree, TriggerTreeConfig, TriggerTreeError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn actions<A: Copy>(tree: &TriggerTree<A>, memory: &serde_json::Value) -> Vec<A> {
    tree.matches(memory).iter().map(|m| *m.action()).collect()
}

/// No two matched clauses may be strictly related.
fn assert_maximal<A>(tree: &TriggerTree<A>, memory: &serde_json::Value) {
    let matches = tree.matches(memory);
    let clauses: Vec<_> = matches.iter().flat_map(|m| m.clauses().iter().copied()).collect();
    for (i, a) in clauses.iter().enumerate() {
        for b in &clauses[i + 1..] {
            let rel = a.relationship(b, tree.comparers());
            assert!(
                matches!(rel, RelationshipType::Equal | RelationshipType::Incomparable),
                "{a} is {rel} of {b}"
            );
        }
    }
}

#[test]
fn true_matches_everything() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("true", "root", vec![]).unwrap();

    assert_eq!(actions(&tree, &json!({})), vec!["root"]);
    assert_eq!(actions(&tree, &json!({"anything": [1, 2]})), vec!["root"]);
    assert_eq!(tree.total_triggers(), 1);
}

#[test]
fn most_specific_of_overlapping_triggers() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("exists(woof) || exists(blah)", 1, vec![]).unwrap();
    tree.add_trigger("exists(blah)", 2, vec![]).unwrap();
    tree.add_trigger("exists(blah) && exists(foo)", 3, vec![]).unwrap();
    assert_eq!(tree.verify_tree(), None);

    let memory = json!({"blah": 1, "woof": 3});
    assert_eq!(actions(&tree, &memory), vec![1, 2]);
    assert_maximal(&tree, &memory);

    let memory = json!({"blah": 1, "foo": 2});
    assert_eq!(actions(&tree, &memory), vec![3]);
}

#[test]
fn ignored_predicates_filter_but_do_not_place() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("ignore(!exists(foo)) && exists(blah)", 1, vec![]).unwrap();
    tree.add_trigger("exists(blah) && ignore(!exists(foo2)) && woof == 3", 2, vec![])
        .unwrap();
    tree.add_trigger("exists(blah) && woof == 3", 3, vec![]).unwrap();
    assert_eq!(tree.verify_tree(), None);

    assert_eq!(actions(&tree, &json!({"blah": 1, "woof": 3})), vec![2, 3]);
    assert_eq!(actions(&tree, &json!({"blah": 1, "woof": 3, "foo2": 0})), vec![3]);
    assert_eq!(actions(&tree, &json!({"blah": 1})), vec![1]);
    assert!(actions(&tree, &json!({"blah": 1, "foo": 0})).is_empty());
}

#[test]
fn boolean_constants() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("exists(blah) && true", 1, vec![]).unwrap();
    tree.add_trigger("exists(blah) && false", 2, vec![]).unwrap();
    tree.add_trigger("exists(blah)", 3, vec![]).unwrap();
    tree.add_trigger("true", 4, vec![]).unwrap();
    tree.add_trigger("false", 5, vec![]).unwrap();

    assert_eq!(tree.total_triggers(), 3);
    assert_eq!(actions(&tree, &json!({})), vec![4]);
    assert_eq!(actions(&tree, &json!({"blah": 1})), vec![1, 3]);
}

#[test]
fn numeric_ranges_nest() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("age > 10", "teen", vec![]).unwrap();
    tree.add_trigger("age > 20", "adult", vec![]).unwrap();
    tree.add_trigger("age > 60", "senior", vec![]).unwrap();
    tree.add_trigger("age > 20 && exists(member)", "member", vec![]).unwrap();
    assert_eq!(tree.verify_tree(), None);

    assert_eq!(actions(&tree, &json!({"age": 15})), vec!["teen"]);
    assert_eq!(actions(&tree, &json!({"age": 30})), vec!["adult"]);
    assert_eq!(actions(&tree, &json!({"age": 70})), vec!["senior"]);
    assert_eq!(actions(&tree, &json!({"age": 30, "member": true})), vec!["member"]);
    assert!(actions(&tree, &json!({"age": 5})).is_empty());
    assert_maximal(&tree, &json!({"age": 70, "member": true}));
}

#[test]
fn negation_is_pushed_into_comparisons() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("!(x < 3)", 1, vec![]).unwrap();
    tree.add_trigger("!(x < 3 || exists(y))", 2, vec![]).unwrap();

    assert!(actions(&tree, &json!({"x": 1})).is_empty());
    assert_eq!(actions(&tree, &json!({"x": 3})), vec![2]);
    assert_eq!(actions(&tree, &json!({"x": 3, "y": 1})), vec![1]);
}

#[test]
fn optional_adds_a_more_specific_variant() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("exists(a) && optional(exists(b))", 1, vec![]).unwrap();
    tree.add_trigger("exists(a)", 2, vec![]).unwrap();

    // the variant with b is subsumed within trigger 1, so only the general
    // clause takes part in matching
    let matches = tree.matches(&json!({"a": 1, "b": 1}));
    let found: Vec<i32> = matches.iter().map(|m| *m.action()).collect();
    assert_eq!(found, vec![1, 2]);
    assert!(matches.iter().all(|m| m.clauses().iter().all(|c| c.len() == 1)));
}

#[test]
fn quantifiers_expand_bindings() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("exists(x)", "any", vec![Quantifier::any("x", ["city", "country"])])
        .unwrap();
    tree.add_trigger("x > 0", "all", vec![Quantifier::all("x", ["a", "b"])])
        .unwrap();

    let matches = tree.matches(&json!({"country": "NZ"}));
    assert_eq!(matches.len(), 1);
    assert_eq!(*matches[0].action(), "any");
    assert_eq!(matches[0].bindings().get("x"), Some(&"country"));

    assert!(actions(&tree, &json!({"a": 1})).is_empty());
    assert_eq!(actions(&tree, &json!({"a": 1, "b": 2})), vec!["all"]);
}

#[test]
fn deletion_restores_an_empty_tree() {
    init_tracing();
    let mut tree = TriggerTree::new();
    let texts = [
        "exists(woof) || exists(blah)",
        "exists(blah)",
        "exists(blah) && exists(foo)",
        "ignore(!exists(foo)) && exists(blah)",
        "age > 10 && exists(blah)",
        "age > 20",
        "true",
    ];
    let ids: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| tree.add_trigger(text, i, vec![]).unwrap())
        .collect();
    assert_eq!(tree.total_triggers(), texts.len());
    assert_eq!(tree.verify_tree(), None);

    for id in ids.iter().rev() {
        assert!(tree.remove_trigger(*id));
        assert_eq!(tree.verify_tree(), None);
    }
    assert_eq!(tree.total_triggers(), 0);
    assert_eq!(tree.node_count(), 1);
    assert!(tree.matches(&json!({"blah": 1, "age": 30})).is_empty());
    assert!(!tree.remove_trigger(ids[0]));
}

#[test]
fn removal_exposes_more_general_triggers() {
    init_tracing();
    let mut tree = TriggerTree::new();
    let general = tree.add_trigger("exists(blah)", 1, vec![]).unwrap();
    let specific = tree.add_trigger("exists(blah) && exists(foo)", 2, vec![]).unwrap();

    let memory = json!({"blah": 1, "foo": 1});
    assert_eq!(actions(&tree, &memory), vec![2]);
    assert!(tree.remove_trigger(specific));
    assert_eq!(actions(&tree, &memory), vec![1]);
    assert!(tree.remove_trigger(general));
    assert!(actions(&tree, &memory).is_empty());
}

#[test]
fn rejected_triggers_leave_the_tree_unchanged() {
    init_tracing();
    let config = TriggerTreeConfig::from_json(r#"{"max_expansion": 4}"#).unwrap();
    let mut tree = TriggerTree::with_config(config, ComparerRegistry::default()).unwrap();
    tree.add_trigger("exists(a)", 1, vec![]).unwrap();
    let before = tree.tree_to_string(0);

    let err = tree
        .add_trigger("(a == 1 || a == 2 || a == 3) && (b == 1 || b == 2)", 2, vec![])
        .unwrap_err();
    assert!(matches!(err, TriggerTreeError::ExpansionLimitExceeded { limit: 4, attempted: 6 }));

    let err = tree.add_trigger("exists(a) &&& exists(b)", 3, vec![]).unwrap_err();
    assert!(err.is_expression());

    let err = tree.add_trigger("isMatch(a, '[')", 4, vec![]).unwrap_err();
    assert!(err.is_expression());

    let nested = format!("{}exists(a){}", "(".repeat(5_000), ")".repeat(5_000));
    let err = tree.add_trigger(&nested, 5, vec![]).unwrap_err();
    assert!(err.is_expression());

    assert_eq!(tree.tree_to_string(0), before);
    assert_eq!(tree.total_triggers(), 1);
}

#[test]
fn renders_graph() {
    init_tracing();
    let mut tree = TriggerTree::new();
    tree.add_trigger("exists(a)", 1, vec![]).unwrap();
    tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();
    assert_eq!(tree.to_string(), "TriggerTree with 2 triggers");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.dot");
    tree.write_dot(&path).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    assert!(dot.starts_with("strict digraph TriggerTree {"));
    assert_eq!(dot.matches("->").count(), 2);
}
