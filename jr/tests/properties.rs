//! Property tests for the repair engine

use jsonrepair::{repair, structural_repair};
use proptest::prelude::*;
use serde_json::Value;

// =============================================================================
// Generators
// =============================================================================

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-z \"\\\\\n\u{1}é{}\\[\\],:]{0,12}".prop_map(Value::String),
    ]
}

fn arb_json() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}|recommendations|id", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}|recommendations", arb_json(), 1..5)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

// =============================================================================
// Helpers
// =============================================================================

/// `repaired` keeps only content present in `original`: object keys are a
/// subset, arrays and strings may be shortened, scalars are equal
fn prefix_consistent(repaired: &Value, original: &Value) -> bool {
    match (repaired, original) {
        (Value::Object(r), Value::Object(o)) => r
            .iter()
            .all(|(key, value)| o.get(key).is_some_and(|orig| prefix_consistent(value, orig))),
        (Value::Array(r), Value::Array(o)) => {
            r.len() <= o.len() && r.iter().zip(o).all(|(value, orig)| prefix_consistent(value, orig))
        }
        (Value::String(r), Value::String(o)) => o.starts_with(r.as_str()),
        (r, o) => r == o,
    }
}

/// Depth of unmatched brackets outside strings; None when a closer has no opener
/// or the text ends inside a string
fn net_depth(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }

    (!in_string).then_some(depth)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn valid_json_is_returned_unchanged(value in arb_json()) {
        let compact = serde_json::to_string(&value).unwrap();
        let repaired = repair(&compact).unwrap();
        prop_assert_eq!(&repaired.value, &value);
        prop_assert_eq!(repaired.strategy, jsonrepair::Strategy::Strict);

        let pretty = serde_json::to_string_pretty(&value).unwrap();
        prop_assert_eq!(repair(&pretty).unwrap().value, value);
    }

    #[test]
    fn truncation_never_fabricates(value in arb_object(), cut in any::<prop::sample::Index>()) {
        let text = serde_json::to_string(&value).unwrap();
        let end = floor_char_boundary(&text, cut.index(text.len() + 1));
        let truncated = &text[..end];

        match repair(truncated) {
            Ok(repaired) => prop_assert!(
                prefix_consistent(&repaired.value, &value),
                "{:?} repaired to {} which is not a prefix of {}",
                truncated,
                repaired.value,
                value
            ),
            Err(e) => prop_assert!(truncated.is_empty(), "{:?} failed: {}", truncated, e),
        }
    }

    #[test]
    fn structural_repair_balances_truncated_json(value in arb_object(), cut in any::<prop::sample::Index>()) {
        let text = serde_json::to_string(&value).unwrap();
        let end = floor_char_boundary(&text, cut.index(text.len() + 1));
        let closed = structural_repair(&text[..end]);
        prop_assert_eq!(net_depth(&closed), Some(0));
    }

    #[test]
    fn structural_repair_balances_arbitrary_text(text in "[\\[\\]{}\",:a-z0-9\\\\ ]{0,48}") {
        let closed = structural_repair(&text);
        prop_assert_eq!(net_depth(&closed), Some(0), "{:?} -> {:?}", text, closed);
    }

    #[test]
    fn structural_repair_balances_any_string(text in any::<String>()) {
        let closed = structural_repair(&text);
        prop_assert_eq!(net_depth(&closed), Some(0));
    }
}

// =============================================================================
// Fixed cases
// =============================================================================

#[test]
fn truncated_worker_output_keeps_empty_recommendations() {
    let raw = r#"{"recommendations":[{"id":"a","title":"X","description":"Y","pros":["p"],"cons":["#;
    let repaired = repair(raw).unwrap();
    assert_eq!(repaired.value, serde_json::json!({"recommendations": []}));
}

#[test]
fn every_prefix_of_a_worker_payload_repairs() {
    let payload = serde_json::json!({
        "recommendations": [
            {"id": "r1", "title": "Negotiate", "description": "Ask for more", "pros": ["money"], "cons": ["awkward"]},
            {"id": "r2", "title": "Wait", "description": "See what comes", "pros": [], "cons": ["slow"], "tags": ["safe"]}
        ]
    });
    let text = serde_json::to_string(&payload).unwrap();

    for end in 1..=text.len() {
        let repaired = repair(&text[..end]).unwrap_or_else(|e| panic!("prefix {end} failed: {e}"));
        let recs = repaired.value["recommendations"].as_array().cloned().unwrap_or_default();
        for rec in &recs {
            // elements are only ever kept whole
            assert!(payload["recommendations"].as_array().unwrap().contains(rec), "half element at {end}: {rec}");
        }
    }
}
