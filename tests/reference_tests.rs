//! Reference resolution
//!
//! `$ref` / `$dynamicRef` across pointers, anchors, embedded `$id`
//! scopes, recursion, and remote documents supplied by a fetcher.

use std::collections::HashMap;

use serde_json::{json, Value};
use url::Url;

use schema_validate::{DirFetcher, SchemaError, SchemaFetcher, Validator};

fn compiled(schema: Value) -> Validator {
    Validator::new(schema).expect("schema compiles")
}

fn ok(schema: &Validator, instance: Value) -> bool {
    schema.validate(&instance).ok
}

/// In-memory fetcher for exercising remote resolution without a network.
struct MapFetcher(HashMap<String, String>);

impl MapFetcher {
    fn new(entries: &[(&str, Value)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(uri, doc)| (uri.to_string(), doc.to_string()))
                .collect(),
        )
    }
}

impl SchemaFetcher for MapFetcher {
    fn fetch(&self, uri: &Url) -> anyhow::Result<String> {
        self.0
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no schema registered for {uri}"))
    }
}

// =============================================================================
// Local references
// =============================================================================

#[test]
fn pointer_fragment_into_defs() {
    let schema = compiled(json!({
        "$defs": {"name": {"type": "string", "minLength": 1}},
        "properties": {"name": {"$ref": "#/$defs/name"}}
    }));
    assert!(ok(&schema, json!({"name": "ada"})));
    assert!(!ok(&schema, json!({"name": 7})));
    assert!(!ok(&schema, json!({"name": ""})));
}

#[test]
fn pointer_tokens_unescape() {
    let schema = compiled(json!({
        "$defs": {"a/b": {"type": "integer"}},
        "$ref": "#/$defs/a~1b"
    }));
    assert!(ok(&schema, json!(4)));
    assert!(!ok(&schema, json!("4")));
}

#[test]
fn anchor_reference() {
    let schema = compiled(json!({
        "$defs": {"target": {"$anchor": "mark", "type": "integer"}},
        "$ref": "#mark"
    }));
    assert!(ok(&schema, json!(3)));
    assert!(!ok(&schema, json!("x")));
}

#[test]
fn embedded_id_scopes() {
    let schema = compiled(json!({
        "$id": "https://example.com/root.json",
        "properties": {
            "item": {"$ref": "item.json"}
        },
        "$defs": {
            "item": {
                "$id": "item.json",
                "type": "object",
                "required": ["sku"]
            }
        }
    }));
    assert!(ok(&schema, json!({"item": {"sku": "1"}})));
    assert!(!ok(&schema, json!({"item": {}})));
}

#[test]
fn ref_with_sibling_keywords() {
    let schema = compiled(json!({
        "$defs": {"base": {"type": "integer"}},
        "$ref": "#/$defs/base",
        "minimum": 10
    }));
    assert!(ok(&schema, json!(12)));
    assert!(!ok(&schema, json!(5)));
    assert!(!ok(&schema, json!("12")));
}

#[test]
fn reference_transparency() {
    let referenced = compiled(json!({
        "$defs": {"s": {"type": "string", "minLength": 2}},
        "properties": {"x": {"$ref": "#/$defs/s"}}
    }));
    let inlined = compiled(json!({
        "properties": {"x": {"type": "string", "minLength": 2}}
    }));
    for instance in [
        json!({"x": "ab"}),
        json!({"x": "a"}),
        json!({"x": 5}),
        json!({}),
    ] {
        assert_eq!(
            ok(&referenced, instance.clone()),
            ok(&inlined, instance),
        );
    }
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn recursive_tree_terminates() {
    let schema = compiled(json!({
        "$ref": "#/$defs/node",
        "$defs": {
            "node": {
                "type": "object",
                "required": ["value"],
                "properties": {
                    "value": {"type": "integer"},
                    "children": {"type": "array", "items": {"$ref": "#/$defs/node"}}
                }
            }
        }
    }));

    let deep = json!({
        "value": 1,
        "children": [
            {"value": 2, "children": [{"value": 3}]},
            {"value": 4}
        ]
    });
    assert!(ok(&schema, deep));

    let broken = json!({
        "value": 1,
        "children": [{"children": []}]
    });
    assert!(!ok(&schema, broken));
}

#[test]
fn mutually_recursive_definitions() {
    let schema = compiled(json!({
        "$ref": "#/$defs/even",
        "$defs": {
            "even": {
                "type": "object",
                "properties": {"next": {"$ref": "#/$defs/odd"}},
                "required": ["e"]
            },
            "odd": {
                "type": "object",
                "properties": {"next": {"$ref": "#/$defs/even"}},
                "required": ["o"]
            }
        }
    }));
    assert!(ok(&schema, json!({"e": 1, "next": {"o": 1, "next": {"e": 1}}})));
    assert!(!ok(&schema, json!({"e": 1, "next": {"e": 1}})));
}

// =============================================================================
// Dynamic references
// =============================================================================

#[test]
fn scenario_s6_dynamic_anchor_binds_outermost() {
    let schema = compiled(json!({
        "$id": "https://example.com/strict-list",
        "$ref": "list",
        "$defs": {
            "stringItems": {"$dynamicAnchor": "items", "type": "string"},
            "list": {
                "$id": "list",
                "type": "array",
                "items": {"$dynamicRef": "#items"},
                "$defs": {"anyItems": {"$dynamicAnchor": "items"}}
            }
        }
    }));
    assert!(ok(&schema, json!(["x", "y"])));
    assert!(!ok(&schema, json!(["x", 5])));
}

#[test]
fn dynamic_ref_falls_back_lexically() {
    // No outer binding: the list's own dynamic anchor applies, which
    // accepts anything.
    let schema = compiled(json!({
        "$id": "https://example.com/list",
        "type": "array",
        "items": {"$dynamicRef": "#items"},
        "$defs": {"anyItems": {"$dynamicAnchor": "items"}}
    }));
    assert!(ok(&schema, json!([1, "mixed", null])));
}

#[test]
fn dynamic_ref_falls_back_to_plain_anchor() {
    let schema = compiled(json!({
        "$id": "https://example.com/main",
        "type": "array",
        "items": {"$dynamicRef": "#leaf"},
        "$defs": {"leaf": {"$anchor": "leaf", "type": "integer"}}
    }));
    assert!(ok(&schema, json!([1, 2])));
    assert!(!ok(&schema, json!(["x"])));
}

// =============================================================================
// Remote documents
// =============================================================================

#[test]
fn remote_ref_fetches_document() {
    let fetcher = MapFetcher::new(&[(
        "https://remote.test/item.json",
        json!({"type": "object", "required": ["id"]}),
    )]);
    let schema = Validator::with_fetcher(
        json!({"items": {"$ref": "https://remote.test/item.json"}}),
        &fetcher,
    )
    .unwrap();
    assert!(ok(&schema, json!([{"id": 1}, {"id": 2}])));
    assert!(!ok(&schema, json!([{"id": 1}, {}])));
}

#[test]
fn remote_fetch_strips_fragment() {
    // The fetcher only knows the fragmentless URI; the pointer is applied
    // locally after the fetch.
    let fetcher = MapFetcher::new(&[(
        "https://remote.test/defs.json",
        json!({"$defs": {"positive": {"type": "number", "exclusiveMinimum": 0}}}),
    )]);
    let schema = Validator::with_fetcher(
        json!({"$ref": "https://remote.test/defs.json#/$defs/positive"}),
        &fetcher,
    )
    .unwrap();
    assert!(ok(&schema, json!(5)));
    assert!(!ok(&schema, json!(0)));
    assert!(!ok(&schema, json!(-1)));
}

#[test]
fn remote_documents_may_reference_each_other() {
    let fetcher = MapFetcher::new(&[
        (
            "https://remote.test/a.json",
            json!({"properties": {"b": {"$ref": "https://remote.test/b.json"}}}),
        ),
        ("https://remote.test/b.json", json!({"type": "boolean"})),
    ]);
    let schema = Validator::with_fetcher(
        json!({"$ref": "https://remote.test/a.json"}),
        &fetcher,
    )
    .unwrap();
    assert!(ok(&schema, json!({"b": true})));
    assert!(!ok(&schema, json!({"b": 1})));
}

#[test]
fn dir_fetcher_serves_schemas_by_id() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("item.json"),
        json!({"$id": "https://local.test/item.json", "type": "integer"}).to_string(),
    )
    .unwrap();

    let fetcher = DirFetcher::new(dir.path()).unwrap();
    assert_eq!(fetcher.len(), 1);

    let schema = Validator::with_fetcher(
        json!({"$ref": "https://local.test/item.json"}),
        &fetcher,
    )
    .unwrap();
    assert!(ok(&schema, json!(7)));
    assert!(!ok(&schema, json!("7")));
}

// =============================================================================
// Compile-time failures
// =============================================================================

#[test]
fn unresolved_pointer_is_a_compile_error() {
    let error = Validator::new(json!({"$ref": "#/$defs/missing"})).unwrap_err();
    assert!(matches!(error, SchemaError::UnresolvedReference(_)));
}

#[test]
fn unreachable_remote_is_a_compile_error() {
    let error = Validator::new(json!({"$ref": "https://nowhere.test/x.json"})).unwrap_err();
    assert!(matches!(error, SchemaError::Fetch { .. }));
}

#[test]
fn malformed_pattern_is_a_compile_error() {
    let error = Validator::new(json!({"pattern": "["})).unwrap_err();
    assert!(matches!(error, SchemaError::InvalidPattern { .. }));

    let error = Validator::new(json!({"patternProperties": {"[": {}}})).unwrap_err();
    assert!(matches!(error, SchemaError::InvalidPattern { .. }));
}

#[test]
fn non_schema_nodes_are_malformed() {
    assert!(matches!(
        Validator::new(json!(12)).unwrap_err(),
        SchemaError::Malformed(_)
    ));
    assert!(matches!(
        Validator::new(json!({"type": 12})).unwrap_err(),
        SchemaError::Malformed(_)
    ));
}

#[test]
fn keywords_inside_properties_are_plain_names() {
    // A property named "$ref" is data, not a reference.
    let schema = compiled(json!({
        "properties": {"$ref": {"type": "string"}}
    }));
    assert!(ok(&schema, json!({"$ref": "anything"})));
    assert!(!ok(&schema, json!({"$ref": 5})));
}
