//! Schema document store and URI index
//!
//! A single pass over each schema document collects every embedded
//! sub-schema, keyed by its absolute URI and by its anchors. Dynamic
//! anchors are indexed twice: once in the plain index and once in the
//! dynamic index consulted by `$dynamicRef` resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::uri;

/// Identity token for a schema or instance node.
///
/// The address of a node inside a pinned document is unique and stable, so
/// it serves as a map key; it is never dereferenced.
pub(crate) fn node_id(value: &Value) -> usize {
    value as *const Value as usize
}

/// Owns every schema document reached during compilation.
///
/// Documents are pinned behind `Arc` so node addresses stay stable while
/// the store grows with remote fetches.
#[derive(Debug)]
pub(crate) struct DocStore {
    docs: Vec<Doc>,
}

#[derive(Debug)]
struct Doc {
    root: Arc<Value>,
    base: Url,
}

impl DocStore {
    pub fn new(root: Value, base: Url) -> Self {
        Self {
            docs: vec![Doc { root: Arc::new(root), base }],
        }
    }

    pub fn add(&mut self, root: Value, base: Url) -> usize {
        self.docs.push(Doc { root: Arc::new(root), base });
        self.docs.len() - 1
    }

    pub fn arc(&self, doc: usize) -> &Arc<Value> {
        &self.docs[doc].root
    }

    pub fn node(&self, doc: usize) -> &Value {
        &self.docs[doc].root
    }

    pub fn base(&self, doc: usize) -> &Url {
        &self.docs[doc].base
    }
}

/// Location of a sub-schema: a document plus a JSON Pointer into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NodeRef {
    pub doc: usize,
    pub pointer: String,
}

impl NodeRef {
    pub fn resolve<'a>(&self, store: &'a DocStore) -> Option<&'a Value> {
        store.node(self.doc).pointer(&self.pointer)
    }
}

/// URI → node maps for all indexed documents.
#[derive(Default)]
pub(crate) struct SchemaIndex {
    plain: HashMap<Url, NodeRef>,
    dynamic: HashMap<Url, NodeRef>,
}

impl SchemaIndex {
    pub fn get(&self, uri: &Url) -> Option<&NodeRef> {
        self.plain.get(uri)
    }

    pub fn get_dynamic(&self, uri: &Url) -> Option<&NodeRef> {
        self.dynamic.get(uri)
    }

    /// Index one document of `store`, registering its root under the
    /// document base URI (with and without an empty fragment) and walking
    /// the tree for `$id`, `$anchor` and `$dynamicAnchor` declarations.
    pub fn index_document(&mut self, store: &DocStore, doc: usize) -> Result<()> {
        let base = store.base(doc).clone();
        let root = NodeRef { doc, pointer: String::new() };
        self.plain.insert(base.clone(), root.clone());
        self.plain.insert(uri::resolve(&base, "#")?, root);
        self.walk(doc, store.node(doc), String::new(), base, "root")
    }

    fn walk(&mut self, doc: usize, node: &Value, pointer: String, base: Url, field: &str) -> Result<()> {
        match node {
            Value::Object(members) => {
                let mut base = base;
                // Keys directly under `properties` are user property names,
                // not schema keywords.
                if field != "properties" {
                    if let Some(id) = members.get("$id").and_then(Value::as_str) {
                        base = uri::resolve(&base, id)?;
                        tracing::trace!(uri = %base, "indexing embedded schema");
                        self.plain.insert(base.clone(), NodeRef { doc, pointer: pointer.clone() });
                    }
                    if let Some(anchor) = members.get("$anchor").and_then(Value::as_str) {
                        let anchor_uri = uri::resolve(&base, &format!("#{anchor}"))?;
                        tracing::trace!(uri = %anchor_uri, "indexing anchor");
                        self.plain.insert(anchor_uri, NodeRef { doc, pointer: pointer.clone() });
                    }
                    if let Some(anchor) = members.get("$dynamicAnchor").and_then(Value::as_str) {
                        let anchor_uri = uri::resolve(&base, &format!("#{anchor}"))?;
                        tracing::trace!(uri = %anchor_uri, "indexing dynamic anchor");
                        self.dynamic.insert(anchor_uri.clone(), NodeRef { doc, pointer: pointer.clone() });
                        self.plain.insert(anchor_uri, NodeRef { doc, pointer: pointer.clone() });
                    }
                }
                for (key, child) in members {
                    let child_pointer = format!("{}/{}", pointer, escape_token(key));
                    self.walk(doc, child, child_pointer, base.clone(), key)?;
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.walk(doc, child, format!("{}/{}", pointer, i), base.clone(), "[]")?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// RFC 6901 token escaping: `~` → `~0`, `/` → `~1`.
fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
