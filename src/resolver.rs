//! Reference resolution
//!
//! A walk over the schema graph that turns every `$ref` into a direct
//! link to its target node, so the compiler never follows strings. The
//! document tree is not rewritten; resolved targets are recorded in a
//! side table keyed by the identity of the referring node.
//!
//! `$dynamicRef` is deliberately left alone here: its target depends on
//! the lexical scope stack at the point of compilation, so the compiler
//! resolves it against the dynamic index itself.
//!
//! When a URI is absent from the index, the fragment is stripped, the
//! schema URI is fetched and indexed, and the lookup is retried with the
//! fragment applied locally. Fetches are memoized per stripped URI.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use url::Url;

use crate::error::{Result, SchemaError};
use crate::fetch::SchemaFetcher;
use crate::index::{node_id, DocStore, NodeRef, SchemaIndex};
use crate::uri;

pub(crate) struct Resolver<'f> {
    fetcher: &'f dyn SchemaFetcher,
    fetched: HashSet<Url>,
    visited: HashSet<usize>,
    refs: HashMap<usize, NodeRef>,
}

impl<'f> Resolver<'f> {
    pub fn new(fetcher: &'f dyn SchemaFetcher) -> Self {
        Self {
            fetcher,
            fetched: HashSet::new(),
            visited: HashSet::new(),
            refs: HashMap::new(),
        }
    }

    /// Resolve every `$ref` reachable from `doc`, fetching remote schemas
    /// on demand. Returns the referring-node → target side table.
    pub fn resolve_document(
        mut self,
        store: &mut DocStore,
        index: &mut SchemaIndex,
        doc: usize,
    ) -> Result<HashMap<usize, NodeRef>> {
        let root = store.arc(doc).clone();
        let base = store.base(doc).clone();
        self.walk(store, index, &root, base, "root")?;
        Ok(self.refs)
    }

    fn walk(
        &mut self,
        store: &mut DocStore,
        index: &mut SchemaIndex,
        node: &Value,
        base: Url,
        field: &str,
    ) -> Result<()> {
        if !self.visited.insert(node_id(node)) {
            return Ok(());
        }
        match node {
            Value::Object(members) => {
                let mut base = base;
                // Same guard as the indexer: keys directly under
                // `properties` are user property names.
                if field != "properties" {
                    if let Some(id) = members.get("$id").and_then(Value::as_str) {
                        base = uri::resolve(&base, id)?;
                    }
                    if let Some(reference) = members.get("$ref").and_then(Value::as_str) {
                        let ref_uri = uri::resolve(&base, reference)?;
                        tracing::debug!(uri = %ref_uri, "resolving reference");
                        let target = self.lookup(store, index, &ref_uri)?;
                        self.refs.insert(node_id(node), target.clone());
                        self.visit_target(store, index, &target, ref_uri)?;
                    }
                }
                for (key, child) in members {
                    self.walk(store, index, child, base.clone(), key)?;
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.walk(store, index, child, base.clone(), "[]")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Recurse into a resolved target so its own references resolve too.
    fn visit_target(
        &mut self,
        store: &mut DocStore,
        index: &mut SchemaIndex,
        target: &NodeRef,
        ref_uri: Url,
    ) -> Result<()> {
        let doc = store.arc(target.doc).clone();
        let node = doc
            .pointer(&target.pointer)
            .ok_or_else(|| SchemaError::UnresolvedReference(ref_uri.to_string()))?;
        self.walk(store, index, node, ref_uri, "$ref")
    }

    /// Lookup policy: exact index hit, else split off the fragment,
    /// locate (or fetch) the schema URI, and apply the fragment locally.
    fn lookup(&mut self, store: &mut DocStore, index: &mut SchemaIndex, target: &Url) -> Result<NodeRef> {
        if let Some(found) = index.get(target) {
            return Ok(found.clone());
        }
        if let Some(pointer) = uri::pointer_fragment(target).map(str::to_string) {
            let schema_uri = uri::strip_fragment(target);
            let root = self.schema_root(store, index, &schema_uri)?;
            let resolved = NodeRef {
                doc: root.doc,
                pointer: format!("{}{}", root.pointer, pointer),
            };
            if resolved.resolve(store).is_none() {
                return Err(SchemaError::UnresolvedReference(target.to_string()));
            }
            return Ok(resolved);
        }
        if uri::anchor_fragment(target).is_some() {
            let schema_uri = uri::strip_fragment(target);
            self.schema_root(store, index, &schema_uri)?;
            return index
                .get(target)
                .cloned()
                .ok_or_else(|| SchemaError::UnresolvedReference(target.to_string()));
        }
        self.schema_root(store, index, target)
    }

    /// Node registered for a fragmentless schema URI, fetching and
    /// indexing the document if it is not yet known.
    fn schema_root(&mut self, store: &mut DocStore, index: &mut SchemaIndex, schema_uri: &Url) -> Result<NodeRef> {
        if let Some(found) = index.get(schema_uri) {
            return Ok(found.clone());
        }
        if !self.fetched.insert(schema_uri.clone()) {
            return Err(SchemaError::UnresolvedReference(schema_uri.to_string()));
        }
        tracing::debug!(uri = %schema_uri, "fetching remote schema");
        let text = self.fetcher.fetch(schema_uri).map_err(|source| SchemaError::Fetch {
            uri: schema_uri.to_string(),
            source,
        })?;
        let document: Value = serde_json::from_str(&text)?;
        let doc = store.add(document, schema_uri.clone());
        index.index_document(store, doc)?;
        let root = store.arc(doc).clone();
        self.walk(store, index, &root, schema_uri.clone(), "root")?;
        index
            .get(schema_uri)
            .cloned()
            .ok_or_else(|| SchemaError::UnresolvedReference(schema_uri.to_string()))
    }
}
