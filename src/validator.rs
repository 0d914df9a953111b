//! Compiled schema and validation entry points
//!
//! `Validator` owns the pinned schema documents and the compiled
//! instruction arena. It is immutable after construction, so one
//! compiled schema can be shared freely across threads; each
//! `validate()` call allocates its own run state.

use serde::Serialize;
use serde_json::Value;

use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::error::Result;
use crate::fetch::{NoNetworkFetcher, SchemaFetcher};
use crate::index::{DocStore, SchemaIndex};
use crate::instr::{Instr, InstrId};
use crate::resolver::Resolver;
use crate::uri;

/// A schema compiled for repeated validation.
#[derive(Debug)]
pub struct Validator {
    store: DocStore,
    arena: Vec<Instr>,
    root: InstrId,
}

impl Validator {
    /// Compile a schema document. References outside the document fail
    /// compilation; use [`Validator::with_fetcher`] to supply remote
    /// schemas.
    pub fn new(schema: Value) -> Result<Self> {
        Self::with_fetcher(schema, &NoNetworkFetcher)
    }

    /// Compile a schema document, delegating unresolved URIs to `fetcher`.
    ///
    /// The fetcher is used only during this call; validation never
    /// fetches.
    pub fn with_fetcher(schema: Value, fetcher: &dyn SchemaFetcher) -> Result<Self> {
        let root_uri = uri::default_root();
        let mut store = DocStore::new(schema, root_uri.clone());
        let mut index = SchemaIndex::default();
        index.index_document(&store, 0)?;
        let refs = Resolver::new(fetcher).resolve_document(&mut store, &mut index, 0)?;
        let (arena, root) = Compiler::compile(&store, &index, &refs, store.node(0), root_uri)?;
        Ok(Self { store, arena, root })
    }

    /// Validate an instance against the compiled schema.
    pub fn validate(&self, instance: &Value) -> Validation {
        let errors = Engine::new(&self.arena).run(self.root, instance);
        Validation { ok: errors.is_empty(), errors }
    }

    /// The schema document this validator was compiled from.
    pub fn schema(&self) -> &Value {
        self.store.node(0)
    }
}

/// Outcome of one validation: `ok`, plus the ordered error messages when
/// the instance does not conform.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Validation {
    /// `{"ok": true}` or `{"ok": false, "errors": [...]}`.
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("ok".to_string(), Value::Bool(self.ok));
        if !self.errors.is_empty() {
            out.insert(
                "errors".to_string(),
                Value::Array(self.errors.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(out)
    }
}

/// One-shot convenience: compile `schema` and check `instance` against
/// it. A schema that fails to compile validates nothing.
pub fn is_valid(schema: &Value, instance: &Value) -> bool {
    Validator::new(schema.clone())
        .map(|validator| validator.validate(instance).ok)
        .unwrap_or(false)
}
