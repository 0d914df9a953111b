//! Schema compilation
//!
//! Translates a resolved schema tree into the instruction arena. Each
//! schema node compiles exactly once: a placeholder `Seq` is inserted
//! into the memo table before the node's children compile, so recursive
//! references link back to the placeholder instead of recursing forever.
//! A lexical scope stack of base URIs is maintained for `$dynamicRef`.

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Result, SchemaError};
use crate::format;
use crate::index::{node_id, DocStore, NodeRef, SchemaIndex};
use crate::instr::{
    truncated, AdditionalItems, ArrayCheck, Instr, InstrId, NumberCheck, ObjectCheck, StringCheck,
};
use crate::uri;
use std::collections::HashMap;

pub(crate) struct Compiler<'a> {
    store: &'a DocStore,
    index: &'a SchemaIndex,
    refs: &'a HashMap<usize, NodeRef>,
    arena: Vec<Instr>,
    memo: HashMap<usize, InstrId>,
    scopes: Vec<Url>,
}

impl<'a> Compiler<'a> {
    /// Compile `root` into an instruction arena, returning the arena and
    /// the root instruction.
    pub fn compile(
        store: &'a DocStore,
        index: &'a SchemaIndex,
        refs: &'a HashMap<usize, NodeRef>,
        root: &Value,
        root_uri: Url,
    ) -> Result<(Vec<Instr>, InstrId)> {
        let mut compiler = Compiler {
            store,
            index,
            refs,
            arena: Vec::new(),
            memo: HashMap::new(),
            scopes: vec![root_uri],
        };
        let root_id = compiler.compile_node(root, root)?;
        Ok((compiler.arena, root_id))
    }

    fn alloc(&mut self, instr: Instr) -> InstrId {
        self.arena.push(instr);
        InstrId(self.arena.len() - 1)
    }

    fn active_scope(&self) -> &Url {
        self.scopes.last().expect("scope stack never empties")
    }

    fn compile_node(&mut self, node: &Value, owner: &Value) -> Result<InstrId> {
        let members = match node {
            // `true` passes everything; `false` is `{"not": {}}`.
            Value::Bool(true) => return Ok(self.alloc(Instr::Always)),
            Value::Bool(false) => {
                let anything = self.alloc(Instr::Always);
                return Ok(self.alloc(Instr::Not { schema: anything, rendered: "{}".to_string() }));
            }
            Value::Object(members) => members,
            other => {
                return Err(SchemaError::Malformed(format!(
                    "expected a schema object or boolean, found {}",
                    truncated(other)
                )))
            }
        };

        let id = node_id(node);
        if let Some(&compiled) = self.memo.get(&id) {
            return Ok(compiled);
        }
        let seq_id = self.alloc(Instr::Seq(Vec::new()));
        self.memo.insert(id, seq_id);

        let scope = match members.get("$id").and_then(Value::as_str) {
            Some(declared) => uri::resolve(self.active_scope(), declared)?,
            None => self.active_scope().clone(),
        };
        tracing::trace!(scope = %scope, "compiling schema node");
        self.scopes.push(scope);
        let compiled = self.compile_keywords(node, members);
        self.scopes.pop();
        self.arena[seq_id.0] = Instr::Seq(compiled?);

        Ok(self.alloc(Instr::Scoped { active: id, owner: node_id(owner), body: seq_id }))
    }

    fn compile_keywords(&mut self, node: &Value, members: &Map<String, Value>) -> Result<Vec<InstrId>> {
        let mut seq = Vec::new();

        if let Some(types) = members.get("type") {
            let allowed: Vec<String> = match types {
                Value::String(single) => vec![single.clone()],
                Value::Array(list) => list
                    .iter()
                    .map(|t| {
                        t.as_str().map(str::to_string).ok_or_else(|| {
                            SchemaError::Malformed(format!("non-string entry in type array: {}", t))
                        })
                    })
                    .collect::<Result<_>>()?,
                other => {
                    return Err(SchemaError::Malformed(format!(
                        "type must be a string or array, found {}",
                        truncated(other)
                    )))
                }
            };
            if allowed != ["any"] {
                let rendered =
                    Value::Array(allowed.iter().cloned().map(Value::String).collect()).to_string();
                seq.push(self.alloc(Instr::Type { allowed, rendered }));
            }
        }

        if let Some(name) = members.get("format").and_then(Value::as_str) {
            if let Some(instr) = format::compile(name) {
                seq.push(self.alloc(instr));
            }
        }

        if let Some(expected) = members.get("const") {
            let instr = Instr::ConstEq { value: expected.clone(), rendered: truncated(expected) };
            seq.push(self.alloc(instr));
        }

        if let Some(options) = members.get("enum") {
            let list = options.as_array().ok_or_else(|| {
                SchemaError::Malformed(format!("enum must be an array, found {}", truncated(options)))
            })?;
            let instr = Instr::Enum { options: list.clone(), rendered: truncated(options) };
            seq.push(self.alloc(instr));
        }

        if let Some(schemas) = members.get("allOf") {
            let branches = self.compile_branches("allOf", schemas, node)?;
            seq.push(self.alloc(Instr::Seq(branches)));
        }

        if let Some(schemas) = members.get("anyOf") {
            let branches = self.compile_branches("anyOf", schemas, node)?;
            seq.push(self.alloc(Instr::AnyOf { branches, rendered: truncated(schemas) }));
        }

        if let Some(schemas) = members.get("oneOf") {
            let branches = self.compile_branches("oneOf", schemas, node)?;
            seq.push(self.alloc(Instr::OneOf { branches, rendered: truncated(schemas) }));
        }

        if let Some(negated) = members.get("not") {
            let schema = self.compile_node(negated, node)?;
            seq.push(self.alloc(Instr::Not { schema, rendered: truncated(negated) }));
        }

        if let Some(Value::Array(names)) = members.get("required") {
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    SchemaError::Malformed(format!("non-string entry in required: {}", name))
                })?;
                seq.push(self.alloc(Instr::Required(name.to_string())));
            }
        }

        let object_check = self.compile_object_check(node, members)?;
        if !object_check.is_trivial() {
            seq.push(self.alloc(Instr::CheckObject(object_check)));
        }

        if let Some(condition) = members.get("if") {
            let condition = self.compile_node(condition, node)?;
            let then = members.get("then").map(|s| self.compile_node(s, node)).transpose()?;
            let otherwise = members.get("else").map(|s| self.compile_node(s, node)).transpose()?;
            seq.push(self.alloc(Instr::IfThenElse { condition, then, otherwise }));
        }

        let array_check = self.compile_array_check(node, members)?;
        if !array_check.is_trivial() {
            seq.push(self.alloc(Instr::CheckArray(array_check)));
        }

        let number_check = NumberCheck {
            min: self.number_bound(members, "minimum")?,
            max: self.number_bound(members, "maximum")?,
            exclusive_min: self.number_bound(members, "exclusiveMinimum")?,
            exclusive_max: self.number_bound(members, "exclusiveMaximum")?,
            multiple_of: self.number_bound(members, "multipleOf")?,
        };
        if !number_check.is_trivial() {
            seq.push(self.alloc(Instr::CheckNumber(number_check)));
        }

        let string_check = StringCheck {
            min: self.count_bound(members, "minLength")?.unwrap_or(0),
            max: self.count_bound(members, "maxLength")?.unwrap_or(usize::MAX),
            pattern: members
                .get("pattern")
                .and_then(Value::as_str)
                .map(compile_pattern)
                .transpose()?,
        };
        if !string_check.is_trivial() {
            seq.push(self.alloc(Instr::CheckString(string_check)));
        }

        if let Some(dependents) = members.get("dependentSchemas") {
            let dependents = dependents.as_object().ok_or_else(|| {
                SchemaError::Malformed("dependentSchemas must be an object".to_string())
            })?;
            for (property, dependent) in dependents {
                let schema = self.compile_node(dependent, node)?;
                seq.push(self.alloc(Instr::DependentSchema { property: property.clone(), schema }));
            }
        }

        if let Some(dependents) = members.get("dependentRequired") {
            let dependents = dependents.as_object().ok_or_else(|| {
                SchemaError::Malformed("dependentRequired must be an object".to_string())
            })?;
            for (property, names) in dependents {
                let names = names.as_array().ok_or_else(|| {
                    SchemaError::Malformed(format!(
                        "dependentRequired entry for '{}' must be an array",
                        property
                    ))
                })?;
                let required = names
                    .iter()
                    .map(|n| {
                        n.as_str().map(str::to_string).ok_or_else(|| {
                            SchemaError::Malformed(format!(
                                "non-string entry in dependentRequired for '{}'",
                                property
                            ))
                        })
                    })
                    .collect::<Result<_>>()?;
                seq.push(self.alloc(Instr::DependentRequired { property: property.clone(), required }));
            }
        }

        // `$ref` was rewritten by the resolver into a direct node link.
        if let Some(target) = self.refs.get(&node_id(node)).cloned() {
            let resolved = target.resolve(self.store).ok_or_else(|| {
                SchemaError::UnresolvedReference(format!(
                    "{}#{}",
                    self.store.base(target.doc),
                    target.pointer
                ))
            })?;
            let compiled = self.compile_node(resolved, node)?;
            seq.push(compiled);
        }

        if let Some(reference) = members.get("$dynamicRef").and_then(Value::as_str) {
            let target = self.resolve_dynamic(reference)?;
            let resolved = target.resolve(self.store).ok_or_else(|| {
                SchemaError::UnresolvedReference(reference.to_string())
            })?;
            let compiled = self.compile_node(resolved, node)?;
            seq.push(compiled);
        }

        // Must run after every other applicator has populated the tracker.
        let unevaluated_properties = members
            .get("unevaluatedProperties")
            .map(|s| self.compile_node(s, node))
            .transpose()?;
        let unevaluated_items = members
            .get("unevaluatedItems")
            .map(|s| self.compile_node(s, node))
            .transpose()?;
        if unevaluated_properties.is_some() || unevaluated_items.is_some() {
            seq.push(self.alloc(Instr::Unevaluated {
                properties: unevaluated_properties,
                items: unevaluated_items,
            }));
        }

        Ok(seq)
    }

    fn compile_branches(&mut self, keyword: &str, schemas: &Value, owner: &Value) -> Result<Vec<InstrId>> {
        let list = schemas.as_array().ok_or_else(|| {
            SchemaError::Malformed(format!("{} must be an array, found {}", keyword, truncated(schemas)))
        })?;
        list.iter().map(|branch| self.compile_node(branch, owner)).collect()
    }

    fn compile_object_check(&mut self, node: &Value, members: &Map<String, Value>) -> Result<ObjectCheck> {
        let mut check = ObjectCheck::default();

        if let Some(properties) = members.get("properties") {
            let properties = properties.as_object().ok_or_else(|| {
                SchemaError::Malformed("properties must be an object".to_string())
            })?;
            for (name, schema) in properties {
                let compiled = self.compile_node(schema, node)?;
                check.props.push((name.clone(), compiled));
            }
        }

        if let Some(patterns) = members.get("patternProperties") {
            let patterns = patterns.as_object().ok_or_else(|| {
                SchemaError::Malformed("patternProperties must be an object".to_string())
            })?;
            for (pattern, schema) in patterns {
                let regex = compile_pattern(pattern)?;
                let compiled = self.compile_node(schema, node)?;
                check.patterns.push((regex, compiled));
            }
        }

        if let Some(additional) = members.get("additionalProperties") {
            check.additional = Some(self.compile_node(additional, node)?);
        }

        if let Some(names) = members.get("propertyNames") {
            check.property_names = Some(self.compile_node(names, node)?);
        }

        check.min = self.count_bound(members, "minProperties")?.unwrap_or(0);
        check.max = self.count_bound(members, "maxProperties")?.unwrap_or(usize::MAX);
        Ok(check)
    }

    fn compile_array_check(&mut self, node: &Value, members: &Map<String, Value>) -> Result<ArrayCheck> {
        let mut check = ArrayCheck::default();

        if let Some(prefix) = members.get("prefixItems") {
            match prefix {
                Value::Array(list) => {
                    let compiled = list
                        .iter()
                        .map(|schema| self.compile_node(schema, node))
                        .collect::<Result<Vec<_>>>()?;
                    check.prefix = Some(compiled);
                }
                Value::Object(_) => check.prefix_all = Some(self.compile_node(prefix, node)?),
                other => {
                    return Err(SchemaError::Malformed(format!(
                        "prefixItems must be an array or object, found {}",
                        truncated(other)
                    )))
                }
            }
        }

        if let Some(additional) = members.get("additionalItems") {
            check.additional = AdditionalItems::Schema(self.compile_node(additional, node)?);
        }

        if let Some(items) = members.get("items") {
            if items == &Value::Bool(false) {
                check.additional = AdditionalItems::Forbidden;
                if check.prefix.is_none() && check.prefix_all.is_none() {
                    check.items = Some(self.alloc(Instr::Never));
                }
            } else {
                check.items = Some(self.compile_node(items, node)?);
            }
        }

        if let Some(unique) = members.get("uniqueItems") {
            check.unique = unique.as_bool().ok_or_else(|| {
                SchemaError::Malformed("uniqueItems must be a boolean".to_string())
            })?;
        }

        check.min = self.count_bound(members, "minItems")?.unwrap_or(0);
        check.max = self.count_bound(members, "maxItems")?.unwrap_or(usize::MAX);

        if let Some(contains) = members.get("contains") {
            check.contains = Some(self.compile_node(contains, node)?);
        }
        check.min_contains = self.count_bound(members, "minContains")?.unwrap_or(1);
        check.max_contains = self.count_bound(members, "maxContains")?.unwrap_or(usize::MAX);

        Ok(check)
    }

    /// Walk the lexical scope stack from the outermost scope inward; the
    /// first scope whose resolved URI carries a dynamic anchor wins,
    /// falling back to the plain index otherwise.
    fn resolve_dynamic(&self, reference: &str) -> Result<NodeRef> {
        for scope in &self.scopes {
            let candidate = uri::resolve(scope, reference)?;
            if let Some(found) = self.index.get_dynamic(&candidate) {
                tracing::debug!(uri = %candidate, "dynamic reference bound");
                return Ok(found.clone());
            }
        }
        for scope in &self.scopes {
            let candidate = uri::resolve(scope, reference)?;
            if let Some(found) = self.index.get(&candidate) {
                return Ok(found.clone());
            }
        }
        Err(SchemaError::UnresolvedReference(reference.to_string()))
    }

    fn number_bound(&self, members: &Map<String, Value>, keyword: &str) -> Result<Option<f64>> {
        members
            .get(keyword)
            .map(|bound| {
                bound.as_f64().ok_or_else(|| {
                    SchemaError::Malformed(format!("{} must be a number, found {}", keyword, truncated(bound)))
                })
            })
            .transpose()
    }

    fn count_bound(&self, members: &Map<String, Value>, keyword: &str) -> Result<Option<usize>> {
        members
            .get(keyword)
            .map(|bound| {
                bound
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| {
                        SchemaError::Malformed(format!(
                            "{} must be a non-negative integer, found {}",
                            keyword,
                            truncated(bound)
                        ))
                    })
            })
            .transpose()
    }
}

/// ECMA-262-leaning patterns with the portability transform applied.
fn compile_pattern(source: &str) -> Result<Regex> {
    let portable = source.replace("\\p{Letter}", "\\p{L}").replace("\\p{digit}", "\\p{N}");
    Regex::new(&portable).map_err(|error| SchemaError::InvalidPattern {
        pattern: portable,
        source: Box::new(error),
    })
}
