//! Validation engine
//!
//! A pure walk over the instruction arena with one mutable side-channel:
//! the evaluation tracker, which records per instance node which members
//! an applicator has evaluated and whether that evaluation succeeded.
//! `unevaluatedProperties` / `unevaluatedItems` consume it. Every
//! applicator reports its own errors and validation never aborts early,
//! so the caller sees the full diagnostic picture.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::format;
use crate::index::node_id;
use crate::instr::{json_eq, truncated, AdditionalItems, Instr, InstrId};

/// Which members of one instance node have been evaluated, and with what
/// outcome. Array indices are tracked under their decimal rendering.
#[derive(Clone, Default)]
struct EvalRecord {
    slots: HashMap<String, bool>,
}

impl EvalRecord {
    fn succeeded(&self, key: &str) -> bool {
        self.slots.get(key) == Some(&true)
    }
}

/// Mutable state of one `validate()` call.
#[derive(Default)]
struct RunState {
    /// Keyed by (schema-node identity, instance-node identity).
    evaluated: HashMap<(usize, usize), EvalRecord>,
    active: usize,
    owner: usize,
}

impl RunState {
    /// Record an evaluation outcome under both the active schema node and
    /// the owner that embeds it, so sibling applicators at the owner level
    /// observe marks from their children.
    fn mark(&mut self, instance: &Value, key: &str, success: bool) {
        let instance = node_id(instance);
        self.evaluated
            .entry((self.active, instance))
            .or_default()
            .slots
            .insert(key.to_string(), success);
        self.evaluated
            .entry((self.owner, instance))
            .or_default()
            .slots
            .insert(key.to_string(), success);
    }

    fn active_record(&self, instance: &Value) -> EvalRecord {
        self.evaluated
            .get(&(self.active, node_id(instance)))
            .cloned()
            .unwrap_or_default()
    }
}

type Errors = Option<Vec<String>>;

fn merge(errors: &mut Errors, more: Errors) {
    if let Some(mut incoming) = more {
        if !incoming.is_empty() {
            errors.get_or_insert_with(Vec::new).append(&mut incoming);
        }
    }
}

fn fail(message: String) -> Errors {
    Some(vec![message])
}

pub(crate) struct Engine<'a> {
    arena: &'a [Instr],
}

impl<'a> Engine<'a> {
    pub fn new(arena: &'a [Instr]) -> Self {
        Self { arena }
    }

    pub fn run(&self, root: InstrId, instance: &Value) -> Vec<String> {
        let mut state = RunState::default();
        self.exec(root, &mut state, instance).unwrap_or_default()
    }

    fn exec(&self, id: InstrId, state: &mut RunState, value: &Value) -> Errors {
        match &self.arena[id.0] {
            Instr::Always => None,
            Instr::Never => fail("Never valid".to_string()),

            Instr::Seq(children) => {
                let mut errors = None;
                for child in children {
                    let result = self.exec(*child, state, value);
                    merge(&mut errors, result);
                }
                errors
            }

            Instr::Scoped { active, owner, body } => {
                let before = (state.active, state.owner);
                state.active = *active;
                state.owner = *owner;
                let result = self.exec(*body, state, value);
                state.active = before.0;
                state.owner = before.1;
                result
            }

            Instr::Type { allowed, rendered } => {
                let actual = type_name(value);
                for candidate in allowed {
                    if candidate == actual || candidate == "any" {
                        return None;
                    }
                    if candidate == "integer" && is_integer(value) {
                        return None;
                    }
                }
                fail(format!(
                    "Type mismatch for {}, allowed types: {}",
                    truncated(value),
                    rendered
                ))
            }

            Instr::ConstEq { value: expected, rendered } => {
                if json_eq(value, expected) {
                    None
                } else {
                    fail(format!("Element {} is not equal to {}", truncated(value), rendered))
                }
            }

            Instr::Enum { options, rendered } => {
                if options.iter().any(|option| json_eq(value, option)) {
                    None
                } else {
                    fail(format!(
                        "Element {} doesn't match any of enumerated possibilities {}",
                        truncated(value),
                        rendered
                    ))
                }
            }

            Instr::CheckNumber(check) => {
                let Some(number) = value.as_f64() else { return None };
                let mut errors = None;
                if let Some(min) = check.min {
                    if number < min {
                        merge(&mut errors, fail(format!("Number {} is below allowed minimum {}", number, min)));
                    }
                }
                if let Some(exclusive_min) = check.exclusive_min {
                    if number <= exclusive_min {
                        merge(
                            &mut errors,
                            fail(format!(
                                "Number {} is equal or below allowed exclusive minimum {}",
                                number, exclusive_min
                            )),
                        );
                    }
                }
                if let Some(max) = check.max {
                    if number > max {
                        merge(&mut errors, fail(format!("Number {} is above allowed maximum {}", number, max)));
                    }
                }
                if let Some(exclusive_max) = check.exclusive_max {
                    if number >= exclusive_max {
                        merge(
                            &mut errors,
                            fail(format!(
                                "Number {} is equal or above allowed exclusive maximum {}",
                                number, exclusive_max
                            )),
                        );
                    }
                }
                if let Some(multiple) = check.multiple_of {
                    if (number / multiple) % 1.0 != 0.0 {
                        merge(&mut errors, fail(format!("Number {} is not a multiple of {}", number, multiple)));
                    }
                }
                errors
            }

            Instr::CheckString(check) => {
                let Value::String(text) = value else { return None };
                let mut errors = None;
                // Length counts Unicode code points, not code units.
                let length = text.chars().count();
                if length < check.min || length > check.max {
                    merge(
                        &mut errors,
                        fail(format!(
                            "String {} has length outside of the permitted range [{},{}]",
                            truncated(value),
                            check.min,
                            check.max
                        )),
                    );
                }
                if let Some(pattern) = &check.pattern {
                    if !pattern.is_match(text) {
                        merge(
                            &mut errors,
                            fail(format!(
                                "String {} does not match regex '{}'",
                                truncated(value),
                                pattern.as_str()
                            )),
                        );
                    }
                }
                errors
            }

            Instr::Format { name, check } => {
                let Value::String(text) = value else { return None };
                if format::check(check, text) {
                    None
                } else {
                    fail(format!("Element {} is not a valid {}", truncated(value), name))
                }
            }

            Instr::CheckArray(check) => self.check_array(check, state, value),
            Instr::CheckObject(check) => self.check_object(check, state, value),

            Instr::Required(name) => {
                let Value::Object(members) = value else { return None };
                if members.contains_key(name) {
                    None
                } else {
                    fail(format!(
                        "Required property {} missing from object {}",
                        name,
                        truncated(value)
                    ))
                }
            }

            Instr::AnyOf { branches, rendered } => {
                let mut passed = false;
                for branch in branches {
                    if self.exec(*branch, state, value).is_none() {
                        passed = true;
                    }
                }
                if passed {
                    None
                } else {
                    fail(format!(
                        "Element {} must conform to at least one of available sub-schemas {}",
                        truncated(value),
                        rendered
                    ))
                }
            }

            Instr::OneOf { branches, rendered } => {
                let mut matches = 0;
                let mut branch_errors = Vec::new();
                for branch in branches {
                    match self.exec(*branch, state, value) {
                        None => matches += 1,
                        Some(errors) => branch_errors.extend(errors),
                    }
                }
                if matches == 1 {
                    None
                } else {
                    let mut errors = vec![format!(
                        "Element {} must conform to exactly one of available sub-schemas {}",
                        truncated(value),
                        rendered
                    )];
                    errors.extend(branch_errors);
                    Some(errors)
                }
            }

            Instr::Not { schema, rendered } => {
                // A successful `not` branch contributes no evaluation marks.
                let snapshot = state.evaluated.clone();
                let result = self.exec(*schema, state, value);
                state.evaluated = snapshot;
                match result {
                    Some(_) => None,
                    None => fail(format!(
                        "Element {} must NOT conform to the schema {}",
                        truncated(value),
                        rendered
                    )),
                }
            }

            Instr::IfThenElse { condition, then, otherwise } => {
                // The condition's evaluation marks propagate either way.
                let branch = if self.exec(*condition, state, value).is_none() { then } else { otherwise };
                match branch {
                    Some(branch) => self.exec(*branch, state, value),
                    None => None,
                }
            }

            Instr::DependentSchema { property, schema } => {
                let Value::Object(members) = value else { return None };
                if members.contains_key(property) {
                    self.exec(*schema, state, value)
                } else {
                    None
                }
            }

            Instr::DependentRequired { property, required } => {
                let Value::Object(members) = value else { return None };
                if !members.contains_key(property) {
                    return None;
                }
                let mut errors = None;
                for name in required {
                    if !members.contains_key(name) {
                        merge(
                            &mut errors,
                            fail(format!(
                                "Conditionally required property {} missing from object {}",
                                name,
                                truncated(value)
                            )),
                        );
                    }
                }
                errors
            }

            Instr::Unevaluated { properties, items } => match value {
                Value::Array(list) => {
                    let Some(schema) = items else { return None };
                    let record = state.active_record(value);
                    let mut errors = None;
                    for (i, item) in list.iter().enumerate() {
                        if !record.succeeded(&i.to_string()) {
                            let result = self.exec(*schema, state, item);
                            merge(&mut errors, result);
                        }
                    }
                    errors
                }
                Value::Object(members) => {
                    let Some(schema) = properties else { return None };
                    let record = state.active_record(value);
                    let mut errors = None;
                    for (key, member) in members {
                        if !record.succeeded(key) {
                            let result = self.exec(*schema, state, member);
                            merge(&mut errors, result);
                        }
                    }
                    errors
                }
                _ => None,
            },
        }
    }

    /// Element dispatch precedence: the single prefix schema, then the
    /// positional prefix, then `items`, then whatever applies to
    /// additional elements.
    fn check_array(&self, check: &crate::instr::ArrayCheck, state: &mut RunState, value: &Value) -> Errors {
        let Value::Array(list) = value else { return None };
        let mut errors = None;
        let mut contains_count = 0usize;

        for (i, item) in list.iter().enumerate() {
            let key = i.to_string();
            if let Some(schema) = check.prefix_all {
                let result = self.exec(schema, state, item);
                state.mark(value, &key, result.is_none());
                merge(&mut errors, result);
            } else if let Some(schema) = check.prefix.as_ref().and_then(|prefix| prefix.get(i)) {
                let result = self.exec(*schema, state, item);
                state.mark(value, &key, result.is_none());
                merge(&mut errors, result);
            } else if let Some(schema) = check.items {
                let result = self.exec(schema, state, item);
                state.mark(value, &key, result.is_none());
                merge(&mut errors, result);
            } else {
                match &check.additional {
                    AdditionalItems::Any => {}
                    AdditionalItems::Schema(schema) => {
                        let result = self.exec(*schema, state, item);
                        state.mark(value, &key, result.is_none());
                        merge(&mut errors, result);
                    }
                    AdditionalItems::Forbidden => {
                        merge(
                            &mut errors,
                            fail(format!(
                                "Additional items are not permitted: {} in {}",
                                truncated(item),
                                truncated(value)
                            )),
                        );
                    }
                }
            }

            if check.unique && list.iter().skip(i + 1).any(|other| json_eq(other, item)) {
                merge(&mut errors, fail(format!("Element {} is duplicate in array.", truncated(item))));
            }

            if let Some(contains) = check.contains {
                if self.exec(contains, state, item).is_none() {
                    contains_count += 1;
                    state.mark(value, &key, true);
                    if contains_count > check.max_contains {
                        merge(&mut errors, fail("Array contains too many matches".to_string()));
                    }
                }
            }

            // Bound the error volume: one failing element is enough.
            if errors.is_some() {
                break;
            }
        }

        if check.contains.is_some() && contains_count < check.min_contains {
            merge(&mut errors, fail(format!("Array requires minimum {} matches", check.min_contains)));
        }
        if list.len() < check.min || list.len() > check.max {
            merge(
                &mut errors,
                fail(format!(
                    "Array {} has number of elements outside of the permitted range [{},{}]",
                    truncated(value),
                    check.min,
                    check.max
                )),
            );
        }
        errors
    }

    fn check_object(&self, check: &crate::instr::ObjectCheck, state: &mut RunState, value: &Value) -> Errors {
        let Value::Object(members) = value else { return None };
        let mut errors = None;
        let mut checked: HashSet<&str> = HashSet::new();

        for (name, schema) in &check.props {
            if let Some(member) = members.get(name) {
                checked.insert(name.as_str());
                let result = self.exec(*schema, state, member);
                state.mark(value, name, result.is_none());
                merge(&mut errors, result);
            }
        }

        for (pattern, schema) in &check.patterns {
            for (key, member) in members {
                if pattern.is_match(key) {
                    checked.insert(key.as_str());
                    let result = self.exec(*schema, state, member);
                    state.mark(value, key, result.is_none());
                    merge(&mut errors, result);
                }
            }
        }

        if let Some(additional) = check.additional {
            for (key, member) in members {
                if !checked.contains(key.as_str()) {
                    let result = self.exec(additional, state, member);
                    state.mark(value, key, result.is_none());
                    merge(&mut errors, result);
                }
            }
        }

        if let Some(names_schema) = check.property_names {
            for key in members.keys() {
                let name = Value::String(key.clone());
                let result = self.exec(names_schema, state, &name);
                state.mark(value, key, result.is_none());
                if result.is_some() {
                    merge(&mut errors, fail(format!("Property name '{}' is not valid", key)));
                }
            }
        }

        if members.len() < check.min {
            merge(
                &mut errors,
                fail(format!(
                    "Object {} has fewer than the permitted {} number of properties",
                    truncated(value),
                    check.min
                )),
            );
        }
        if members.len() > check.max {
            merge(
                &mut errors,
                fail(format!(
                    "Object {} has more than the permitted {} number of properties",
                    truncated(value),
                    check.max
                )),
            );
        }
        errors
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `"integer"` is satisfied by any number with a zero fractional part.
fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(number) => {
            number.is_i64()
                || number.is_u64()
                || number.as_f64().map(|n| n % 1.0 == 0.0).unwrap_or(false)
        }
        _ => false,
    }
}
