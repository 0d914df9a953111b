//! Instruction set
//!
//! A compiled schema is a DAG of instructions held in an arena and
//! addressed by [`InstrId`]; recursion links back to an id allocated
//! before the children compiled, so cycles need no interior mutability
//! and the compiled form stays `Send + Sync`.

use regex::Regex;
use serde_json::Value;

use crate::format::FormatCheck;

/// Instance renderings in error messages are cut off at this many characters.
pub(crate) const MAX_RENDERED: usize = 200;

/// Arena handle of a compiled instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InstrId(pub usize);

/// One validation step. Applying an instruction to an instance yields
/// `None` (valid) or the accumulated error messages.
#[derive(Debug)]
pub(crate) enum Instr {
    /// The `true` schema: anything is valid.
    Always,
    /// Internal fail-fast used for `items: false` with no item schema.
    Never,
    /// Children applied in order, errors concatenated.
    Seq(Vec<InstrId>),
    /// Records which schema node owns the evaluation marks produced while
    /// `body` runs; `active`/`owner` are schema-node identity tokens.
    Scoped { active: usize, owner: usize, body: InstrId },
    Type { allowed: Vec<String>, rendered: String },
    ConstEq { value: Value, rendered: String },
    Enum { options: Vec<Value>, rendered: String },
    CheckNumber(NumberCheck),
    CheckString(StringCheck),
    Format { name: String, check: FormatCheck },
    CheckArray(ArrayCheck),
    CheckObject(ObjectCheck),
    Required(String),
    AnyOf { branches: Vec<InstrId>, rendered: String },
    OneOf { branches: Vec<InstrId>, rendered: String },
    Not { schema: InstrId, rendered: String },
    IfThenElse {
        condition: InstrId,
        then: Option<InstrId>,
        otherwise: Option<InstrId>,
    },
    DependentSchema { property: String, schema: InstrId },
    DependentRequired { property: String, required: Vec<String> },
    /// Runs after every sibling applicator has populated the evaluation
    /// tracker; applies the configured schema to unevaluated members.
    Unevaluated {
        properties: Option<InstrId>,
        items: Option<InstrId>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct NumberCheck {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exclusive_min: Option<f64>,
    pub exclusive_max: Option<f64>,
    pub multiple_of: Option<f64>,
}

impl NumberCheck {
    pub fn is_trivial(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.exclusive_min.is_none()
            && self.exclusive_max.is_none()
            && self.multiple_of.is_none()
    }
}

#[derive(Debug)]
pub(crate) struct StringCheck {
    pub min: usize,
    pub max: usize,
    pub pattern: Option<Regex>,
}

impl Default for StringCheck {
    fn default() -> Self {
        Self { min: 0, max: usize::MAX, pattern: None }
    }
}

impl StringCheck {
    pub fn is_trivial(&self) -> bool {
        self.min == 0 && self.max == usize::MAX && self.pattern.is_none()
    }
}

#[derive(Debug)]
pub(crate) struct ObjectCheck {
    pub min: usize,
    pub max: usize,
    pub props: Vec<(String, InstrId)>,
    pub patterns: Vec<(Regex, InstrId)>,
    pub additional: Option<InstrId>,
    pub property_names: Option<InstrId>,
}

impl Default for ObjectCheck {
    fn default() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
            props: Vec::new(),
            patterns: Vec::new(),
            additional: None,
            property_names: None,
        }
    }
}

impl ObjectCheck {
    pub fn is_trivial(&self) -> bool {
        self.min == 0
            && self.max == usize::MAX
            && self.props.is_empty()
            && self.patterns.is_empty()
            && self.additional.is_none()
            && self.property_names.is_none()
    }
}

/// What applies to array elements past every prefix/item schema.
#[derive(Debug)]
pub(crate) enum AdditionalItems {
    /// Unconstrained.
    Any,
    Schema(InstrId),
    /// `items: false`: extra elements are an error.
    Forbidden,
}

#[derive(Debug)]
pub(crate) struct ArrayCheck {
    pub min: usize,
    pub max: usize,
    pub unique: bool,
    /// `prefixItems` given as a single schema object.
    pub prefix_all: Option<InstrId>,
    pub prefix: Option<Vec<InstrId>>,
    pub items: Option<InstrId>,
    pub additional: AdditionalItems,
    pub contains: Option<InstrId>,
    pub min_contains: usize,
    pub max_contains: usize,
}

impl Default for ArrayCheck {
    fn default() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
            unique: false,
            prefix_all: None,
            prefix: None,
            items: None,
            additional: AdditionalItems::Any,
            contains: None,
            min_contains: 1,
            max_contains: usize::MAX,
        }
    }
}

impl ArrayCheck {
    pub fn is_trivial(&self) -> bool {
        self.min == 0
            && self.max == usize::MAX
            && !self.unique
            && self.prefix_all.is_none()
            && self.prefix.is_none()
            && self.items.is_none()
            && matches!(self.additional, AdditionalItems::Any)
            && self.contains.is_none()
    }
}

/// Instance rendering for error messages, truncated to [`MAX_RENDERED`]
/// characters followed by an ellipsis.
pub(crate) fn truncated(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > MAX_RENDERED {
        let mut cut: String = rendered.chars().take(MAX_RENDERED).collect();
        cut.push('…');
        cut
    } else {
        rendered
    }
}

/// Structural equality with numeric comparison by value, so `1` equals
/// `1.0` the way `{"type": "integer"}` accepts both.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| json_eq(v, w))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).map_or(false, |w| json_eq(v, w)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(json_eq(&json!(1), &json!(1.0)));
        assert!(!json_eq(&json!(1), &json!(1.5)));
        assert!(json_eq(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!json_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn long_values_truncate() {
        let long = json!("x".repeat(500));
        let rendered = truncated(&long);
        assert!(rendered.ends_with('…'));
        assert_eq!(rendered.chars().count(), MAX_RENDERED + 1);
    }
}
