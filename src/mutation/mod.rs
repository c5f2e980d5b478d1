use serde_json::{json, Value};

use crate::payload::Payload;

/// Closed tag for payload value kinds. Mutation catalogs are selected by an
/// exhaustive match over this enum rather than by type-name strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::String(_) => ValueKind::String,
        Value::Number(_) => ValueKind::Number,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Object(_) => ValueKind::Object,
        Value::Array(_) => ValueKind::Array,
        Value::Null => ValueKind::Null,
    }
}

/// Boundary/adversarial substitution values per kind. `Null` fields have no
/// catalog and are skipped by the sweep.
pub fn catalog_values(kind: ValueKind) -> Vec<Value> {
    match kind {
        ValueKind::String => vec![
            json!(""),
            json!("null"),
            json!("undefined"),
            json!("<script>alert(1)</script>"),
            json!("' OR '1'='1"),
            Value::Null,
            json!("true"),
            json!("false"),
            json!("0"),
            json!("1"),
            json!("admin"),
            json!("administrator"),
            json!("root"),
        ],
        ValueKind::Number => vec![
            json!(0),
            json!(-1),
            json!(9999999),
            json!("0"),
            json!(""),
            Value::Null,
            json!(true),
            json!(false),
            json!("null"),
            json!(2147483647),
            json!(-2147483648i64),
        ],
        ValueKind::Boolean => vec![
            json!(true),
            json!(false),
            json!("true"),
            json!("false"),
            json!(0),
            json!(1),
            Value::Null,
            json!(""),
            json!("null"),
        ],
        ValueKind::Object => vec![
            json!({}),
            Value::Null,
            json!(""),
            json!("null"),
            json!("undefined"),
            json!([]),
            json!("{}"),
        ],
        ValueKind::Array => vec![
            json!([]),
            Value::Null,
            json!(""),
            json!("null"),
            json!("undefined"),
            json!({}),
            json!("[]"),
            json!([1, 2, 3]),
        ],
        ValueKind::Null => Vec::new(),
    }
}

/// Lazy sweep of single-field variants: for each field of the base payload,
/// one clone per catalog value of that field's kind. Never combines two
/// substitutions.
pub struct MutationSweep<'a> {
    base: &'a Payload,
    fields: Vec<&'a String>,
    field_idx: usize,
    values: Vec<Value>,
    value_idx: usize,
}

impl<'a> MutationSweep<'a> {
    fn advance_field(&mut self) -> bool {
        while self.field_idx < self.fields.len() {
            let field = self.fields[self.field_idx];
            let kind = kind_of(&self.base[field.as_str()]);
            self.values = catalog_values(kind);
            self.value_idx = 0;
            if !self.values.is_empty() {
                return true;
            }
            self.field_idx += 1;
        }
        false
    }
}

impl<'a> Iterator for MutationSweep<'a> {
    type Item = Payload;

    fn next(&mut self) -> Option<Payload> {
        loop {
            if self.value_idx < self.values.len() {
                let field = self.fields[self.field_idx];
                let value = self.values[self.value_idx].clone();
                self.value_idx += 1;
                let mut mutated = self.base.clone();
                mutated.insert(field.clone(), value);
                return Some(mutated);
            }
            self.field_idx += 1;
            if !self.advance_field() {
                return None;
            }
        }
    }
}

pub fn variants(base: &Payload) -> MutationSweep<'_> {
    let mut sweep = MutationSweep {
        base,
        fields: base.keys().collect(),
        field_idx: 0,
        values: Vec::new(),
        value_idx: 0,
    };
    sweep.advance_field();
    sweep
}
