//! Binary operators.
//!
//! Operators are written with whitespace on both sides and apply strictly
//! left to right: `2 + 3 * 4` is `(2 + 3) * 4`.  The lexer builds its
//! `operator` and `sentence_end` patterns from the tables below, so adding
//! an operator is one table entry plus its evaluation.

use std::cmp::Ordering;

use crate::script::node::Mode;
use crate::script::value::{Dimension, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    /// `is`: strict equality.
    Is,
    IsNot,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `==`: coercing equality.
    Like,
    NotLike,
    Set,
    AddSet,
    SubSet,
    Cast,
    Rescue,
    IsType,
    Then,
    Insert,
    IsIn,
    IsNotIn,
}

/// Operator spellings in lexer match order.
pub const OPERATORS: &[(&str, BinOp)] = &[
    ("+", BinOp::Add),
    ("-", BinOp::Sub),
    ("*", BinOp::Mul),
    ("/", BinOp::Div),
    ("%", BinOp::Mod),
    ("and", BinOp::And),
    ("or", BinOp::Or),
    ("is", BinOp::Is),
    ("is_not", BinOp::IsNot),
    ("<", BinOp::Lt),
    ("<=", BinOp::Lte),
    (">", BinOp::Gt),
    (">=", BinOp::Gte),
    ("==", BinOp::Like),
    ("!=", BinOp::NotLike),
    ("=", BinOp::Set),
    ("+=", BinOp::AddSet),
    ("-=", BinOp::SubSet),
    ("as", BinOp::Cast),
    ("rescue", BinOp::Rescue),
    ("is_a", BinOp::IsType),
    ("is_an", BinOp::IsType),
    ("then", BinOp::Then),
    ("|", BinOp::Then),
    ("<<", BinOp::Insert),
    ("is_in", BinOp::IsIn),
    ("is_not_in", BinOp::IsNotIn),
];

/// Sentence terminators and the mode each one gives its sentence.
pub const SENTENCE_ENDS: &[(&str, Mode)] = &[
    (";", Mode::Sync),
    ("&", Mode::Async),
    ("?", Mode::Condition),
    ("else?", Mode::Branch),
    (">>", Mode::Fwd),
];

pub fn lookup(text: &str) -> Option<BinOp> {
    OPERATORS.iter().find(|(s, _)| *s == text).map(|(_, op)| *op)
}

pub fn sentence_mode(text: &str) -> Mode {
    SENTENCE_ENDS.iter().find(|(s, _)| *s == text).map_or(Mode::Sync, |(_, m)| *m)
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Is => "is",
            BinOp::IsNot => "is_not",
            BinOp::Lt => "lt",
            BinOp::Lte => "lte",
            BinOp::Gt => "gt",
            BinOp::Gte => "gte",
            BinOp::Like => "like",
            BinOp::NotLike => "not_like",
            BinOp::Set => "set",
            BinOp::AddSet => "add_set",
            BinOp::SubSet => "sub_set",
            BinOp::Cast => "cast",
            BinOp::Rescue => "rescue",
            BinOp::IsType => "is_type",
            BinOp::Then => "then",
            BinOp::Insert => "insert",
            BinOp::IsIn => "is_in",
            BinOp::IsNotIn => "is_not_in",
        }
    }

    /// Operators whose operands are both evaluated up front and combined
    /// by [`apply`].
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::Mod
                | BinOp::Is
                | BinOp::IsNot
                | BinOp::Lt
                | BinOp::Lte
                | BinOp::Gt
                | BinOp::Gte
                | BinOp::Like
                | BinOp::NotLike
                | BinOp::IsIn
                | BinOp::IsNotIn
        )
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Combine two resolved operands.  Only meaningful for
/// [`BinOp::is_simple`] operators; anything else yields `undefined`.
pub fn apply(op: BinOp, l: &Value, r: &Value) -> Value {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, l, r),
        BinOp::Is => Value::Bool(l.strict_eq(r)),
        BinOp::IsNot => Value::Bool(!l.strict_eq(r)),
        BinOp::Like => Value::Bool(l.loose_eq(r)),
        BinOp::NotLike => Value::Bool(!l.loose_eq(r)),
        BinOp::Lt => Value::Bool(l.compare(r) == Some(Ordering::Less)),
        BinOp::Lte => Value::Bool(matches!(l.compare(r), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => Value::Bool(l.compare(r) == Some(Ordering::Greater)),
        BinOp::Gte => Value::Bool(matches!(l.compare(r), Some(Ordering::Greater | Ordering::Equal))),
        BinOp::IsIn => Value::Bool(is_in(l, r)),
        BinOp::IsNotIn => Value::Bool(!is_in(l, r)),
        _ => Value::Undefined,
    }
}

/// `+ - * / %`.  Two dimensions with the same unit keep the unit; any
/// other mix falls back to plain numbers, except that `+` concatenates
/// when either side is text.
pub fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Value {
    if let (Value::Dimension(a), Value::Dimension(b)) = (l, r) {
        if a.unit == b.unit {
            return Value::Dimension(Dimension { number: numeric(op, a.number, b.number), unit: a.unit.clone() });
        }
    }
    if op == BinOp::Add {
        let text = |v: &Value| matches!(v, Value::Str(_)) || (!matches!(v, Value::Dimension(_)) && v.is_stringish());
        if text(l) || text(r) {
            return Value::Str(format!("{l}{r}"));
        }
    }
    Value::Number(numeric(op, l.to_number(), r.to_number()))
}

fn numeric(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        _ => f64::NAN,
    }
}

/// Membership: element of an array or list, key of an object, substring
/// of a string.
pub fn is_in(l: &Value, r: &Value) -> bool {
    match r {
        Value::Array(items) => items.borrow().iter().any(|v| v.strict_eq(l)),
        Value::Object(map) => map.borrow().contains_key(&l.as_text()),
        Value::Str(s) => s.contains(&l.as_text()),
        Value::Host(h) => h.items().is_some_and(|items| items.iter().any(|v| v.strict_eq(l))),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::Object;

    fn dim(n: f64, unit: &str) -> Value {
        Value::Dimension(Dimension { number: n, unit: unit.into() })
    }

    #[test]
    fn lookup_spellings() {
        assert_eq!(lookup("is_an"), Some(BinOp::IsType));
        assert_eq!(lookup("|"), Some(BinOp::Then));
        assert_eq!(lookup("=="), Some(BinOp::Like));
        assert_eq!(lookup("nope"), None);
        assert_eq!(sentence_mode("else?"), Mode::Branch);
        assert_eq!(sentence_mode(")"), Mode::Sync);
    }

    #[test]
    fn units_are_kept_when_equal() {
        assert_eq!(arithmetic(BinOp::Add, &dim(10.0, "px"), &dim(5.0, "px")), dim(15.0, "px"));
        assert_eq!(arithmetic(BinOp::Mul, &dim(2.0, "em"), &dim(3.0, "em")), dim(6.0, "em"));
    }

    #[test]
    fn mismatched_units_fall_back_to_numbers() {
        assert_eq!(arithmetic(BinOp::Add, &dim(10.0, "px"), &5.0.into()), Value::Number(15.0));
        assert_eq!(arithmetic(BinOp::Sub, &dim(10.0, "px"), &dim(4.0, "em")), Value::Number(6.0));
    }

    #[test]
    fn plus_concatenates_text() {
        assert_eq!(arithmetic(BinOp::Add, &"a".into(), &1.0.into()), Value::from("a1"));
        assert_eq!(arithmetic(BinOp::Add, &1.0.into(), &"1".into()), Value::from("11"));
        assert_eq!(arithmetic(BinOp::Add, &dim(1.0, "px"), &"!".into()), Value::from("1px!"));
        assert_eq!(arithmetic(BinOp::Sub, &"5".into(), &1.0.into()), Value::Number(4.0));
    }

    #[test]
    fn strict_and_loose_are_distinct() {
        assert_eq!(apply(BinOp::Is, &1.0.into(), &"1".into()), Value::Bool(false));
        assert_eq!(apply(BinOp::Like, &1.0.into(), &"1".into()), Value::Bool(true));
        assert_eq!(apply(BinOp::IsNot, &Value::Null, &Value::Undefined), Value::Bool(true));
        assert_eq!(apply(BinOp::NotLike, &Value::Null, &Value::Undefined), Value::Bool(false));
    }

    #[test]
    fn comparisons() {
        assert_eq!(apply(BinOp::Lt, &1.0.into(), &2.0.into()), Value::Bool(true));
        assert_eq!(apply(BinOp::Gte, &2.0.into(), &2.0.into()), Value::Bool(true));
        assert_eq!(apply(BinOp::Gt, &"b".into(), &"a".into()), Value::Bool(true));
        assert_eq!(apply(BinOp::Lt, &f64::NAN.into(), &1.0.into()), Value::Bool(false));
    }

    #[test]
    fn membership() {
        let arr = Value::array(vec![1.0.into(), "x".into()]);
        assert!(is_in(&"x".into(), &arr));
        assert!(!is_in(&"1".into(), &arr));
        let mut map = Object::new();
        map.insert("k".into(), Value::Null);
        assert!(is_in(&"k".into(), &Value::object(map)));
        assert!(is_in(&"ell".into(), &"hello".into()));
        assert!(!is_in(&"x".into(), &Value::Number(1.0)));
    }
}
