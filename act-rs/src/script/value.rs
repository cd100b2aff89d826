//! Runtime values.
//!
//! The language is dynamically typed with loose, coercing semantics:
//! strings concatenate under `+`, comparisons coerce to numbers unless both
//! sides are strings, `==` coerces while `is` does not.  Arrays and objects
//! are shared references, so writes through one handle are visible through
//! every other.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::HostError;
use crate::host::HostObject;
use crate::script::context::Context;
use crate::script::node::{FunctionDef, Node};
use crate::script::signal::EvalFuture;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type Object = IndexMap<String, Value>;
pub type ObjectRef = Rc<RefCell<Object>>;

/// Weak counterpart of the reference variants of [`Value`].
#[derive(Debug, Clone)]
pub enum WeakValue {
    Array(Weak<RefCell<Vec<Value>>>),
    Object(Weak<RefCell<Object>>),
    Function(Weak<Callable>),
    Host(Weak<dyn HostObject>),
}

impl WeakValue {
    pub fn upgrade(&self) -> Option<Value> {
        Some(match self {
            WeakValue::Array(a) => Value::Array(a.upgrade()?),
            WeakValue::Object(o) => Value::Object(o.upgrade()?),
            WeakValue::Function(f) => Value::Function(f.upgrade()?),
            WeakValue::Host(h) => Value::Host(h.upgrade()?),
        })
    }

    pub fn is_alive(&self) -> bool {
        match self {
            WeakValue::Array(a) => a.strong_count() > 0,
            WeakValue::Object(o) => o.strong_count() > 0,
            WeakValue::Function(f) => f.strong_count() > 0,
            WeakValue::Host(h) => h.strong_count() > 0,
        }
    }
}

/// A plain function supplied by the host or the embedding program.
pub type NativeFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value, HostError>>;

/// A library method: receives the calling context, the target, and the raw
/// argument nodes so it can decide how (and whether) to evaluate them.
pub type MethodFn = for<'a> fn(&'a Context, Value, &'a [Node]) -> EvalFuture<'a, Value>;

// ── Dimension ─────────────────────────────────────────────────────────────────

/// A number with a unit, e.g. `12px` or `1.5s`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub number: f64,
    pub unit: String,
}

impl Dimension {
    /// Parse `-?\d+(\.\d+)?[a-z%]+`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let split = text.find(|c: char| c.is_ascii_lowercase() || c == '%')?;
        let (num, unit) = text.split_at(split);
        let digits = num.strip_prefix('-').unwrap_or(num);
        if digits.is_empty()
            || digits.starts_with('.')
            || digits.ends_with('.')
            || !digits.chars().all(|c| c.is_ascii_digit() || c == '.')
            || digits.matches('.').count() > 1
            || !unit.chars().all(|c| c.is_ascii_lowercase() || c == '%')
        {
            return None;
        }
        Some(Dimension { number: num.parse().ok()?, unit: unit.to_owned() })
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", format_number(self.number), self.unit)
    }
}

// ── Callable ──────────────────────────────────────────────────────────────────

pub enum Callable {
    Native { name: String, func: NativeFn },
    Method { name: &'static str, func: MethodFn },
    /// A `-> $a $b (body)` function, with the object it was defined in.
    Script { def: Rc<FunctionDef>, this: Value },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Native { name, .. } => name,
            Callable::Method { name, .. } => name,
            Callable::Script { .. } => "anonymous",
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native { name, .. } => write!(f, "Native({name})"),
            Callable::Method { name, .. } => write!(f, "Method({name})"),
            Callable::Script { def, .. } => write!(f, "Script({:?})", def.params),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Dimension(Dimension),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Callable>),
    Host(Rc<dyn HostObject>),
}

/// Arrays hold at most `2^32 - 1` elements.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Grow or shrink `items` to `len`, padding with `undefined`.  Fails
/// instead of aborting when the memory cannot be reserved.
fn resize_array(items: &mut Vec<Value>, len: usize) -> Result<(), HostError> {
    if len > items.len() && items.try_reserve_exact(len - items.len()).is_err() {
        return Err(HostError::new("Invalid array length"));
    }
    items.resize(len, Value::Undefined);
    Ok(())
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&Value, &[Value]) -> Result<Value, HostError> + 'static,
    ) -> Self {
        Value::Function(Rc::new(Callable::Native { name: name.into(), func: Rc::new(func) }))
    }

    pub fn method(name: &'static str, func: MethodFn) -> Self {
        Value::Function(Rc::new(Callable::Method { name, func }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_host(&self) -> Option<&Rc<dyn HostObject>> {
        match self {
            Value::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Host objects that report a tag name are elements.
    pub fn is_element(&self) -> bool {
        self.as_host().is_some_and(|h| h.tag_name().is_some())
    }

    /// Pointer identity for reference values.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Host(h) => Some(Rc::as_ptr(h) as *const () as usize),
            _ => None,
        }
    }

    /// A reference that does not keep the value alive.  `None` for values
    /// without an identity.
    pub fn downgrade(&self) -> Option<WeakValue> {
        Some(match self {
            Value::Array(a) => WeakValue::Array(Rc::downgrade(a)),
            Value::Object(o) => WeakValue::Object(Rc::downgrade(o)),
            Value::Function(f) => WeakValue::Function(Rc::downgrade(f)),
            Value::Host(h) => WeakValue::Host(Rc::downgrade(h)),
            _ => return None,
        })
    }

    /// `0`, `NaN`, `""`, `false`, `null` and `undefined` are falsy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Dimension(d) => d.number,
            Value::Str(s) => parse_number(s),
            Value::Function(_) => f64::NAN,
            other => parse_number(&other.to_string()),
        }
    }

    /// String form used by templates and string contexts: like `Display`,
    /// except that `undefined` renders empty.
    pub fn as_text(&self) -> String {
        match self {
            Value::Undefined => String::new(),
            other => other.to_string(),
        }
    }

    /// `typeof`-style tag.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            _ => "object",
        }
    }

    /// Constructor-style name used by `is_a`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Undefined => "Undefined".into(),
            Value::Null => "Null".into(),
            Value::Bool(_) => "Boolean".into(),
            Value::Number(_) => "Number".into(),
            Value::Str(_) => "String".into(),
            Value::Dimension(_) => "Dimension".into(),
            Value::Array(_) => "Array".into(),
            Value::Object(_) => "Object".into(),
            Value::Function(_) => "Function".into(),
            Value::Host(h) => h.type_name(),
        }
    }

    // ── Equality & ordering ───────────────────────────────────────────────────

    /// `is`: no coercion; reference values compare by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Dimension(a), Value::Dimension(b)) => a == b,
            (a, b) => match (a.identity(), b.identity()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// `==`: coercing equality.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), Number(_))
            | (Str(_), Str(_))
            | (Bool(_), Bool(_))
            | (Dimension(_), Dimension(_)) => self.strict_eq(other),
            (a, b) if a.identity().is_some() && b.identity().is_some() => a.strict_eq(b),
            (Bool(_), _) => Number(self.to_number()).loose_eq(other),
            (_, Bool(_)) => self.loose_eq(&Number(other.to_number())),
            (Number(n), _) => *n == other.to_number(),
            (_, Number(n)) => self.to_number() == *n,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// Relational ordering: strings compare lexically, everything else
    /// numerically.  `None` when either side is `NaN`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        let (a, b) = (self.to_primitive(), other.to_primitive());
        match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => a.to_number().partial_cmp(&b.to_number()),
        }
    }

    fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Host(_) => {
                Value::Str(self.to_string())
            }
            other => other.clone(),
        }
    }

    pub fn is_stringish(&self) -> bool {
        matches!(self.to_primitive(), Value::Str(_))
    }

    // ── Members ───────────────────────────────────────────────────────────────

    pub fn get_member(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.borrow().get(key).cloned().unwrap_or_default(),
            Value::Array(a) => {
                let a = a.borrow();
                if key == "length" {
                    return Value::Number(a.len() as f64);
                }
                key.parse::<usize>().ok().and_then(|i| a.get(i).cloned()).unwrap_or_default()
            }
            Value::Str(s) => {
                if key == "length" {
                    return Value::Number(s.chars().count() as f64);
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or_default()
            }
            Value::Dimension(d) => match key {
                "number" => Value::Number(d.number),
                "unit" => Value::Str(d.unit.clone()),
                _ => Value::Undefined,
            },
            Value::Host(h) => h.get(key),
            _ => Value::Undefined,
        }
    }

    pub fn set_member(&self, key: &str, value: Value) -> Result<(), HostError> {
        match self {
            Value::Object(o) => {
                o.borrow_mut().insert(key.to_owned(), value);
                Ok(())
            }
            Value::Array(a) => {
                let mut a = a.borrow_mut();
                if key == "length" {
                    let len = value.to_number();
                    if !(len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LENGTH as f64) {
                        return Err(HostError::new("Invalid array length"));
                    }
                    return resize_array(&mut a, len as usize);
                }
                let Ok(i) = key.parse::<usize>() else {
                    return Err(HostError::new(format!("Cannot set property '{key}' of an array")));
                };
                if i >= MAX_ARRAY_LENGTH {
                    return Err(HostError::new("Invalid array length"));
                }
                if i >= a.len() {
                    resize_array(&mut a, i + 1)?;
                }
                a[i] = value;
                Ok(())
            }
            Value::Host(h) => h.set(key, value),
            Value::Undefined | Value::Null => Err(HostError::new(format!(
                "Cannot set properties of {self} (setting '{key}')"
            ))),
            _ => Ok(()),
        }
    }

    /// Own enumerable keys, in order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(o) => o.borrow().keys().cloned().collect(),
            Value::Array(a) => (0..a.borrow().len()).map(|i| i.to_string()).collect(),
            Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            Value::Host(h) => h.keys(),
            _ => Vec::new(),
        }
    }

    /// Items of an iterable value; `None` when the value is not iterable.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(a) => Some(a.borrow().clone()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Host(h) => h.items(),
            _ => None,
        }
    }

    // ── JSON ──────────────────────────────────────────────────────────────────

    /// JSON form; `None` for values JSON cannot represent at top level.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        Some(match self {
            Value::Undefined | Value::Function(_) => return None,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::Dimension(d) => serde_json::json!({ "number": d.number, "unit": d.unit }),
            Value::Array(a) => {
                Json::Array(a.borrow().iter().map(|v| v.to_json().unwrap_or(Json::Null)).collect())
            }
            Value::Object(o) => Json::Object(
                o.borrow()
                    .iter()
                    .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                    .collect(),
            ),
            Value::Host(h) => h.to_json(),
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Dimension(d) => write!(f, "{d}"),
            Value::Array(a) => {
                let parts: Vec<String> = a
                    .borrow()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect();
                f.write_str(&parts.join(","))
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(c) => write!(f, "[function {}]", c.name()),
            Value::Host(h) => f.write_str(&h.to_text()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Dimension(d) => write!(f, "{d}"),
            Value::Array(a) => f.debug_list().entries(a.borrow().iter()).finish(),
            Value::Object(o) => f.debug_map().entries(o.borrow().iter()).finish(),
            Value::Function(c) => write!(f, "{c:?}"),
            Value::Host(h) => write!(f, "{h:?}"),
        }
    }
}

/// Values compare with `is` semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

// ── Number helpers ────────────────────────────────────────────────────────────

/// Render a number the way scripts expect: integers without a fraction,
/// `NaN`, `Infinity`, no negative zero.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else {
        format!("{n}")
    }
}

/// Whole-string numeric conversion: blank is `0`, garbage is `NaN`.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

/// Leading-prefix float parse (`"12.5px"` → `12.5`).
pub fn parse_float_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &t[digits_start..end] == "." {
        return if t[digits_start..].starts_with("Infinity") {
            if t.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY }
        } else {
            f64::NAN
        };
    }
    let mut exp_end = end;
    if exp_end < bytes.len() && (bytes[exp_end] == b'e' || bytes[exp_end] == b'E') {
        exp_end += 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'-' || bytes[exp_end] == b'+') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    t[..end].parse().unwrap_or(f64::NAN)
}

/// Leading-prefix integer parse (`"42px"` → `42`, `"1e3"` → `1`).
pub fn parse_int_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let (sign, rest) = match t.strip_prefix('-') {
        Some(r) => (-1.0, r),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    digits.parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_display() {
        assert_eq!(Value::Number(15.0).to_string(), "15");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn array_display_skips_nullish() {
        let a = Value::array(vec![1.0.into(), Value::Null, "x".into()]);
        assert_eq!(a.to_string(), "1,,x");
    }

    #[test]
    fn truthiness() {
        for v in [Value::Undefined, Value::Null, 0.0.into(), "".into(), false.into(), f64::NAN.into()] {
            assert!(!v.truthy(), "{v:?} should be falsy");
        }
        for v in [1.0.into(), "0".into(), true.into(), Value::array(vec![])] {
            assert!(v.truthy(), "{v:?} should be truthy");
        }
    }

    #[test]
    fn strict_vs_loose() {
        let one = Value::Number(1.0);
        let s_one = Value::from("1");
        assert!(!one.strict_eq(&s_one));
        assert!(one.loose_eq(&s_one));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(Value::from(true).loose_eq(&one));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn array_length_is_bounded() {
        let a = Value::array(vec![1.0.into()]);
        a.set_member("length", 3.0.into()).unwrap();
        assert_eq!(a.get_member("length"), Value::Number(3.0));
        a.set_member("length", 1.0.into()).unwrap();
        assert_eq!(a.to_string(), "1");

        assert!(a.set_member("length", 1e20.into()).is_err());
        assert!(a.set_member("length", (-1.0).into()).is_err());
        assert!(a.set_member("length", 1.5.into()).is_err());
        assert!(a.set_member(&MAX_ARRAY_LENGTH.to_string(), 2.0.into()).is_err());
        assert!(a.set_member("100000000000000000000", 2.0.into()).is_err());
        assert_eq!(a.get_member("length"), Value::Number(1.0));
    }

    #[test]
    fn weak_values_do_not_keep_targets_alive() {
        let a = Value::array(vec![1.0.into()]);
        let weak = a.downgrade().unwrap();
        assert!(weak.upgrade().is_some_and(|v| v.strict_eq(&a)));
        drop(a);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
        assert!(Value::Number(1.0).downgrade().is_none());
    }

    #[test]
    fn reference_identity() {
        let a = Value::array(vec![]);
        let b = a.clone();
        assert!(a.strict_eq(&b));
        assert!(!a.strict_eq(&Value::array(vec![])));
    }

    #[test]
    fn compare_strings_and_numbers() {
        assert_eq!(Value::from("a").compare(&"b".into()), Some(Ordering::Less));
        assert_eq!(Value::from("10").compare(&Value::Number(9.0)), Some(Ordering::Greater));
        assert_eq!(Value::Number(f64::NAN).compare(&Value::Number(1.0)), None);
    }

    #[test]
    fn dimension_parse() {
        assert_eq!(Dimension::parse("12px"), Some(Dimension { number: 12.0, unit: "px".into() }));
        assert_eq!(Dimension::parse("-1.5em"), Some(Dimension { number: -1.5, unit: "em".into() }));
        assert_eq!(Dimension::parse("50%"), Some(Dimension { number: 50.0, unit: "%".into() }));
        assert_eq!(Dimension::parse("px"), None);
        assert_eq!(Dimension::parse("12"), None);
        assert_eq!(Dimension::parse("red"), None);
    }

    #[test]
    fn members() {
        let o = Value::object(Object::new());
        o.set_member("a", 1.0.into()).unwrap();
        assert_eq!(o.get_member("a"), Value::Number(1.0));
        let arr = Value::array(vec![]);
        arr.set_member("2", "x".into()).unwrap();
        assert_eq!(arr.get_member("length"), Value::Number(3.0));
        assert_eq!(arr.get_member("2"), Value::from("x"));
        assert!(Value::Undefined.set_member("a", Value::Null).is_err());
    }

    #[test]
    fn numeric_parsing() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number(""), 0.0);
        assert!(parse_number("12px").is_nan());
        assert_eq!(parse_float_prefix("12.5px"), 12.5);
        assert!(parse_float_prefix("px").is_nan());
        assert_eq!(parse_int_prefix("42.9"), 42.0);
        assert_eq!(parse_int_prefix("-7em"), -7.0);
    }

    #[test]
    fn json_round() {
        let v = Value::from(serde_json::json!({ "a": [1, "x", null], "b": true }));
        assert_eq!(v.get_member("b"), Value::Bool(true));
        let back = v.to_json().unwrap();
        assert_eq!(back, serde_json::json!({ "a": [1.0, "x", null], "b": true }));
    }
}
