//! Evaluation results that remember where they came from.
//!
//! Every node evaluates to a [`Solved`]: the value it produced plus, when
//! the value was read out of a container, the container and key it came
//! from.  Assignment writes back through that container; a later
//! [`Solved::value`] re-reads the slot, so a write is visible through the
//! same result immediately.
//!
//! | Access | Read | Write |
//! |--------|------|-------|
//! | `Value` | produced value | not settable |
//! | `Property` | `parent[key]` | `parent[key] = v` |
//! | `Attribute` | attribute `key` | attribute `key` = text of `v` |
//! | `Style` | style `key` | style `key` = text of `v`, arrays space-joined |
//! | `Id` | live lookup by id | not settable |
//! | `Selector` | live query (or closest ancestor) | not settable |

use std::fmt;
use std::rc::Rc;

use crate::error::HostError;
use crate::host::Host;
use crate::script::value::{Dimension, Value};

/// The kind of node a result was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    None,
    Number,
    Str,
    Url,
    Dimension,
    Word,
    Variable,
    Property,
    Attribute,
    CssProperty,
    Id,
    Tag,
    Class,
    Selector,
    Template,
    Array,
    Object,
    Function,
    Scope,
    Expression,
}

impl Origin {
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Origin::None => return None,
            Origin::Number => "Number",
            Origin::Str => "String",
            Origin::Url => "Url",
            Origin::Dimension => "Dimension",
            Origin::Word => "Word",
            Origin::Variable => "Variable",
            Origin::Property => "Property",
            Origin::Attribute => "Attribute",
            Origin::CssProperty => "CssProperty",
            Origin::Id => "Id",
            Origin::Tag => "Tag",
            Origin::Class => "Class",
            Origin::Selector => "Selector",
            Origin::Template => "Template",
            Origin::Array => "Array",
            Origin::Object => "Object",
            Origin::Function => "Function",
            Origin::Scope => "Scope",
            Origin::Expression => "Expression",
        })
    }
}

#[derive(Clone, Default)]
pub enum Access {
    #[default]
    Value,
    Property,
    Attribute,
    Style,
    Id(Rc<dyn Host>),
    Selector { host: Rc<dyn Host>, closest: bool },
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Value => f.write_str("Value"),
            Access::Property => f.write_str("Property"),
            Access::Attribute => f.write_str("Attribute"),
            Access::Style => f.write_str("Style"),
            Access::Id(_) => f.write_str("Id"),
            Access::Selector { closest, .. } => write!(f, "Selector {{ closest: {closest} }}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Solved {
    produced: Value,
    pub origin: Origin,
    /// Owning container; also the receiver when the value is called.
    pub parent: Option<Value>,
    pub key: Option<String>,
    pub access: Access,
    /// A result this one was derived from (e.g. a variable holding an id
    /// lookup).  Reads go through it; writes go to this result's own slot.
    inner: Option<Box<Solved>>,
}

impl Solved {
    pub fn new(value: Value, origin: Origin) -> Self {
        Solved { produced: value, origin, ..Default::default() }
    }

    /// A property slot `parent[key]`.
    pub fn property(value: Value, origin: Origin, parent: Value, key: impl Into<String>) -> Self {
        Solved {
            produced: value,
            origin,
            parent: Some(parent),
            key: Some(key.into()),
            access: Access::Property,
            inner: None,
        }
    }

    pub fn attribute(element: Value, name: impl Into<String>) -> Self {
        let name = name.into();
        let produced = element
            .as_host()
            .and_then(|h| h.get_attribute(&name))
            .map_or(Value::Undefined, Value::Str);
        Solved {
            produced,
            origin: Origin::Attribute,
            parent: Some(element),
            key: Some(name),
            access: Access::Attribute,
            inner: None,
        }
    }

    pub fn style(element: Value, name: impl Into<String>) -> Self {
        let name = name.into();
        let produced = element.as_host().map_or(Value::Undefined, |h| style_value(&h.style(&name)));
        Solved {
            produced,
            origin: Origin::CssProperty,
            parent: Some(element),
            key: Some(name),
            access: Access::Style,
            inner: None,
        }
    }

    /// `#id`, resolved against the live document on every read.
    pub fn id(selector: impl Into<String>, host: Rc<dyn Host>) -> Self {
        Solved {
            produced: Value::Str(selector.into()),
            origin: Origin::Id,
            access: Access::Id(host),
            ..Default::default()
        }
    }

    /// A selector query rooted at `root`, re-run on every read.
    pub fn selector(
        selector: impl Into<String>,
        origin: Origin,
        root: Value,
        closest: bool,
        host: Rc<dyn Host>,
    ) -> Self {
        Solved {
            produced: Value::Str(selector.into()),
            origin,
            parent: Some(root),
            access: Access::Selector { host, closest },
            ..Default::default()
        }
    }

    /// A value bound to a receiver but not to a slot (a library method
    /// looked up on an object).
    pub fn bound(value: Value, receiver: Value) -> Self {
        Solved { produced: value, origin: Origin::Expression, parent: Some(receiver), ..Default::default() }
    }

    /// Keep `inner` as the result this slot's value came from.
    pub fn holding(mut self, inner: Solved) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Dimension and lookup results keep their identity when stored in a
    /// variable.
    pub fn is_complex(&self) -> bool {
        let inner = self.through();
        inner.origin == Origin::Dimension || matches!(inner.access, Access::Id(_) | Access::Selector { .. })
    }

    /// Re-label a result with the node kind that produced it, keeping its
    /// slot.
    pub fn from_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// The current value: re-reads the owning slot or re-runs the lookup.
    pub fn value(&self) -> Result<Value, HostError> {
        if let Some(inner) = &self.inner {
            return inner.value();
        }
        match &self.access {
            Access::Value => Ok(self.produced.clone()),
            Access::Id(host) => {
                let id = self.produced.as_text();
                Ok(host.find_by_id(id.strip_prefix('#').unwrap_or(&id)))
            }
            Access::Selector { host, closest } => {
                let root = self.parent.clone().unwrap_or_default();
                let selector = self.produced.as_text();
                if *closest {
                    host.closest(&root, &selector)
                } else {
                    host.query_all(&root, &selector)
                }
            }
            Access::Property => match (&self.parent, &self.key) {
                (Some(parent), Some(key)) if !parent.is_nullish() => Ok(parent.get_member(key)),
                _ => Ok(self.produced.clone()),
            },
            Access::Attribute => Ok(self
                .host_parent()
                .and_then(|(h, key)| h.get_attribute(key))
                .map_or(Value::Null, Value::Str)),
            Access::Style => Ok(self
                .host_parent()
                .map_or(Value::Undefined, |(h, key)| style_value(&h.style(key)))),
        }
    }

    fn host_parent(&self) -> Option<(&Rc<dyn crate::host::HostObject>, &str)> {
        let host = self.parent.as_ref()?.as_host()?;
        Some((host, self.key.as_deref()?))
    }

    /// The innermost result in the provenance chain.
    pub fn through(&self) -> &Solved {
        match &self.inner {
            Some(inner) => inner.through(),
            None => self,
        }
    }

    /// The value as it was when produced.
    pub fn produced(&self) -> &Value {
        match &self.inner {
            Some(inner) => inner.produced(),
            None => &self.produced,
        }
    }

    /// Text form for templates and string contexts.  Lookup results
    /// render as their selector text; `undefined` renders empty.
    pub fn to_text(&self) -> String {
        let inner = self.through();
        match &inner.access {
            Access::Id(_) | Access::Selector { .. } => inner.produced.as_text(),
            _ => self.value().unwrap_or_else(|_| self.produced().clone()).as_text(),
        }
    }

    fn has_slot(&self) -> bool {
        matches!(self.access, Access::Property | Access::Attribute | Access::Style)
            && self.key.is_some()
            && self.parent.as_ref().is_some_and(Value::truthy)
    }

    pub fn is_settable(&self) -> bool {
        self.has_slot() || self.inner.as_ref().is_some_and(|inner| inner.is_settable())
    }

    pub fn is_style(&self) -> bool {
        matches!(self.through().access, Access::Style)
    }

    /// Write through the owning slot.
    pub fn set(&self, value: Value) -> Result<(), HostError> {
        if let (false, Some(inner)) = (self.has_slot(), &self.inner) {
            return inner.set(value);
        }
        let (Some(parent), Some(key)) = (&self.parent, &self.key) else {
            return Err(HostError::new("Cannot assign to a value that is not a reference"));
        };
        match self.access {
            Access::Property => parent.set_member(key, value),
            Access::Attribute => match parent.as_host() {
                Some(h) => h.set_attribute(key, &value.to_string()),
                None => Err(HostError::new(format!("Cannot set attribute '{key}' of {parent}"))),
            },
            Access::Style => {
                let text = match &value {
                    Value::Array(items) => {
                        items.borrow().iter().map(Value::as_text).collect::<Vec<_>>().join(" ")
                    }
                    other => other.as_text(),
                };
                match parent.as_host() {
                    Some(h) => h.set_style(key, &text),
                    None => Err(HostError::new(format!("Cannot set style '{key}' of {parent}"))),
                }
            }
            _ => Err(HostError::new("Cannot assign to a lookup result")),
        }
    }
}

impl From<Value> for Solved {
    fn from(value: Value) -> Self {
        Solved::new(value, Origin::None)
    }
}

/// Style text as a value: dimension-shaped text becomes a dimension.
fn style_value(text: &str) -> Value {
    match Dimension::parse(text) {
        Some(d) => Value::Dimension(d),
        None => Value::Str(text.to_owned()),
    }
}
