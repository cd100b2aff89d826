//! An in-memory document host.
//!
//! [`MemoryHost`] is a small element tree (`<html><body>…`) with ids,
//! classes, attributes, inline style and free-form properties.  It backs
//! the `act` binary and the integration tests.
//!
//! Selectors support what scripts in this crate need: compound selectors
//! of a tag, `#id`, `.class` and `[attr]` / `[attr=value]`, descendant
//! combinators, and comma-separated groups.  `innerHTML` is stored as text:
//! setting it replaces the children, reading it renders them back.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::json;

use crate::error::HostError;
use crate::host::{Host, HostObject, LogLevel};
use crate::script::value::{parse_float_prefix, parse_int_prefix, Object, Value};

// ── Element ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Element {
    tag: String,
    attrs: RefCell<IndexMap<String, String>>,
    style: RefCell<IndexMap<String, String>>,
    props: RefCell<Object>,
    text: RefCell<String>,
    children: RefCell<Vec<Rc<Element>>>,
    parent: RefCell<Weak<Element>>,
    this: Weak<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Rc<Self> {
        Rc::new_cyclic(|this| Element {
            tag: tag.to_ascii_lowercase(),
            attrs: RefCell::default(),
            style: RefCell::default(),
            props: RefCell::default(),
            text: RefCell::default(),
            children: RefCell::default(),
            parent: RefCell::default(),
            this: this.clone(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// This element as a script value.
    pub fn value(self: &Rc<Self>) -> Value {
        Value::Host(Rc::clone(self) as Rc<dyn HostObject>)
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.attrs.borrow_mut().insert(name.to_owned(), value.to_owned());
    }

    pub fn children(&self) -> Vec<Rc<Element>> {
        self.children.borrow().clone()
    }

    pub fn parent_element(&self) -> Option<Rc<Element>> {
        self.parent.borrow().upgrade()
    }

    /// Move `child` under this element, detaching it from its old parent.
    pub fn append(self: &Rc<Self>, child: &Rc<Element>) {
        if let Some(old) = child.parent_element() {
            old.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, child));
        }
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(Rc::clone(child));
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class").is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    fn descendants(&self, out: &mut Vec<Rc<Element>>) {
        for child in self.children.borrow().iter() {
            out.push(Rc::clone(child));
            child.descendants(out);
        }
    }

    fn inner(&self) -> String {
        let mut out = self.text.borrow().clone();
        for child in self.children.borrow().iter() {
            out.push_str(&child.outer());
        }
        out
    }

    fn outer(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for (name, value) in self.attrs.borrow().iter() {
            out.push_str(&format!(" {name}=\"{value}\""));
        }
        let style = self.style_text();
        if !style.is_empty() {
            out.push_str(&format!(" style=\"{style}\""));
        }
        out.push('>');
        out.push_str(&self.inner());
        out.push_str(&format!("</{}>", self.tag));
        out
    }

    fn style_text(&self) -> String {
        self.style
            .borrow()
            .iter()
            .map(|(k, v)| format!("{k}: {v};"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn matches(&self, selector: &str) -> Result<bool, HostError> {
        let groups = parse_selector(selector)?;
        let Some(me) = self.this.upgrade() else {
            return Ok(false);
        };
        Ok(groups.iter().any(|chain| matches_chain(&me, chain)))
    }
}

impl HostObject for Element {
    fn type_name(&self) -> String {
        let mut chars = self.tag.chars();
        let tag: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        format!("HTML{tag}Element")
    }

    fn tag_name(&self) -> Option<String> {
        Some(self.tag.to_ascii_uppercase())
    }

    fn get(&self, key: &str) -> Value {
        if let Some(value) = self.props.borrow().get(key) {
            return value.clone();
        }
        match key {
            "id" => Value::Str(self.attr("id").unwrap_or_default()),
            "className" => Value::Str(self.attr("class").unwrap_or_default()),
            "tagName" => Value::Str(self.tag.to_ascii_uppercase()),
            "innerHTML" => Value::Str(self.inner()),
            "outerHTML" => Value::Str(self.outer()),
            "textContent" => Value::Str(self.text.borrow().clone()),
            "children" => NodeList::value(self.children().iter().map(Element::value).collect()),
            "parentElement" => self.parent(),
            _ => Value::Undefined,
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        match key {
            "id" => self.set_attr("id", &value.as_text()),
            "className" => self.set_attr("class", &value.as_text()),
            "innerHTML" | "textContent" => self.set_inner_html(&value.as_text())?,
            _ => {
                self.props.borrow_mut().insert(key.to_owned(), value);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.props.borrow().keys().cloned().collect()
    }

    fn call(&self, method: &str, args: &[Value]) -> Option<Result<Value, HostError>> {
        let text = |i: usize| args.get(i).map(Value::as_text).unwrap_or_default();
        Some(Ok(match method {
            "getAttribute" => self.attr(&text(0)).map_or(Value::Null, Value::Str),
            "setAttribute" => {
                self.set_attr(&text(0), &text(1));
                Value::Undefined
            }
            "removeAttribute" => {
                self.attrs.borrow_mut().shift_remove(&text(0));
                Value::Undefined
            }
            "hasAttribute" => Value::Bool(self.attrs.borrow().contains_key(&text(0))),
            "matches" => return Some(self.matches(&text(0)).map(Value::Bool)),
            "remove" => {
                if let (Some(parent), Some(me)) = (self.parent_element(), self.this.upgrade()) {
                    parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, &me));
                    *self.parent.borrow_mut() = Weak::new();
                }
                Value::Undefined
            }
            _ => return None,
        }))
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attr(name)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), HostError> {
        self.set_attr(name, value);
        Ok(())
    }

    fn style(&self, name: &str) -> String {
        self.style.borrow().get(name).cloned().unwrap_or_default()
    }

    fn set_style(&self, name: &str, value: &str) -> Result<(), HostError> {
        let mut style = self.style.borrow_mut();
        if value.is_empty() {
            style.shift_remove(name);
        } else {
            style.insert(name.to_owned(), value.to_owned());
        }
        Ok(())
    }

    fn inner_html(&self) -> Option<String> {
        Some(self.inner())
    }

    fn set_inner_html(&self, html: &str) -> Result<(), HostError> {
        for child in self.children.borrow_mut().drain(..) {
            *child.parent.borrow_mut() = Weak::new();
        }
        *self.text.borrow_mut() = html.to_owned();
        Ok(())
    }

    fn parent(&self) -> Value {
        self.parent_element().map_or(Value::Null, |p| p.value())
    }

    fn to_json(&self) -> serde_json::Value {
        let map = |m: &IndexMap<String, String>| {
            m.iter().map(|(k, v)| (k.clone(), json!(v))).collect::<serde_json::Map<_, _>>()
        };
        json!({
            "tag": self.tag,
            "attributes": map(&self.attrs.borrow()),
            "style": map(&self.style.borrow()),
            "html": self.inner(),
        })
    }
}

// ── NodeList ──────────────────────────────────────────────────────────────────

/// Result of a selector query.
#[derive(Debug)]
pub struct NodeList(Vec<Value>);

impl NodeList {
    pub fn value(items: Vec<Value>) -> Value {
        Value::Host(Rc::new(NodeList(items)))
    }
}

impl HostObject for NodeList {
    fn type_name(&self) -> String {
        "NodeList".to_owned()
    }

    fn get(&self, key: &str) -> Value {
        if key == "length" {
            return Value::Number(self.0.len() as f64);
        }
        key.parse::<usize>().ok().and_then(|i| self.0.get(i).cloned()).unwrap_or_default()
    }

    fn keys(&self) -> Vec<String> {
        (0..self.0.len()).map(|i| i.to_string()).collect()
    }

    fn items(&self) -> Option<Vec<Value>> {
        Some(self.0.clone())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0.iter().map(|v| v.to_json().unwrap_or(serde_json::Value::Null)).collect(),
        )
    }
}

// ── Selectors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, el: &Element) -> bool {
        self.tag.as_ref().map_or(true, |t| t == "*" || *t == el.tag)
            && self.id.as_ref().map_or(true, |id| el.attr("id").as_deref() == Some(id))
            && self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|(name, value)| match (el.attr(name), value) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            })
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_name(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

fn parse_compound(text: &str, selector: &str) -> Result<Compound, HostError> {
    let invalid = || HostError::new(format!("'{selector}' is not a valid selector"));
    let mut compound = Compound::default();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' | '.' => {
                chars.next();
                let name = take_name(&mut chars);
                if name.is_empty() {
                    return Err(invalid());
                }
                if c == '#' {
                    compound.id = Some(name);
                } else {
                    compound.classes.push(name);
                }
            }
            '[' => {
                chars.next();
                let inner: String = chars.by_ref().take_while(|&c| c != ']').collect();
                let (name, value) = match inner.split_once('=') {
                    Some((n, v)) => (n.trim(), Some(v.trim().trim_matches(['"', '\'']).to_owned())),
                    None => (inner.trim(), None),
                };
                if name.is_empty() || !name.chars().all(is_name_char) {
                    return Err(invalid());
                }
                compound.attrs.push((name.to_owned(), value));
            }
            '*' if compound.tag.is_none() => {
                chars.next();
                compound.tag = Some("*".to_owned());
            }
            c if is_name_char(c) && compound.tag.is_none() => {
                compound.tag = Some(take_name(&mut chars).to_ascii_lowercase());
            }
            _ => return Err(invalid()),
        }
    }
    Ok(compound)
}

/// Comma-separated groups of descendant chains.
fn parse_selector(selector: &str) -> Result<Vec<Vec<Compound>>, HostError> {
    let groups = selector
        .split(',')
        .map(|group| {
            group
                .split_whitespace()
                .map(|part| parse_compound(part, selector))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    if groups.iter().any(Vec::is_empty) {
        return Err(HostError::new(format!("'{selector}' is not a valid selector")));
    }
    Ok(groups)
}

fn matches_chain(el: &Rc<Element>, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !last.matches(el) {
        return false;
    }
    let mut remaining = ancestors;
    let mut current = el.parent_element();
    while let Some((wanted, rest)) = remaining.split_last() {
        let Some(node) = current else {
            return false;
        };
        if wanted.matches(&node) {
            remaining = rest;
        }
        current = node.parent_element();
    }
    true
}

// ── MemoryHost ────────────────────────────────────────────────────────────────

pub struct MemoryHost {
    root: Rc<Element>,
    body: Rc<Element>,
    window: Value,
    /// Every element ever created here, by identity, so script values can be
    /// mapped back to tree nodes.
    registry: RefCell<HashMap<usize, Weak<Element>>>,
    logs: RefCell<Vec<(LogLevel, String)>>,
    echo: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        let root = Element::new("html");
        let head = Element::new("head");
        let body = Element::new("body");
        root.append(&head);
        root.append(&body);

        let mut window = Object::new();
        window.insert("document".into(), root.value());
        let host = MemoryHost {
            root,
            body,
            window: Value::object(window),
            registry: RefCell::default(),
            logs: RefCell::default(),
            echo: false,
        };
        for el in [&host.root, &head, &host.body] {
            host.register(el);
        }
        host
    }

    /// Print `log` output to stdout as well as recording it.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn body(&self) -> Value {
        self.body.value()
    }

    pub fn body_element(&self) -> &Rc<Element> {
        &self.body
    }

    /// A new element, registered with this host but not yet attached.
    pub fn element(&self, tag: &str) -> Rc<Element> {
        let el = Element::new(tag);
        self.register(&el);
        el
    }

    /// Logged messages, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.logs.borrow().iter().map(|(_, m)| m.clone()).collect()
    }

    fn register(&self, el: &Rc<Element>) {
        let key = Rc::as_ptr(el) as *const () as usize;
        self.registry.borrow_mut().insert(key, Rc::downgrade(el));
    }

    fn element_of(&self, value: &Value) -> Option<Rc<Element>> {
        let key = value.as_host()?;
        let id = Rc::as_ptr(key) as *const () as usize;
        self.registry.borrow().get(&id).and_then(Weak::upgrade)
    }

    fn all_elements(&self) -> Vec<Rc<Element>> {
        let mut out = vec![Rc::clone(&self.root)];
        self.root.descendants(&mut out);
        out
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        MemoryHost::new()
    }
}

impl Host for MemoryHost {
    fn global(&self, key: &str) -> Option<Value> {
        let first = |args: &[Value]| args.first().cloned().unwrap_or_default();
        Some(match key {
            "parseInt" => Value::native(key, move |_, args| Ok(Value::Number(parse_int_prefix(&first(args).as_text())))),
            "parseFloat" => {
                Value::native(key, move |_, args| Ok(Value::Number(parse_float_prefix(&first(args).as_text()))))
            }
            "isNaN" => Value::native(key, move |_, args| Ok(Value::Bool(first(args).to_number().is_nan()))),
            "String" => Value::native(key, move |_, args| Ok(Value::Str(first(args).to_string()))),
            "Number" => Value::native(key, move |_, args| Ok(Value::Number(first(args).to_number()))),
            _ => return None,
        })
    }

    fn document(&self) -> Value {
        self.root.value()
    }

    fn window(&self) -> Value {
        self.window.clone()
    }

    fn find_by_id(&self, id: &str) -> Value {
        self.all_elements()
            .into_iter()
            .find(|el| el.attr("id").as_deref() == Some(id))
            .map_or(Value::Null, |el| el.value())
    }

    fn query_all(&self, root: &Value, selector: &str) -> Result<Value, HostError> {
        let groups = parse_selector(selector)?;
        let root = if root.is_nullish() { Some(Rc::clone(&self.root)) } else { self.element_of(root) };
        let Some(root) = root else {
            return Ok(NodeList::value(Vec::new()));
        };
        let mut candidates = Vec::new();
        root.descendants(&mut candidates);
        let found = candidates
            .iter()
            .filter(|el| groups.iter().any(|chain| matches_chain(el, chain)))
            .map(Element::value)
            .collect();
        Ok(NodeList::value(found))
    }

    fn closest(&self, element: &Value, selector: &str) -> Result<Value, HostError> {
        let groups = parse_selector(selector)?;
        let mut current = self.element_of(element);
        while let Some(el) = current {
            if groups.iter().any(|chain| matches_chain(&el, chain)) {
                return Ok(el.value());
            }
            current = el.parent_element();
        }
        Ok(Value::Null)
    }

    fn create_element(&self, tag: &str) -> Result<Value, HostError> {
        if tag.is_empty() || !tag.chars().all(is_name_char) {
            return Err(HostError::new(format!("'{tag}' is not a valid tag name")));
        }
        Ok(self.element(tag).value())
    }

    fn construct(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
        match name {
            "Object" => Ok(Value::object(Object::new())),
            "Array" => Ok(Value::array(args.to_vec())),
            _ => Err(HostError::new(format!("{name} is not a constructor"))),
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        if self.echo {
            match level {
                LogLevel::Raw | LogLevel::Info => println!("{message}"),
                LogLevel::Warn | LogLevel::Error => eprintln!("{message}"),
            }
        }
        tracing::debug!(target: "act::script", ?level, "{message}");
        self.logs.borrow_mut().push((level, message.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page() -> (MemoryHost, Rc<Element>, Rc<Element>) {
        let host = MemoryHost::new();
        let nav = host.element("nav");
        nav.set_attr("id", "menu");
        let item = host.element("a");
        item.set_attr("class", "link active");
        nav.append(&item);
        host.body_element().append(&nav);
        (host, nav, item)
    }

    fn count(value: &Value) -> usize {
        value.items().map_or(0, |items| items.len())
    }

    #[test]
    fn selectors_parse() {
        let groups = parse_selector("div.big#main, a[href]").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0].tag.as_deref(), Some("div"));
        assert_eq!(groups[0][0].id.as_deref(), Some("main"));
        assert_eq!(groups[0][0].classes, vec!["big".to_owned()]);
        assert_eq!(groups[1][0].attrs, vec![("href".to_owned(), None)]);
        assert!(parse_selector("div > ").is_err());
        assert!(parse_selector("").is_err());
    }

    #[test]
    fn query_by_tag_class_and_descendant() {
        let (host, nav, _) = page();
        let doc = host.document();
        assert_eq!(count(&host.query_all(&doc, "a").unwrap()), 1);
        assert_eq!(count(&host.query_all(&doc, ".active").unwrap()), 1);
        assert_eq!(count(&host.query_all(&doc, "body nav a.link").unwrap()), 1);
        assert_eq!(count(&host.query_all(&doc, "section a").unwrap()), 0);
        assert_eq!(count(&host.query_all(&nav.value(), "nav").unwrap()), 0);
    }

    #[test]
    fn ids_and_closest() {
        let (host, nav, item) = page();
        assert_eq!(host.find_by_id("menu").identity(), nav.value().identity());
        assert_eq!(host.find_by_id("nope"), Value::Null);
        let found = host.closest(&item.value(), "#menu").unwrap();
        assert_eq!(found.identity(), nav.value().identity());
        assert_eq!(host.closest(&item.value(), "table").unwrap(), Value::Null);
    }

    #[test]
    fn inner_html_replaces_children() {
        let (_, nav, item) = page();
        assert_eq!(nav.inner_html().unwrap(), r#"<a class="link active"></a>"#);
        nav.set_inner_html("<b>hi</b>").unwrap();
        assert!(nav.children().is_empty());
        assert!(item.parent_element().is_none());
        assert_eq!(nav.get("innerHTML"), Value::from("<b>hi</b>"));
    }

    #[test]
    fn element_members() {
        let (_, nav, _) = page();
        nav.set("title", Value::from("Menu")).unwrap();
        assert_eq!(nav.get("title"), Value::from("Menu"));
        assert_eq!(nav.get("id"), Value::from("menu"));
        assert_eq!(nav.type_name(), "HTMLNavElement");
        assert_eq!(nav.call("getAttribute", &[Value::from("id")]).unwrap().unwrap(), Value::from("menu"));
        assert!(nav.call("explode", &[]).is_none());
        nav.set_style("color", "red").unwrap();
        assert_eq!(nav.style("color"), "red");
        nav.set_style("color", "").unwrap();
        assert_eq!(nav.style("color"), "");
    }

    #[test]
    fn logs_are_recorded() {
        let host = MemoryHost::new();
        host.log(LogLevel::Info, "hello");
        host.log(LogLevel::Warn, "careful");
        assert_eq!(host.logs(), vec!["hello".to_owned(), "careful".to_owned()]);
    }
}
