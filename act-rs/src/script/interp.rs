//! Node evaluation.
//!
//! [`Context::solve`] is the single entry point: it checks the halt flag,
//! dispatches on the node kind and returns a [`Solved`] result.  Every
//! step returns a boxed local future, so evaluation may suspend at any
//! node (timers, host calls) without blocking the rest of the runtime.
//!
//! Scopes and templates share one sentence runner ([`Context::execute`]):
//!
//! | Mode | After the sentence |
//! |------|--------------------|
//! | `;` | continue |
//! | `&` | started with `spawn_local`; the runner does not wait |
//! | `?` | falsy: skip the next sentence; truthy: skip the one after an `else?` |
//! | `>>` | the result becomes the target of later sentences |
//!
//! `Stop` ends the scope with its payload, `Repeat` starts it over and
//! `Restart` does the same at the root only.  Everything else propagates.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, error};

use crate::error::TraceFrame;
use crate::script::context::{Context, Opts};
use crate::script::keywords;
use crate::script::node::{Expr, ExprKind, Mode, Node, NodeKind, Part, Scope, ScopeMeta, Sentence, Span, Template};
use crate::script::ops::{self, BinOp};
use crate::script::signal::{EvalFuture, Flow, Signal, SignalKind, Unwind};
use crate::script::solved::{Origin, Solved};
use crate::script::value::{parse_float_prefix, parse_int_prefix, Callable, Dimension, Object, Value};

/// How a run of sentences ended.
enum Finished {
    Completed { last: Solved, slots: Vec<String> },
    /// A `Stop` signal ended the scope early.
    Stopped(Value),
}

// ── Key normalisation ─────────────────────────────────────────────────────────

/// `font_size` → `fontSize`, `inner_html` → `innerHTML`.
pub fn snake_to_camel(key: &str) -> String {
    match key {
        "inner_html" => return "innerHTML".to_owned(),
        "outer_html" => return "outerHTML".to_owned(),
        _ => {}
    }
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.to_lowercase().chars() {
        if upper && c.is_ascii_lowercase() {
            out.push(c.to_ascii_uppercase());
            upper = false;
            continue;
        }
        if upper {
            out.push('_');
        }
        upper = c == '_' || c == '-';
        if !upper {
            out.push(c);
        }
    }
    if upper {
        out.push('_');
    }
    out
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn with_prefix(text: &str, prefix: char) -> String {
    if text.starts_with(prefix) {
        text.to_owned()
    } else {
        format!("{prefix}{text}")
    }
}

impl Context {
    // ── Entry points ──────────────────────────────────────────────────────────

    /// Evaluate one node against `target`.
    pub fn solve<'a>(&'a self, node: &'a Node, target: Value, opts: Opts) -> EvalFuture<'a> {
        Box::pin(async move {
            self.check_halt()?;
            let solved = self.solve_node(node, target, opts).await?;
            if self.config().debug {
                debug!(
                    target: "act::solve",
                    node = node.kind_name(),
                    line = node.span.line,
                    column = node.span.column,
                    origin = solved.origin.name().unwrap_or("none"),
                    value = ?solved.produced(),
                    "solved"
                );
            }
            Ok(solved)
        })
    }

    /// Evaluate and unwrap to the current value.
    pub async fn value_of(&self, node: &Node, target: Value) -> Flow<Value> {
        Ok(self.solve(node, target, Opts::default()).await?.value()?)
    }

    /// Evaluate to text; `undefined` becomes the empty string.
    pub async fn as_string(&self, node: &Node, target: Value) -> Flow<String> {
        Ok(self.value_of(node, target).await?.as_text())
    }

    /// Evaluate each node in order, flattening `...spread` arguments.
    pub async fn solve_all(&self, nodes: &[Node], target: &Value) -> Flow<Vec<Value>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match &node.kind {
                NodeKind::Spread(inner) => {
                    let value = self.value_of(inner, target.clone()).await?;
                    match value.items() {
                        Some(items) => out.extend(items),
                        None => out.push(value),
                    }
                }
                _ => out.push(self.value_of(node, target.clone()).await?),
            }
        }
        Ok(out)
    }

    /// Run a scope: the last sentence's result, or the payload of a `Stop`.
    pub fn solve_scope<'a>(&'a self, scope: &'a Rc<Scope>, target: Value, opts: Opts) -> EvalFuture<'a> {
        Box::pin(async move {
            Ok(match self.execute(scope, target, opts, false).await? {
                Finished::Completed { last, .. } => last,
                Finished::Stopped(payload) => Solved::from(payload),
            })
        })
    }

    /// Member key as written, or its camel-case form when only that one is
    /// defined on `target` (and the policy is on).
    pub fn member_key(&self, key: &str, target: &Value) -> String {
        if !self.config().convert_to_camel_case || !matches!(target.get_member(key), Value::Undefined) {
            return key.to_owned();
        }
        snake_to_camel(key)
    }

    async fn solve_node(&self, node: &Node, target: Value, opts: Opts) -> Flow {
        let host = self.host();
        Ok(match &node.kind {
            NodeKind::Number(n) => Solved::new(Value::Number(*n), Origin::Number),
            NodeKind::Str(s) => Solved::new(Value::Str(s.clone()), Origin::Str),
            NodeKind::Url(s) => Solved::new(Value::Str(s.clone()), Origin::Url),
            NodeKind::Dimension { number, unit } => Solved::new(
                Value::Dimension(Dimension { number: *number, unit: unit.clone() }),
                Origin::Dimension,
            ),
            NodeKind::Word(word) => self.solve_word(word, target),
            NodeKind::Variable { name, scope } => self.solve_variable(name, scope),
            NodeKind::Property(name) => self.solve_property(name, target),
            NodeKind::Attribute(name) => Solved::attribute(target, name.clone()),
            NodeKind::CssProperty(name) => Solved::style(target, name.clone()),
            NodeKind::Id(id) => Solved::id(id.clone(), Rc::clone(host)),
            NodeKind::Tag(tag) => Solved::selector(tag.clone(), Origin::Tag, host.document(), false, Rc::clone(host)),
            NodeKind::Class(class) => {
                Solved::selector(class.clone(), Origin::Class, host.document(), false, Rc::clone(host))
            }
            NodeKind::SelectorTemplate(template) => {
                let text = self.solve_template(template, target.clone()).await?.as_text();
                self.select(text.trim(), target)
            }
            NodeKind::Template(template) => Solved::new(self.solve_template(template, target).await?, Origin::Template),
            NodeKind::Spread(inner) => self.solve(inner, target, opts).await?,
            NodeKind::Array(items) => Solved::new(Value::array(self.solve_all(items, &target).await?), Origin::Array),
            NodeKind::Object(entries) => Solved::new(self.solve_object(entries, target).await?, Origin::Object),
            NodeKind::Function(def) => Solved::new(
                Value::Function(Rc::new(Callable::Script { def: Rc::clone(def), this: opts.parent.unwrap_or_default() })),
                Origin::Function,
            ),
            NodeKind::Scope(scope) => self.solve_scope(scope, target, opts).await?,
            NodeKind::Expr(expr) => self.solve_expr(expr, node.span, target, opts).await?,
        })
    }

    // ── Values ────────────────────────────────────────────────────────────────

    fn solve_word(&self, word: &str, target: Value) -> Solved {
        let value = match word {
            "me" => target,
            "source_element" => self.binding().element(),
            "original_target" => self.target().clone(),
            "undefined" => Value::Undefined,
            "NaN" => Value::Number(f64::NAN),
            "debugger" => {
                debug!(target: "act::debugger", target = ?target, event = ?self.event(), "debugger");
                Value::Undefined
            }
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            "document" => self.host().document(),
            "window" | "js" => self.host().window(),
            _ => Value::Str(word.to_owned()),
        };
        Solved::new(value, Origin::Word)
    }

    /// `$name`: engine globals for capitalised names, otherwise the nearest
    /// scope defining it, then the binding chain, then a new variable in the
    /// scope it was written in.
    pub fn solve_variable(&self, name: &str, scope: &Rc<ScopeMeta>) -> Solved {
        if name.chars().next().is_some_and(char::is_uppercase) {
            let globals = self.engine().globals();
            return Solved::property(globals.get_member(name), Origin::Variable, globals, name);
        }

        // A `run` block links back to its caller's scope, whose variables
        // live in the caller's context.
        let mut seen = HashSet::new();
        let mut ctx = self.clone();
        let mut current = Some(Rc::clone(scope));
        while let Some(meta) = current {
            if !seen.insert((ctx.key(), meta.key())) {
                break;
            }
            if ctx.scope_defines(&meta, name) {
                let data = ctx.scope_data(&meta);
                let current = data.get_member(name);
                let source = ctx.held(&meta, name, &current);
                let slot = Solved::property(current, Origin::Variable, data, name);
                return match source {
                    Some(source) => slot.holding(source),
                    None => slot,
                };
            }
            current = match ctx.from_scope(&meta) {
                Some((from, caller)) => {
                    ctx = caller;
                    Some(from)
                }
                None => meta.parent.clone(),
            };
        }

        if let Some(found) = self.engine().lookup_data(self.binding(), name) {
            return found.from_origin(Origin::Variable);
        }

        let data = self.scope_data(scope);
        Solved::property(data.get_member(name), Origin::Variable, data, name)
    }

    fn solve_property(&self, name: &str, target: Value) -> Solved {
        if target.is_nullish() {
            return Solved::new(Value::Undefined, Origin::Property);
        }
        let key = self.member_key(name, &target);
        Solved::property(target.get_member(&key), Origin::Property, target, key)
    }

    /// Selector text from a `{…}` template or an `as selector` cast:
    /// `> sel` searches inside the target, `< sel` walks up from it.
    fn select(&self, text: &str, target: Value) -> Solved {
        let host = Rc::clone(self.host());
        if let Some(rest) = text.strip_prefix('>') {
            return Solved::selector(rest.trim(), Origin::Selector, target, false, host);
        }
        if let Some(rest) = text.strip_prefix('<') {
            let from = if target.is_element() { target } else { self.target().clone() };
            return Solved::selector(rest.trim(), Origin::Selector, from, true, host);
        }
        let document = host.document();
        Solved::selector(text, Origin::Selector, document, false, host)
    }

    async fn solve_object(&self, entries: &[(Node, Node)], target: Value) -> Flow<Value> {
        let object = Value::object(Object::new());
        for (key, value) in entries {
            let key = match &key.kind {
                NodeKind::Word(word) => word.clone(),
                _ => self.as_string(key, target.clone()).await?,
            };
            let opts = Opts { parent: Some(object.clone()) };
            let value = self.solve(value, target.clone(), opts).await?.value()?;
            object.set_member(&key, value)?;
        }
        Ok(object)
    }

    async fn solve_template(&self, template: &Rc<Template>, target: Value) -> Flow<Value> {
        let slots = match &template.scope {
            Some(scope) => match self.execute(scope, target, Opts::default(), true).await? {
                Finished::Completed { slots, .. } => slots,
                Finished::Stopped(payload) => return Ok(payload),
            },
            None => Vec::new(),
        };

        let mut out = String::new();
        for part in &template.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Slot(i) => out.push_str(slots.get(*i).map_or("", String::as_str)),
            }
        }
        Ok(Value::Str(out))
    }

    // ── Sentences ─────────────────────────────────────────────────────────────

    /// The sentence runner shared by scopes and templates.  With `collect`,
    /// the text of every sentence result is kept for template slots.
    fn execute<'a>(
        &'a self,
        scope: &'a Rc<Scope>,
        target: Value,
        opts: Opts,
        collect: bool,
    ) -> EvalFuture<'a, Finished> {
        Box::pin(async move {
            let sentences = &scope.sentences;
            let mut current_target = target.clone();
            let mut last = Solved::default();
            let mut slots = vec![String::new(); if collect { sentences.len() } else { 0 }];
            let mut skip: VecDeque<bool> = VecDeque::new();
            let mut i = 0;

            while i < sentences.len() {
                let sentence = &sentences[i];
                if skip.pop_front().unwrap_or(false) {
                    i += 1;
                    continue;
                }

                if sentence.mode == Mode::Async {
                    self.spawn_sentence(scope, i, current_target.clone(), opts.clone());
                    last = Solved::default();
                    i += 1;
                    continue;
                }

                match self.solve_sentence(sentence, current_target.clone(), opts.clone()).await {
                    Ok(result) => {
                        match sentence.mode {
                            Mode::Condition => {
                                let truthy = result.value()?.truthy();
                                let branch_follows = sentences.get(i + 1).is_some_and(|s| s.mode == Mode::Branch);
                                skip = VecDeque::from([!truthy, truthy && branch_follows]);
                            }
                            Mode::Fwd => current_target = result.value()?,
                            _ => {}
                        }
                        if collect {
                            slots[i] = result.to_text();
                        }
                        last = result;
                    }
                    Err(Unwind::Signal(Signal { kind: SignalKind::Stop, payload })) => {
                        return Ok(Finished::Stopped(payload));
                    }
                    Err(Unwind::Signal(Signal { kind: SignalKind::Repeat, .. })) => {
                        self.restart_scope(&mut i, &mut skip, &mut current_target, &target);
                        continue;
                    }
                    Err(Unwind::Signal(Signal { kind: SignalKind::Restart, .. })) if scope.is_root() => {
                        self.restart_scope(&mut i, &mut skip, &mut current_target, &target);
                        continue;
                    }
                    Err(other) => return Err(other),
                }
                i += 1;
            }

            Ok(Finished::Completed { last, slots })
        })
    }

    fn restart_scope(&self, i: &mut usize, skip: &mut VecDeque<bool>, current: &mut Value, target: &Value) {
        debug!(target: "act::solve", "scope restarted");
        *i = 0;
        skip.clear();
        *current = target.clone();
    }

    /// Start an `&` sentence without waiting for it.  Must run inside a
    /// tokio `LocalSet`.
    fn spawn_sentence(&self, scope: &Rc<Scope>, index: usize, target: Value, opts: Opts) {
        let ctx = self.clone();
        let scope = Rc::clone(scope);
        tokio::task::spawn_local(async move {
            let Some(sentence) = scope.sentences.get(index) else { return };
            match ctx.solve_sentence(sentence, target, opts).await {
                Err(Unwind::Error(e)) => error!(target: "act::runtime", "{}", e.report()),
                Err(Unwind::Signal(signal)) => {
                    debug!(target: "act::runtime", signal = %signal.kind, "signal ended async sentence");
                }
                Ok(_) => {}
            }
        });
    }

    async fn solve_sentence(&self, sentence: &Sentence, target: Value, opts: Opts) -> Flow {
        let computed = match &sentence.target {
            Some(node) => match self.value_of(node, target.clone()).await {
                Ok(value) => value,
                Err(e) => return Err(self.trace(e, sentence, &target, &target)),
            },
            None if matches!(target, Value::Undefined) => self.target().clone(),
            None => target.clone(),
        };

        self.solve(&sentence.value, computed.clone(), opts)
            .await
            .map_err(|e| self.trace(e, sentence, &computed, &target))
    }

    /// Append one trace frame to a runtime error; signals pass unchanged.
    fn trace(&self, unwind: Unwind, sentence: &Sentence, computed: &Value, original: &Value) -> Unwind {
        match unwind {
            Unwind::Error(mut e) => {
                e.trace.push(TraceFrame {
                    span: sentence.span,
                    code: sentence.code().to_owned(),
                    computed_target: computed.clone(),
                    original_target: original.clone(),
                    event: self.event().clone(),
                });
                Unwind::Error(e)
            }
            signal => signal,
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    async fn solve_expr(&self, expr: &Expr, span: Span, target: Value, opts: Opts) -> Flow {
        let outcome = match &expr.kind {
            ExprKind::Binary { op, l, r } => self.solve_binary(expr, *op, l, r, target).await,
            ExprKind::Insert { l, r } => self.solve_insert(l.as_ref(), r, target).await,
            ExprKind::Keyword { name, args } => match keywords::keyword(name) {
                Some(keyword) => keyword(self, expr, target, args).await,
                None => Err(Unwind::error(format!("Unknown keyword '{name}'."))),
            },
            ExprKind::Prefix { prefix, value } => match keywords::prefix(prefix) {
                Some(prefix) => prefix(self, expr, target, value).await,
                None => Err(Unwind::error(format!("Unknown prefix '{prefix}'."))),
            },
            ExprKind::Member { l, keys } => self.solve_member(l, keys, target).await,
            ExprKind::Subscript { l, indices } => self.solve_subscript(l, indices, target).await,
            ExprKind::Call { l, args } => self.solve_call(l, args, target, opts).await,
            ExprKind::Act { l, args } => self.solve_act(l, args, target).await,
        };

        outcome.map_err(|unwind| match unwind {
            Unwind::Error(mut e) if e.span.is_none() => {
                e.span = Some(span);
                Unwind::Error(e)
            }
            other => other,
        })
    }

    async fn solve_binary(&self, expr: &Expr, op: BinOp, l: &Node, r: &Node, target: Value) -> Flow {
        if op.is_simple() {
            let a = self.value_of(l, target.clone()).await?;
            let b = self.value_of(r, target).await?;
            return Ok(Solved::new(ops::apply(op, &a, &b), Origin::Expression));
        }

        match op {
            BinOp::And => {
                let left = self.value_of(l, target.clone()).await?;
                if !left.truthy() {
                    return Ok(Solved::new(left, Origin::Expression));
                }
                Ok(Solved::new(self.value_of(r, target).await?, Origin::Expression))
            }
            BinOp::Or => {
                let left = self.solve(l, target.clone(), Opts::default()).await?;
                if left.value()?.truthy() {
                    return Ok(left);
                }
                Ok(Solved::new(self.value_of(r, target).await?, Origin::Expression))
            }
            BinOp::Then => {
                let left = self.value_of(l, target).await?;
                self.solve(r, left, Opts::default()).await
            }
            BinOp::Rescue => self.solve_rescue(l, r, target).await,
            BinOp::Set | BinOp::AddSet | BinOp::SubSet => self.solve_set(op, l, r, target).await,
            BinOp::Cast => self.solve_cast(expr, l, r, target).await,
            BinOp::IsType => self.solve_is_type(l, r, target).await,
            BinOp::Insert => self.solve_insert(Some(l), r, target).await,
            _ => Ok(Solved::default()),
        }
    }

    async fn solve_rescue(&self, l: &Node, r: &Node, target: Value) -> Flow {
        match self.solve(l, target.clone(), Opts::default()).await {
            Err(Unwind::Error(e)) => {
                debug!(target: "act::runtime", error = %e, "rescued");
                if let Some(scope) = r.as_scope() {
                    let mut exception = Object::new();
                    exception.insert("message".into(), Value::Str(e.cause.clone().unwrap_or(e.message)));
                    self.scope_data(&scope.meta).set_member("exception", Value::object(exception))?;
                }
                self.solve(r, target, Opts::default()).await
            }
            other => other,
        }
    }

    async fn solve_set(&self, op: BinOp, l: &Node, r: &Node, target: Value) -> Flow {
        let place = self.solve(l, target.clone(), Opts::default()).await?;
        let source = self.solve(r, target.clone(), Opts::default()).await?;
        let rhs = source.value()?;
        let value = match op {
            BinOp::AddSet => ops::arithmetic(BinOp::Add, &place.value()?, &rhs),
            BinOp::SubSet => ops::arithmetic(BinOp::Sub, &place.value()?, &rhs),
            _ => rhs,
        };

        if place.is_settable() {
            place.set(value.clone())?;
            if let (Origin::Variable, Some(vars), Some(name)) = (place.origin, &place.parent, &place.key) {
                let held = (op == BinOp::Set && source.is_complex()).then(|| source.through().clone());
                self.hold(vars, name, held, &value);
            }
        } else {
            let key = l.name().map_or_else(|| place.to_text(), str::to_owned);
            let key = if self.config().convert_to_camel_case { snake_to_camel(&key) } else { key };
            target.set_member(&key, value.clone())?;
        }
        Ok(Solved::new(value, Origin::Expression))
    }

    async fn solve_cast(&self, expr: &Expr, l: &Node, r: &Node, target: Value) -> Flow {
        let value = self.value_of(l, target.clone()).await?;
        let kind = self.solve(r, target.clone(), Opts::default()).await?.to_text();
        let text = value.to_string();
        let host = self.host();

        let cast = match kind.as_str() {
            "number" => {
                let n = value.to_number();
                Value::Number(if n.is_nan() { 0.0 } else { n })
            }
            "float" => Value::Number(match &value {
                Value::Dimension(d) => d.number,
                _ => parse_float_prefix(&text),
            }),
            "int" | "integer" => Value::Number(match &value {
                Value::Dimension(d) => d.number.trunc(),
                _ => parse_int_prefix(&text),
            }),
            "string" => Value::Str(text),
            "boolean" => Value::Bool(text != "false" && !value.loose_eq(&Value::Number(0.0)) && value.truthy()),
            "json" => value.to_json().map_or(Value::Undefined, |json| Value::Str(json.to_string())),
            "id" => return Ok(Solved::id(with_prefix(&text, '#'), Rc::clone(host))),
            "class" => {
                let selector = with_prefix(&text, '.');
                return Ok(Solved::selector(selector, Origin::Class, host.document(), false, Rc::clone(host)));
            }
            "selector" => return Ok(self.select(text.trim(), target)),
            "attribute" => return Ok(Solved::attribute(target, text)),
            "css_property" => return Ok(Solved::style(target, text)),
            "dimension" => match Dimension::parse(&text) {
                Some(d) => Value::Dimension(d),
                None => return Err(Unwind::error(format!("Cannot cast '{text}' to a dimension."))),
            },
            "variable" => return Ok(self.solve_variable(&text, &expr.scope)),
            _ => Value::Undefined,
        };
        Ok(Solved::new(cast, Origin::Expression))
    }

    async fn solve_is_type(&self, l: &Node, r: &Node, target: Value) -> Flow {
        let left = self.solve(l, target.clone(), Opts::default()).await?;
        let value = left.value()?;
        let type_name = self.solve(r, target, Opts::default()).await?.to_text();

        let matched = match value.as_host().and_then(|h| h.tag_name()) {
            Some(tag) => tag.eq_ignore_ascii_case(&type_name),
            None => match type_name.as_str() {
                "float" => matches!(value, Value::Number(n) if !n.is_nan()),
                "int" | "integer" => matches!(value, Value::Number(n) if n.fract() == 0.0),
                _ => {
                    let class = pascal_case(&snake_to_camel(&type_name));
                    left.through().origin.name() == Some(class.as_str()) || value.type_name() == class
                }
            },
        };
        Ok(Solved::new(Value::Bool(matched), Origin::Expression))
    }

    async fn solve_insert(&self, l: Option<&Node>, r: &Node, target: Value) -> Flow {
        let destination = match l {
            Some(node) => self.value_of(node, target.clone()).await?,
            None if !target.is_nullish() => target.clone(),
            None => self.target().clone(),
        };
        let content = self.value_of(r, target).await?;
        let html = match content.as_host() {
            Some(h) if content.is_element() => h.inner_html().unwrap_or_default(),
            _ => content.as_text(),
        };

        if let Some(host) = destination.as_host() {
            if destination.is_element() {
                host.set_inner_html(&html)?;
                return Ok(Solved::new(Value::Str(html), Origin::Expression));
            }
            if let Some(first) = host.items().and_then(|items| items.into_iter().next()) {
                if let Some(element) = first.as_host() {
                    element.set_inner_html(&html)?;
                    return Ok(Solved::new(Value::Str(html), Origin::Expression));
                }
            }
        }
        if let Value::Array(items) = &destination {
            items.borrow_mut().push(content);
            return Ok(Solved::new(destination.clone(), Origin::Expression));
        }

        Err(Unwind::error(format!(
            "Cannot insert into target of type '{}'. Expected Element, NodeList, or Array.",
            destination.type_of()
        )))
    }

    // ── Members & calls ───────────────────────────────────────────────────────

    async fn solve_member(&self, l: &Node, keys: &[Node], target: Value) -> Flow {
        let mut current = match &l.kind {
            NodeKind::Word(word) if !keywords::is_reserved_word(word) && !target.is_nullish() => {
                let key = self.member_key(word, &target);
                match target.get_member(&key) {
                    Value::Undefined => self.solve(l, target.clone(), Opts::default()).await?,
                    own => Solved::property(own, Origin::Property, target.clone(), key),
                }
            }
            _ => self.solve(l, target.clone(), Opts::default()).await?,
        };

        for key in keys {
            let parent = current.value()?;
            if parent.is_element() {
                match &key.kind {
                    NodeKind::Attribute(name) => {
                        current = Solved::attribute(parent, name.clone());
                        continue;
                    }
                    NodeKind::CssProperty(name) => {
                        current = Solved::style(parent, name.clone());
                        continue;
                    }
                    NodeKind::Variable { name, .. } => {
                        let data = self.engine().binding(&parent).data().clone();
                        current = Solved::property(data.get_member(name), Origin::Variable, data, name.clone());
                        continue;
                    }
                    _ => {}
                }
            }

            let name = match &key.kind {
                NodeKind::Word(word) => word.clone(),
                _ => self.as_string(key, target.clone()).await?,
            };
            if parent.is_nullish() {
                return Err(Unwind::error(format!("Cannot resolve member '{name}' of {parent}.")));
            }

            let resolved = self.member_key(&name, &parent);
            current = match parent.get_member(&resolved) {
                Value::Undefined => match self.engine().resolve(&name, &parent) {
                    Some(function) => Solved::bound(function, parent),
                    None => Solved::property(Value::Undefined, Origin::Property, parent, resolved),
                },
                own => Solved::property(own, Origin::Property, parent, resolved),
            };
        }

        Ok(current)
    }

    async fn solve_subscript(&self, l: &Node, indices: &[Node], target: Value) -> Flow {
        let mut current = self.solve(l, target.clone(), Opts::default()).await?;
        for index in indices {
            let parent = current.value()?;
            let key = self.as_string(index, target.clone()).await?;
            current = Solved::property(parent.get_member(&key), Origin::Property, parent, key);
        }
        Ok(current)
    }

    async fn solve_call(&self, l: &Node, args: &[Node], target: Value, _opts: Opts) -> Flow {
        let callee = self.solve(l, target.clone(), Opts::default()).await?;
        match self.resolve_and_call(&callee, args, &target).await? {
            Some(value) => Ok(Solved::new(value, Origin::Expression)),
            None => Err(Unwind::error(format!(
                "Cannot call '{}': not a function or callable object.",
                callee.to_text()
            ))),
        }
    }

    /// `l: a b` calls `l` when it resolves to something callable and
    /// otherwise assigns the arguments to it.
    async fn solve_act(&self, l: &Node, args: &[Node], target: Value) -> Flow {
        let place = self.solve(l, target.clone(), Opts::default()).await?;
        if let Some(value) = self.resolve_and_call(&place, args, &target).await? {
            return Ok(Solved::new(value, Origin::Expression));
        }

        let values = self.solve_all(args, &target).await?;
        let value = if place.is_settable() && place.is_style() {
            Value::Str(values.iter().map(Value::as_text).collect::<Vec<_>>().join(" "))
        } else {
            values.into_iter().next().unwrap_or_default()
        };

        if place.is_settable() {
            place.set(value.clone())?;
        } else {
            let key = self.member_key(&place.to_text(), &target);
            target.set_member(&key, value.clone())?;
        }
        Ok(Solved::new(value, Origin::Expression))
    }

    /// Call whatever `l` names.  A function in hand is called directly; a
    /// string is looked up in the builtin resolver, then on the target,
    /// then in the host's global namespace.  `None` when nothing matched.
    async fn resolve_and_call(&self, l: &Solved, args: &[Node], target: &Value) -> Flow<Option<Value>> {
        let callee = l.value()?;
        if let Value::Function(_) = callee {
            let receiver = match (&l.parent, l.origin) {
                (Some(parent), origin) if origin != Origin::Variable => parent.clone(),
                _ => target.clone(),
            };
            return Ok(Some(self.call(callee, receiver, args, target.clone()).await?));
        }
        let Value::Str(text) = &callee else {
            return Ok(None);
        };

        let key = self.member_key(text, target);
        let resolved = self.engine().resolve(text, target).or_else(|| self.engine().resolve(&key, target));
        if let Some(function) = resolved {
            return Ok(Some(self.call(function, target.clone(), args, target.clone()).await?));
        }
        let member = target.get_member(&key);
        if let Value::Function(_) = member {
            return Ok(Some(self.call(member, target.clone(), args, target.clone()).await?));
        }

        let host_call = target.as_host().is_some();
        let global = self.host().global(&key);
        if !host_call && global.is_none() {
            return Ok(None);
        }

        let values = self.solve_all(args, target).await?;
        if let Some(host) = target.as_host() {
            if let Some(result) = host.call(&key, &values) {
                return Ok(Some(result?));
            }
        }
        match global {
            Some(Value::Function(f)) if !matches!(*f, Callable::Method { .. }) => {
                Ok(Some(self.invoke(&f, target.clone(), values).await?))
            }
            Some(function @ Value::Function(_)) => {
                Ok(Some(self.call(function, target.clone(), args, target.clone()).await?))
            }
            _ => Ok(None),
        }
    }

    /// Call a function value with unevaluated argument nodes.  Library
    /// methods get the nodes as written; everything else gets them
    /// evaluated against `target`.
    pub fn call<'a>(&'a self, callee: Value, receiver: Value, args: &'a [Node], target: Value) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            let Value::Function(function) = &callee else {
                return Err(Unwind::error(format!("Cannot call '{callee}': not a function or callable object.")));
            };
            if let Callable::Method { func, .. } = &**function {
                return func(self, receiver, args).await;
            }
            let values = self.solve_all(args, &target).await?;
            self.invoke(function, receiver, values).await
        })
    }

    /// Call a native or script function with evaluated arguments.
    pub fn invoke<'a>(&'a self, function: &'a Rc<Callable>, receiver: Value, values: Vec<Value>) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            match &**function {
                Callable::Native { func, .. } => Ok(func(&receiver, &values)?),
                Callable::Script { def, this } => {
                    let ctx = self.spawn();
                    let data = ctx.scope_data(&def.body.meta);
                    data.set_member("event", self.event().clone())?;
                    let this = if this.is_nullish() { receiver.clone() } else { this.clone() };
                    data.set_member("this", this)?;

                    let mut values = values.into_iter();
                    for param in &def.params {
                        data.set_member(param, values.next().unwrap_or_default())?;
                    }
                    if let Some(rest) = &def.rest {
                        data.set_member(rest, Value::array(values.collect()))?;
                    }

                    match ctx.solve_scope(&def.body, receiver, Opts::default()).await {
                        Ok(result) => Ok(result.value()?),
                        Err(Unwind::Signal(Signal { kind: SignalKind::Return, payload })) => Ok(payload),
                        Err(other) => Err(other),
                    }
                }
                Callable::Method { name, .. } => {
                    Err(Unwind::error(format!("'{name}' needs its arguments unevaluated and cannot be called here.")))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_keys() {
        assert_eq!(snake_to_camel("font_size"), "fontSize");
        assert_eq!(snake_to_camel("background-color"), "backgroundColor");
        assert_eq!(snake_to_camel("inner_html"), "innerHTML");
        assert_eq!(snake_to_camel("plain"), "plain");
        assert_eq!(snake_to_camel("trailing_"), "trailing_");
        assert_eq!(snake_to_camel("a_1"), "a_1");
    }

    #[test]
    fn pascal_names() {
        assert_eq!(pascal_case("number"), "Number");
        assert_eq!(pascal_case(&snake_to_camel("css_property")), "CssProperty");
        assert_eq!(pascal_case(""), "");
    }

    #[test]
    fn prefixes_are_not_doubled() {
        assert_eq!(with_prefix("#main", '#'), "#main");
        assert_eq!(with_prefix("main", '#'), "#main");
        assert_eq!(with_prefix("big", '.'), ".big");
    }
}
