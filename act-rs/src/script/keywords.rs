//! Keywords, prefixes and reserved words.
//!
//! A keyword is a word that switches the parser to a comma- or
//! operator-delimited argument list (`each $x in $list (...)`); its
//! function receives the raw argument nodes and decides what to evaluate.
//! A prefix applies to exactly one following value (`not $x`).
//!
//! | Keyword | Arguments |
//! |---------|-----------|
//! | `run` | block name, block arguments |
//! | `def` | block name, `$params`, `...$rest`, body |
//! | `each` | `body` / `$x in list body` / `$k $v in object body` |
//! | `for` | `$i [from a] to b [step s] body` |
//! | `if` | `cond then [else other]` |
//! | `loop`, `while`, `with` | body / `cond body` / `object body` |
//! | `new` | `<tag>` or constructor name plus arguments |
//! | `on`, `off`, `kill` | event name (`on` also takes options and a body) |
//! | `break`, `stop`, `return` | optional payload |
//! | `continue`, `repeat`, `restart`, `halt` | none |
//! | `throw` | message |

use std::rc::Rc;

use tracing::info;

use crate::error::RuntimeError;
use crate::runtime::Handler;
use crate::script::context::{Context, Opts};
use crate::script::node::{Expr, FunctionDef, Node, NodeKind, ScopeMeta};
use crate::script::signal::{loop_step, EvalFuture, LoopStep, Signal, SignalKind, Unwind};
use crate::script::solved::{Origin, Solved};
use crate::script::value::{Object, Value};

pub type KeywordFn = for<'a> fn(&'a Context, &'a Expr, Value, &'a [Node]) -> EvalFuture<'a>;
pub type PrefixFn = for<'a> fn(&'a Context, &'a Expr, Value, &'a Node) -> EvalFuture<'a>;

pub const KEYWORDS: &[(&str, KeywordFn)] = &[
    ("run", run),
    ("def", def),
    ("each", each),
    ("for", for_range),
    ("if", if_then),
    ("loop", loop_forever),
    ("while", while_loop),
    ("with", with),
    ("new", construct),
    ("on", on),
    ("off", off),
    ("kill", kill),
    ("break", raise_break),
    ("continue", raise_continue),
    ("stop", raise_stop),
    ("return", raise_return),
    ("repeat", raise_repeat),
    ("restart", raise_restart),
    ("halt", raise_halt),
    ("throw", throw),
];

/// Prefix keywords, in lexer match order.
pub const PREFIXES: &[(&str, PrefixFn)] = &[
    ("global", global),
    ("local", local),
    ("scoped", scoped),
    ("not", not),
    ("negative", negative),
    ("type", type_of),
    ("wat", wat),
];

/// Words that evaluate to something other than their own text.
pub const WORDS: &[&str] = &[
    "me",
    "source_element",
    "original_target",
    "undefined",
    "NaN",
    "debugger",
    "true",
    "false",
    "null",
    "document",
    "window",
    "js",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|(name, _)| *name == word)
}

pub fn keyword(word: &str) -> Option<KeywordFn> {
    KEYWORDS.iter().find(|(name, _)| *name == word).map(|(_, f)| *f)
}

pub fn prefix(word: &str) -> Option<PrefixFn> {
    PREFIXES.iter().find(|(name, _)| *name == word).map(|(_, f)| *f)
}

pub fn is_reserved_word(word: &str) -> bool {
    WORDS.contains(&word) || is_keyword(word)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Scope whose data receives loop variables: the body's own scope, or the
/// scope the keyword was written in when the body is a bare expression.
fn body_scope<'a>(expr: &'a Expr, body: &'a Node) -> &'a Rc<ScopeMeta> {
    body.as_scope().map_or(&expr.scope, |s| &s.meta)
}

fn arg_is(args: &[Node], idx: usize, word: &str) -> bool {
    args.get(idx).is_some_and(|n| n.is_word(word))
}

fn arg<'a>(args: &'a [Node], idx: usize, keyword: &str) -> Result<&'a Node, Unwind> {
    args.get(idx)
        .ok_or_else(|| Unwind::error(format!("Invalid {keyword} syntax: missing argument {}.", idx + 1)))
}

fn done(value: impl Into<Value>) -> Solved {
    Solved::from(value.into())
}

// ── Blocks ────────────────────────────────────────────────────────────────────

fn run<'a>(ctx: &'a Context, expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let Some((name_node, rest)) = args.split_first() else {
            return Err(Unwind::error("Invalid run syntax: missing block name."));
        };
        let name = ctx.as_string(name_node, target.clone()).await?;
        let Some(block) = ctx.engine().lookup_block(ctx.binding(), &name) else {
            return Err(Unwind::error(format!("Block '{name}' not found.")));
        };

        // Each invocation gets its own scope data so recursive runs keep
        // their parameters apart.
        let callee = ctx.spawn();
        callee.set_from_scope(&block.body.meta, Rc::clone(&expr.scope), ctx);
        let data = callee.scope_data(&block.body.meta);

        for (i, param) in block.params.iter().enumerate() {
            let value = match rest.get(i) {
                Some(node) => ctx.value_of(node, target.clone()).await?,
                None => Value::Undefined,
            };
            data.set_member(param, value)?;
        }
        if let Some(rest_name) = &block.rest {
            let extra = rest.get(block.params.len()..).unwrap_or(&[]);
            data.set_member(rest_name, Value::array(ctx.solve_all(extra, &target).await?))?;
        }

        match callee.solve_scope(&block.body, target, Opts::default()).await {
            Err(Unwind::Signal(Signal { kind: SignalKind::Return, payload })) => Ok(done(payload)),
            other => other,
        }
    })
}

fn def<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let (Some(name), Some(body)) = (
            args.first().and_then(Node::name),
            args.last().filter(|_| args.len() > 1).and_then(Node::as_scope),
        ) else {
            return Err(Unwind::error("Invalid def syntax: expected a name and a body."));
        };

        let mut params = Vec::new();
        let mut rest = None;
        for arg in &args[1..args.len() - 1] {
            match &arg.kind {
                NodeKind::Spread(inner) => rest = inner.name().map(str::to_owned),
                _ => params.extend(arg.name().map(str::to_owned)),
            }
        }

        let block = FunctionDef { params, rest, body: Rc::clone(body) };
        ctx.engine().binding(&target).define_block(name.to_owned(), Rc::new(block));
        Ok(Solved::default())
    })
}

// ── Loops ─────────────────────────────────────────────────────────────────────

fn each<'a>(ctx: &'a Context, expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        if arg_is(args, 2, "in") {
            let key = arg(args, 0, "each")?.name().unwrap_or_default();
            let val = arg(args, 1, "each")?.name().unwrap_or_default();
            let iterable = ctx.value_of(arg(args, 3, "each")?, target).await?;
            let body = arg(args, 4, "each")?;
            let data = ctx.scope_data(body_scope(expr, body));

            for k in iterable.keys() {
                let v = iterable.get_member(&k);
                data.set_member(key, Value::Str(k))?;
                data.set_member(val, v)?;
                let step = loop_step(ctx.solve(body, iterable.clone(), Opts::default()).await)?;
                if let LoopStep::Exit(payload) = step {
                    return Ok(done(payload));
                }
            }
            return Ok(done(iterable));
        }

        let (name, iterable, body) = if arg_is(args, 1, "in") {
            let iterable = ctx.value_of(arg(args, 2, "each")?, target.clone()).await?;
            (args[0].name(), iterable, arg(args, 3, "each")?)
        } else {
            (None, target.clone(), arg(args, 0, "each")?)
        };

        let Some(items) = iterable.items() else {
            return Err(Unwind::error(format!("Cannot iterate over {}.", iterable.type_name())));
        };
        let data = ctx.scope_data(body_scope(expr, body));

        for item in items {
            let item_target = match name {
                Some(name) => {
                    data.set_member(name, item)?;
                    target.clone()
                }
                None => item,
            };
            if let LoopStep::Exit(payload) = loop_step(ctx.solve(body, item_target, Opts::default()).await)? {
                return Ok(done(payload));
            }
        }
        Ok(Solved::default())
    })
}

fn for_range<'a>(ctx: &'a Context, expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let name = arg(args, 0, "for")?.name().unwrap_or_default();
        let mut idx = 1;
        let mut start = 0.0;

        if arg_is(args, idx, "from") {
            start = ctx.value_of(arg(args, idx + 1, "for")?, target.clone()).await?.to_number();
            idx += 2;
        }
        if !arg_is(args, idx, "to") {
            return Err(Unwind::error(r#"Invalid for loop syntax: missing "to" word."#));
        }
        let end = ctx.value_of(arg(args, idx + 1, "for")?, target.clone()).await?.to_number();
        idx += 2;

        let ascending = start <= end;
        let step = if arg_is(args, idx, "step") {
            ctx.value_of(arg(args, idx + 1, "for")?, target.clone()).await?.to_number()
        } else if ascending {
            1.0
        } else {
            -1.0
        };
        if step == 0.0 || step.is_nan() || (ascending && step < 0.0) || (!ascending && step > 0.0) {
            return Err(Unwind::error(format!("Invalid for loop step: {step} never reaches {end}.")));
        }

        let Some(body) = args.last() else {
            return Err(Unwind::error("Invalid for loop syntax: missing body."));
        };
        let data = ctx.scope_data(body_scope(expr, body));

        let mut i = start;
        while if ascending { i <= end } else { i >= end } {
            data.set_member(name, Value::Number(i))?;
            if let LoopStep::Exit(payload) = loop_step(ctx.solve(body, target.clone(), Opts::default()).await)? {
                return Ok(done(payload));
            }
            i += step;
        }
        Ok(Solved::default())
    })
}

fn loop_forever<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let body = arg(args, 0, "loop")?;
        loop {
            if let LoopStep::Exit(payload) = loop_step(ctx.solve(body, target.clone(), Opts::default()).await)? {
                return Ok(done(payload));
            }
        }
    })
}

fn while_loop<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let condition = arg(args, 0, "while")?;
        let body = arg(args, 1, "while")?;
        while ctx.value_of(condition, target.clone()).await?.truthy() {
            if let LoopStep::Exit(payload) = loop_step(ctx.solve(body, target.clone(), Opts::default()).await)? {
                return Ok(done(payload));
            }
        }
        Ok(Solved::default())
    })
}

// ── Branching & targets ───────────────────────────────────────────────────────

fn if_then<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let condition = arg(args, 0, "if")?;
        let then = arg(args, 1, "if")?;
        if ctx.value_of(condition, target.clone()).await?.truthy() {
            return ctx.solve(then, target, Opts::default()).await;
        }
        match args.get(2..) {
            Some([kw, other, ..]) if kw.is_word("else") => ctx.solve(other, target, Opts::default()).await,
            _ => Ok(Solved::default()),
        }
    })
}

fn with<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let with_target = ctx.solve(arg(args, 0, "with")?, target, Opts::default()).await?;
        ctx.solve(arg(args, 1, "with")?, with_target.value()?, Opts::default()).await?;
        Ok(with_target)
    })
}

fn construct<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let Some((ctor, rest)) = args.split_first() else {
            return Err(Unwind::error("Invalid new syntax: missing constructor."));
        };
        if let NodeKind::Tag(tag) = &ctor.kind {
            return Ok(done(ctx.host().create_element(tag)?));
        }

        let ctor_value = ctx.value_of(ctor, target.clone()).await?;
        if let Value::Function(_) = ctor_value {
            return Ok(done(ctx.call(ctor_value, target.clone(), rest, target).await?));
        }
        let values = ctx.solve_all(rest, &target).await?;
        Ok(done(ctx.host().construct(&ctor_value.as_text(), &values)?))
    })
}

// ── Events ────────────────────────────────────────────────────────────────────

fn on<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let Some((event_node, rest)) = args.split_first() else {
            return Err(Unwind::error("Invalid on syntax: missing event name."));
        };
        let Some(body) = rest.last().and_then(Node::as_scope) else {
            return Err(Unwind::error("Invalid on syntax: missing handler body."));
        };
        let event = ctx.as_string(event_node, target.clone()).await?;
        let options = match rest.first() {
            Some(node) if rest.len() > 1 && matches!(node.kind, NodeKind::Object(_)) => {
                ctx.value_of(node, target.clone()).await?
            }
            _ => Value::object(Object::new()),
        };

        ctx.engine().binding(&target).add_handler(Handler::new(event, Rc::clone(body), options));
        Ok(done(true))
    })
}

fn off<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let Some(binding) = ctx.engine().find_binding(&target) else {
            return Ok(done(false));
        };
        let event = ctx.as_string(arg(args, 0, "off")?, target).await?;
        Ok(done(binding.remove_handler(&event)))
    })
}

fn kill<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        if !target.is_element() {
            return Ok(done(false));
        }
        let Some(binding) = ctx.engine().find_binding(&target) else {
            return Ok(done(false));
        };
        let event = ctx.as_string(arg(args, 0, "kill")?, target).await?;
        let Some(handler) = binding.handler(&event) else {
            return Ok(done(false));
        };
        if handler.gate().is_running() {
            handler.gate().halt();
            return Ok(done(true));
        }
        Ok(done(false))
    })
}

// ── Signals ───────────────────────────────────────────────────────────────────

fn raise<'a>(ctx: &'a Context, kind: SignalKind, target: Value, payload: Option<&'a Node>) -> EvalFuture<'a> {
    Box::pin(async move {
        let payload = match payload {
            Some(node) => ctx.value_of(node, target).await?,
            None => Value::Undefined,
        };
        Err(Signal::with_payload(kind, payload).into())
    })
}

fn raise_break<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Break, target, args.first())
}

fn raise_stop<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Stop, target, args.first())
}

fn raise_return<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Return, target, args.first())
}

fn raise_continue<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, _args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Continue, target, None)
}

fn raise_repeat<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, _args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Repeat, target, None)
}

fn raise_restart<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, _args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Restart, target, None)
}

fn raise_halt<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, _args: &'a [Node]) -> EvalFuture<'a> {
    raise(ctx, SignalKind::Halt, target, None)
}

fn throw<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, args: &'a [Node]) -> EvalFuture<'a> {
    Box::pin(async move {
        let message = match args.first() {
            Some(node) => ctx.value_of(node, target).await?.as_text(),
            None => "Error".to_owned(),
        };
        Err(RuntimeError::new(message).into())
    })
}

// ── Prefixes ──────────────────────────────────────────────────────────────────

fn global<'a>(ctx: &'a Context, _expr: &'a Expr, _target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        let key = value.name().unwrap_or_default();
        let globals = ctx.engine().globals();
        Ok(Solved::property(globals.get_member(key), Origin::Variable, globals, key))
    })
}

fn local<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        let key = value.name().unwrap_or_default();
        let data = ctx.engine().binding(&target).data().clone();
        Ok(Solved::property(data.get_member(key), Origin::Variable, data, key))
    })
}

fn scoped<'a>(ctx: &'a Context, expr: &'a Expr, _target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        let key = value.name().unwrap_or_default();
        let data = ctx.scope_data(&expr.scope);
        Ok(Solved::property(data.get_member(key), Origin::Variable, data, key))
    })
}

fn not<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move { Ok(done(!ctx.value_of(value, target).await?.truthy())) })
}

fn negative<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        Ok(done(match ctx.value_of(value, target).await? {
            Value::Dimension(mut d) => {
                d.number = -d.number;
                Value::Dimension(d)
            }
            other => Value::Number(-other.to_number()),
        }))
    })
}

fn type_of<'a>(ctx: &'a Context, _expr: &'a Expr, target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        let solved = ctx.solve(value, target, Opts::default()).await?;
        let name = match solved.through().origin.name() {
            Some(name) => name.to_owned(),
            None => solved.value()?.type_of().to_owned(),
        };
        Ok(done(name))
    })
}

fn wat<'a>(ctx: &'a Context, expr: &'a Expr, target: Value, value: &'a Node) -> EvalFuture<'a> {
    Box::pin(async move {
        let result = ctx.solve(value, target.clone(), Opts::default()).await?;
        info!(
            target: "act::wat",
            code = expr.scope.snippet(value.span),
            origin = result.origin.name().unwrap_or("none"),
            value = ?result.value()?,
            target = ?target,
            "wat?"
        );
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_consistent() {
        assert!(is_keyword("each"));
        assert!(!is_keyword("me"));
        assert!(is_reserved_word("me"));
        assert!(is_reserved_word("halt"));
        assert!(!is_reserved_word("color"));
        assert!(keyword("for").is_some());
        assert!(prefix("wat").is_some());
        assert!(prefix("each").is_none());
    }

    #[test]
    fn no_prefix_is_also_a_keyword() {
        for (name, _) in PREFIXES {
            assert!(!is_keyword(name), "{name} is both a prefix and a keyword");
        }
    }
}
