//! Core global callables.
//!
//! These are available on every target through [`crate::runtime::Engine::resolve`]
//! after the host's own resolver.  All of them are library methods: they
//! receive the argument nodes unevaluated, so `delay` and `lock` can decide
//! what to evaluate and when.
//!
//! | Name | Result |
//! |------|--------|
//! | `listens_to(event)` | the receiver has an `on event` handler |
//! | `is_running([event])` | handler running count, or any handler running |
//! | `tick()` | yields to the scheduler once |
//! | `wait(time)` | sleeps; `time` in ms or with an `ms`/`s`/`m`/`h` unit |
//! | `log`, `log_raw`, `warn`, `error` | host log output |
//! | `time_to_ms(time)` | milliseconds |
//! | `random(min, max)` | integer when both bounds are integers |
//! | `delay time body` | debounced: a newer call supersedes a pending one |
//! | `lock`, `unlock`, `is_locked` | invocation gate of the running or a named handler |

use std::time::Duration;

use tracing::debug;

use crate::host::LogLevel;
use crate::script::context::{Context, Opts};
use crate::script::node::Node;
use crate::script::signal::{EvalFuture, Flow, Signal, SignalKind, Unwind};
use crate::script::value::{parse_float_prefix, MethodFn, Value};

pub const GLOBALS: &[(&str, MethodFn)] = &[
    ("listens_to", listens_to),
    ("is_running", is_running),
    ("tick", tick),
    ("wait", wait),
    ("log", log),
    ("log_raw", log_raw),
    ("warn", warn),
    ("error", log_error),
    ("time_to_ms", time_to_ms_global),
    ("random", random),
    ("delay", delay),
    ("lock", lock),
    ("unlock", unlock),
    ("is_locked", is_locked),
];

/// The library callable called `name`, if any.
pub fn global(name: &str) -> Option<Value> {
    GLOBALS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(n, f)| Value::method(*n, *f))
}

/// `2s` → 2000, `1.5m` → 90000, `250` → 250.  Unknown units count as
/// milliseconds; text that is not a number is 0.
pub fn time_to_ms(time: &Value) -> f64 {
    if let Value::Number(n) = time {
        return *n;
    }
    let text = time.to_string();
    let text = text.trim();
    let unit_start = text.trim_end_matches(|c: char| c.is_ascii_lowercase()).len();
    let unit = &text[unit_start..];
    let number = parse_float_prefix(text);
    if unit.is_empty() {
        return if number.is_nan() { 0.0 } else { number };
    }
    number
        * match unit {
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => 1.0,
        }
}

fn sleep_for(ms: f64) -> Duration {
    if ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

async fn arg_values(ctx: &Context, this: &Value, args: &[Node]) -> Flow<Vec<Value>> {
    ctx.solve_all(args, this).await
}

async fn first_arg(ctx: &Context, this: &Value, args: &[Node]) -> Flow<Option<Value>> {
    match args.first() {
        Some(node) => Ok(Some(ctx.value_of(node, this.clone()).await?)),
        None => Ok(None),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn listens_to<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let event = first_arg(ctx, &this, args).await?.map(|v| v.as_text()).unwrap_or_default();
        let listening = ctx
            .engine()
            .find_binding(&this)
            .is_some_and(|binding| binding.handler(&event).is_some());
        Ok(Value::Bool(listening))
    })
}

fn is_running<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let event = first_arg(ctx, &this, args).await?;
        let Some(binding) = ctx.engine().find_binding(&this) else {
            return Ok(Value::Null);
        };
        Ok(match event {
            None | Some(Value::Null) => {
                Value::Bool(binding.handlers().iter().any(|h| h.gate().is_running()))
            }
            Some(event) => match binding.handler(&event.as_text()) {
                Some(handler) => Value::Number(handler.gate().running() as f64),
                None => Value::Bool(false),
            },
        })
    })
}

fn tick<'a>(_ctx: &'a Context, _this: Value, _args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        tokio::task::yield_now().await;
        Ok(Value::Undefined)
    })
}

fn wait<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let time = first_arg(ctx, &this, args).await?.unwrap_or_default();
        tokio::time::sleep(sleep_for(time_to_ms(&time))).await;
        Ok(Value::Undefined)
    })
}

async fn emit(ctx: &Context, this: &Value, args: &[Node], level: LogLevel) -> Flow<Value> {
    let values = arg_values(ctx, this, args).await?;
    let message = match level {
        LogLevel::Raw => values.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(" "),
        _ => values.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
    };
    ctx.host().log(level, &message);
    Ok(Value::Undefined)
}

fn log<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move { emit(ctx, &this, args, LogLevel::Info).await })
}

fn log_raw<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move { emit(ctx, &this, args, LogLevel::Raw).await })
}

fn warn<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move { emit(ctx, &this, args, LogLevel::Warn).await })
}

fn log_error<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move { emit(ctx, &this, args, LogLevel::Error).await })
}

fn time_to_ms_global<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let time = first_arg(ctx, &this, args).await?.unwrap_or_default();
        Ok(Value::Number(time_to_ms(&time)))
    })
}

fn random<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let values = arg_values(ctx, &this, args).await?;
        let min = values.first().map_or(f64::NAN, Value::to_number);
        let max = values.get(1).map_or(f64::NAN, Value::to_number);
        let n = ctx.engine().random() * (max - min + 1.0) + min;
        let integral = min % 1.0 + max % 1.0 == 0.0;
        Ok(Value::Number(if integral { n.floor() } else { n }))
    })
}

/// `delay time body`: run `body` after `time`.  Calling it again for the
/// same body before the timer fires supersedes the pending run, which then
/// halts its invocation instead of running the body.
fn delay<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let (Some(time), Some(body)) = (args.first(), args.get(1)) else {
            return Err(Unwind::error("Invalid delay syntax: expected a time and a body."));
        };
        let key = match body.as_scope() {
            Some(scope) => scope.meta.key(),
            None => body as *const Node as usize,
        };

        let ms = time_to_ms(&ctx.value_of(time, this.clone()).await?);
        let generation = ctx.engine().arm_delay(key);
        tokio::time::sleep(sleep_for(ms)).await;

        if !ctx.engine().finish_delay(key, generation) {
            debug!(target: "act::runtime", key, "delay superseded");
            return Err(Signal::new(SignalKind::Halt).into());
        }
        Ok(ctx.solve(body, this, Opts::default()).await?.value()?)
    })
}

fn lock<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let Some(first) = first_arg(ctx, &this, args).await? else {
            ctx.gate().set_locked(true);
            return Ok(Value::Bool(true));
        };
        if let Value::Bool(locked) = first {
            ctx.gate().set_locked(locked);
            return Ok(Value::Bool(locked));
        }

        let Some(handler) = ctx.engine().find_binding(&this).and_then(|b| b.handler(&first.as_text())) else {
            return Ok(Value::Null);
        };
        let locked = match args.get(1) {
            Some(node) => ctx.value_of(node, this.clone()).await?.truthy(),
            None => true,
        };
        handler.gate().set_locked(locked);
        Ok(Value::Bool(true))
    })
}

fn unlock<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let Some(first) = first_arg(ctx, &this, args).await? else {
            ctx.gate().set_locked(false);
            return Ok(Value::Bool(true));
        };
        let Some(binding) = ctx.engine().find_binding(&this) else {
            return Ok(Value::Null);
        };
        if let Some(handler) = binding.handler(&first.as_text()) {
            handler.gate().set_locked(false);
        }
        Ok(Value::Bool(true))
    })
}

fn is_locked<'a>(ctx: &'a Context, this: Value, args: &'a [Node]) -> EvalFuture<'a, Value> {
    Box::pin(async move {
        let Some(first) = first_arg(ctx, &this, args).await? else {
            return Ok(Value::Bool(ctx.gate().is_locked()));
        };
        let Some(binding) = ctx.engine().find_binding(&this) else {
            return Ok(Value::Null);
        };
        Ok(binding
            .handler(&first.as_text())
            .map_or(Value::Undefined, |h| Value::Bool(h.gate().is_locked())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::Dimension;

    #[test]
    fn time_units() {
        assert_eq!(time_to_ms(&Value::Number(250.0)), 250.0);
        assert_eq!(time_to_ms(&Value::from("2s")), 2000.0);
        assert_eq!(time_to_ms(&Value::from("1.5m")), 90_000.0);
        assert_eq!(time_to_ms(&Value::from("1h")), 3_600_000.0);
        assert_eq!(time_to_ms(&Value::from("40ms")), 40.0);
        assert_eq!(time_to_ms(&Value::from("300")), 300.0);
        assert_eq!(time_to_ms(&Value::from("soon")), 0.0);
        let dim = Value::Dimension(Dimension { number: 3.0, unit: "s".into() });
        assert_eq!(time_to_ms(&dim), 3000.0);
    }

    #[test]
    fn sleeps_are_never_negative() {
        assert_eq!(sleep_for(-5.0), Duration::ZERO);
        assert_eq!(sleep_for(f64::NAN), Duration::ZERO);
        assert_eq!(sleep_for(1500.0), Duration::from_millis(1500));
        assert_eq!(sleep_for(1e23), Duration::MAX);
        assert_eq!(sleep_for(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn globals_resolve_by_name() {
        assert!(global("wait").is_some());
        assert!(global("delay").is_some());
        assert!(global("no_such_thing").is_none());
        let mut names: Vec<_> = GLOBALS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), GLOBALS.len());
    }
}
