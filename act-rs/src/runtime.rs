//! The engine: configuration, host, globals and the per-target bindings
//! that `def` blocks and `on` handlers attach to.
//!
//! Everything here is single-threaded.  Scripts that use `&` sentences,
//! `wait` or `delay` need a tokio current-thread runtime with a
//! [`tokio::task::LocalSet`]:
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use act::{config::Config, memory::MemoryHost, runtime::Engine, script::value::Value};
//! let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! let local = tokio::task::LocalSet::new();
//! let engine = Engine::new(Config::default(), Rc::new(MemoryHost::new()));
//! let value = local.block_on(&rt, engine.run(Value::Undefined, "1 + 2")).unwrap();
//! assert_eq!(value, Value::Number(3.0));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{Error, Result, RuntimeError, SyntaxError};
use crate::host::Host;
use crate::script::context::{Context, Gate, Opts};
use crate::script::library;
use crate::script::node::{FunctionDef, Scope};
use crate::script::parser;
use crate::script::signal::{Flow, Signal, SignalKind, Unwind};
use crate::script::solved::{Origin, Solved};
use crate::script::value::{Object, Value, WeakValue};

// ── Source ────────────────────────────────────────────────────────────────────

/// One parsed source unit.
#[derive(Debug, Clone)]
pub struct Source {
    pub code: Rc<str>,
    pub scope: Rc<Scope>,
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// An `on event (…)` registration.
#[derive(Debug)]
pub struct Handler {
    pub event: String,
    pub body: Rc<Scope>,
    /// The options object given to `on`, or `undefined`.
    pub options: Value,
    gate: Rc<Gate>,
}

impl Handler {
    pub fn new(event: String, body: Rc<Scope>, options: Value) -> Self {
        Handler { event, body, options, gate: Gate::new() }
    }

    /// Lock and halt state shared by every invocation of this handler.
    pub fn gate(&self) -> &Rc<Gate> {
        &self.gate
    }

    /// Registered with `[once: true]`.
    pub fn is_once(&self) -> bool {
        self.options.get_member("once").truthy()
    }
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// Script state attached to one target: its `$variables` (through
/// `local`), `def` blocks and `on` handlers.
#[derive(Debug)]
pub struct Binding {
    /// Weak, so a binding never keeps its target alive.  `None` for the
    /// shared binding of values without an identity.
    element: Option<WeakValue>,
    data: Value,
    handlers: RefCell<IndexMap<String, Rc<Handler>>>,
    blocks: RefCell<IndexMap<String, Rc<FunctionDef>>>,
}

impl Binding {
    fn new(element: &Value) -> Self {
        Binding {
            element: element.downgrade(),
            data: Value::object(Object::new()),
            handlers: RefCell::default(),
            blocks: RefCell::default(),
        }
    }

    /// The target, or `undefined` once it has been dropped.
    pub fn element(&self) -> Value {
        self.element.as_ref().and_then(WeakValue::upgrade).unwrap_or_default()
    }

    fn is_alive(&self) -> bool {
        self.element.as_ref().map_or(true, WeakValue::is_alive)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Register a handler, replacing any previous one for the same event.
    pub fn add_handler(&self, handler: Handler) {
        debug!(target: "act::runtime", event = %handler.event, "handler added");
        self.handlers.borrow_mut().insert(handler.event.clone(), Rc::new(handler));
    }

    pub fn remove_handler(&self, event: &str) -> bool {
        self.handlers.borrow_mut().shift_remove(event).is_some()
    }

    pub fn handler(&self, event: &str) -> Option<Rc<Handler>> {
        self.handlers.borrow().get(event).cloned()
    }

    pub fn handlers(&self) -> Vec<Rc<Handler>> {
        self.handlers.borrow().values().cloned().collect()
    }

    pub fn define_block(&self, name: String, def: Rc<FunctionDef>) {
        self.blocks.borrow_mut().insert(name, def);
    }

    pub fn block(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.blocks.borrow().get(name).cloned()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

struct EngineState {
    config: Config,
    host: Rc<dyn Host>,
    /// `$Capitalised` variables.
    globals: Value,
    /// Bindings of reference values, keyed by [`Value::identity`].  Entries
    /// whose target was dropped are pruned when a new binding is created.
    bindings: RefCell<HashMap<usize, Rc<Binding>>>,
    /// Binding shared by every target without an identity.
    detached: Rc<Binding>,
    /// Latest `delay` generation per body.
    delays: RefCell<HashMap<usize, u64>>,
    rng: Cell<u64>,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine(Rc<EngineState>);

impl Engine {
    pub fn new(config: Config, host: Rc<dyn Host>) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0x2545_f491_4f6c_dd1d, |d| d.as_nanos() as u64);
        Engine(Rc::new(EngineState {
            config,
            host,
            globals: Value::object(Object::new()),
            bindings: RefCell::default(),
            detached: Rc::new(Binding::new(&Value::Undefined)),
            delays: RefCell::default(),
            rng: Cell::new(seed | 1),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.0.host
    }

    /// The object behind `$Capitalised` variables and `global name`.
    pub fn globals(&self) -> Value {
        self.0.globals.clone()
    }

    pub fn parse(&self, code: &str) -> std::result::Result<Source, SyntaxError> {
        let scope = parser::parse(code, &self.0.config)?;
        Ok(Source { code: Rc::clone(&scope.meta.code), scope })
    }

    // ── Bindings ──────────────────────────────────────────────────────────────

    /// The binding of `target`, created on first use.  Values without an
    /// identity (numbers, strings, `undefined`) share one binding.
    pub fn binding(&self, target: &Value) -> Rc<Binding> {
        let Some(id) = target.identity() else {
            return Rc::clone(&self.0.detached);
        };
        let mut bindings = self.0.bindings.borrow_mut();
        if let Some(found) = bindings.get(&id).filter(|b| b.is_alive()) {
            return Rc::clone(found);
        }
        bindings.retain(|_, b| b.is_alive());
        let binding = Rc::new(Binding::new(target));
        bindings.insert(id, Rc::clone(&binding));
        binding
    }

    /// The binding of `target` if one was ever created.
    pub fn find_binding(&self, target: &Value) -> Option<Rc<Binding>> {
        match target.identity() {
            Some(id) => self.0.bindings.borrow().get(&id).filter(|b| b.is_alive()).cloned(),
            None if target.is_nullish() => Some(Rc::clone(&self.0.detached)),
            None => None,
        }
    }

    /// The nearest ancestor of `binding`'s element that has a binding.
    pub fn parent_binding(&self, binding: &Binding) -> Option<Rc<Binding>> {
        let element = binding.element();
        let mut current = element.as_host()?.parent();
        while !current.is_nullish() {
            if let Some(found) = self.find_binding(&current) {
                return Some(found);
            }
            current = current.as_host().map_or(Value::Undefined, |h| h.parent());
        }
        None
    }

    fn bindings_from(&self, binding: &Rc<Binding>) -> impl Iterator<Item = Rc<Binding>> + '_ {
        std::iter::successors(Some(Rc::clone(binding)), move |b| self.parent_binding(b))
    }

    /// A `def` block visible from `binding`: its own or an ancestor's.
    pub fn lookup_block(&self, binding: &Rc<Binding>, name: &str) -> Option<Rc<FunctionDef>> {
        self.bindings_from(binding).find_map(|b| b.block(name))
    }

    /// A variable defined in the data of `binding` or an ancestor binding.
    pub fn lookup_data(&self, binding: &Rc<Binding>, name: &str) -> Option<Solved> {
        self.bindings_from(binding).find_map(|b| {
            let value = b.data.get_member(name);
            if matches!(value, Value::Undefined) {
                return None;
            }
            Some(Solved::property(value, Origin::Variable, b.data.clone(), name))
        })
    }

    /// Builtin resolver: the host's first, then the core library.
    pub fn resolve(&self, key: &str, target: &Value) -> Option<Value> {
        self.0.host.resolve(key, target).or_else(|| library::global(key))
    }

    // ── Running ───────────────────────────────────────────────────────────────

    /// Parse and run `code` against `target`.  `halt` and `stop` end the run
    /// with their payload; other uncaught signals are errors.
    pub async fn run(&self, target: Value, code: &str) -> Result<Value> {
        let source = self.parse(code)?;
        self.run_source(target, &source).await
    }

    pub async fn run_source(&self, target: Value, source: &Source) -> Result<Value> {
        let binding = self.binding(&target);
        let gate = Gate::new();
        let _running = gate.enter();
        let ctx = Context::new(self.clone(), target.clone(), binding, Value::Undefined, gate);
        let outcome = ctx.solve_scope(&source.scope, target, Opts::default()).await;
        self.conclude(outcome)
    }

    /// Deliver `event_name` to the handler registered on `target`.
    ///
    /// `Ok(None)` when there is no handler, the handler is locked or the
    /// invocation failed; failures are logged, never returned, so one bad
    /// handler cannot break the host's event loop.  Uncaught signals other
    /// than `halt`/`stop` are returned as errors.
    pub async fn dispatch(&self, target: &Value, event_name: &str, event: Value) -> Result<Option<Value>> {
        let Some(binding) = self.find_binding(target) else {
            return Ok(None);
        };
        let Some(handler) = binding.handler(event_name) else {
            return Ok(None);
        };
        if handler.gate().is_locked() {
            debug!(target: "act::runtime", event = event_name, "handler locked");
            return Ok(None);
        }
        if handler.is_once() {
            binding.remove_handler(event_name);
        }

        let element = binding.element();
        let _running = handler.gate().enter();
        let ctx = Context::new(self.clone(), element.clone(), Rc::clone(&binding), event.clone(), Rc::clone(handler.gate()));
        ctx.scope_data(&handler.body.meta).set_member("event", event).map_err(RuntimeError::from)?;

        let outcome = ctx.solve_scope(&handler.body, element, Opts::default()).await;
        match self.conclude(outcome) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Runtime(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn conclude(&self, outcome: Flow) -> Result<Value> {
        match outcome {
            Ok(solved) => Ok(solved.value().map_err(RuntimeError::from)?),
            Err(Unwind::Signal(Signal { kind: SignalKind::Halt | SignalKind::Stop, payload })) => Ok(payload),
            Err(Unwind::Signal(signal)) => {
                warn!(target: "act::runtime", signal = %signal.kind, "uncaught signal");
                Err(Error::UnhandledSignal(signal.kind))
            }
            Err(Unwind::Error(e)) => {
                error!(target: "act::runtime", "{}", e.report());
                Err(Error::Runtime(e))
            }
        }
    }

    // ── Library support ───────────────────────────────────────────────────────

    /// Uniform in `[0, 1)`.
    pub(crate) fn random(&self) -> f64 {
        let mut x = self.0.rng.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0.rng.set(x);
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Start a new `delay` for `key`, superseding any pending one.
    pub(crate) fn arm_delay(&self, key: usize) -> u64 {
        let mut delays = self.0.delays.borrow_mut();
        let generation = delays.get(&key).map_or(1, |g| g + 1);
        delays.insert(key, generation);
        generation
    }

    /// `true` when `generation` is still the latest delay for `key`; the
    /// entry is cleared so the next call starts fresh.
    pub(crate) fn finish_delay(&self, key: usize, generation: u64) -> bool {
        let mut delays = self.0.delays.borrow_mut();
        if delays.get(&key) != Some(&generation) {
            return false;
        }
        delays.remove(&key);
        true
    }

    #[cfg(test)]
    pub(crate) fn binding_count(&self) -> usize {
        self.0.bindings.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use pretty_assertions::assert_eq;

    fn engine() -> Engine {
        Engine::new(Config::default(), Rc::new(NullHost))
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        tokio::task::LocalSet::new().block_on(&rt, f)
    }

    #[test]
    fn bindings_are_per_identity() {
        let engine = engine();
        let a = Value::object(Object::new());
        let b = Value::object(Object::new());
        assert!(Rc::ptr_eq(&engine.binding(&a), &engine.binding(&a)));
        assert!(!Rc::ptr_eq(&engine.binding(&a), &engine.binding(&b)));
        assert_eq!(engine.binding_count(), 2);
        assert!(Rc::ptr_eq(&engine.binding(&Value::Undefined), &engine.binding(&Value::Number(1.0))));
        assert!(engine.find_binding(&Value::array(vec![])).is_none());
    }

    #[test]
    fn bindings_do_not_outlive_their_targets() {
        let engine = engine();
        let kept = Value::object(Object::new());
        block_on(engine.run(kept.clone(), "on ping (1)")).unwrap();

        let dropped = Value::object(Object::new());
        block_on(engine.run(dropped.clone(), "on ping (2); local x = 1")).unwrap();
        let binding = engine.find_binding(&dropped).unwrap();
        assert_eq!(engine.binding_count(), 2);

        drop(dropped);
        assert!(binding.element().is_nullish());
        drop(binding);

        let fresh = Value::object(Object::new());
        engine.binding(&fresh);
        assert_eq!(engine.binding_count(), 2);
        assert!(engine.find_binding(&kept).is_some_and(|b| b.handler("ping").is_some()));
    }

    #[test]
    fn delays_supersede() {
        let engine = engine();
        let first = engine.arm_delay(7);
        let second = engine.arm_delay(7);
        assert!(!engine.finish_delay(7, first));
        assert!(engine.finish_delay(7, second));
        assert_eq!(engine.arm_delay(7), 1);
    }

    #[test]
    fn random_stays_in_range() {
        let engine = engine();
        for _ in 0..1000 {
            let n = engine.random();
            assert!((0.0..1.0).contains(&n));
        }
    }

    #[test]
    fn run_reports_uncaught_break() {
        let engine = engine();
        let err = block_on(engine.run(Value::Undefined, "break")).unwrap_err();
        assert!(matches!(err, Error::UnhandledSignal(SignalKind::Break)));
    }

    #[test]
    fn halt_and_stop_end_quietly() {
        let engine = engine();
        assert_eq!(block_on(engine.run(Value::Undefined, "1; halt; 2")).unwrap(), Value::Undefined);
        assert_eq!(block_on(engine.run(Value::Undefined, "stop 5; 2")).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn dispatch_honours_lock_and_once() {
        let engine = engine();
        let target = Value::object(Object::new());
        block_on(engine.run(target.clone(), "on ping [once: true] (:count = 1)")).unwrap();
        block_on(engine.run(target.clone(), "on pong (:pongs += 1)")).unwrap();

        assert_eq!(block_on(engine.dispatch(&target, "ping", Value::Null)).unwrap(), Some(Value::Number(1.0)));
        assert_eq!(block_on(engine.dispatch(&target, "ping", Value::Null)).unwrap(), None);

        let handler = engine.find_binding(&target).and_then(|b| b.handler("pong")).unwrap();
        handler.gate().set_locked(true);
        assert_eq!(block_on(engine.dispatch(&target, "pong", Value::Null)).unwrap(), None);
        handler.gate().set_locked(false);
        assert!(block_on(engine.dispatch(&target, "pong", Value::Null)).unwrap().is_some());
    }
}
