//! Per-invocation evaluation state.
//!
//! A [`Context`] is created for every top-level run and every event handler
//! invocation.  It carries the default target, the binding the source was
//! attached to, the event payload and the [`Gate`] of the invocation, plus
//! the data of every scope evaluated under it.  Parsed scopes are shared
//! between invocations; their variables are not.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::Config;
use crate::host::Host;
use crate::runtime::{Binding, Engine};
use crate::script::node::ScopeMeta;
use crate::script::signal::{Flow, Signal, SignalKind};
use crate::script::solved::Solved;
use crate::script::value::{Object, Value};

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Lock and halt state shared by every running invocation of one handler.
///
/// `lock` refuses new invocations; `halt` makes running ones stop at their
/// next evaluation step.  The halt flag clears once nothing is running.
#[derive(Debug, Default)]
pub struct Gate {
    locked: Cell<bool>,
    halted: Cell<bool>,
    running: Cell<usize>,
}

impl Gate {
    pub fn new() -> Rc<Self> {
        Rc::new(Gate::default())
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.set(locked);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.get()
    }

    pub fn halt(&self) {
        self.halted.set(true);
    }

    /// Number of invocations currently running through this gate.
    pub fn running(&self) -> usize {
        self.running.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get() > 0
    }

    /// Mark one invocation as running until the guard is dropped.
    pub fn enter(self: &Rc<Self>) -> GateGuard {
        self.running.set(self.running.get() + 1);
        GateGuard(Rc::clone(self))
    }
}

pub struct GateGuard(Rc<Gate>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        let gate = &self.0;
        gate.running.set(gate.running.get().saturating_sub(1));
        if gate.running.get() == 0 {
            gate.halted.set(false);
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Options threaded from a composite node into its children.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// The object a function literal is being defined in; becomes its
    /// receiver.
    pub parent: Option<Value>,
}

struct ScopeData {
    /// Keeps the scope alive so its key cannot be reused.
    _meta: Rc<ScopeMeta>,
    vars: Value,
    /// Dynamic link set by `run`: the scope the block was invoked from and
    /// the context that scope's variables live in.
    from_scope: Option<(Rc<ScopeMeta>, Context)>,
    /// Dimension and lookup results assigned to variables, with the value
    /// stored at the time.
    held: HashMap<String, (Solved, Value)>,
}

struct Frame {
    engine: Engine,
    target: Value,
    binding: Rc<Binding>,
    event: Value,
    gate: Rc<Gate>,
    data: RefCell<HashMap<usize, ScopeData>>,
}

#[derive(Clone)]
pub struct Context(Rc<Frame>);

impl Context {
    pub fn new(engine: Engine, target: Value, binding: Rc<Binding>, event: Value, gate: Rc<Gate>) -> Self {
        Context(Rc::new(Frame { engine, target, binding, event, gate, data: RefCell::default() }))
    }

    /// A context for a function call: same invocation, fresh scope data.
    pub fn spawn(&self) -> Self {
        let f = &self.0;
        Context::new(f.engine.clone(), f.target.clone(), Rc::clone(&f.binding), f.event.clone(), Rc::clone(&f.gate))
    }

    pub fn engine(&self) -> &Engine {
        &self.0.engine
    }

    pub fn config(&self) -> &Config {
        self.0.engine.config()
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        self.0.engine.host()
    }

    /// The target the invocation started with.
    pub fn target(&self) -> &Value {
        &self.0.target
    }

    pub fn binding(&self) -> &Rc<Binding> {
        &self.0.binding
    }

    pub fn event(&self) -> &Value {
        &self.0.event
    }

    pub fn gate(&self) -> &Rc<Gate> {
        &self.0.gate
    }

    /// Variables of `scope` under this context, created on first use.
    pub fn scope_data(&self, scope: &Rc<ScopeMeta>) -> Value {
        self.0
            .data
            .borrow_mut()
            .entry(scope.key())
            .or_insert_with(|| ScopeData {
                _meta: Rc::clone(scope),
                vars: Value::object(Object::new()),
                from_scope: None,
                held: HashMap::new(),
            })
            .vars
            .clone()
    }

    /// `true` when `scope` holds a variable called `name` whose value is
    /// not `undefined`.
    pub fn scope_defines(&self, scope: &Rc<ScopeMeta>, name: &str) -> bool {
        match self.0.data.borrow().get(&scope.key()) {
            Some(data) => !matches!(data.vars.get_member(name), Value::Undefined),
            None => false,
        }
    }

    pub fn from_scope(&self, scope: &Rc<ScopeMeta>) -> Option<(Rc<ScopeMeta>, Context)> {
        self.0.data.borrow().get(&scope.key()).and_then(|d| d.from_scope.clone())
    }

    pub fn set_from_scope(&self, scope: &Rc<ScopeMeta>, from: Rc<ScopeMeta>, caller: &Context) {
        self.scope_data(scope);
        if let Some(data) = self.0.data.borrow_mut().get_mut(&scope.key()) {
            data.from_scope = Some((from, caller.clone()));
        }
    }

    /// Remember (or forget, when `source` is `None`) the result a variable
    /// in `vars` was assigned from.
    pub fn hold(&self, vars: &Value, name: &str, source: Option<Solved>, stored: &Value) {
        let mut data = self.0.data.borrow_mut();
        let Some(scope) = data.values_mut().find(|d| d.vars.strict_eq(vars)) else {
            return;
        };
        match source {
            Some(source) => {
                scope.held.insert(name.to_owned(), (source, stored.clone()));
            }
            None => {
                scope.held.remove(name);
            }
        }
    }

    /// The result `name` in `scope` was assigned from, while the variable
    /// still holds the value stored then.
    pub fn held(&self, scope: &Rc<ScopeMeta>, name: &str, current: &Value) -> Option<Solved> {
        let data = self.0.data.borrow();
        let (source, stored) = data.get(&scope.key())?.held.get(name)?;
        stored.strict_eq(current).then(|| source.clone())
    }

    /// Identity of this context's scope-data table.
    pub fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Turn a pending halt into a `Halt` signal.
    pub fn check_halt(&self) -> Flow<()> {
        if self.0.gate.is_halted() {
            return Err(Signal::new(SignalKind::Halt).into());
        }
        Ok(())
    }
}
