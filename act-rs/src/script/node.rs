//! The parsed tree.
//!
//! A parse produces one root [`Scope`].  Scopes hold [`Sentence`]s; every
//! sentence holds an optional explicit target and a value [`Node`].  Nodes are
//! a closed sum type evaluated by [`crate::script::interp`].
//!
//! Scopes are immutable once parsed.  Anything that changes while a script
//! runs (variables, loop counters) lives in per-context scope data keyed by
//! the scope's [`ScopeMeta`], never in the tree itself.

use std::fmt;
use std::rc::Rc;

use crate::script::lexer::Token;
use crate::script::ops::BinOp;

// ── Span ──────────────────────────────────────────────────────────────────────

/// Source range of a node: byte offsets plus the line/column of its first
/// token (column is the first token's end column, as reported by the lexer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn between(start: &Token, end: &Token) -> Self {
        Span {
            start: start.index,
            end: end.index_end().max(start.index),
            line: start.line,
            column: start.column,
        }
    }
}

// ── Scopes & sentences ────────────────────────────────────────────────────────

/// Identity and lexical parent of a scope.  Created before the scope's
/// sentences are parsed so children can point at it.
#[derive(Debug)]
pub struct ScopeMeta {
    pub parent: Option<Rc<ScopeMeta>>,
    /// Full source text the scope was parsed from.
    pub code: Rc<str>,
}

impl ScopeMeta {
    pub fn root(code: Rc<str>) -> Rc<Self> {
        Rc::new(ScopeMeta { parent: None, code })
    }

    pub fn child(parent: &Rc<ScopeMeta>) -> Rc<Self> {
        Rc::new(ScopeMeta { parent: Some(Rc::clone(parent)), code: Rc::clone(&parent.code) })
    }

    /// Stable identity used to key scope data.
    pub fn key(self: &Rc<Self>) -> usize {
        Rc::as_ptr(self) as usize
    }

    pub fn snippet(&self, span: Span) -> &str {
        let end = span.end.min(self.code.len());
        self.code.get(span.start.min(end)..end).unwrap_or("")
    }
}

/// Sequencing mode of a sentence, fixed by its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// `;`
    #[default]
    Sync,
    /// `&`: start and continue without waiting.
    Async,
    /// `?`: skip the next sentence when falsy.
    Condition,
    /// `else?`: skipped when the preceding condition was truthy.
    Branch,
    /// `>>`: the result becomes the target of later sentences.
    Fwd,
}

#[derive(Debug)]
pub struct Sentence {
    pub target: Option<Node>,
    pub value: Node,
    pub mode: Mode,
    pub span: Span,
    pub scope: Rc<ScopeMeta>,
}

impl Sentence {
    pub fn code(&self) -> &str {
        self.scope.snippet(self.span)
    }
}

#[derive(Debug)]
pub struct Scope {
    pub meta: Rc<ScopeMeta>,
    pub sentences: Vec<Sentence>,
    pub span: Span,
}

impl Scope {
    pub fn is_root(&self) -> bool {
        self.meta.parent.is_none()
    }

    pub fn code(&self) -> &str {
        self.meta.snippet(self.span)
    }
}

// ── Composite payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Index of the interpolated sentence in the template's scope.
    Slot(usize),
}

#[derive(Debug)]
pub struct Template {
    pub parts: Vec<Part>,
    /// Interpolated sentences; `None` for a template without `{…}` slots.
    pub scope: Option<Rc<Scope>>,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub body: Rc<Scope>,
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Number(f64),
    Str(String),
    Url(String),
    Dimension { number: f64, unit: String },
    Word(String),
    Variable { name: String, scope: Rc<ScopeMeta> },
    Property(String),
    Attribute(String),
    CssProperty(String),
    /// `#name`, kept with its `#`.
    Id(String),
    /// `<name>`, stored without brackets.
    Tag(String),
    /// `.name`, kept with its `.`.
    Class(String),
    SelectorTemplate(Rc<Template>),
    Template(Rc<Template>),
    Spread(Box<Node>),
    Array(Vec<Node>),
    Object(Vec<(Node, Node)>),
    Function(Rc<FunctionDef>),
    Scope(Rc<Scope>),
    Expr(Box<Expr>),
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Node { kind, span }
    }

    /// The bare name carried by identifier-like nodes (`$x` → `x`,
    /// `:p` → `p`, `word` → `word`).
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Word(s)
            | NodeKind::Str(s)
            | NodeKind::Property(s)
            | NodeKind::Attribute(s)
            | NodeKind::CssProperty(s)
            | NodeKind::Id(s)
            | NodeKind::Tag(s)
            | NodeKind::Class(s) => Some(s),
            NodeKind::Variable { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, NodeKind::Word(w) if w == word)
    }

    pub fn as_scope(&self) -> Option<&Rc<Scope>> {
        match &self.kind {
            NodeKind::Scope(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Number(_) => "number",
            NodeKind::Str(_) => "string",
            NodeKind::Url(_) => "url",
            NodeKind::Dimension { .. } => "dimension",
            NodeKind::Word(_) => "word",
            NodeKind::Variable { .. } => "variable",
            NodeKind::Property(_) => "property",
            NodeKind::Attribute(_) => "attribute",
            NodeKind::CssProperty(_) => "css_property",
            NodeKind::Id(_) => "id",
            NodeKind::Tag(_) => "tag",
            NodeKind::Class(_) => "class",
            NodeKind::SelectorTemplate(_) => "selector_template",
            NodeKind::Template(_) => "template",
            NodeKind::Spread(_) => "spread",
            NodeKind::Array(_) => "array",
            NodeKind::Object(_) => "object",
            NodeKind::Function(_) => "function",
            NodeKind::Scope(_) => "scope",
            NodeKind::Expr(e) => e.kind.name(),
        }
    }
}

// ── Expressions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Lexical scope the expression was parsed in.
    pub scope: Rc<ScopeMeta>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// `l OP r`.
    Binary { op: BinOp, l: Node, r: Node },
    /// `l << r`; a missing `l` inserts into the current target.
    Insert { l: Option<Node>, r: Node },
    /// `keyword arg, …`.
    Keyword { name: String, args: Vec<Node> },
    /// `prefix value`.
    Prefix { prefix: String, value: Node },
    /// `l.a.b`.
    Member { l: Node, keys: Vec<Node> },
    /// `l[a][b]`.
    Subscript { l: Node, indices: Vec<Node> },
    /// `l!`, `l!: a b`, `l(a, b)`.
    Call { l: Node, args: Vec<Node> },
    /// `l: a b`: call, or assign when `l` is not callable.
    Act { l: Node, args: Vec<Node> },
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Binary { op, .. } => op.name(),
            ExprKind::Insert { .. } => "insert",
            ExprKind::Keyword { .. } => "keyword",
            ExprKind::Prefix { .. } => "prefix",
            ExprKind::Member { .. } => "member",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::Call { .. } => "call",
            ExprKind::Act { .. } => "act",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
            Mode::Condition => "condition",
            Mode::Branch => "branch",
            Mode::Fwd => "fwd",
        };
        f.write_str(s)
    }
}
