//! The Act language.
//!
//! Source text flows through [`lexer`] (dual-mode tokens), [`parser`]
//! (a left-to-right tree with no operator precedence) and finally the
//! evaluator in [`interp`], which solves every node into a
//! [`solved::Solved`] so assignments can write back to where a value came
//! from.
//!
//! # Quick start
//!
//! ```no_run
//! use std::rc::Rc;
//! use act::config::Config;
//! use act::memory::MemoryHost;
//! use act::runtime::Engine;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! let local = tokio::task::LocalSet::new();
//! let host = Rc::new(MemoryHost::new());
//! let target = host.body();
//! let engine = Engine::new(Config::new(), host);
//! let v = local.block_on(&rt, engine.run(target, "6 * 7")).unwrap();
//! assert_eq!(v.to_number(), 42.0);
//! ```

pub mod context;
pub mod interp;
pub mod keywords;
pub mod lexer;
pub mod library;
pub mod node;
pub mod ops;
pub mod parser;
pub mod signal;
pub mod solved;
pub mod value;

// Re-exports for convenience.
pub use context::Context;
pub use value::Value;
