//! Act: an embeddable, asynchronous scripting language for scripting a
//! document-like host.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`script`] | lexer, parser, evaluator and core library |
//! | [`runtime`] | [`runtime::Engine`], per-target bindings and handlers |
//! | [`host`] | the traits a host environment implements |
//! | [`memory`] | an in-memory document host |
//! | [`config`] | engine settings and `config.act` loading |
//! | [`cli`] | argument parsing for the `act` binary |

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod memory;
pub mod runtime;
pub mod script;
