//! Dynamic invocation and chaining of editor operations.
//!
//! Operations live in a category-keyed [`registry`]. A single call goes
//! through the [`proxy`] (lookup, local validation, remote send); chained
//! calls go through the [`pipeline`] runner, which resolves `$.step.field`
//! references against earlier results. [`relay::Relay`] ties the pieces
//! together for the HTTP API and the CLI.

#[cfg(feature = "server")]
pub mod api;
pub mod audit;
pub mod context;
pub mod error;
pub mod logging;
pub mod operations;
pub mod paths;
pub mod pipeline;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod remote;
pub mod resolver;
pub mod settings;
