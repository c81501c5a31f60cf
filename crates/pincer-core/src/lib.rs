//! Core library for Pincer — the safety and coordination layer of an
//! autonomous coding-agent runtime.
//!
//! The crate provides the control logic that decides whether and when a
//! proposed action executes:
//!
//! - every tool call passes through the [`agent::ToolInterceptor`], which
//!   under plan-only mode simulates write operations instead of running them;
//! - sensitive actions go through the [`agent::ConfirmationManager`], an
//!   asynchronous human-in-the-loop protocol with timeout fallbacks and
//!   persisted "remember this decision" semantics;
//! - the growing conversation is governed by the
//!   [`agent::ContextCompressor`], which replaces older history with a
//!   summary while preserving the most recent turns verbatim.
//!
//! All components communicate through an explicit per-session
//! [`agent::EventBus`] and take their collaborators as constructor
//! parameters; there is no global state. The outer agent loop, model
//! client, and presentation layers are external consumers of these types.

pub mod agent;
pub mod config;
pub mod error;
pub mod tools;

pub use error::CoreError;
