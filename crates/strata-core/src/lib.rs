//! Strata core runtime
//!
//! This crate provides the behavior-composition substrate including:
//! - Dynamic value representation and a prototype-linked object arena
//! - Identity registry (stable process-lifetime tags)
//! - Inheritable, copy-on-write per-object metadata
//! - Idempotent, dependency-ordered mixin application
//! - Colon-namespaced events with deferred delivery

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod events;
pub mod ident;
pub mod meta;
pub mod mixin;
pub mod realm;
pub mod value;

pub use events::{event_name, Binding, EventContext, ListenerRecord, Method, Transform};
pub use ident::{generate_id, Ident};
pub use meta::{MetaEntry, MetaNodeId};
pub use mixin::{Mixin, Setup};
pub use realm::{FunctionId, Invocation, NativeFn, ObjectId, Realm};
pub use value::Value;

/// Errors raised by the composition substrate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Metadata was requested for a value that cannot carry it.
    #[error("unsupported metadata target: {0}")]
    UnsupportedTarget(String),

    /// A malformed argument was supplied to mixin application.
    #[error("invalid behavior unit: {0}")]
    InvalidBehaviorUnit(String),

    /// A bound method failed to resolve to a function at invocation time.
    #[error("listener {method} for event `{event}` did not resolve to a function")]
    ListenerResolution {
        /// Event being dispatched when resolution failed.
        event: String,
        /// Identity tag of the method that failed to resolve.
        method: String,
    },

    /// A property path was malformed.
    #[error("invalid property path `{0}`")]
    InvalidPath(String),

    /// An error produced inside a user callback.
    #[error("callback error: {0}")]
    Callback(String),
}

/// Result alias for substrate operations.
pub type Result<T> = std::result::Result<T, Error>;
