//! # gov-enforce
//!
//! Policy enforcement around the subsystems Governor controls.
//!
//! Each guard wraps one collaborator (a [`ToolExecutor`], [`PluginHost`],
//! [`MemoryStore`], [`ConnectivityGateway`], or [`UpdateManager`]) and runs
//! the same flow for every operation:
//!
//! 1. **Check**: evaluate policy synchronously (`check_*` methods expose this
//!    step on its own, without side effects).
//! 2. **Gate**: record an audit entry in the engine's log; on Deny or a pending
//!    approval, notify sinks and return [`Outcome::Blocked`] /
//!    [`Outcome::RequiresApproval`] without touching the collaborator.
//! 3. **Delegate**: otherwise call the collaborator, forwarding the
//!    cancellation token unchanged, and return [`Outcome::Completed`] with any
//!    constraints attached.
//!
//! Approvals are session grants held by the engine; every guard exposes them
//! through [`Approvals`].

pub mod connectivity;
pub mod error;
pub mod guard;
pub mod memory;
pub mod notify;
pub mod plugin;
pub mod tool;
pub mod update;

pub use connectivity::{ConnectivityGateway, ConnectivityGuard, NetworkResponse};
pub use error::EnforceError;
pub use guard::{Approvals, Outcome};
pub use memory::{MemoryGuard, MemoryItem, MemoryStore, VecMemoryStore};
pub use notify::{
    EnforcementEvent, EnforcementSink, MemorySink, NotificationDispatcher, PurgeReason, TracingSink,
};
pub use plugin::{PluginGuard, PluginHost, PluginManifest};
pub use tool::{ToolExecutor, ToolGuard, ToolOutput};
pub use update::{UpdateGuard, UpdateInfo, UpdateManager, UpdateVerdict};
