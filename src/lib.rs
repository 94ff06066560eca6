//! tool-bridge — a dynamic supervisor for child tool-provider processes.
//!
//! Embedding hosts (an MCP server, a CLI, a test harness) configure a set of
//! named providers, then `load`/`call`/`unload`/`reload` them on demand. Each
//! provider is a child process speaking line-delimited JSON-RPC 2.0 on its
//! stdin/stdout; this crate owns spawning it, handshaking with it, tracking
//! what tools it offers, and routing calls to it with bounded timeouts.
//!
//! This crate does not install servers, read or write a config file on its
//! own initiative, expose a CLI, or re-host these operations over a remote
//! protocol — those are jobs for the embedding host.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod supervisor;

pub use catalog::{CatalogEntry, CatalogView};
pub use codec::{FrameError, Message, RpcError};
pub use config::{ConfigView, ProviderDecl};
pub use error::{ProviderError, Result};
pub use session::{ProviderSession, SessionState, ToolDescriptor};
pub use supervisor::{LoadedProvider, Supervisor};

use std::sync::OnceLock;

static GLOBAL: OnceLock<Supervisor> = OnceLock::new();

/// Install the process-wide [`Supervisor`] singleton, built from `config`.
///
/// Purely additive: nothing requires going through this accessor. Returns
/// `false` if a global supervisor has already been installed (the given
/// `config` is dropped in that case; the caller should keep its own copy if
/// it needs to retry with a fresh `Supervisor` instead).
pub fn init_global(config: ConfigView) -> bool {
    GLOBAL.set(Supervisor::new(config)).is_ok()
}

/// The process-wide [`Supervisor`] singleton, if [`init_global`] has been
/// called. Most callers should prefer constructing their own `Supervisor`
/// directly (e.g. via `Supervisor::new`) and threading it explicitly; this
/// exists for hosts that want a single ambient instance.
pub fn global() -> Option<&'static Supervisor> {
    GLOBAL.get()
}
