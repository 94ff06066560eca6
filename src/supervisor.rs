//! Supervisor — registry of live [`ProviderSession`]s, keyed by provider name.
//!
//! Two locks are at play, never nested in the blocking direction:
//! - the **registry lock** (`Mutex<HashMap<...>>`), held only long enough to
//!   insert, remove, or clone an `Arc<ProviderSession>` — never across a
//!   provider's stdout wait;
//! - each session's own I/O lock (inside [`ProviderSession`]), held across a
//!   single call's bounded wait.
//!
//! A generation counter is stamped on each registry entry at load time so a
//! failed call can compare-and-evict: it only removes the entry if the
//! instance it was talking to is still the one currently registered, so a
//! concurrent reload or fresh load is never clobbered by a stale failure.

use crate::catalog::CatalogView;
use crate::config::ConfigView;
use crate::error::ProviderError;
use crate::session::{ProviderSession, DEFAULT_CALL_TIMEOUT, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Entry {
    session: Arc<ProviderSession>,
    generation: u64,
}

/// A loaded-or-known provider's summary, as returned by [`Supervisor::list_loaded`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProvider {
    pub name: String,
    pub alive: bool,
    pub tool_names: Vec<String>,
    pub tool_count: usize,
}

/// Supervises the set of currently loaded provider sessions and the
/// configuration they were declared in.
pub struct Supervisor {
    config: ConfigView,
    registry: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

impl Supervisor {
    pub fn new(config: ConfigView) -> Self {
        Self {
            config,
            registry: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// The configuration this supervisor was constructed with.
    pub fn config(&self) -> &ConfigView {
        &self.config
    }

    /// All provider names declared in configuration, whether loaded or not.
    pub fn available_names(&self) -> Vec<String> {
        self.config.available_names()
    }

    /// Load (spawn, handshake, discover) the named provider if it isn't
    /// already loaded. Idempotent: calling `load` on an already-`Ready`
    /// provider is a no-op that returns `Ok(())`.
    #[tracing::instrument(skip(self), fields(provider = %name))]
    pub async fn load(&self, name: &str) -> crate::Result<()> {
        {
            let registry = self.registry.lock().await;
            if registry.contains_key(name) {
                return Ok(());
            }
        }

        let decl = self
            .config
            .get(name)
            .ok_or_else(|| ProviderError::NotConfigured(name.to_string()))?
            .clone();

        let session = ProviderSession::spawn(&decl).await?;
        session.handshake(DEFAULT_HANDSHAKE_TIMEOUT).await?;
        session.discover(DEFAULT_DISCOVERY_TIMEOUT).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.registry.lock().await;
        // Another caller may have loaded this provider while we were
        // spawning; keep whichever entry is already registered and let ours
        // be dropped (and its process killed on drop).
        registry.entry(name.to_string()).or_insert(Entry { session, generation });
        Ok(())
    }

    /// Unload the named provider: terminate its process and remove it from
    /// the registry. Returns `NotLoaded` if the provider isn't loaded.
    #[tracing::instrument(skip(self), fields(provider = %name))]
    pub async fn unload(&self, name: &str) -> crate::Result<()> {
        let entry = {
            let mut registry = self.registry.lock().await;
            registry.remove(name)
        };
        match entry {
            Some(entry) => {
                entry.session.terminate(Duration::from_secs(5)).await;
                Ok(())
            }
            None => Err(ProviderError::NotLoaded(name.to_string())),
        }
    }

    /// Unload then load the named provider, picking up any change in its
    /// declared command/args/env and refreshing its tool catalog. Reloading
    /// a provider that isn't currently loaded behaves as a plain `load`.
    #[tracing::instrument(skip(self), fields(provider = %name))]
    pub async fn reload(&self, name: &str) -> crate::Result<()> {
        match self.unload(name).await {
            Ok(()) | Err(ProviderError::NotLoaded(_)) => {}
            Err(other) => return Err(other),
        }
        self.load(name).await
    }

    /// Call `tool_name` on `provider_name`, auto-loading the provider first
    /// if it isn't already loaded.
    #[tracing::instrument(skip(self, arguments), fields(provider = %provider_name, tool = %tool_name))]
    pub async fn call(
        &self,
        provider_name: &str,
        tool_name: &str,
        arguments: Value,
    ) -> crate::Result<Value> {
        self.load(provider_name).await?;

        let (session, generation) = {
            let registry = self.registry.lock().await;
            let entry = registry
                .get(provider_name)
                .ok_or_else(|| ProviderError::NotLoaded(provider_name.to_string()))?;
            (entry.session.clone(), entry.generation)
        };

        match session.call(tool_name, arguments, DEFAULT_CALL_TIMEOUT).await {
            Ok(value) => Ok(value),
            Err(err @ ProviderError::ProviderDead(..)) => {
                self.evict_if_current(provider_name, generation).await;
                Err(err)
            }
            Err(other) => Err(other),
        }
    }

    /// Re-run discovery for an already-loaded provider, refreshing its tool
    /// catalog in place.
    #[tracing::instrument(skip(self), fields(provider = %name))]
    pub async fn refresh(&self, name: &str) -> crate::Result<()> {
        let session = {
            let registry = self.registry.lock().await;
            registry
                .get(name)
                .map(|entry| entry.session.clone())
                .ok_or_else(|| ProviderError::NotLoaded(name.to_string()))?
        };
        session.discover(DEFAULT_DISCOVERY_TIMEOUT).await
    }

    /// Summaries of every currently loaded provider.
    pub async fn list_loaded(&self) -> Vec<LoadedProvider> {
        let sessions: Vec<Arc<ProviderSession>> = {
            let registry = self.registry.lock().await;
            registry.values().map(|e| e.session.clone()).collect()
        };

        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let alive = session.is_alive().await;
            let tool_names = session.tool_names().await;
            out.push(LoadedProvider {
                name: session.name().to_string(),
                alive,
                tool_count: tool_names.len(),
                tool_names,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// A read-only view over the currently loaded providers' tools.
    pub async fn catalog(&self) -> CatalogView {
        let sessions: Vec<Arc<ProviderSession>> = {
            let registry = self.registry.lock().await;
            registry.values().map(|e| e.session.clone()).collect()
        };
        CatalogView::from_sessions(sessions).await
    }

    /// Terminate every loaded provider. The supervisor may be reused
    /// afterward — `load` will spawn fresh sessions as needed.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = {
            let mut registry = self.registry.lock().await;
            registry.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.session.terminate(Duration::from_secs(5)).await;
        }
    }

    async fn evict_if_current(&self, name: &str, observed_generation: u64) {
        let mut registry = self.registry.lock().await;
        if let Some(entry) = registry.get(name) {
            if entry.generation == observed_generation {
                registry.remove(name);
                tracing::warn!(provider = %name, "evicted dead provider from registry");
            }
        }
    }
}
