//! CatalogView — read-only snapshot of tools currently offered by loaded providers.
//!
//! Built fresh from the [`crate::Supervisor`]'s live sessions on every call;
//! it caches nothing itself, so it can never go stale relative to the
//! registry at the moment it was built.

use crate::session::{ProviderSession, ToolDescriptor};
use std::sync::Arc;

/// One tool entry in the aggregated catalog, attributed to the provider that
/// offers it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub provider: String,
    pub tool: ToolDescriptor,
}

/// A read-only, point-in-time view over every loaded provider's tools.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    entries: Vec<CatalogEntry>,
}

impl CatalogView {
    pub(crate) async fn from_sessions(sessions: Vec<Arc<ProviderSession>>) -> Self {
        let mut entries = Vec::new();
        for session in sessions {
            let provider = session.name().to_string();
            for tool in session.tools().await {
                entries.push(CatalogEntry { provider: provider.clone(), tool });
            }
        }
        Self { entries }
    }

    /// Build directly from a list of entries, primarily for tests.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Every tool across every loaded provider, sorted by tool name.
    pub fn list_all_tools(&self) -> Vec<&CatalogEntry> {
        let mut all: Vec<&CatalogEntry> = self.entries.iter().collect();
        all.sort_by(|a, b| a.tool.name.cmp(&b.tool.name));
        all
    }

    /// Find a tool by name. When more than one loaded provider offers a tool
    /// with this name, the provider whose name sorts first lexicographically
    /// wins.
    pub fn find_tool(&self, tool_name: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.tool.name == tool_name)
            .min_by(|a, b| a.provider.cmp(&b.provider))
    }

    /// Names of every provider contributing at least one entry to this view.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.provider.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }
}
