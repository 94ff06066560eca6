//! ConfigView — read-only snapshot of provider declarations.
//!
//! Reads a `mcpServers` mapping (TOML or JSON) from a config source. The core
//! consults this on every `load`; it never writes it and never validates
//! beyond field types and the checks in [`ConfigView::validate`].

use crate::error::ProviderError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Declarative configuration for one child tool-provider process.
///
/// Immutable for the lifetime of a session; a change to the backing config
/// file is observed only when the provider is next loaded or reloaded.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderDecl {
    /// Unique, non-empty provider name (the `mcpServers` key is stored here too).
    #[serde(skip)]
    pub name: String,
    /// Filesystem-resolvable executable.
    pub command: String,
    /// Ordered argument sequence.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables merged over the host environment; these win on conflict.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Top-level shape of the configuration source: a single `mcpServers` table.
#[derive(Debug, Clone, Default, Deserialize)]
struct McpServersFile {
    #[serde(default)]
    #[serde(rename = "mcpServers")]
    mcp_servers: HashMap<String, ProviderDecl>,
}

/// Read-only view over the declared providers.
///
/// Consulted by the [`crate::Supervisor`] on every `load`. Never mutates or
/// persists the underlying source.
#[derive(Debug, Clone, Default)]
pub struct ConfigView {
    providers: HashMap<String, ProviderDecl>,
}

impl ConfigView {
    /// Build a `ConfigView` directly from a map of declarations, primarily for tests.
    pub fn from_decls(providers: impl IntoIterator<Item = ProviderDecl>) -> Self {
        let providers = providers
            .into_iter()
            .map(|decl| (decl.name.clone(), decl))
            .collect();
        Self { providers }
    }

    /// Parse a configuration source (TOML or JSON, sniffed by content), then validate.
    ///
    /// JSON is detected by a leading `{` (after trimming whitespace); anything
    /// else is parsed as TOML.
    pub fn from_str(source: &str) -> crate::Result<Self> {
        let trimmed = source.trim_start();
        let file: McpServersFile = if trimmed.starts_with('{') {
            serde_json::from_str(source).map_err(|e| {
                ProviderError::NotConfigured(format!("invalid JSON config: {e}"))
            })?
        } else {
            toml::from_str(source).map_err(|e| {
                ProviderError::NotConfigured(format!("invalid TOML config: {e}"))
            })?
        };

        let mut providers = HashMap::with_capacity(file.mcp_servers.len());
        for (name, mut decl) in file.mcp_servers {
            decl.name = name.clone();
            providers.insert(name, decl);
        }

        let view = Self { providers };
        view.validate()?;
        Ok(view)
    }

    /// Read and parse the configuration file at `path`. Defaults to `./<config>`
    /// when the caller has no better path (the core performs no filesystem
    /// writes and never resolves a default path itself — that is the
    /// installer/CLI's job).
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::NotConfigured(format!(
                "failed to read config at '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_str(&content)
    }

    /// Validate field types and basic invariants without spawning anything.
    ///
    /// - Provider names must be non-empty and contain only letters, digits,
    ///   `-`, or `_`.
    /// - `command` must be non-empty.
    pub fn validate(&self) -> crate::Result<()> {
        for (name, decl) in &self.providers {
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            {
                return Err(ProviderError::NotConfigured(format!(
                    "provider name '{name}' must be non-empty alphanumeric with '-'/'_'"
                )));
            }
            if decl.command.is_empty() {
                return Err(ProviderError::NotConfigured(format!(
                    "provider '{name}' has an empty command"
                )));
            }
        }
        Ok(())
    }

    /// Look up a provider declaration by name.
    pub fn get(&self, name: &str) -> Option<&ProviderDecl> {
        self.providers.get(name)
    }

    /// All configured provider names, sorted.
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
