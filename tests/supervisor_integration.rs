//! Integration tests exercising a supervisor against the real `fake-provider`
//! child binary over stdio.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Once;
use tool_bridge::{ConfigView, ProviderDecl, ProviderError, Supervisor};

static INIT_TRACING: Once = Once::new();

/// Installs a `tracing-subscriber` writer so `RUST_LOG=debug cargo test -- --nocapture`
/// surfaces the supervisor's own spans while debugging a failing test.
fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn fake_provider_path() -> String {
    env!("CARGO_BIN_EXE_fake-provider").to_string()
}

fn config_with(providers: Vec<(&str, Vec<&str>)>) -> ConfigView {
    init_tracing();
    ConfigView::from_decls(providers.into_iter().map(|(name, args)| ProviderDecl {
        name: name.to_string(),
        command: fake_provider_path(),
        args: args.into_iter().map(str::to_string).collect(),
        env: HashMap::new(),
    }))
}

#[tokio::test]
async fn test_load_then_call_round_trips_arguments() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    supervisor.load("echo-server").await.unwrap();

    let loaded = supervisor.list_loaded().await;
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].alive);
    assert_eq!(loaded[0].tool_names, vec!["echo".to_string()]);

    let result = supervisor
        .call("echo-server", "echo", json!({"hello": "world"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"hello": "world"}));
}

#[tokio::test]
async fn test_call_auto_loads_unloaded_provider() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    assert!(supervisor.list_loaded().await.is_empty());

    let result = supervisor.call("echo-server", "echo", json!({"x": 1})).await.unwrap();
    assert_eq!(result, json!({"x": 1}));
    assert_eq!(supervisor.list_loaded().await.len(), 1);
}

#[tokio::test]
async fn test_raw_result_without_content_passes_through() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    let result = supervisor.call("echo-server", "raw", json!({})).await.unwrap();
    assert_eq!(result, json!({"plain": true}));
}

#[tokio::test]
async fn test_call_to_unconfigured_provider_errors() {
    let supervisor = Supervisor::new(ConfigView::default());
    let result = supervisor.call("nope", "echo", json!({})).await;
    assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
}

#[tokio::test]
async fn test_unload_then_call_reloads_from_scratch() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    supervisor.load("echo-server").await.unwrap();
    supervisor.unload("echo-server").await.unwrap();
    assert!(supervisor.list_loaded().await.is_empty());

    let result = supervisor.call("echo-server", "echo", json!({"again": true})).await.unwrap();
    assert_eq!(result, json!({"again": true}));
}

#[tokio::test]
async fn test_reload_refreshes_tool_catalog() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    supervisor.load("echo-server").await.unwrap();
    supervisor.reload("echo-server").await.unwrap();

    let loaded = supervisor.list_loaded().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].tool_names, vec!["echo".to_string()]);
}

#[tokio::test]
async fn test_crash_during_call_surfaces_provider_dead_or_io_error() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    supervisor.load("echo-server").await.unwrap();
    let result = supervisor.call("echo-server", "crash", json!({})).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_two_providers_are_independent() {
    let supervisor = Supervisor::new(config_with(vec![
        ("provider-a", vec![]),
        ("provider-b", vec![]),
    ]));

    let a = supervisor.call("provider-a", "echo", json!({"from": "a"})).await.unwrap();
    let b = supervisor.call("provider-b", "echo", json!({"from": "b"})).await.unwrap();
    assert_eq!(a, json!({"from": "a"}));
    assert_eq!(b, json!({"from": "b"}));

    let loaded = supervisor.list_loaded().await;
    assert_eq!(loaded.len(), 2);
}

#[tokio::test]
async fn test_catalog_aggregates_across_providers() {
    let supervisor = Supervisor::new(config_with(vec![
        ("provider-a", vec![]),
        ("provider-b", vec![]),
    ]));
    supervisor.load("provider-a").await.unwrap();
    supervisor.load("provider-b").await.unwrap();

    let catalog = supervisor.catalog().await;
    assert_eq!(catalog.providers(), vec!["provider-a".to_string(), "provider-b".to_string()]);

    let found = catalog.find_tool("echo").unwrap();
    assert_eq!(found.provider, "provider-a");
}

#[tokio::test]
async fn test_shutdown_terminates_all_loaded_providers() {
    let supervisor = Supervisor::new(config_with(vec![("echo-server", vec![])]));
    supervisor.load("echo-server").await.unwrap();
    supervisor.shutdown().await;
    assert!(supervisor.list_loaded().await.is_empty());
}
