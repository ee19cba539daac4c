//! End-to-end behavior of the gateway facade against mock upstreams.

mod common;

use std::{sync::Arc, time::Duration};

use common::{args, manager, manager_with, memory_storage, stdio, MockFactory};
use data_connector::FileRegistryStorage;
use gateway_mcp::{ErrorKind, McpConfig, McpError, McpTransport};
use rmcp::model::RawContent;

fn text(result: &rmcp::model::CallToolResult) -> String {
    match &result.content[0].raw {
        RawContent::Text(t) => t.text.clone(),
        other => panic!("expected text content, got {other:?}"),
    }
}

fn names(tools: &[gateway_mcp::ToolInfo]) -> Vec<&str> {
    tools.iter().map(|t| t.name.as_str()).collect()
}

#[tokio::test]
async fn test_calc_scenario() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;

    let registered = manager.register(stdio("calc", "calc-tool")).await.unwrap();
    assert_eq!(registered.name, "calc");

    let tool = manager.get_tool("calc::add").unwrap();
    assert!(tool.enabled);
    assert_eq!(tool.server, "calc");
    assert_eq!(tool.tool, "add");

    let result = manager
        .invoke("calc::add", args(serde_json::json!({"a": 2, "b": 3})))
        .await
        .unwrap();
    assert_eq!(text(&result), "5");
    assert_eq!(calc.calls(), 1);

    assert_eq!(manager.disable_tools("calc::add").await.unwrap(), vec!["calc::add"]);
    let err = manager.invoke("calc::add", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disabled);
    assert_eq!(calc.calls(), 1);

    manager.deregister("calc").await.unwrap();
    let err = manager.get_tool("calc::add").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_same_local_name_on_two_servers() {
    let factory = MockFactory::new();
    factory.add_server("srv1", &["search"]);
    factory.add_server("srv2", &["search"]);
    let manager = manager(&factory).await;

    manager.register(stdio("srv1", "a")).await.unwrap();
    manager.register(stdio("srv2", "b")).await.unwrap();

    assert_eq!(
        names(&manager.list_tools()),
        vec!["srv1::search", "srv2::search"]
    );

    let r1 = manager.invoke("srv1::search", None).await.unwrap();
    let r2 = manager.invoke("srv2::search", None).await.unwrap();
    assert_eq!(text(&r1), "srv1:search");
    assert_eq!(text(&r2), "srv2:search");
}

#[tokio::test]
async fn test_registration_is_atomic_on_discovery_failure() {
    let factory = MockFactory::new();
    factory.add_server("flaky", &["add"]).fail_listing(true);
    factory.add_server("dupes", &["add", "add"]);
    factory.set_unreachable("down", true);
    let storage = memory_storage();
    let manager = manager_with(McpConfig::default(), Arc::clone(&storage), &factory).await;

    let err = manager.register(stdio("flaky", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let err = manager.register(stdio("dupes", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = manager.register(stdio("down", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    assert!(manager.list_servers().is_empty());
    assert!(manager.list_tools().is_empty());
    assert!(storage.list_servers().await.unwrap().is_empty());
    assert!(storage.list_tool_states(None).await.unwrap().is_empty());
    assert!(manager.surface().snapshot().is_empty());
}

#[tokio::test]
async fn test_failed_discovery_counted_once() {
    let factory = MockFactory::new();
    factory.set_unreachable("down", true);
    let manager = manager(&factory).await;

    let err = manager.register(stdio("down", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let metrics = manager.metrics();
    assert_eq!(metrics.connection_errors, 1);
    assert_eq!(metrics.errors_of(ErrorKind::Connection), 1);
    assert_eq!(metrics.failed_calls, 0);
}

#[tokio::test]
async fn test_register_validation() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;

    let err = manager.register(stdio("a::b", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = manager.register(stdio("calc", " ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(factory.connects(), 0);

    manager.register(stdio("calc", "calc-tool")).await.unwrap();
    let err = manager.register(stdio("calc", "calc-tool")).await.unwrap_err();
    assert!(matches!(err, McpError::ServerExists(_)));
}

#[tokio::test]
async fn test_enable_disable_idempotent() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["add", "sub"]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();

    let first = manager.disable_tools("calc").await.unwrap();
    let state_after_first = manager.list_tools();
    let second = manager.disable_tools("calc").await.unwrap();

    assert_eq!(first, vec!["calc::add", "calc::sub"]);
    assert_eq!(first, second);
    assert_eq!(manager.list_tools(), state_after_first);
    assert!(manager.list_tools().iter().all(|t| !t.enabled));

    let enabled = manager.enable_tools("calc::sub").await.unwrap();
    assert_eq!(enabled, vec!["calc::sub"]);
    assert!(manager.get_tool("calc::sub").unwrap().enabled);
    assert!(!manager.get_tool("calc::add").unwrap().enabled);
}

#[tokio::test]
async fn test_entity_resolution_errors() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["add"]);
    factory.add_server("empty", &[]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();
    manager.register(stdio("empty", "x")).await.unwrap();

    let err = manager.enable_tools("nothing").await.unwrap_err();
    assert!(matches!(err, McpError::Validation(_)));

    let err = manager.enable_tools("calc::missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = manager.disable_tools("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = manager.disable_tools("empty").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_disabled_tool_never_reaches_upstream() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();
    manager.disable_tools("calc").await.unwrap();

    for _ in 0..5 {
        let err = manager.invoke("calc::add", None).await.unwrap_err();
        assert!(matches!(err, McpError::ToolDisabled(_)));
    }
    assert_eq!(calc.calls(), 0);
    assert_eq!(manager.metrics().errors_of(ErrorKind::Disabled), 5);
}

#[tokio::test]
async fn test_cascade_delete() {
    let factory = MockFactory::new();
    factory.add_server("srv1", &["a", "b"]);
    factory.add_server("srv2", &["a"]);
    let storage = memory_storage();
    let manager = manager_with(McpConfig::default(), Arc::clone(&storage), &factory).await;
    manager.register(stdio("srv1", "x")).await.unwrap();
    manager.register(stdio("srv2", "x")).await.unwrap();

    manager.deregister("srv1").await.unwrap();

    let err = manager.list_tools_by_server("srv1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(manager
        .list_tools()
        .iter()
        .all(|t| !t.name.starts_with("srv1::")));
    assert!(storage
        .list_tool_states(Some("srv1"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(names(&manager.list_tools()), vec!["srv2::a"]);

    let err = manager.deregister("srv1").await.unwrap_err();
    assert!(matches!(err, McpError::ServerNotFound(_)));

    let err = manager.invoke("srv1::a", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_token_is_redacted_in_listings() {
    let factory = MockFactory::new();
    factory.add_server("web", &["fetch"]);
    let manager = manager(&factory).await;

    let config = gateway_mcp::McpServerConfig::new(
        "web",
        McpTransport::StreamableHttp {
            url: "https://web.example.com/mcp".into(),
            token: Some("s3cret".into()),
        },
    );
    let registered = manager.register(config).await.unwrap();

    let listed = serde_json::to_string(&manager.list_servers()).unwrap();
    assert!(!listed.contains("s3cret"));
    assert!(!serde_json::to_string(&registered).unwrap().contains("s3cret"));
    assert!(!serde_json::to_string(&manager.get_server("web").unwrap())
        .unwrap()
        .contains("s3cret"));
}

#[tokio::test]
async fn test_persistence_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let factory = MockFactory::new();
    factory.add_server("calc", &["add", "sub"]);
    factory.add_server("web", &["fetch"]);

    {
        let storage = Arc::new(FileRegistryStorage::open(&path).await.unwrap());
        let manager = manager_with(McpConfig::default(), storage, &factory).await;
        manager.register(stdio("calc", "calc-tool")).await.unwrap();
        manager.register(stdio("web", "web-tool")).await.unwrap();
        manager.disable_tools("calc::sub").await.unwrap();
        manager.shutdown().await;
    }

    let storage = Arc::new(FileRegistryStorage::open(&path).await.unwrap());
    let manager = manager_with(McpConfig::default(), storage, &factory).await;

    let servers: Vec<String> = manager.list_servers().into_iter().map(|s| s.name).collect();
    assert_eq!(servers, vec!["calc", "web"]);
    assert!(manager.get_tool("calc::add").unwrap().enabled);
    assert!(!manager.get_tool("calc::sub").unwrap().enabled);
    assert!(manager.get_tool("web::fetch").unwrap().enabled);
    assert!(!manager.surface().contains("calc::sub"));
}

#[tokio::test]
async fn test_unreachable_server_survives_restart_with_flags() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["add", "sub"]);
    let storage = memory_storage();

    {
        let manager = manager_with(McpConfig::default(), Arc::clone(&storage), &factory).await;
        manager.register(stdio("calc", "x")).await.unwrap();
        manager.disable_tools("calc::sub").await.unwrap();
    }

    factory.set_unreachable("calc", true);
    let manager = manager_with(McpConfig::default(), Arc::clone(&storage), &factory).await;
    assert_eq!(manager.list_servers().len(), 1);
    assert!(manager.list_tools_by_server("calc").unwrap().is_empty());

    factory.set_unreachable("calc", false);
    let tools = manager.refresh_server("calc").await.unwrap();
    assert_eq!(names(&tools), vec!["calc::add", "calc::sub"]);
    assert!(!manager.get_tool("calc::sub").unwrap().enabled);
}

#[tokio::test]
async fn test_refresh_keeps_flags_and_prunes() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add", "sub"]);
    let storage = memory_storage();
    let config = McpConfig {
        enable_tools_on_discovery: false,
        ..Default::default()
    };
    let manager = manager_with(config, Arc::clone(&storage), &factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();
    manager.enable_tools("calc::add").await.unwrap();

    calc.set_tools(&["add", "mul"]);
    let tools = manager.refresh_server("calc").await.unwrap();

    assert_eq!(names(&tools), vec!["calc::add", "calc::mul"]);
    assert!(manager.get_tool("calc::add").unwrap().enabled);
    assert!(!manager.get_tool("calc::mul").unwrap().enabled);
    assert!(manager.get_tool("calc::sub").is_err());

    let flags = storage.list_tool_states(Some("calc")).await.unwrap();
    let stored: Vec<(&str, bool)> = flags
        .iter()
        .map(|f| (f.tool_name.as_str(), f.enabled))
        .collect();
    assert_eq!(stored, vec![("add", true), ("mul", false)]);
}

#[tokio::test]
async fn test_tool_list_changed_triggers_refresh() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();

    calc.set_tools(&["add", "sub"]);
    calc.notify_tools_changed().await;

    let mut refreshed = false;
    for _ in 0..50 {
        if manager.get_tool("calc::sub").is_ok() {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refreshed, "catalog was not refreshed after notification");
    assert!(manager.surface().contains("calc::sub"));
}

#[tokio::test]
async fn test_upstream_tool_error_is_classified() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["fail"]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();

    let err = manager.invoke("calc::fail", None).await.unwrap_err();
    assert!(matches!(&err, McpError::ToolExecution(m) if m == "upstream says no"));
    assert_eq!(err.kind(), ErrorKind::ToolError);

    let err = manager.invoke("calcadd", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_invocation_timeout() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    calc.set_call_delay(Duration::from_secs(5));
    let config = McpConfig {
        call_timeout_secs: 1,
        ..Default::default()
    };
    let manager = manager_with(config, memory_storage(), &factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();

    let err = manager.invoke("calc::add", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(manager.stats().active_executions, 0);
}

#[tokio::test]
async fn test_configured_servers_registered_at_startup() {
    let factory = MockFactory::new();
    factory.add_server("calc", &["add"]);
    factory.set_unreachable("optional", true);

    let config = McpConfig {
        servers: vec![stdio("calc", "x"), stdio("optional", "y")],
        ..Default::default()
    };
    let manager = manager_with(config, memory_storage(), &factory).await;
    let servers: Vec<String> = manager.list_servers().into_iter().map(|s| s.name).collect();
    assert_eq!(servers, vec!["calc"]);
    assert!(manager.surface().contains("calc::add"));
}

#[tokio::test]
async fn test_required_server_failure_aborts_startup() {
    let factory = MockFactory::new();
    factory.set_unreachable("core", true);
    let config = McpConfig {
        servers: vec![stdio("core", "x").required(true)],
        ..Default::default()
    };
    let err = match gateway_mcp::McpManager::new(config, memory_storage(), factory.clone()).await {
        Ok(_) => panic!("startup should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, McpError::Config(_)));
}

#[tokio::test]
async fn test_client_reused_across_concurrent_calls() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();
    assert_eq!(factory.connects(), 1);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager.invoke("calc::add", None).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(factory.connects(), 1);
    assert_eq!(calc.calls(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_calls_racing_registration_reuse_discovery_client() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    let manager = manager(&factory).await;

    let mut callers = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        callers.push(tokio::spawn(async move {
            loop {
                match manager.invoke("calc::add", None).await {
                    Ok(_) => break,
                    Err(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    manager.register(stdio("calc", "x")).await.unwrap();
    for caller in callers {
        caller.await.unwrap();
    }
    assert_eq!(factory.connects(), 1);
    assert_eq!(calc.calls(), 4);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_calls() {
    let factory = MockFactory::new();
    let calc = factory.add_server("calc", &["add"]);
    calc.set_call_delay(Duration::from_millis(200));
    let manager = manager(&factory).await;
    manager.register(stdio("calc", "x")).await.unwrap();

    let caller = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.invoke("calc::add", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.stats().active_executions, 1);

    manager.shutdown().await;
    assert_eq!(manager.stats().active_executions, 0);
    assert!(caller.await.unwrap().is_ok());
}
