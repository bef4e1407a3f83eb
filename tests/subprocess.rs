//! Commands that may end the process run in a child under the auto policy.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use cmdtree_mcp::{
    CommandExecutor, ExecutionMode, ExecutionPolicy, ExecutorOptions, RegistryOptions,
    ToolRegistry, fleet,
};

fn executor() -> CommandExecutor {
    CommandExecutor::new(
        Arc::new(fleet::tree()),
        ExecutorOptions {
            policy: ExecutionPolicy::Auto,
            program: Some(PathBuf::from(env!("CARGO_BIN_EXE_fleetctl"))),
            ..Default::default()
        },
    )
}

fn path(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn flags(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[test]
fn terminating_failure_stays_in_the_child() {
    let exec = executor();
    let result = exec
        .execute(&path(&["delete", "cluster"]), &flags(json!({"cluster": "zulu"})), &[])
        .unwrap();
    assert_eq!(result.mode, ExecutionMode::SubProcess);
    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("cluster 'zulu' not found"));

    // The host is still here and can keep executing.
    let result = exec
        .execute(&path(&["describe", "cluster"]), &flags(json!({"cluster": "alpha"})), &[])
        .unwrap();
    assert_eq!(result.exit_code, 0);
}

#[test]
fn missing_target_terminates_with_message() {
    let result = executor()
        .execute(&path(&["delete", "cluster"]), &Map::new(), &[])
        .unwrap();
    assert_eq!(result.mode, ExecutionMode::SubProcess);
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("a cluster name or id is required"));
}

#[test]
fn delete_skips_the_prompt_without_a_terminal() {
    let result = executor()
        .execute(&path(&["delete", "cluster"]), &Map::new(), &path(&["alpha"]))
        .unwrap();
    assert!(result.success(), "{result:?}");
    assert_eq!(result.stdout.trim(), "Cluster 'alpha' will start uninstalling");
}

#[test]
fn forced_policy_runs_everything_in_a_child() {
    let exec = CommandExecutor::new(
        Arc::new(fleet::tree()),
        ExecutorOptions {
            policy: ExecutionPolicy::SubProcess,
            program: Some(PathBuf::from(env!("CARGO_BIN_EXE_fleetctl"))),
            ..Default::default()
        },
    );
    let result = exec
        .execute(&path(&["list", "roles"]), &Map::new(), &[])
        .unwrap();
    assert_eq!(result.mode, ExecutionMode::SubProcess);
    let roles: Value = serde_json::from_str(&result.stdout).unwrap();
    assert_eq!(roles[0]["name"], "admin");
}

#[test]
fn delete_tool_reports_failure_as_error_output() {
    let registry = ToolRegistry::new(
        Arc::new(executor()),
        RegistryOptions {
            prefix: fleet::PROGRAM.to_string(),
            ..Default::default()
        },
    );
    let output = registry
        .call_tool(
            "fleet_delete",
            flags(json!({"resource": "cluster", "flags": {"cluster": "zulu", "yes": true}})),
        )
        .unwrap();
    assert!(output.is_error);
    assert!(output.content[0].contains("not found"));
}
