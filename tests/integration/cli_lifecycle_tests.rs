//! End-to-end CLI tests driving the `plugin-runtime` binary, in the
//! style of the teacher's `fluent-integration-tests` crate. These
//! exercise the CLI/Manager wiring and error reporting paths that
//! don't require a real compiled plugin object on disk (dynamic
//! loading of `libloading`-based entrypoints is covered by
//! `runtime-loader`'s own unit tests with a stubbed resolver).

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn runtime_toml(plugins_dir: &std::path::Path, data_dir: &std::path::Path) -> String {
    format!(
        "plugins_dir = {:?}\ndata_dir = {:?}\nrequire_signature = false\nscan_plugins = true\n",
        plugins_dir, data_dir
    )
}

fn write_plugin(plugins_dir: &std::path::Path, id: &str, permissions: &[&str]) {
    let dir = plugins_dir.join(id);
    fs::create_dir_all(&dir).unwrap();
    let manifest = serde_json::json!({
        "id": id, "name": id, "version": "0.1.0", "description": "", "author": "",
        "main": "main.bin", "permissions": permissions, "dependencies": [],
        "resource_limits": {"memory_bytes": 1024, "wall_timeout_ms": 1000, "cpu_time_ms": 1000}
    });
    fs::write(dir.join("plugin.json"), manifest.to_string()).unwrap();
    fs::write(dir.join("main.bin"), b"not a real shared object").unwrap();
}

#[test]
fn list_on_empty_runtime_reports_no_plugins() {
    let plugins_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    let config_path = config_dir.path().join("runtime.toml");
    fs::write(&config_path, runtime_toml(plugins_dir.path(), data_dir.path())).unwrap();

    Command::cargo_bin("plugin-runtime")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(contains("no plugins loaded"));
}

#[test]
fn execute_on_unknown_plugin_reports_not_found() {
    let plugins_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    let config_path = config_dir.path().join("runtime.toml");
    fs::write(&config_path, runtime_toml(plugins_dir.path(), data_dir.path())).unwrap();

    Command::cargo_bin("plugin-runtime")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "info", "ghost"])
        .assert()
        .failure();
}

#[test]
fn load_with_unknown_permission_token_fails() {
    let plugins_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    let config_path = config_dir.path().join("runtime.toml");
    fs::write(&config_path, runtime_toml(plugins_dir.path(), data_dir.path())).unwrap();

    write_plugin(plugins_dir.path(), "bad-perms", &["root"]);

    Command::cargo_bin("plugin-runtime")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "load", "bad-perms"])
        .assert()
        .failure();
}

#[test]
fn load_all_on_missing_plugins_dir_reports_nothing_loaded() {
    let plugins_dir = tempdir().unwrap();
    // Point plugins_dir at a subdirectory that was never created.
    let nonexistent = plugins_dir.path().join("does-not-exist");
    let data_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    let config_path = config_dir.path().join("runtime.toml");
    fs::write(&config_path, runtime_toml(&nonexistent, data_dir.path())).unwrap();

    Command::cargo_bin("plugin-runtime")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "load-all"])
        .assert()
        .success();
}

#[test]
fn stats_on_fresh_runtime_reports_zero_plugins() {
    let plugins_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    let config_path = config_dir.path().join("runtime.toml");
    fs::write(&config_path, runtime_toml(plugins_dir.path(), data_dir.path())).unwrap();

    Command::cargo_bin("plugin-runtime")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "stats"])
        .assert()
        .success()
        .stdout(contains("\"total_plugins\": 0"));
}
