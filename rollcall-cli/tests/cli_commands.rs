use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const GABBLE: &str = "\
[ConnectionManager]
Interfaces=

[Protocol jabber]
EnglishName=Jabber
Icon=im-jabber
VCardField=x-jabber
param-account=s required register
param-password=s required
param-port=q
default-port=5222
param-register=b

[Protocol irc]
param-account=s required
";

/// A sandbox whose data and config directories are all temporary.
struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            root: TempDir::new().expect("sandbox"),
        }
    }

    fn data_home(&self) -> PathBuf {
        self.root.path().join("data-home")
    }

    fn system_data(&self) -> PathBuf {
        self.root.path().join("system-data")
    }

    fn install(&self, data_dir: &Path, file_name: &str, contents: &str) -> PathBuf {
        let dir = data_dir.join("telepathy").join("managers");
        fs::create_dir_all(&dir).expect("managers dir");
        let path = dir.join(file_name);
        fs::write(&path, contents).expect("write manager file");
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rollcall"));
        cmd.env("HOME", self.root.path())
            .env("XDG_DATA_HOME", self.data_home())
            .env("XDG_DATA_DIRS", self.system_data())
            .env("XDG_CONFIG_HOME", self.root.path().join("config"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_prints_protocols_and_parameters() {
    let sandbox = Sandbox::new();
    let path = sandbox.install(&sandbox.system_data(), "gabble.manager", GABBLE);

    sandbox
        .cmd()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("gabble | 2 protocols"))
        .stdout(contains("jabber (Jabber)"))
        .stdout(contains("[can register]"))
        .stdout(contains("5222"))
        .stdout(contains("irc (Irc)"));
}

#[test]
fn inspect_json_lists_protocols_in_name_order() {
    let sandbox = Sandbox::new();
    let path = sandbox.install(&sandbox.system_data(), "gabble.manager", GABBLE);

    let output = sandbox
        .cmd()
        .arg("inspect")
        .arg(&path)
        .arg("--json")
        .output()
        .expect("run");
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["manager"], "gabble");
    let protocols = json["protocols"].as_array().expect("protocols");
    assert_eq!(protocols[0]["name"], "irc");
    assert_eq!(protocols[1]["name"], "jabber");
    assert_eq!(protocols[1]["can_register"], true);

    let params = protocols[1]["params"].as_array().expect("params");
    let password = params
        .iter()
        .find(|p| p["name"] == "password")
        .expect("password param");
    assert!(password["flags"]
        .as_array()
        .expect("flags")
        .iter()
        .any(|f| f == "secret"));
    let port = params.iter().find(|p| p["name"] == "port").expect("port");
    assert_eq!(port["default"], 5222);
}

#[test]
fn inspect_missing_file_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["inspect", "/nonexistent/gabble.manager"])
        .assert()
        .failure()
        .stderr(contains("failed to read"));
}

#[test]
fn inspect_needs_name_for_unusual_file_names() {
    let sandbox = Sandbox::new();
    let path = sandbox.install(&sandbox.system_data(), "my-gabble.manager", GABBLE);

    sandbox
        .cmd()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("--name"));

    sandbox
        .cmd()
        .arg("inspect")
        .arg(&path)
        .args(["--name", "gabble"])
        .assert()
        .success()
        .stdout(contains("gabble | 2 protocols"));
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[test]
fn list_merges_data_directories() {
    let sandbox = Sandbox::new();
    sandbox.install(&sandbox.system_data(), "gabble.manager", GABBLE);
    sandbox.install(&sandbox.system_data(), "haze.manager", "[Protocol aim]\n");
    let preferred = sandbox.install(&sandbox.data_home(), "haze.manager", "[Protocol msn]\n");

    let output = sandbox
        .cmd()
        .args(["list", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json = stdout_json(&output);
    let entries = json.as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["manager"], "gabble");
    assert_eq!(entries[0]["protocols"], serde_json::json!(["irc", "jabber"]));
    assert_eq!(entries[1]["manager"], "haze");
    assert_eq!(entries[1]["path"], preferred.display().to_string());
    assert_eq!(entries[1]["protocols"], serde_json::json!(["msn"]));
}

#[test]
fn list_reads_extra_directories_from_config() {
    let sandbox = Sandbox::new();
    let extra = sandbox.root.path().join("extra");
    sandbox.install(&extra, "gabble.manager", GABBLE);
    let config = sandbox.root.path().join("rollcall.yaml");
    fs::write(&config, format!("extra_data_dirs:\n  - {}\n", extra.display())).expect("config");

    sandbox
        .cmd()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(contains("gabble"))
        .stdout(contains("irc, jabber"));
}

#[test]
fn list_with_nothing_installed() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No managers installed."));
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

#[test]
fn show_prepares_manager_from_cache_file() {
    let sandbox = Sandbox::new();
    sandbox.install(&sandbox.data_home(), "gabble.manager", GABBLE);

    sandbox
        .cmd()
        .args(["show", "gabble"])
        .assert()
        .success()
        .stdout(contains(
            "gabble | org.freedesktop.Telepathy.ConnectionManager.gabble | source: file",
        ))
        .stdout(contains("jabber (Jabber)"));
}

#[test]
fn show_json_reports_source_and_file() {
    let sandbox = Sandbox::new();
    let path = sandbox.install(&sandbox.data_home(), "gabble.manager", GABBLE);

    let output = sandbox
        .cmd()
        .args(["show", "gabble", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["info_source"], "file");
    assert_eq!(json["cache_file"], path.display().to_string());
    assert_eq!(json["protocols"].as_array().expect("protocols").len(), 2);
}

#[test]
fn show_without_cache_file_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["show", "gabble"])
        .assert()
        .failure()
        .stderr(contains("has no usable description"));
}

// ---------------------------------------------------------------------------
// check-name
// ---------------------------------------------------------------------------

#[test]
fn check_name_accepts_valid_names() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["check-name", "gabble_2"])
        .assert()
        .success()
        .stdout(contains("valid manager name"));
    sandbox
        .cmd()
        .args(["check-name", "--protocol", "local-xmpp"])
        .assert()
        .success()
        .stdout(contains("valid protocol name"));
}

#[test]
fn check_name_rejects_invalid_names() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["check-name", "local-xmpp"])
        .assert()
        .failure()
        .stderr(contains("invalid service name"));
    sandbox
        .cmd()
        .args(["check-name", "--protocol", "2fast"])
        .assert()
        .failure()
        .stderr(contains("first character"));
}
