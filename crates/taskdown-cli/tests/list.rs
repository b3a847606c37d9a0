use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_taskdown"))
}

fn write_vault(dir: &std::path::Path) {
    std::fs::write(
        dir.join("work.md"),
        "# Work [project:work area:office]\n\
         - [ ] Draft plan [id:1 bucket:today]\n\
         \x20\x20- [x] Outline [id:1.1]\n\
         - [ ] Expenses [id:2 bucket:someday]\n",
    )
    .expect("write work.md");
    std::fs::write(
        dir.join("home.md"),
        "# Home [project:home]\n- [ ] Fix gate [id:1]\n",
    )
    .expect("write home.md");
}

fn ids(stdout: &[u8]) -> Vec<String> {
    let tasks: Value = serde_json::from_slice(stdout).expect("json");
    tasks
        .as_array()
        .expect("array")
        .iter()
        .map(|t| t["global_id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn list_defaults_to_open_tasks() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "--json"])
        .output()
        .expect("list");
    assert!(output.status.success());
    assert_eq!(ids(&output.stdout), vec!["home:1", "work:1", "work:2"]);
}

#[test]
fn list_filters_by_query_and_status() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "project:work", "--status", "all", "--json"])
        .output()
        .expect("list");
    assert!(output.status.success());
    assert_eq!(ids(&output.stdout), vec!["work:1", "work:1.1", "work:2"]);

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "(project:home | bucket:someday)", "--json"])
        .output()
        .expect("list");
    assert!(output.status.success());
    assert_eq!(ids(&output.stdout), vec!["home:1", "work:2"]);
}

#[test]
fn list_group_by_buckets_with_sentinel() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "--group-by", "bucket", "--json"])
        .output()
        .expect("list");
    assert!(output.status.success());
    let groups: Value = serde_json::from_slice(&output.stdout).expect("json");
    let labels: Vec<&str> = groups
        .as_array()
        .expect("array")
        .iter()
        .map(|g| g["group"].as_str().expect("label"))
        .collect();
    assert_eq!(labels, vec!["(no bucket)", "today", "someday"]);
}

#[test]
fn invalid_query_is_a_usage_error() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "project:work |"])
        .output()
        .expect("list");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid query"));
    assert!(stderr.contains("expected a filter after `|`"));
}

#[test]
fn search_matches_text_across_statuses() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["search", "outline", "--json"])
        .output()
        .expect("search");
    assert!(output.status.success());
    assert_eq!(ids(&output.stdout), vec!["work:1.1"]);
}

#[test]
fn stats_counts_lanes() {
    let repo = TempDir::new().expect("repo");
    write_vault(repo.path());

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["stats", "--json"])
        .output()
        .expect("stats");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["total"]["total"], 4);
    assert_eq!(report["total"]["done"], 1);
    assert_eq!(report["by_project"]["work"]["open"], 2);
    assert_eq!(report["by_bucket"]["(no bucket)"]["total"], 2);
}

#[test]
fn warnings_go_to_stderr_not_stdout() {
    let repo = TempDir::new().expect("repo");
    std::fs::write(repo.path().join("a.md"), "- [ ] floating [id:1]\n").expect("write");

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["list", "--json"])
        .output()
        .expect("list");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no project context"));
    assert_eq!(ids(&output.stdout), Vec::<String>::new());
}
