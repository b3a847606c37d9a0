use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_taskdown"))
}

#[test]
fn done_edits_the_markdown_and_persists_the_index() {
    let repo = TempDir::new().expect("repo");
    let file = repo.path().join("work.md");
    std::fs::write(
        &file,
        "# Work [project:work]\n- [ ] Draft plan [id:1 bucket:today]\n",
    )
    .expect("write");

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["done", "work:1"])
        .output()
        .expect("done");
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("done: work:1"));

    // The markdown is the source of truth: checkbox flipped, updated stamped.
    let text = std::fs::read_to_string(&file).expect("read");
    assert!(text.contains("- [x] Draft plan [id:1 bucket:today updated:"));

    // The persisted index was re-derived from the edited text.
    let index_file = repo.path().join(".index").join("index.json");
    let index: Value =
        serde_json::from_str(&std::fs::read_to_string(&index_file).expect("read index"))
            .expect("json");
    assert_eq!(index["version"], 3);
    assert_eq!(index["tasks"]["work:1"]["completed"], true);

    let undo = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["undone", "work:1"])
        .output()
        .expect("undone");
    assert!(undo.status.success());
    let text = std::fs::read_to_string(&file).expect("read");
    assert!(text.contains("- [ ] Draft plan"));
}

#[test]
fn done_with_unknown_id_fails_cleanly() {
    let repo = TempDir::new().expect("repo");
    std::fs::write(
        repo.path().join("work.md"),
        "# Work [project:work]\n- [ ] Draft plan [id:1]\n",
    )
    .expect("write");

    let output = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["done", "work:99"])
        .output()
        .expect("done");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no task with id `work:99`"));
}

#[test]
fn index_check_detects_staleness() {
    let repo = TempDir::new().expect("repo");
    let file = repo.path().join("work.md");
    std::fs::write(&file, "# Work [project:work]\n- [ ] Draft [id:1]\n").expect("write");

    let write = bin()
        .arg("--root")
        .arg(repo.path())
        .arg("index")
        .output()
        .expect("index");
    assert!(write.status.success());

    let check = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["index", "--check"])
        .output()
        .expect("check");
    assert!(check.status.success());
    assert!(String::from_utf8_lossy(&check.stdout).contains("up to date"));

    std::fs::write(&file, "# Work [project:work]\n- [x] Draft [id:1]\n").expect("rewrite");
    let check = bin()
        .arg("--root")
        .arg(repo.path())
        .args(["index", "--check"])
        .output()
        .expect("check");
    assert!(!check.status.success());
    assert!(String::from_utf8_lossy(&check.stdout).contains("stale:"));
}
