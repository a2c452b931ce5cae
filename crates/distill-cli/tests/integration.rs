#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn distill(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("distill").unwrap();
    cmd.current_dir(dir.path()).env("DISTILL_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    distill(dir).args(["init", "--name", "trading"]).assert().success();
}

fn create_incident(dir: &TempDir, title: &str, keyword: &str) {
    distill(dir)
        .args([
            "incident",
            "create",
            "--title",
            title,
            "--severity",
            "high",
            "--root-cause",
            "retry loop resubmitted without an idempotency key",
            "--mitigation",
            "Send a client order id on every retry. Added alerting.",
            "--keyword",
            keyword,
        ])
        .assert()
        .success();
}

fn rules_file(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join("RULES.md")).unwrap()
}

/// Start `distill` as separate processes, all at once, and wait for each.
fn run_concurrently(dir: &TempDir, runs: Vec<Vec<String>>) -> Vec<std::process::Output> {
    let children: Vec<std::process::Child> = runs
        .into_iter()
        .map(|args| {
            std::process::Command::new(assert_cmd::cargo::cargo_bin("distill"))
                .args(args)
                .current_dir(dir.path())
                .env("DISTILL_ROOT", dir.path())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();
    children
        .into_iter()
        .map(|c| c.wait_with_output().unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// distill init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    assert!(dir.path().join(".distill/config.yaml").exists());
    assert!(dir.path().join("postmortem").is_dir());
    assert_eq!(
        rules_file(&dir),
        "# Operating Rules\n<!-- distill revision: 0 -->\n\n"
    );
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    distill(&dir)
        .args(["incident", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("distill init"));
}

// ---------------------------------------------------------------------------
// distill incident
// ---------------------------------------------------------------------------

#[test]
fn incident_create_list_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Duplicate order submission", "order");

    assert!(dir
        .path()
        .join("postmortem/PM-001-duplicate-order-submission.yaml")
        .exists());

    distill(&dir)
        .args(["incident", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PM-001"))
        .stdout(predicate::str::contains("HIGH"));

    distill(&dir)
        .args(["incident", "show", "pm-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# PM-001: Duplicate order submission"))
        .stdout(predicate::str::contains("## Root Cause"));
}

#[test]
fn incident_create_rejects_unknown_severity() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args([
            "incident",
            "create",
            "--title",
            "x",
            "--severity",
            "urgent",
            "--root-cause",
            "y",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown severity"));
}

#[test]
fn incident_show_missing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["incident", "show", "PM-042"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incident not found: PM-042"));
}

#[test]
fn incident_search_ranks_exact_first() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Duplicate order submission", "order");
    create_incident(&dir, "Missing fill logs", "logging");

    let out = distill(&dir)
        .args(["--json", "incident", "search", "order"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    // PM-002 only mentions "order" in its mitigation.
    assert_eq!(hits[0]["record"]["id"], "PM-001");
    assert_eq!(hits[0]["matched"], "exact");
    assert_eq!(hits[1]["record"]["id"], "PM-002");
    assert_eq!(hits[1]["matched"], "substring");
}

#[test]
fn concurrent_processes_get_unique_incident_ids() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let runs = (0..4)
        .map(|_| {
            ["incident", "create", "--title", "Same title", "--severity", "low", "--root-cause", "race"]
                .map(String::from)
                .to_vec()
        })
        .collect();
    for out in run_concurrently(&dir, runs) {
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    }

    let mut files: Vec<String> = std::fs::read_dir(dir.path().join("postmortem"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        (1..=4)
            .map(|n| format!("PM-{n:03}-same-title.yaml"))
            .collect::<Vec<_>>()
    );
    assert!(!dir.path().join(".distill/distill.lock").exists());

    let out = distill(&dir).args(["--json", "incident", "list"]).output().unwrap();
    let records: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// distill rules
// ---------------------------------------------------------------------------

#[test]
fn propose_approve_commits() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Duplicate order submission", "order");

    distill(&dir)
        .args([
            "rules",
            "propose",
            "--entry",
            "[WARNING] Never resubmit an order without its client order id (PM-001)",
            "--entry",
            "[PARAMETER] order_retry_limit = 3 (manual)",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending_approval"));

    // Nothing committed yet.
    assert!(!rules_file(&dir).contains("WARNING"));
    let raw = std::fs::read_to_string(dir.path().join(".distill/proposal.yaml")).unwrap();
    let pending: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
    assert_eq!(pending["state"].as_str(), Some("pending_approval"));
    assert_eq!(pending["projected_lines"].as_u64(), Some(5));

    distill(&dir)
        .args(["rules", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. [WARNING]"));

    distill(&dir)
        .args(["rules", "approve"])
        .assert()
        .success()
        .stdout(predicate::str::contains("committed revision 1"));

    let text = rules_file(&dir);
    assert!(text.contains("<!-- distill revision: 1 -->"));
    assert!(text.contains(
        "- [WARNING] Never resubmit an order without its client order id (PM-001)"
    ));
    assert!(text.contains("- [PARAMETER] order_retry_limit = 3 (manual)"));

    distill(&dir)
        .args(["rules", "lines"])
        .assert()
        .success()
        .stdout("5/100\n");

    distill(&dir)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("committed"));

    distill(&dir)
        .args(["incident", "show", "PM-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Rules"))
        .stdout(predicate::str::contains("- #1 [WARNING] Never resubmit"));
}

#[test]
fn propose_from_incident_uses_suggestions() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Duplicate order submission", "order");

    distill(&dir)
        .args(["rules", "suggest", "PM-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[WARNING] Send a client order id on every retry. (PM-001)",
        ));

    distill(&dir)
        .args(["rules", "propose", "--from-incident", "PM-001"])
        .assert()
        .success();
    distill(&dir).args(["rules", "approve"]).assert().success();
    assert!(rules_file(&dir).contains("- [WARNING] Duplicate order submission (PM-001)"));
}

#[test]
fn second_proposal_is_refused() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["rules", "propose", "--entry", "[DIRECTIVE] first (manual)"])
        .assert()
        .success();
    distill(&dir)
        .args(["rules", "propose", "--entry", "[DIRECTIVE] second (manual)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already pending_approval"));
}

#[test]
fn concurrent_proposals_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let runs = ["first", "second"]
        .iter()
        .map(|s| {
            vec![
                "rules".to_string(),
                "propose".to_string(),
                "--entry".to_string(),
                format!("[DIRECTIVE] {s} (manual)"),
            ]
        })
        .collect();
    let outs = run_concurrently(&dir, runs);
    let ok = outs.iter().filter(|o| o.status.success()).count();
    assert_eq!(ok, 1);
    let refused = outs.iter().find(|o| !o.status.success()).unwrap();
    assert!(String::from_utf8_lossy(&refused.stderr).contains("already pending_approval"));
}

#[test]
fn propose_with_unknown_source_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["rules", "propose", "--entry", "[WARNING] ghost (PM-009)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incident not found: PM-009"));
    assert!(!dir.path().join(".distill/proposal.yaml").exists());
}

#[test]
fn reject_then_resubmit_then_approve() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["rules", "propose", "--entry", "[DIRECTIVE] be careful (manual)"])
        .assert()
        .success();

    distill(&dir)
        .args([
            "rules",
            "reject",
            "--feedback",
            "too vague",
            "--edit",
            "1=Run the backtest suite before merging",
        ])
        .assert()
        .success();
    assert!(!rules_file(&dir).contains("DIRECTIVE"));

    distill(&dir)
        .args(["rules", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("drafting"))
        .stdout(predicate::str::contains("too vague"));

    distill(&dir).args(["rules", "resubmit"]).assert().success();
    distill(&dir).args(["rules", "approve"]).assert().success();
    assert!(rules_file(&dir).contains("- [DIRECTIVE] Run the backtest suite before merging (manual)"));
}

#[test]
fn cancel_leaves_ruleset_untouched() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let before = rules_file(&dir);
    distill(&dir)
        .args(["rules", "propose", "--entry", "[DIRECTIVE] x (manual)"])
        .assert()
        .success();
    distill(&dir)
        .args(["rules", "cancel"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ruleset unchanged"));
    assert_eq!(rules_file(&dir), before);
    distill(&dir)
        .args(["rules", "approve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no ruleset proposal"));
}

#[test]
fn over_ceiling_requires_pruning() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    // 95 entries: 98 lines.
    let mut text = String::from("# Operating Rules\n<!-- distill revision: 3 -->\n\n");
    for i in 1..=95 {
        text.push_str(&format!("- [DIRECTIVE] standing rule {i} (manual)\n"));
    }
    std::fs::write(dir.path().join("RULES.md"), text).unwrap();

    let mut propose = distill(&dir);
    propose.args(["rules", "propose"]);
    for i in 1..=5 {
        propose.args(["--entry", &format!("[WARNING] new rule {i} (manual)")]);
    }
    propose
        .assert()
        .success()
        .stdout(predicate::str::contains("over the ceiling by 3"));

    distill(&dir)
        .args(["rules", "approve", "--keep-all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("103 lines"))
        .stderr(predicate::str::contains("#1, #2, #3"));

    distill(&dir).args(["rules", "approve"]).assert().success();
    distill(&dir)
        .args(["rules", "lines"])
        .assert()
        .success()
        .stdout("100/100\n");
    assert!(!rules_file(&dir).contains("standing rule 3 "));
}

#[test]
fn multiline_statement_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["rules", "propose", "--entry", "[WARNING] first\nsecond (manual)"])
        .assert()
        .failure();
    assert!(!dir.path().join(".distill/proposal.yaml").exists());
}

// ---------------------------------------------------------------------------
// distill recall / config
// ---------------------------------------------------------------------------

#[test]
fn recall_lists_incidents_and_rules() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Duplicate order submission", "order");
    create_incident(&dir, "Missing fill logs", "logging");
    distill(&dir)
        .args(["rules", "propose", "--entry", "[WARNING] Use client order ids (PM-001)"])
        .assert()
        .success();
    distill(&dir).args(["rules", "approve"]).assert().success();

    distill(&dir)
        .args(["recall", "--incident", "PM-002", "--keyword", "order"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PM-002"))
        .stdout(predicate::str::contains("PM-001"))
        .stdout(predicate::str::contains("#1 [WARNING] Use client order ids (PM-001)"));
}

#[test]
fn recall_from_work_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_incident(&dir, "Missing fill logs", "logging");
    std::fs::write(dir.path().join("work.yaml"), "keywords: [logging]\n").unwrap();

    let out = distill(&dir)
        .args(["--json", "recall", "--file", "work.yaml"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let found: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(found["incidents"][0]["id"], "PM-001");
    assert_eq!(found["rules"].as_array().unwrap().len(), 0);
}

#[test]
fn config_validate_clean_project() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    distill(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".distill/config.yaml"),
        "project:\n  name: trading\nruleset:\n  ceiling: 2\n",
    )
    .unwrap();
    distill(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}
