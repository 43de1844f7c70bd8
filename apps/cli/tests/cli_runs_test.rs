//! Integration tests for `chattune runs`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write_manifest(root: &std::path::Path, job_id: &str, finished_at: &str, train_loss: f64) {
    let job_dir = root.join(job_id);
    fs::create_dir_all(&job_dir).unwrap();
    let manifest = json!({
        "job_id": job_id,
        "created_at": "2026-10-01T08:00:00Z",
        "finished_at": finished_at,
        "base_model": { "model_id": "unsloth/llama-3-8b-bnb-4bit", "load_in_4bit": true, "dtype": null },
        "dataset": "acme/support-chats",
        "dataset_id": "0f0f",
        "metrics": { "train_loss": train_loss, "eval_loss": null, "steps": 40 },
        "artifacts": [
            { "kind": "merged_model", "path": "support-llama_merged_16bit", "sha256": "aa" },
            { "kind": "quantized_model", "path": "support-llama_q4_k_m", "sha256": "bb" }
        ],
        "publications": []
    });
    fs::write(job_dir.join("run_manifest.json"), serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
}

#[test]
fn test_runs_empty_output_dir() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("chattune").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs (0)"))
        .stdout(predicate::str::contains("No completed runs found"));
}

#[test]
fn test_runs_lists_newest_first_and_skips_incomplete() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("outputs");
    write_manifest(&root, "job-old", "2026-10-01T09:00:00Z", 1.5);
    write_manifest(&root, "job-new", "2026-10-02T09:00:00Z", 0.9);
    fs::create_dir_all(root.join("job-failed").join("checkpoints")).unwrap();

    let output = Command::cargo_bin("chattune")
        .unwrap()
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .arg("--output-dir")
        .arg(&root)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["job_id"], "job-new");
    assert_eq!(runs[0]["merged_model"], "support-llama_merged_16bit");
    assert_eq!(runs[0]["quantized_model"], "support-llama_q4_k_m");
    assert_eq!(runs[1]["job_id"], "job-old");
}

#[test]
fn test_runs_human_output() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("outputs");
    write_manifest(&root, "job-one", "2026-10-02T09:00:00Z", 0.75);

    let mut cmd = Command::cargo_bin("chattune").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs (1)"))
        .stdout(predicate::str::contains("job-one"))
        .stdout(predicate::str::contains("0.7500"));
}

#[test]
fn test_runs_shows_one_run() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("outputs");
    write_manifest(&root, "job-one", "2026-10-02T09:00:00Z", 0.75);

    let mut cmd = Command::cargo_bin("chattune").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .arg("job-one")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run job-one"))
        .stdout(predicate::str::contains("support-llama_q4_k_m"))
        .stdout(predicate::str::contains("Steps:      40"));
}

#[test]
fn test_runs_show_json_is_the_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("outputs");
    write_manifest(&root, "job-one", "2026-10-02T09:00:00Z", 0.75);

    let output = Command::cargo_bin("chattune")
        .unwrap()
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .arg("job-one")
        .arg("--output-dir")
        .arg(&root)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(manifest["job_id"], "job-one");
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 2);
}

#[test]
fn test_runs_unknown_job_fails() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("chattune").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .arg("runs")
        .arg("job-missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("job-missing"));
}

