//! Integration tests for `chattune train`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const REQUIRED: [&str; 5] = ["HF_INPUT_MODEL", "HF_ACCOUNT", "HF_DATASET", "HF_OUTPUT_MODEL", "HF_TOKEN"];

/// Command isolated from the developer's environment and config files.
fn chattune(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chattune").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("NO_COLOR", "1")
        .env_remove("CHATTUNE_RUNTIME");
    for key in REQUIRED {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn test_train_without_env_names_every_missing_key() {
    let temp_dir = TempDir::new().unwrap();

    chattune(&temp_dir)
        .arg("train")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "missing required environment variable(s): HF_INPUT_MODEL, HF_ACCOUNT, HF_DATASET, HF_OUTPUT_MODEL, HF_TOKEN",
        ));

    assert!(!temp_dir.path().join("outputs").exists());
}

#[test]
fn test_train_reports_only_the_missing_keys() {
    let temp_dir = TempDir::new().unwrap();

    chattune(&temp_dir)
        .arg("train")
        .env("HF_INPUT_MODEL", "unsloth/llama-3-8b-bnb-4bit")
        .env("HF_ACCOUNT", "acme")
        .env("HF_DATASET", "support-chats")
        .env("HF_TOKEN", "   ")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HF_OUTPUT_MODEL, HF_TOKEN"))
        .stderr(predicate::str::contains("HF_ACCOUNT").not());
}

#[test]
fn test_train_without_runtime_fails_before_loading() {
    let temp_dir = TempDir::new().unwrap();

    chattune(&temp_dir)
        .arg("train")
        .env("HF_INPUT_MODEL", "unsloth/llama-3-8b-bnb-4bit")
        .env("HF_ACCOUNT", "acme")
        .env("HF_DATASET", "support-chats")
        .env("HF_OUTPUT_MODEL", "support-llama")
        .env("HF_TOKEN", "hf_secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No runtime worker configured"))
        .stderr(predicate::str::contains("hf_secret").not());

    assert!(!temp_dir.path().join("outputs").exists());
}

#[test]
fn test_train_rejects_unreadable_config() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(".chattunerc"), "log_level = [").unwrap();

    chattune(&temp_dir)
        .arg("train")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[cfg(unix)]
const WORKER: &str = r#"#!/bin/sh
cat > /dev/null
case "$1" in
  train)
    echo 'Loading checkpoint shards'
    echo '{"type":"step","step":1,"total":1,"loss":0.5}'
    echo '{"type":"result","value":{"train_loss":0.5,"steps":1}}'
    ;;
  publish)
    echo '{"type":"result","value":{"reference":"main"}}'
    ;;
  *)
    echo '{"type":"result"}'
    ;;
esac
"#;

/// A configured `train` against local splits and a scripted worker.
#[cfg(unix)]
fn offline_train(temp_dir: &TempDir) -> Command {
    let data = temp_dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("train.jsonl"), "{\"chats\": [{\"role\": \"user\", \"content\": \"hi\"}]}\n").unwrap();
    std::fs::write(data.join("test.jsonl"), "{\"chats\": []}\n").unwrap();
    let worker = temp_dir.path().join("worker.sh");
    std::fs::write(&worker, WORKER).unwrap();

    let mut cmd = chattune(temp_dir);
    cmd.env("HF_INPUT_MODEL", "unsloth/llama-3-8b-bnb-4bit")
        .env("HF_ACCOUNT", "acme")
        .env("HF_DATASET", "support-chats")
        .env("HF_OUTPUT_MODEL", "support-llama")
        .env("HF_TOKEN", "hf_secret")
        .env("CHATTUNE_RUNTIME", format!("sh {}", worker.display()))
        .arg("train")
        .arg("--dataset-dir")
        .arg(&data)
        .arg("--export-dir")
        .arg(temp_dir.path().join("exports"));
    cmd
}

#[cfg(unix)]
#[test]
fn test_train_json_prints_only_the_manifest() {
    let temp_dir = TempDir::new().unwrap();

    let output = offline_train(&temp_dir).arg("--json").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(manifest["dataset"], "acme/support-chats");
    assert_eq!(manifest["metrics"]["train_loss"], 0.5);
    let publications = manifest["publications"].as_array().unwrap();
    assert_eq!(publications.len(), 2);
    assert!(publications.iter().all(|p| p["repo_id"] == "acme/support-llama"));

    let job_id = manifest["job_id"].as_str().unwrap();
    assert!(temp_dir.path().join("outputs").join(job_id).join("run_manifest.json").exists());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("[train:"));
}

#[cfg(unix)]
#[test]
fn test_train_human_output_shows_progress() {
    let temp_dir = TempDir::new().unwrap();

    offline_train(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Runtime:    sh "))
        .stdout(predicate::str::contains("step 1/1 loss=0.5000"))
        .stdout(predicate::str::contains("Fine-tuning complete"))
        .stdout(predicate::str::contains("Published gguf/q4_k_m to acme/support-llama"));
}

