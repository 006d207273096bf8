//! Integration tests for the arcticchat binary.
//!
//! Every test runs offline: the heuristic tokenizer stands in for the
//! pretrained vocabulary and no command here talks to the model.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command with a clean environment inside an empty directory.
#[allow(deprecated)]
fn arcticchat_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("arcticchat").expect("Failed to find arcticchat binary");
    cmd.current_dir(dir.path())
        .env_remove("REPLICATE_API_TOKEN")
        .env_remove("ARCTICCHAT_REPLICATE__API_TOKEN")
        .env_remove("RUST_LOG")
        .timeout(std::time::Duration::from_secs(30));
    cmd
}

#[test]
fn test_prompt_prints_formatted_conversation() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    arcticchat_cmd(&dir)
        .args(["--tokenizer", "estimate", "prompt", "Does this contain aspartame?"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("assistant\nHi I am food inspector"))
        .stdout(predicate::str::contains(
            "\nuser\nDoes this contain aspartame?\nassistant\n",
        ))
        .stdout(predicate::str::contains("tokens: "));
}

#[test]
fn test_prompt_over_ceiling_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    arcticchat_cmd(&dir)
        .args(["--tokenizer", "estimate", "--ceiling", "5", "prompt", "hello"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("(Exceeded)"))
        .stderr(predicate::str::contains(
            "Conversation length too long. Please keep it under 5 tokens.",
        ));
}

#[test]
fn test_prompt_uses_greeting_from_config_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("arcticchat.toml"),
        "greeting = \"Hello there.\"\n\n[tokenizer]\nkind = \"estimate\"\n",
    )
    .expect("Failed to write config");

    arcticchat_cmd(&dir)
        .args(["prompt", "Is MSG safe?"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "assistant\nHello there.\nuser\nIs MSG safe?\nassistant\n",
        ));
}

#[test]
fn test_config_redacts_token() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("arcticchat.toml"), "[budget]\nceiling = 2048\n")
        .expect("Failed to write config");

    arcticchat_cmd(&dir)
        .env("REPLICATE_API_TOKEN", "r8_verysecretvalue")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ceiling = 2048"))
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("verysecret").not());
}

#[test]
fn test_invalid_config_value_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    arcticchat_cmd(&dir)
        .env("ARCTICCHAT_SAMPLING__TOP_P", "1.5")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sampling.top_p"));
}

#[test]
fn test_chat_requires_token() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    arcticchat_cmd(&dir)
        .args(["--tokenizer", "estimate", "chat"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Replicate API token (set REPLICATE_API_TOKEN)."))
        .stderr(predicate::str::contains("Replicate API token.").not());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_retry_resends_after_failed_stream() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/snowflake/snowflake-arctic-instruct/predictions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/snowflake/snowflake-arctic-instruct/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "p1",
            "urls": { "stream": format!("{}/stream/p1", server.uri()) }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream/p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: output\ndata: Sure.\n\nevent: done\ndata: {}\n\n"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let token = format!("r8_{}", "a".repeat(37));
    arcticchat_cmd(&dir)
        .env("REPLICATE_API_TOKEN", token)
        .env("ARCTICCHAT_REPLICATE__BASE_URL", server.uri())
        .args(["--tokenizer", "estimate", "chat"])
        .write_stdin("hello\n/retry\n/quit\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("The model stream failed"))
        .stdout(predicate::str::contains("Sure."));
}

#[test]
fn test_extract_rejects_unsupported_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("notes.txt"), "just text").expect("Failed to write file");

    arcticchat_cmd(&dir)
        .args(["extract", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported file type"));
}
