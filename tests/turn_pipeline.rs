//! End-to-end turn passes against a stubbed Replicate API.
//!
//! The session, budget guard and HTTP client are the real ones; only the
//! remote endpoints and the tokenizer vocabulary are replaced.

use std::sync::Arc;
use std::time::Duration;

use arcticchat::budget::{BudgetConfig, BudgetGuard, TokenCounter, TokenizerError};
use arcticchat::completion::ReplicateClient;
use arcticchat::conversation::{Role, TurnFormatter};
use arcticchat::error::ChatError;
use arcticchat::session::{ChatSession, SessionConfig, TurnEvent};
use arcticchat::timeout::TimeoutConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREDICTIONS_PATH: &str = "/models/snowflake/snowflake-arctic-instruct/predictions";

/// One token per whitespace-separated word.
struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(text.split_whitespace().count())
    }

    fn name(&self) -> &str {
        "words"
    }
}

fn guard(ceiling: usize) -> BudgetGuard {
    BudgetGuard::new(BudgetConfig::new().with_ceiling(ceiling), Arc::new(WordCounter))
}

fn session() -> ChatSession {
    ChatSession::new(SessionConfig::new().with_greeting("Hi, ask me anything."))
}

async fn mount_prediction(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(PREDICTIONS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "p1",
            "urls": { "stream": format!("{}/stream/p1", server.uri()) }
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_stream(server: &MockServer, body: impl Into<String>) {
    let body: String = body.into();
    Mock::given(method("GET"))
        .and(path("/stream/p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> ReplicateClient {
    ReplicateClient::new("r8_test").with_base_url(server.uri())
}

#[tokio::test]
async fn test_admitted_turn_streams_and_commits() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        "event: output\ndata: It does:\n\nevent: output\ndata:  E951.\n\nevent: done\ndata: {}\n\n",
    )
    .await;

    let mut session = session();
    session.submit_user("Does this contain aspartame?").unwrap();
    let prompt = TurnFormatter::format(session.history());
    assert_eq!(
        prompt.as_str(),
        "assistant\nHi, ask me anything.\nuser\nDoes this contain aspartame?\nassistant\n"
    );

    Mock::given(method("POST"))
        .and(path(PREDICTIONS_PATH))
        .and(body_partial_json(serde_json::json!({
            "input": {
                "prompt": prompt.as_str(),
                "prompt_template": "{prompt}",
                "temperature": 0.3,
                "top_p": 0.9
            },
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "p1",
            "urls": { "stream": format!("{}/stream/p1", server.uri()) }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let turn = session
        .respond(&guard(3072), &client(&server), &CancellationToken::new(), Some(&tx))
        .await
        .unwrap()
        .unwrap();
    drop(tx);

    assert_eq!(turn.role(), Role::Assistant);
    assert_eq!(turn.content(), "It does: E951.");
    assert_eq!(session.history().len(), 3);

    let mut fragments = Vec::new();
    while let Some(event) = rx.recv().await {
        if let TurnEvent::Fragment(text) = event {
            fragments.push(text);
        }
    }
    assert_eq!(fragments, vec!["It does:", " E951."]);
}

#[tokio::test]
async fn test_rejected_turn_never_reaches_the_api() {
    let server = MockServer::start().await;
    mount_prediction(&server, 0).await;

    let mut session = session();
    // 4 greeting words + 2 tags + "assistant" + 3 = 10 tokens
    session.submit_user("one two three").unwrap();

    let err = session
        .respond(&guard(10), &client(&server), &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::BudgetExceeded(_)));
    assert!(err.offers_reset());
    assert_eq!(
        err.to_string(),
        "Conversation length too long. Please keep it under 10 tokens."
    );
}

#[tokio::test]
async fn test_one_below_ceiling_is_sent() {
    let server = MockServer::start().await;
    mount_prediction(&server, 1).await;
    mount_stream(&server, "event: output\ndata: ok\n\nevent: done\ndata: {}\n\n").await;

    let mut session = session();
    session.submit_user("one two three").unwrap();

    let turn = session
        .respond(&guard(11), &client(&server), &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(turn.map(|t| t.content().to_string()), Some("ok".to_string()));
}

#[tokio::test]
async fn test_failure_after_two_fragments_discards_reply() {
    let server = MockServer::start().await;
    mount_prediction(&server, 1).await;
    mount_stream(
        &server,
        "event: output\ndata: Aspartame\n\nevent: output\ndata:  is\n\nevent: error\ndata: {\"detail\":\"GPU fell over\"}\n\n",
    )
    .await;

    let mut session = session();
    session.submit_user("Is aspartame banned?").unwrap();

    let err = session
        .respond(&guard(3072), &client(&server), &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "remote_stream_failure");
    assert!(err.to_string().contains("GPU fell over"));
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history().last().role(), Role::User);

    // Retrying is allowed: the user turn is still waiting for a reply
    assert!(session.needs_response());
}

#[tokio::test]
async fn test_cleared_chat_starts_from_greeting() {
    let server = MockServer::start().await;
    mount_prediction(&server, 1).await;
    mount_stream(&server, "event: output\ndata: Sure.\n\nevent: done\ndata: {}\n\n").await;

    let mut session = session();
    session.submit_user("hello").unwrap();
    session
        .respond(&guard(3072), &client(&server), &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(session.history().len(), 3);

    session.reset();
    assert_eq!(
        TurnFormatter::format(session.history()).as_str(),
        "assistant\nHi, ask me anything.\nassistant\n"
    );
}

#[tokio::test]
async fn test_long_reply_commits_while_events_go_unread() {
    let server = MockServer::start().await;
    mount_prediction(&server, 1).await;
    let mut body = "event: output\ndata: word\n\n".repeat(20);
    body.push_str("event: done\ndata: {}\n\n");
    mount_stream(&server, body).await;

    let timeouts = TimeoutConfig::new().with_turn_timeout(Duration::from_secs(1));
    let mut session = ChatSession::new(
        SessionConfig::new()
            .with_greeting("Hi, ask me anything.")
            .with_timeouts(timeouts),
    );
    session.submit_user("List the additives.").unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        session.respond(&guard(3072), &client(&server), &CancellationToken::new(), Some(&tx)),
    )
    .await
    .expect("turn pass returned");

    let turn = outcome.unwrap().unwrap();
    assert_eq!(turn.content(), "word".repeat(20));
    assert_eq!(session.history().len(), 3);
}
