use keychat::config::Config;
use keychat::keys::KeyPool;
use keychat::llm::gemini::{GeminiClient, Outcome};
use keychat::session::{Notice, Reply, Session};
use mockito::{Matcher, Mock, Server, ServerGuard};
use reqwest::Client;
use serde_json::json;
use std::io::Write;
use std::time::{Duration, Instant};

const MODEL: &str = "gemini-test";

fn test_config() -> Config {
    Config {
        backoff_ms: 0,
        fallback_model: "fallback-model".to_string(),
        ..Config::default()
    }
}

fn keys(k: usize) -> KeyPool {
    KeyPool::new((1..=k).map(|i| format!("key-{}", i)).collect()).unwrap()
}

fn session(server: &ServerGuard, pool: KeyPool, model: &str, config: &Config) -> Session {
    let client = GeminiClient::new(Client::new(), &server.url(), Duration::from_secs(5));
    Session::new(client, pool, model.to_string(), config)
}

fn answer(text: &str) -> String {
    json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}, "finishReason": "STOP"}]})
        .to_string()
}

async fn mock_for_key(server: &mut ServerGuard, model: &str, key: &str, status: usize, body: &str) -> Mock {
    server
        .mock("POST", format!("/models/{}:generateContent", model).as_str())
        .match_query(Matcher::UrlEncoded("key".into(), key.into()))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn rotates_past_exhausted_keys_until_one_succeeds() {
    let mut server = Server::new_async().await;
    let k = 3;
    let first = mock_for_key(&mut server, MODEL, "key-1", 429, "{}").await;
    let second = mock_for_key(&mut server, MODEL, "key-2", 429, "{}").await;
    let third = mock_for_key(&mut server, MODEL, "key-3", 200, &answer("hello")).await;

    let config = test_config();
    let mut session = session(&server, keys(k), MODEL, &config);
    let mut notices = Vec::new();
    let reply = session.ask_with("hi", |n| notices.push(n)).await;

    assert_eq!(
        reply,
        Reply::Answer {
            text: "hello".to_string(),
            key: 3
        }
    );
    assert_eq!(session.pool().index(), k - 1);
    assert_eq!(session.conversation().len(), 2);
    assert!(notices.contains(&Notice::Rotated { position: 3, total: 3 }));
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn gives_up_after_twice_the_pool_size() {
    let mut server = Server::new_async().await;
    let k = 3;
    let mock = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(2 * k)
        .create_async()
        .await;

    let config = test_config();
    let mut session = session(&server, keys(k), MODEL, &config);
    let reply = session.ask("hi").await;

    assert_eq!(reply, Reply::Exhausted { attempts: 6 });
    assert!(session.conversation().is_empty());
    // 2k rotations bring the pool back to where it started.
    assert_eq!(session.pool().index(), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_reply_neither_retries_nor_rotates() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"candidates": []}).to_string())
        .expect(1)
        .create_async()
        .await;

    let config = test_config();
    let mut session = session(&server, keys(2), MODEL, &config);
    let reply = session.ask("hi").await;

    assert_eq!(reply, Reply::Empty);
    assert_eq!(session.pool().index(), 0);
    assert!(session.conversation().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_retry_on_the_same_key() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::UrlEncoded("key".into(), "key-1".into()))
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let config = test_config();
    let mut session = session(&server, keys(2), MODEL, &config);
    let mut notices = Vec::new();
    let reply = session.ask_with("hi", |n| notices.push(n)).await;

    assert_eq!(reply, Reply::Exhausted { attempts: 4 });
    assert_eq!(session.pool().index(), 0);
    assert!(notices
        .iter()
        .all(|n| *n == Notice::AttemptFailed { key: 1, outcome: Outcome::ProviderError(503) }));
    failing.assert_async().await;
}

#[tokio::test]
async fn only_the_most_recent_turns_are_sent() {
    let mut server = Server::new_async().await;
    let config = Config {
        max_history: 2,
        ..test_config()
    };

    let warmup = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(answer("a"))
        .expect(2)
        .create_async()
        .await;
    let mut session = session(&server, keys(1), MODEL, &config);
    session.ask("q1").await;
    session.ask("q2").await;
    warmup.assert_async().await;
    warmup.remove_async().await;

    let expected = json!({
        "contents": [
            {"role": "user", "parts": [{"text": "q2"}]},
            {"role": "model", "parts": [{"text": "a"}]},
            {"role": "user", "parts": [{"text": "q3"}]}
        ],
        "generationConfig": {"temperature": 0.7, "maxOutputTokens": 8192, "topP": 0.95, "topK": 40}
    });
    let truncated = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::Any)
        .match_body(Matcher::Json(expected))
        .with_status(200)
        .with_body(answer("a3"))
        .expect(1)
        .create_async()
        .await;

    let reply = session.ask("q3").await;
    assert!(matches!(reply, Reply::Answer { ref text, .. } if text == "a3"));

    let recent = session.conversation().recent(2);
    assert_eq!(recent[0].text, "q3");
    assert_eq!(recent[1].text, "a3");
    assert_eq!(session.conversation().len(), 6);
    truncated.assert_async().await;
}

#[tokio::test]
async fn model_not_found_downgrades_once() {
    let mut server = Server::new_async().await;
    let missing = server
        .mock("POST", "/models/gemini-old:generateContent")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let fallback = mock_for_key(&mut server, "fallback-model", "key-2", 200, &answer("ok")).await;

    let config = test_config();
    let mut session = session(&server, keys(2), "gemini-old", &config);
    let mut notices = Vec::new();
    let reply = session.ask_with("hi", |n| notices.push(n)).await;

    assert!(matches!(reply, Reply::Answer { key: 2, .. }));
    assert_eq!(session.model(), "fallback-model");
    assert!(notices.contains(&Notice::ModelDowngraded {
        from: "gemini-old".to_string(),
        to: "fallback-model".to_string(),
    }));
    fallback.assert_async().await;
    missing.assert_async().await;
    missing.remove_async().await;

    // A second 404 on a manually restored model no longer downgrades.
    session.set_model("gemini-old".to_string());
    let replies_before = session.conversation().len();
    let budget = session.attempt_budget();
    let tail = server
        .mock("POST", "/models/gemini-old:generateContent")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(budget as usize)
        .create_async()
        .await;

    let reply = session.ask("again").await;
    assert_eq!(reply, Reply::Exhausted { attempts: budget });
    assert_eq!(session.model(), "gemini-old");
    assert_eq!(session.conversation().len(), replies_before);
    tail.assert_async().await;
}

#[tokio::test]
async fn timeouts_retry_on_the_same_key() {
    let mut server = Server::new_async().await;
    let slow = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::UrlEncoded("key".into(), "key-1".into()))
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(answer("late").as_bytes())
        })
        .expect_at_least(1)
        .create_async()
        .await;

    let config = test_config();
    let client = GeminiClient::new(Client::new(), &server.url(), Duration::from_millis(300));
    let mut session = Session::new(client, keys(2), MODEL.to_string(), &config);
    let mut notices = Vec::new();
    let reply = session.ask_with("hi", |n| notices.push(n)).await;

    assert_eq!(reply, Reply::Exhausted { attempts: 4 });
    assert_eq!(session.pool().index(), 0);
    assert!(session.conversation().is_empty());
    assert_eq!(notices.len(), 4);
    assert!(notices
        .iter()
        .all(|n| *n == Notice::AttemptFailed { key: 1, outcome: Outcome::TimedOut }));
    slow.assert_async().await;
}

#[tokio::test]
async fn final_failed_attempt_skips_the_backoff() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("/models/{}:generateContent", MODEL).as_str())
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create_async()
        .await;

    let config = Config {
        backoff_ms: 5_000,
        retry_multiplier: 1,
        ..test_config()
    };
    let mut session = session(&server, keys(1), MODEL, &config);
    let started = Instant::now();
    let reply = session.ask("hi").await;

    assert_eq!(reply, Reply::Exhausted { attempts: 1 });
    assert!(started.elapsed() < Duration::from_secs(2));
    mock.assert_async().await;
}
