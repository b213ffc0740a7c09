mod common;

use codeflow::config::TimeoutConfig;
use codeflow::error::{PipelineError, Stage};
use codeflow::quota::{InMemoryQuotaStore, StoreCall};
use codeflow::GenerationRequest;
use common::{fixture, fixture_with_timeouts, ScriptedCompletion, DOCUMENT, FENCED_DOCUMENT};
use std::time::Duration;

fn request(code: &str, gmail: &str) -> GenerationRequest {
    GenerationRequest::new(code, gmail).unwrap()
}

#[tokio::test]
async fn test_subscribed_account_is_debited_once() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(FENCED_DOCUMENT),
    );
    let code = "def add(a, b):\n    return a + b\n";

    let result = f.orchestrator.handle(request(code, "a@x.com")).await.unwrap();

    assert_eq!(result.document, DOCUMENT);
    assert_eq!(result.code_length, code.chars().count());
    assert_eq!(f.store.turns("a@x.com"), Some(2));
    assert_eq!(f.completion.calls(), 1);
    assert!(f.completion.prompts()[0].contains(code));
}

#[tokio::test]
async fn test_code_length_counts_characters() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 1),
        ScriptedCompletion::always(DOCUMENT),
    );
    let code = "// ÜBER façade\nlet π = 3.14;";

    let result = f.orchestrator.handle(request(code, "a@x.com")).await.unwrap();
    assert_eq!(result.code_length, code.chars().count());
    assert_ne!(result.code_length, code.len());
}

#[tokio::test]
async fn test_zero_turns_is_not_subscribed() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("b@x.com", 0),
        ScriptedCompletion::always(DOCUMENT),
    );

    let err = f
        .orchestrator
        .handle(request("x = 1", "b@x.com"))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::NotSubscribed);
    assert_eq!(f.store.turns("b@x.com"), Some(0));
    assert_eq!(f.completion.calls(), 0);
    assert_eq!(
        f.store.calls(),
        vec![StoreCall::Fetch {
            identity: "b@x.com".to_string()
        }]
    );
}

#[tokio::test]
async fn test_unknown_account_is_not_subscribed() {
    let f = fixture(InMemoryQuotaStore::recording(), ScriptedCompletion::always(DOCUMENT));

    let err = f
        .orchestrator
        .handle(request("x = 1", "ghost@x.com"))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::NotSubscribed);
    assert_eq!(f.completion.calls(), 0);
}

#[tokio::test]
async fn test_store_outage_reads_as_not_subscribed() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 5),
        ScriptedCompletion::always(DOCUMENT),
    );
    f.store.fail_fetches(true);

    let err = f
        .orchestrator
        .handle(request("x = 1", "a@x.com"))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::NotSubscribed);
    assert_eq!(f.completion.calls(), 0);
}

#[tokio::test]
async fn test_eleventh_request_in_window_is_rejected() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("c@x.com", 100),
        ScriptedCompletion::always(DOCUMENT),
    );

    for i in 0..10 {
        let result = f.orchestrator.handle(request("x = 1", "c@x.com")).await;
        assert!(result.is_ok(), "request {} should succeed", i + 1);
    }
    let calls_before = f.store.calls().len();

    let err = f
        .orchestrator
        .handle(request("x = 1", "c@x.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));
    assert_eq!(f.store.calls().len(), calls_before);
    assert_eq!(f.store.turns("c@x.com"), Some(90));
    assert_eq!(f.completion.calls(), 10);
}

#[tokio::test]
async fn test_blocked_identity_admitted_after_window() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("c@x.com", 100),
        ScriptedCompletion::always(DOCUMENT),
    );

    for _ in 0..10 {
        f.orchestrator.handle(request("x", "c@x.com")).await.unwrap();
    }
    assert!(f.orchestrator.handle(request("x", "c@x.com")).await.is_err());

    f.clock.advance(Duration::from_millis(60_001));

    assert!(f.orchestrator.handle(request("x", "c@x.com")).await.is_ok());
}

#[tokio::test]
async fn test_rate_limit_is_per_identity() {
    let f = fixture(
        InMemoryQuotaStore::recording()
            .with_turns("c@x.com", 100)
            .with_turns("d@x.com", 100),
        ScriptedCompletion::always(DOCUMENT),
    );

    for _ in 0..10 {
        f.orchestrator.handle(request("x", "c@x.com")).await.unwrap();
    }

    assert!(f.orchestrator.handle(request("x", "d@x.com")).await.is_ok());
}

#[tokio::test]
async fn test_blank_code_counts_against_window_but_touches_nothing() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
    );

    for _ in 0..10 {
        let err = f
            .orchestrator
            .handle(request(" \t\n", "a@x.com"))
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::EmptyInput);
    }

    assert!(f.store.calls().is_empty());
    assert_eq!(f.completion.calls(), 0);

    let err = f
        .orchestrator
        .handle(request("x = 1", "a@x.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));
}

#[tokio::test]
async fn test_failed_generation_keeps_turns() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT).then_fail(),
    );

    let err = f
        .orchestrator
        .handle(request("x = 1", "a@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::GenerationFailed);
    assert!(!err.to_string().contains("internal model error"));
    assert_eq!(f.store.turns("a@x.com"), Some(3));

    // Next attempt succeeds and is billed
    f.orchestrator.handle(request("x = 1", "a@x.com")).await.unwrap();
    assert_eq!(f.store.turns("a@x.com"), Some(2));
}

#[tokio::test]
async fn test_failed_debit_withholds_document() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
    );
    f.store.fail_writes(true);

    let err = f
        .orchestrator
        .handle(request("x = 1", "a@x.com"))
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::QuotaUpdateFailed);
    assert_eq!(f.completion.calls(), 1);
    assert_eq!(f.store.turns("a@x.com"), Some(3));
}

#[tokio::test]
async fn test_store_down_at_debit_withholds_document() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
    );
    let store = f.store.clone();
    f.completion.on_call(move || store.fail_fetches(true));

    let result = f.orchestrator.handle(request("x = 1", "a@x.com")).await;

    assert_eq!(result.unwrap_err(), PipelineError::QuotaFetchFailed);
    assert_eq!(f.completion.calls(), 1);
    assert_eq!(f.store.turns("a@x.com"), Some(3));
    assert!(!f
        .store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::Write { .. })));
}

#[tokio::test]
async fn test_row_gone_at_debit_withholds_document() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
    );
    let store = f.store.clone();
    f.completion.on_call(move || store.remove("a@x.com"));

    let result = f.orchestrator.handle(request("x = 1", "a@x.com")).await;

    assert_eq!(result.unwrap_err(), PipelineError::QuotaFetchFailed);
    assert_eq!(f.completion.calls(), 1);
    assert_eq!(f.store.turns("a@x.com"), None);
}

#[tokio::test]
async fn test_debit_timeout_withholds_document() {
    let timeouts = TimeoutConfig {
        store_secs: 1,
        ..TimeoutConfig::default()
    };
    let f = fixture_with_timeouts(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
        timeouts,
    );
    let store = f.store.clone();
    f.completion
        .on_call(move || store.set_delay(Some(Duration::from_secs(3))));

    let result = f.orchestrator.handle(request("x = 1", "a@x.com")).await;

    assert_eq!(
        result.unwrap_err(),
        PipelineError::Timeout {
            stage: Stage::QuotaDebit,
            elapsed: Duration::from_secs(1),
        }
    );
    assert_eq!(f.completion.calls(), 1);
    assert_eq!(f.store.turns("a@x.com"), Some(3));
}

#[tokio::test]
async fn test_last_turn_spent_once() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 1),
        ScriptedCompletion::always(DOCUMENT),
    );

    assert!(f.orchestrator.handle(request("x", "a@x.com")).await.is_ok());
    assert_eq!(f.store.turns("a@x.com"), Some(0));

    let err = f
        .orchestrator
        .handle(request("x", "a@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::NotSubscribed);
    assert_eq!(f.completion.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_overdraw() {
    let f = fixture(
        InMemoryQuotaStore::recording().with_turns("a@x.com", 3),
        ScriptedCompletion::always(DOCUMENT),
    );

    let calls = (0..8).map(|_| {
        let orchestrator = f.orchestrator.clone();
        tokio::spawn(async move { orchestrator.handle(request("x = 1", "a@x.com")).await })
    });
    let results = futures::future::join_all(calls).await;

    let successes = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 3);
    assert_eq!(f.store.turns("a@x.com"), Some(0));
}
