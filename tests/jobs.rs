//! Job Backend Integration Tests
//!
//! Retries, per-attempt reporting and settlement of inline jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actionkit::cli::demo::flaky_action;
use actionkit::{
    values, ActionDef, ActionError, Flow, InlineBackend, JobBackend, Outcome, ReportContext,
    ReportMode, RetryPolicy, Settings,
};
use serde_json::json;

/// Settings whose reporter records the attempt of every report
fn recording_settings(mode: ReportMode) -> (Arc<Settings>, Arc<Mutex<Vec<u32>>>) {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let settings = Settings::default()
        .with_default_report_mode(mode)
        .with_reporter(
            move |_: &ActionError, ctx: &ReportContext<'_>| -> anyhow::Result<()> {
                let attempt = ctx.retry.map(|r| r.attempt()).unwrap_or(0);
                sink.lock().unwrap().push(attempt);
                Ok(())
            },
        );
    (Arc::new(settings), reported)
}

#[tokio::test]
async fn test_job_retries_until_success() {
    let (settings, reported) = recording_settings(ReportMode::FirstAndExhausted);
    let backend = InlineBackend::new(RetryPolicy::immediate(3)).with_settings(settings);
    let action = flaky_action(2).unwrap();

    let report = backend.perform(&action, values(json!({}))).await;

    assert_eq!(report.attempt_count(), 3);
    assert!(report.result.ok());
    assert_eq!(report.result.get("attempt").unwrap(), &json!(3));

    let outcomes: Vec<Outcome> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![Outcome::ExceptionRaised, Outcome::ExceptionRaised, Outcome::Success]
    );
    assert!(report.attempts[0].reported);
    assert!(!report.attempts[1].reported);
    assert_eq!(*reported.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_exhausted_job_reports_last_attempt() {
    let (settings, reported) = recording_settings(ReportMode::FirstAndExhausted);
    let backend = InlineBackend::new(RetryPolicy::immediate(2)).with_settings(settings);
    let action = flaky_action(10).unwrap();

    let report = backend.perform(&action, values(json!({}))).await;

    assert_eq!(report.attempt_count(), 3);
    assert_eq!(report.result.outcome(), Outcome::ExceptionRaised);
    assert_eq!(*reported.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn test_only_exhausted_stays_quiet_when_retry_succeeds() {
    let (settings, reported) = recording_settings(ReportMode::OnlyExhausted);
    let backend = InlineBackend::new(RetryPolicy::immediate(3)).with_settings(settings);
    let action = flaky_action(1).unwrap();

    let report = backend.perform(&action, values(json!({}))).await;

    assert!(report.result.ok());
    assert!(reported.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_business_failure_is_not_retried() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = {
        let runs = runs.clone();
        ActionDef::builder("Declined")
            .work(move |ctx| {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(ctx.fail("Card declined"))
            })
            .build()
            .unwrap()
    };
    let backend = InlineBackend::new(RetryPolicy::immediate(5))
        .with_settings(Arc::new(Settings::default()));

    let report = backend.perform(&action, values(json!({}))).await;

    assert_eq!(report.attempt_count(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(report.result.error(), Some("Card declined"));
}

#[test]
fn test_retry_records_carry_job_id() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let action = {
        let seen = seen.clone();
        ActionDef::builder("Recorder")
            .work(move |ctx| {
                let record = ctx.retry().cloned();
                seen.lock().unwrap().push(record);
                Ok(Flow::Continue)
            })
            .build()
            .unwrap()
    };
    let backend = InlineBackend::new(RetryPolicy::immediate(1))
        .with_settings(Arc::new(Settings::default()));

    let report = tokio_test::block_on(backend.perform(&action, values(json!({}))));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let record = seen[0].as_ref().unwrap();
    assert_eq!(record.adapter(), "inline");
    assert_eq!(record.attempt(), 1);
    assert_eq!(record.max_retries(), 1);
    assert_eq!(record.job_id(), Some(report.job_id.to_string().as_str()));
}
