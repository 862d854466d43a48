mod common;

use std::time::Duration;

use tokio::sync::watch;

use common::{Events, Harness, RecordingNotifier, ScriptedProber};
use sitewatch_core::{CheckResult, ErrorKind, SiteSpec};
use sitewatch_scheduler::{LifecycleConfig, STUCK_CALL_GRACE, SchedulerError};
use sitewatch_state::Store;

const URL: &str = "https://a.test";

fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn single_run_failure_notifies_once_and_sets_key() {
    let h = Harness::new();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down])]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let outcome = lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.report.notified, vec![ErrorKind::Down]);
    assert_eq!(h.prober.calls(URL), 1);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "notify-down");
    assert!(!sent[0].fixed);
    assert_eq!(sent[0].retries, 1);

    assert_eq!(h.store.writes(), vec![format!("set {URL}:down")]);
    assert!(h.store.get(&format!("{URL}:down")).await.unwrap().is_some());
}

#[tokio::test]
async fn repeated_failure_is_suppressed() {
    let h = Harness::new();
    h.prober.script(
        URL,
        vec![
            CheckResult::failing(&[ErrorKind::Down]),
            CheckResult::failing(&[ErrorKind::Down]),
        ],
    );
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();
    let site = SiteSpec::new(URL).with_max_runs(1);

    lifecycle.run(site.clone(), &rx).await.unwrap();
    let outcome = lifecycle.run(site, &rx).await.unwrap();

    assert_eq!(outcome.report.suppressed, vec![ErrorKind::Down]);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.store.writes().len(), 1);
}

#[tokio::test]
async fn recovery_sends_fixed_once_and_clears_key() {
    let h = Harness::new();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down])]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();
    let site = SiteSpec::new(URL).with_max_runs(1);

    lifecycle.run(site.clone(), &rx).await.unwrap();
    h.notifier.clear();

    // Script exhausted: the prober now reports a healthy site.
    let outcome = lifecycle.run(site.clone(), &rx).await.unwrap();
    assert_eq!(outcome.errors, 0);
    assert_eq!(outcome.report.fixed, vec![ErrorKind::Down]);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "notify-down");
    assert!(sent[0].fixed);
    assert!(h.store.get(&format!("{URL}:down")).await.unwrap().is_none());

    // Healthy again: nothing left to resolve.
    h.notifier.clear();
    let outcome = lifecycle.run(site, &rx).await.unwrap();
    assert_eq!(outcome.report.sent(), 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn persistent_failure_retries_up_to_the_default_bound() {
    let h = Harness::new();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Process]); 5]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let outcome = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(h.prober.calls(URL), 3);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "notify-process");
    assert_eq!(sent[0].retries, 3);
    assert_eq!(sent[0].system_logs, 2);
}

#[tokio::test]
async fn failure_then_success_never_notifies() {
    let h = Harness::new();
    h.prober.script(
        URL,
        vec![CheckResult::failing(&[ErrorKind::Down]), CheckResult::healthy()],
    );
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let outcome = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.errors, 0);
    assert!(h.notifier.sent().is_empty());
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn new_incidents_are_sent_before_recoveries() {
    let h = Harness::new();
    h.store.set(&format!("{URL}:down"), "0").await.unwrap();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Process])]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let outcome = lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap();

    assert_eq!(outcome.report.notified, vec![ErrorKind::Process]);
    assert_eq!(outcome.report.fixed, vec![ErrorKind::Down]);

    let notifications: Vec<String> = h
        .events
        .all()
        .into_iter()
        .filter(|e| e.starts_with("notify"))
        .collect();
    assert_eq!(
        notifications,
        vec![
            format!("notify notify-process fixed=false {URL}"),
            format!("notify notify-down fixed=true {URL}"),
        ]
    );
}

#[tokio::test]
async fn one_notification_per_kind_even_with_repeated_errors() {
    let h = Harness::new();
    h.prober.script(
        URL,
        vec![CheckResult::failing(&[
            ErrorKind::Resource,
            ErrorKind::Resource,
            ErrorKind::Down,
        ])],
    );
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap();

    let mut channels: Vec<String> = h.notifier.sent().into_iter().map(|s| s.channel).collect();
    channels.sort();
    assert_eq!(channels, vec!["notify-down", "notify-resource"]);
}

#[tokio::test]
async fn failed_recovery_keeps_the_key() {
    let h = Harness::new();
    h.store.set(&format!("{URL}:down"), "0").await.unwrap();
    h.notifier.set_failing(true);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let outcome = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap();

    assert_eq!(outcome.report.retained, vec![ErrorKind::Down]);
    assert!(h.store.get(&format!("{URL}:down")).await.unwrap().is_some());

    // Next healthy run delivers the recovery.
    h.notifier.set_failing(false);
    let outcome = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap();
    assert_eq!(outcome.report.fixed, vec![ErrorKind::Down]);
    assert!(h.store.get(&format!("{URL}:down")).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_new_incident_delivery_is_not_retried() {
    let h = Harness::new();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down]); 2]);
    h.notifier.set_failing(true);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();
    let site = SiteSpec::new(URL).with_max_runs(1);

    let outcome = lifecycle.run(site.clone(), &rx).await.unwrap();
    assert_eq!(outcome.report.undelivered, vec![ErrorKind::Down]);

    let outcome = lifecycle.run(site, &rx).await.unwrap();
    assert_eq!(outcome.report.suppressed, vec![ErrorKind::Down]);
}

#[tokio::test]
async fn key_write_failure_still_notifies_then_fails() {
    let h = Harness::new();
    h.store.set_failing(true);
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down])]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let err = lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::State(_)));
    assert!(err.is_fatal());
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stuck_prober_is_fatal() {
    let events = Events::default();
    let h = Harness::with_parts(
        ScriptedProber::new(events.clone()).with_delay(Duration::from_secs(120)),
        RecordingNotifier::new(events.clone()),
        events,
    );
    let lifecycle = h.lifecycle(LifecycleConfig {
        probe_timeout: Duration::from_secs(1),
        ..LifecycleConfig::default()
    });
    let (_tx, rx) = running();

    let err = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap_err();

    match err {
        SchedulerError::Timeout { operation, timeout, .. } => {
            assert_eq!(operation, "probe");
            assert_eq!(timeout, Duration::from_secs(1) + STUCK_CALL_GRACE);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_calls_within_grace_complete() {
    let events = Events::default();
    let h = Harness::with_parts(
        ScriptedProber::new(events.clone()).with_delay(Duration::from_secs(3)),
        RecordingNotifier::new(events.clone()).with_delay(Duration::from_secs(3)),
        events,
    );
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down])]);
    let lifecycle = h.lifecycle(LifecycleConfig {
        probe_timeout: Duration::from_secs(1),
        notify_timeout: Duration::from_secs(1),
        ..LifecycleConfig::default()
    });
    let (_tx, rx) = running();

    let outcome = lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap();

    assert_eq!(outcome.report.notified, vec![ErrorKind::Down]);
}

#[tokio::test(start_paused = true)]
async fn stuck_notifier_is_fatal() {
    let events = Events::default();
    let h = Harness::with_parts(
        ScriptedProber::new(events.clone()),
        RecordingNotifier::new(events.clone()).with_delay(Duration::from_secs(120)),
        events,
    );
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Down])]);
    let lifecycle = h.lifecycle(LifecycleConfig {
        notify_timeout: Duration::from_secs(1),
        ..LifecycleConfig::default()
    });
    let (_tx, rx) = running();

    let err = lifecycle
        .run(SiteSpec::new(URL).with_max_runs(1), &rx)
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::Timeout { operation: "notify", .. }));
}

#[tokio::test]
async fn shutdown_cancels_before_probing() {
    let h = Harness::new();
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (tx, rx) = running();
    tx.send(true).unwrap();

    let err = lifecycle.run(SiteSpec::new(URL), &rx).await.unwrap_err();

    assert!(matches!(err, SchedulerError::Cancelled(_)));
    assert!(!err.is_fatal());
    assert_eq!(h.prober.calls(URL), 0);
}

#[tokio::test]
async fn ignore_list_prevents_notification() {
    let h = Harness::new();
    h.prober.script(URL, vec![CheckResult::failing(&[ErrorKind::Resource])]);
    let lifecycle = h.lifecycle(LifecycleConfig::default());
    let (_tx, rx) = running();

    let mut site = SiteSpec::new(URL).with_max_runs(1);
    site.ignore = vec!["resource error".to_string()];
    let outcome = lifecycle.run(site, &rx).await.unwrap();

    assert_eq!(outcome.errors, 0);
    assert!(h.notifier.sent().is_empty());
}
