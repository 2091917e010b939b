//! Poll loop controller: probes a job until it reaches a terminal state, the
//! wait budget runs out, the prober fails for good, or the caller cancels.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::StatusProber;
use crate::error::{ConfigError, PollError, ProbeError};
use crate::task::{Job, PollOutcome, StatusSnapshot, TaskState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Pause between two probes of a job that is still running.
    pub check_interval_secs: u64,
    /// Overall budget measured from the first probe.
    pub max_wait_secs: u64,
    /// Consecutive transient probe failures tolerated before giving up.
    pub max_transient_errors: u32,
    /// Upper bound for the back-off applied after transient failures.
    pub max_backoff_secs: u64,
    /// Log every probe at info level instead of debug.
    pub verbose: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            max_wait_secs: 1800,
            max_transient_errors: 5,
            max_backoff_secs: 60,
            verbose: true,
        }
    }
}

impl PollSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    /// Delay after the `failures`-th consecutive transient error: the check
    /// interval doubled per failure, capped at `max_backoff_secs`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let secs = self
            .check_interval_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_secs.max(self.check_interval_secs));
        Duration::from_secs(secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.check_interval_secs",
                message: "must be greater than zero".into(),
            });
        }
        if self.max_wait_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.max_wait_secs",
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

fn report(settings: &PollSettings, job: &Job, snapshot: &StatusSnapshot, probe: u32) {
    let detail = snapshot.message.as_deref().unwrap_or("");
    if settings.verbose {
        info!(task_id = %job.id, probe, state = %snapshot.state, detail, "task status");
    } else {
        debug!(task_id = %job.id, probe, state = %snapshot.state, detail, "task status");
    }
}

/// Drives `prober` until `job` finishes.
///
/// Returns `Ok` for every outcome the job itself decides (succeeded, failed)
/// and for budget exhaustion or cancellation. Returns `Err` only when probing
/// cannot continue: a fatal probe error, or more than
/// `max_transient_errors` transient ones in a row.
pub async fn wait_for_completion<P>(
    prober: &P,
    job: &Job,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome, PollError>
where
    P: StatusProber + ?Sized,
{
    let started = Instant::now();
    let max_wait = settings.max_wait();
    let mut last: Option<StatusSnapshot> = None;
    let mut consecutive_failures = 0u32;
    let mut probes = 0u32;

    info!(task_id = %job.id, operation = %job.kind, "monitoring task");

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled {
                elapsed: started.elapsed(),
                last_snapshot: last,
            });
        }

        probes += 1;
        let probed = tokio::select! {
            _ = cancel.cancelled() => {
                info!(task_id = %job.id, "monitoring cancelled during status check");
                return Ok(PollOutcome::Cancelled {
                    elapsed: started.elapsed(),
                    last_snapshot: last,
                });
            }
            probed = prober.probe(job) => probed,
        };
        let delay = match probed {
            Ok(snapshot) => {
                consecutive_failures = 0;
                report(settings, job, &snapshot, probes);

                if let Some(prev) = &last {
                    if snapshot.state.rank() < prev.state.rank() {
                        warn!(
                            task_id = %job.id,
                            from = %prev.state,
                            to = %snapshot.state,
                            "task state moved backwards"
                        );
                    }
                }

                match snapshot.state {
                    TaskState::Succeeded => {
                        if snapshot.artifacts.is_empty() {
                            warn!(task_id = %job.id, "task succeeded without any videos");
                        }
                        return Ok(PollOutcome::Succeeded {
                            snapshot,
                            elapsed: started.elapsed(),
                        });
                    }
                    TaskState::Failed => {
                        let reason = snapshot
                            .message
                            .clone()
                            .unwrap_or_else(|| "unknown failure".to_string());
                        return Ok(PollOutcome::Failed {
                            reason,
                            snapshot,
                            elapsed: started.elapsed(),
                        });
                    }
                    TaskState::Submitted | TaskState::Processing => {
                        last = Some(snapshot);
                        settings.check_interval()
                    }
                }
            }
            Err(err @ ProbeError::Fatal(_)) => {
                warn!(task_id = %job.id, error = %err, "aborting poll");
                return Err(PollError::Fatal {
                    task_id: job.id.clone(),
                    source: err,
                    elapsed: started.elapsed(),
                    last_snapshot: last,
                });
            }
            Err(ProbeError::Transient(reason)) => {
                consecutive_failures += 1;
                if consecutive_failures > settings.max_transient_errors {
                    return Err(PollError::TransientRetriesExhausted {
                        task_id: job.id.clone(),
                        attempts: consecutive_failures,
                        last_error: reason,
                        elapsed: started.elapsed(),
                        last_snapshot: last,
                    });
                }
                let delay = settings.backoff(consecutive_failures);
                warn!(
                    task_id = %job.id,
                    attempt = consecutive_failures,
                    retry_in_secs = delay.as_secs(),
                    error = %reason,
                    "status check failed"
                );
                delay
            }
        };

        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            warn!(task_id = %job.id, elapsed_secs = elapsed.as_secs(), "timed out");
            return Ok(PollOutcome::TimedOut {
                elapsed,
                last_snapshot: last,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(task_id = %job.id, "monitoring cancelled");
                return Ok(PollOutcome::Cancelled {
                    elapsed: started.elapsed(),
                    last_snapshot: last,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ArtifactRef, OperationKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed script; once exhausted keeps reporting `processing`.
    struct ScriptedProber {
        script: Mutex<VecDeque<Result<StatusSnapshot, ProbeError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProber {
        fn new(script: Vec<Result<StatusSnapshot, ProbeError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusProber for ScriptedProber {
        async fn probe(&self, job: &Job) -> Result<StatusSnapshot, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusSnapshot::new(&job.id, TaskState::Processing)))
        }
    }

    fn job() -> Job {
        Job::new("task-1", OperationKind::Creation)
    }

    fn snap(state: TaskState) -> Result<StatusSnapshot, ProbeError> {
        Ok(StatusSnapshot::new("task-1", state))
    }

    fn settings(interval: u64, max_wait: u64) -> PollSettings {
        PollSettings {
            check_interval_secs: interval,
            max_wait_secs: max_wait,
            verbose: false,
            ..PollSettings::default()
        }
    }

    fn artifact() -> ArtifactRef {
        ArtifactRef {
            id: "v1".into(),
            url: "https://cdn.example/v1.mp4".into(),
            duration: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probes_until_success_and_returns_final_artifacts() {
        let k = 3;
        let mut script: Vec<_> = (0..k).map(|_| snap(TaskState::Processing)).collect();
        script.push(Ok(StatusSnapshot::new("task-1", TaskState::Succeeded)
            .with_artifacts(vec![artifact()])));
        let prober = ScriptedProber::new(script);

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(prober.calls(), k + 1);
        assert_eq!(outcome.artifacts(), &[artifact()]);
        assert_eq!(outcome.elapsed(), Duration::from_secs(5 * k as u64));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval_of_the_budget() {
        for (interval, budget) in [(5, 30), (7, 30), (10, 10), (4, 9)] {
            let prober = ScriptedProber::new(vec![]);
            let outcome = wait_for_completion(
                &prober,
                &job(),
                &settings(interval, budget),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            match outcome {
                PollOutcome::TimedOut { elapsed, last_snapshot } => {
                    let t = Duration::from_secs(budget);
                    let i = Duration::from_secs(interval);
                    assert!(elapsed >= t, "{elapsed:?} < {t:?}");
                    assert!(elapsed < t + i, "{elapsed:?} >= {t:?} + {i:?}");
                    assert_eq!(last_snapshot.unwrap().state, TaskState::Processing);
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_on_first_probe_aborts_without_sleeping() {
        let prober = ScriptedProber::new(vec![Err(ProbeError::Fatal("task not found".into()))]);
        let before = Instant::now();

        let err = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Fatal { .. }));
        assert_eq!(prober.calls(), 1);
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_keeps_the_last_seen_snapshot() {
        let prober = ScriptedProber::new(vec![
            snap(TaskState::Processing),
            Err(ProbeError::Fatal("credentials revoked".into())),
        ]);

        let err = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PollError::Fatal {
                elapsed,
                last_snapshot,
                ..
            } => {
                assert_eq!(elapsed, Duration::from_secs(5));
                assert_eq!(last_snapshot.unwrap().state, TaskState::Processing);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_is_terminal_and_keeps_reason() {
        let prober = ScriptedProber::new(vec![
            snap(TaskState::Submitted),
            Ok(StatusSnapshot::new("task-1", TaskState::Failed).with_message("content policy")),
        ]);

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(prober.calls(), 2);
        match outcome {
            PollOutcome::Failed { reason, .. } => assert_eq!(reason, "content policy"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_wins_over_attached_message() {
        let prober = ScriptedProber::new(vec![Ok(StatusSnapshot::new("task-1", TaskState::Succeeded)
            .with_artifacts(vec![artifact()])
            .with_message("upstream warning"))]);

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            PollOutcome::Succeeded { snapshot, .. } => {
                assert_eq!(snapshot.message.as_deref(), Some("upstream warning"));
                assert_eq!(snapshot.artifacts.len(), 1);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_with_backoff() {
        let prober = ScriptedProber::new(vec![
            Err(ProbeError::Transient("502".into())),
            Err(ProbeError::Transient("502".into())),
            Ok(StatusSnapshot::new("task-1", TaskState::Succeeded).with_artifacts(vec![artifact()])),
        ]);

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(prober.calls(), 3);
        // 5s after the first failure, 10s after the second.
        assert_eq!(outcome.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_consecutive_transient_errors_escalate() {
        let script = (0..10)
            .map(|_| Err(ProbeError::Transient("connection reset".into())))
            .collect();
        let prober = ScriptedProber::new(script);
        let cfg = PollSettings {
            max_transient_errors: 2,
            ..settings(1, 600)
        };

        let err = wait_for_completion(&prober, &job(), &cfg, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PollError::TransientRetriesExhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_transient_error_count() {
        let transient = || Err(ProbeError::Transient("timeout".into()));
        let prober = ScriptedProber::new(vec![
            transient(),
            transient(),
            snap(TaskState::Processing),
            transient(),
            transient(),
            Ok(StatusSnapshot::new("task-1", TaskState::Succeeded)),
        ]);
        let cfg = PollSettings {
            max_transient_errors: 2,
            ..settings(1, 600)
        };

        let outcome = wait_for_completion(&prober, &job(), &cfg, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(prober.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_between_probes_stops_the_loop() {
        let prober = ScriptedProber::new(vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &cancel)
            .await
            .unwrap();

        match outcome {
            PollOutcome::Cancelled { elapsed, last_snapshot } => {
                assert_eq!(elapsed, Duration::from_secs(12));
                assert!(last_snapshot.is_some());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(prober.calls(), 3);
    }

    /// Never answers within any reasonable time.
    struct StalledProber {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StatusProber for StalledProber {
        async fn probe(&self, job: &Job) -> Result<StatusSnapshot, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(StatusSnapshot::new(&job.id, TaskState::Processing))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_status_check_in_flight() {
        let prober = StalledProber {
            calls: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &cancel)
            .await
            .unwrap();

        match outcome {
            PollOutcome::Cancelled { elapsed, last_snapshot } => {
                assert_eq!(elapsed, Duration::from_secs(3));
                assert!(last_snapshot.is_none());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_skips_probing() {
        let prober = ScriptedProber::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = wait_for_completion(&prober, &job(), &settings(5, 600), &cancel)
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
        assert_eq!(prober.calls(), 0);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let cfg = PollSettings {
            check_interval_secs: 5,
            max_backoff_secs: 30,
            ..PollSettings::default()
        };
        let delays: Vec<u64> = (1..=5).map(|n| cfg.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);
    }
}
