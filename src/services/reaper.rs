//! Timeout-driven reaper for sessions abandoned mid-flow.
//!
//! The sweep uses the same guarded CAS path as user actions, so it can never
//! clobber a session that transitioned concurrently: the racing row is
//! skipped and re-examined on the next run. Running the sweep twice with no
//! newly-stale sessions in between terminates nothing the second time.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::machine::{self, SessionAction};
use crate::repositories::store::{SignalStore, TransitionUpdate};
use crate::services::signals;

/// Default age threshold in minutes before a non-terminal session is reaped.
pub const DEFAULT_THRESHOLD_MINUTES: i64 = 2;

/// Default interval in seconds between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 30;

/// What one sweep found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    /// Non-terminal sessions past the age threshold at selection time.
    pub stale: usize,
    /// Sessions actually moved to their failure/expiry terminal status.
    pub terminated: usize,
}

/// Sweeps once: force-terminates every non-terminal session whose phase
/// clock (`started_at`, else `created_at`) is older than `threshold`.
///
/// Per-session failures are non-fatal and independent: the row is logged,
/// skipped, and picked up again on the next scheduled run.
pub async fn reap(store: &dyn SignalStore, threshold: Duration) -> Result<ReapReport> {
    let cutoff = Utc::now() - threshold;
    let stale = store.find_stale(cutoff).await?;
    let mut terminated = 0usize;

    for session in &stale {
        let transition = match machine::apply(
            session,
            session.participant_a_id,
            &SessionAction::Reap,
        ) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Reaper skipping session {}: {}", session.id, e);
                continue;
            }
        };

        let now = Utc::now();
        let mut outcome = transition.outcome;
        if let Some(outcome) = &mut outcome {
            if let Some(started) = session.started_at {
                outcome.duration_secs = Some((now - started).num_seconds());
            }
        }

        let update = TransitionUpdate {
            expected: session.status,
            next: transition.next,
            bind_participant_b: None,
            started_at: None,
            ended_at: Some(now),
            outcome,
        };

        match store.transition_session(session.id, &update).await {
            Ok(Some(updated)) => {
                terminated += 1;
                tracing::info!(
                    "Reaped session {}: {} -> {}",
                    updated.id,
                    session.status.as_str(),
                    updated.status.as_str()
                );
                if let Err(e) = signals::emit_transition(store, &updated, None).await {
                    tracing::warn!(
                        "Failed to emit signals for reaped session {}: {}",
                        updated.id,
                        e
                    );
                }
            }
            // Lost the CAS to a legitimate in-flight action; leave it be.
            Ok(None) => {
                tracing::debug!(
                    "Session {} transitioned concurrently, skipping",
                    session.id
                );
            }
            Err(e) => {
                tracing::warn!("Reaper failed on session {}: {}", session.id, e);
            }
        }
    }

    Ok(ReapReport { stale: stale.len(), terminated })
}

/// Configuration for the background sweep.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Seconds between sweeps.
    pub sweep_interval_seconds: u64,
    /// Age threshold in minutes.
    pub threshold_minutes: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
        }
    }
}

/// Runs the sweep on an interval until the cancellation token fires.
///
/// The current iteration completes before shutdown; a failed sweep is logged
/// and retried on the next tick.
pub async fn run_reaper(
    store: Arc<dyn SignalStore>,
    config: ReaperConfig,
    cancel_token: CancellationToken,
) {
    tracing::info!(
        "Reaper started (every {}s, threshold {}m)",
        config.sweep_interval_seconds,
        config.threshold_minutes
    );

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match reap(store.as_ref(), Duration::minutes(config.threshold_minutes)).await {
                    Ok(report) if report.stale > 0 => {
                        tracing::info!(
                            "Sweep complete: {} stale, {} terminated",
                            report.stale,
                            report.terminated
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Sweep failed: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                tracing::info!("Reaper received shutdown signal, exiting");
                break;
            }
        }
    }
}
