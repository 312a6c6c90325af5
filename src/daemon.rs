//! The agent's main loop.
//!
//! Runs the update check once, sends an initial report, then reports on a
//! fixed interval until Ctrl+C. Collection and reporting are blocking and run
//! on tokio's blocking pool.

use crate::collector;
use crate::config::{AgentConfig, UpdateConfig};
use crate::error::Result;
use crate::reporter::Reporter;
use crate::update::{UpdateOutcome, Updater};
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};

/// Run the daemon until interrupted.
///
/// # Errors
///
/// Returns an error if the configuration is invalid. Update and report
/// failures are logged and never end the loop.
pub async fn run(config: AgentConfig) -> Result<()> {
    config.validate()?;

    tracing::info!(
        version = %config.update.running_version,
        instance = %config.instance,
        interval_minutes = config.interval_minutes,
        skip_updates = config.skip_updates,
        "starting uppi agent"
    );

    if !config.skip_updates {
        check_for_updates(config.update.clone()).await;
    }

    let reporter = Arc::new(Reporter::new(&config));
    if report_once(&reporter).await {
        tracing::info!("initial metrics sent successfully");
    }

    let mut tick = interval(config.interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial report covers it.
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if report_once(&reporter).await {
                    tracing::info!("metrics sent successfully");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Run one update check on the blocking pool and log how it ended.
pub async fn check_for_updates(config: UpdateConfig) -> Option<UpdateOutcome> {
    let joined = tokio::task::spawn_blocking(move || {
        Updater::new(config).map(|updater| updater.check_and_apply())
    })
    .await;

    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "cannot set up update check");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "update check did not complete");
            return None;
        }
    };

    match &outcome {
        UpdateOutcome::Critical(e) => {
            tracing::error!(
                critical = true,
                error = %e,
                "update left the agent binary in an unknown state, operator attention required"
            );
        }
        UpdateOutcome::Applied { version, restart, .. } => {
            tracing::info!(%version, ?restart, "update applied");
        }
        other => tracing::debug!(outcome = ?other, "update check finished"),
    }
    Some(outcome)
}

/// Collect and send one snapshot. Returns `true` on success.
async fn report_once(reporter: &Arc<Reporter>) -> bool {
    let reporter = Arc::clone(reporter);
    let joined = tokio::task::spawn_blocking(move || {
        let metrics = collector::collect();
        reporter.send(&metrics)
    })
    .await;

    match joined {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to send metrics");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "metric report task did not complete");
            false
        }
    }
}
