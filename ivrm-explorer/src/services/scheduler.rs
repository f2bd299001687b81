//! Reconciliation scheduler
//!
//! One tokio task per periodic pass plus `dispatch_workers` dispatch tasks.
//! Every task stops at the next tick boundary once the cancellation token
//! fires; a pass that is already running is allowed to finish.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ivrm_common::Result;

use crate::config::ScheduleConfig;
use crate::services::reconciliation::{
    run_backfill_pass, run_convergence_pass, run_digit_map_pass, run_dispatch_pass,
    run_seed_pass, run_stalled_pass, run_summary_pass, run_tree_seed_pass, PassContext,
};

pub struct Scheduler {
    ctx: PassContext,
    schedule: ScheduleConfig,
    last_error: Arc<RwLock<Option<String>>>,
}

impl Scheduler {
    pub fn new(
        ctx: PassContext,
        schedule: ScheduleConfig,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            ctx,
            schedule,
            last_error,
        }
    }

    /// Start every pass; the returned set completes after cancellation
    pub fn spawn(self, cancel: CancellationToken) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        let s = &self.schedule;

        for worker in 0..s.dispatch_workers {
            tracing::debug!(worker, "Starting dispatch worker");
            self.spawn_pass(&mut tasks, "dispatch", s.dispatch_secs, &cancel, |ctx| async move {
                run_dispatch_pass(&ctx).await
            });
        }
        self.spawn_pass(&mut tasks, "seed", s.seed_secs, &cancel, |ctx| async move {
            run_seed_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "backfill", s.backfill_secs, &cancel, |ctx| async move {
            run_backfill_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "tree_seed", s.tree_seed_secs, &cancel, |ctx| async move {
            run_tree_seed_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "stalled", s.stalled_secs, &cancel, |ctx| async move {
            run_stalled_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "digit_map", s.digit_map_secs, &cancel, |ctx| async move {
            run_digit_map_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "summary", s.summary_secs, &cancel, |ctx| async move {
            run_summary_pass(&ctx).await
        });
        self.spawn_pass(&mut tasks, "convergence", s.convergence_secs, &cancel, |ctx| async move {
            run_convergence_pass(&ctx).await
        });

        tracing::info!(
            passes = tasks.len(),
            dispatch_workers = s.dispatch_workers,
            "Reconciliation scheduler started"
        );
        tasks
    }

    fn spawn_pass<F, Fut, T>(
        &self,
        tasks: &mut JoinSet<()>,
        name: &'static str,
        period_secs: u64,
        cancel: &CancellationToken,
        pass: F,
    ) where
        F: Fn(PassContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Debug + Send + 'static,
    {
        let ctx = self.ctx.clone();
        let cancel = cancel.clone();
        let last_error = Arc::clone(&self.last_error);
        let period = Duration::from_secs(period_secs);

        tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match pass(ctx.clone()).await {
                    Ok(report) => tracing::debug!(pass = name, ?report, "Pass finished"),
                    Err(e) => {
                        tracing::error!(pass = name, error = %e, "Pass failed");
                        *last_error.write().await = Some(format!("{} pass: {}", name, e));
                    }
                }
            }

            tracing::debug!(pass = name, "Pass stopped");
        });
    }
}
