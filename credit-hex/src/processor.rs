//! Overdue payment processor.
//!
//! Sweeps the schedule for due entries and collects them from the funding
//! accounts. An entry whose account cannot cover payment plus penalty, or is
//! no longer active, is marked overdue, keeps the penalty, and stays eligible
//! for the next sweep.
//!
//! Lifecycle: `Idle` -> `Running` (after [`OverdueProcessor::start`]) ->
//! `Stopped` (after [`OverdueProcessor::stop`]). A running processor sweeps
//! once immediately, then on every interval tick or manual trigger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use credit_types::domain::schedule::penalty_for;
use credit_types::{
    AppError, Clock, Money, NotificationKind, Notifier, PaymentScheduleEntry, Settlement, Store,
    SweepSummary, Transaction, UserId,
};

use crate::service::record_audit;

/// Sweep cadence and pricing.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Fraction of the scheduled payment charged per sweep (`0.10` = 10 %)
    pub penalty_rate: Decimal,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            penalty_rate: Decimal::new(10, 2),
        }
    }
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Running,
    Stopped,
}

enum State {
    Idle,
    Running {
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// What happened to one due entry.
enum Outcome {
    Paid,
    Overdue,
}

/// The part of the processor shared with the background task.
struct Sweeper<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    penalty_rate: Decimal,
    /// Serialises sweeps so a penalty accrues at most once per sweep
    sweep_lock: Mutex<()>,
}

impl<S: Store> Sweeper<S> {
    async fn sweep(&self) -> Result<SweepSummary, AppError> {
        let _guard = self.sweep_lock.lock().await;
        let now = self.clock.now();

        let due = self.store.due_entries(now).await.map_err(|e| {
            error!(error = %e, "Failed to load due schedule entries");
            AppError::from(e)
        })?;

        let mut summary = SweepSummary {
            total: due.len(),
            ..SweepSummary::default()
        };
        debug!(due = summary.total, "Sweep started");

        // One entry at a time keeps the store's lock order simple
        for entry in &due {
            match self.process_entry(entry, now).await {
                Ok(Outcome::Paid) => summary.paid += 1,
                Ok(Outcome::Overdue) => summary.overdue += 1,
                Err(e) => {
                    warn!(entry_id = %entry.id, credit_id = %entry.credit_id, error = %e, "Failed to process schedule entry");
                    summary.failed += 1;
                }
            }
        }
        summary.processed = summary.paid + summary.overdue;

        info!(
            total = summary.total,
            processed = summary.processed,
            paid = summary.paid,
            overdue = summary.overdue,
            failed = summary.failed,
            "Sweep finished"
        );
        Ok(summary)
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.id, credit_id = %entry.credit_id))]
    async fn process_entry(
        &self,
        entry: &PaymentScheduleEntry,
        now: DateTime<Utc>,
    ) -> Result<Outcome, AppError> {
        let penalty = penalty_for(entry.payment_amount, self.penalty_rate);

        match self.store.settle_entry(entry.id, penalty, now).await {
            Ok(settlement) => {
                self.on_paid(&settlement, penalty, now).await;
                Ok(Outcome::Paid)
            }
            // A blocked or closed account cannot be charged either
            Err(e) if e.is_insufficient_funds() || e.is_account_inactive() => {
                let overdue = self.store.accrue_penalty(entry.id, penalty, now).await?;
                info!(
                    penalty = %penalty,
                    accrued = %overdue.penalty_amount,
                    reason = %e,
                    "Payment not collected, marked overdue"
                );
                self.on_overdue(&overdue, penalty).await;
                Ok(Outcome::Overdue)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_paid(&self, settlement: &Settlement, penalty: Decimal, now: DateTime<Utc>) {
        let Settlement {
            entry,
            credit,
            account,
        } = settlement;
        info!(
            paid = %entry.paid_amount,
            penalty = %penalty,
            balance = %account.balance.amount(),
            remaining_debt = %credit.remaining_debt.amount(),
            "Scheduled payment collected"
        );

        let currency = account.currency();
        match (
            Money::new(entry.paid_amount, currency),
            Money::new(penalty, currency),
        ) {
            (Ok(paid), Ok(penalty)) => {
                let tx = Transaction::credit_payment(
                    account.id,
                    credit.id,
                    entry.payment_number,
                    paid,
                    penalty,
                    now,
                );
                record_audit(self.store.as_ref(), tx).await;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Cannot record credit payment");
            }
        }

        let payload = json!({
            "credit_id": credit.id,
            "entry_id": entry.id,
            "payment_number": entry.payment_number,
            "amount": entry.paid_amount,
            "penalty": penalty,
            "remaining_debt": credit.remaining_debt.amount(),
            "credit_status": credit.status,
        });
        self.notify(NotificationKind::PaymentSucceeded, credit.user_id, payload)
            .await;
    }

    async fn on_overdue(&self, entry: &PaymentScheduleEntry, penalty: Decimal) {
        let credit = match self.store.get_credit(entry.credit_id).await {
            Ok(Some(credit)) => credit,
            Ok(None) => {
                warn!("Overdue entry has no credit, notification skipped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Cannot load credit, notification skipped");
                return;
            }
        };

        let payload = json!({
            "credit_id": entry.credit_id,
            "entry_id": entry.id,
            "payment_number": entry.payment_number,
            "due_date": entry.due_date,
            "amount": entry.payment_amount,
            "penalty": penalty,
            "total_penalty": entry.penalty_amount,
        });
        self.notify(NotificationKind::PaymentOverdue, credit.user_id, payload)
            .await;
    }

    async fn notify(&self, kind: NotificationKind, recipient: UserId, payload: serde_json::Value) {
        if let Err(e) = self.notifier.send(kind, recipient, payload).await {
            warn!(kind = %kind, recipient = %recipient, error = %e, "Notification failed");
        }
    }
}

/// Background task body: sweep now, then on every tick or trigger until
/// shutdown is signalled. A sweep in progress always runs to completion.
async fn run_loop<S: Store>(
    sweeper: Arc<Sweeper<S>>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => debug!("Manual sweep triggered"),
        }

        // Errors are already logged by the sweep itself
        let _ = sweeper.sweep().await;
    }

    info!("Overdue processor loop exited");
}

/// Periodic collector of due scheduled payments.
pub struct OverdueProcessor<S: Store> {
    sweeper: Arc<Sweeper<S>>,
    interval: Duration,
    trigger: Arc<Notify>,
    state: Mutex<State>,
}

impl<S: Store> OverdueProcessor<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            sweeper: Arc::new(Sweeper {
                store,
                notifier,
                clock,
                penalty_rate: config.penalty_rate,
                sweep_lock: Mutex::new(()),
            }),
            interval: config.interval,
            trigger: Arc::new(Notify::new()),
            state: Mutex::new(State::Idle),
        }
    }

    pub async fn state(&self) -> ProcessorState {
        match *self.state.lock().await {
            State::Idle => ProcessorState::Idle,
            State::Running { .. } => ProcessorState::Running,
            State::Stopped => ProcessorState::Stopped,
        }
    }

    /// Starts the background sweep loop.
    ///
    /// Only an idle processor can start; a stopped one stays stopped.
    pub async fn start(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        match *state {
            State::Idle => {}
            State::Running { .. } => {
                return Err(AppError::Conflict("Overdue processor already running".into()));
            }
            State::Stopped => {
                return Err(AppError::Conflict("Overdue processor was stopped".into()));
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.sweeper),
            self.interval,
            Arc::clone(&self.trigger),
            shutdown_rx,
        ));
        *state = State::Running { shutdown, handle };

        info!(
            interval_secs = self.interval.as_secs(),
            penalty_rate = %self.sweeper.penalty_rate,
            "Overdue processor started"
        );
        Ok(())
    }

    /// Stops future sweeps and waits for a sweep in progress to finish.
    ///
    /// Idempotent. Callers bound the wait with their own shutdown deadline.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Stopped);

        if let State::Running { shutdown, handle } = previous {
            let _ = shutdown.send(true);
            if let Err(e) = handle.await {
                error!(error = %e, "Overdue processor task failed");
            }
            info!("Overdue processor stopped");
        }
    }

    /// Asks a running processor to sweep without waiting for the next tick.
    ///
    /// Ignored unless the processor is running. Triggers that arrive while a
    /// sweep is in progress collapse into one follow-up sweep.
    pub async fn trigger_now(&self) {
        if matches!(*self.state.lock().await, State::Running { .. }) {
            self.trigger.notify_one();
        } else {
            debug!("Processor not running, trigger ignored");
        }
    }

    /// Runs one sweep on the caller's task.
    pub async fn run_sweep(&self) -> Result<SweepSummary, AppError> {
        self.sweeper.sweep().await
    }
}
