//! OverdueProcessor tests: sweep outcomes and scheduler lifecycle.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as TimeDelta;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use credit_types::{
        Account, AccountStatus, AppError, Clock, Credit, CreditStatus, LedgerStore,
        NotificationKind, Notifier, PaymentScheduleEntry, PaymentScheduleStore, PaymentStatus,
        SweepSummary, TransactionType, WithdrawRequest,
    };

    use crate::service_tests::tests::{
        FailingNotifier, FaultyStore, RecordingNotifier, Services, credit_request, open_account,
        services,
    };
    use crate::{OverdueProcessor, ProcessorState, SweepConfig};

    struct Fixture {
        s: Services,
        account: Account,
        credit: Credit,
        schedule: Vec<PaymentScheduleEntry>,
    }

    /// A 100 000 / 31 % / 12 month credit, disbursed into a fresh account.
    async fn fixture() -> Fixture {
        let s = services();
        let account = open_account(&s.ledger).await;
        let credit = s
            .credits
            .create_credit(credit_request(&account, dec!(100000), 12))
            .await
            .unwrap();
        let schedule = s.credits.get_schedule(credit.id).await.unwrap();
        Fixture {
            s,
            account,
            credit,
            schedule,
        }
    }

    fn processor(
        f: &Fixture,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> OverdueProcessor<FaultyStore> {
        OverdueProcessor::new(
            Arc::clone(&f.s.store),
            notifier,
            f.s.clock.clone(),
            SweepConfig {
                interval,
                penalty_rate: dec!(0.10),
            },
        )
    }

    impl Fixture {
        /// Moves the clock just past the due date of payment `n` (1-based).
        fn pass_due_date(&self, n: usize) {
            self.s
                .clock
                .set(self.schedule[n - 1].due_date + TimeDelta::hours(1));
        }

        async fn balance(&self) -> Decimal {
            self.s
                .store
                .get_account(self.account.id)
                .await
                .unwrap()
                .unwrap()
                .balance
                .amount()
        }

        async fn entry(&self, n: usize) -> PaymentScheduleEntry {
            self.s
                .store
                .get_entry(self.schedule[n - 1].id)
                .await
                .unwrap()
                .unwrap()
        }

        async fn drain_to(&self, balance: Decimal) {
            let amount = self.balance().await - balance;
            self.s
                .ledger
                .withdraw(WithdrawRequest {
                    account_id: self.account.id,
                    amount,
                })
                .await
                .unwrap();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sweep outcomes
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_nothing_due_before_first_due_date() {
        let f = fixture().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let p = processor(&f, notifier.clone(), Duration::from_secs(60));

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary, SweepSummary::default());
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_due_payment_collected_with_penalty() {
        let f = fixture().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let p = processor(&f, notifier.clone(), Duration::from_secs(60));
        f.pass_due_date(1);

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                total: 1,
                processed: 1,
                paid: 1,
                overdue: 0,
                failed: 0,
            }
        );

        // 9 797.97 payment plus 979.80 penalty
        assert_eq!(f.balance().await, dec!(89222.23));
        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Paid);
        assert_eq!(entry.penalty_amount, dec!(979.80));
        assert_eq!(entry.paid_amount, dec!(10777.77));
        assert_eq!(entry.paid_at, Some(f.s.clock.now()));

        let credit = f.s.credits.get_credit(f.credit.id).await.unwrap();
        assert_eq!(
            credit.remaining_debt.amount(),
            dec!(100000) - f.schedule[0].principal_amount
        );

        let history = f.s.ledger.history(f.account.id).await.unwrap();
        let payment = &history.transactions[0];
        assert_eq!(payment.transaction_type, TransactionType::CreditPayment);
        assert_eq!(payment.amount.amount(), dec!(10777.77));
        assert_eq!(payment.source_account_id, Some(f.account.id));

        let (kind, recipient, payload) = notifier.last().unwrap();
        assert_eq!(kind, NotificationKind::PaymentSucceeded);
        assert_eq!(recipient, f.account.user_id);
        assert_eq!(payload["payment_number"], 1);
    }

    #[tokio::test]
    async fn test_second_sweep_does_not_charge_again() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );
        f.pass_due_date(1);

        p.run_sweep().await.unwrap();
        let after_first = f.balance().await;

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(f.balance().await, after_first);
    }

    #[tokio::test]
    async fn test_insufficient_funds_accrues_penalty_each_sweep() {
        let f = fixture().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let p = processor(&f, notifier.clone(), Duration::from_secs(60));
        f.drain_to(dec!(100)).await;
        f.pass_due_date(1);

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(f.balance().await, dec!(100));

        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Overdue);
        assert_eq!(entry.penalty_amount, dec!(979.80));

        // Still unpaid on the next sweep: the penalty adds up, never compounds
        f.s.clock.advance(TimeDelta::hours(12));
        p.run_sweep().await.unwrap();
        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Overdue);
        assert_eq!(entry.penalty_amount, dec!(1959.60));
        assert_eq!(f.balance().await, dec!(100));

        assert_eq!(
            notifier.kinds(),
            vec![NotificationKind::PaymentOverdue, NotificationKind::PaymentOverdue]
        );
        let (_, _, payload) = notifier.last().unwrap();
        assert_eq!(payload["total_penalty"], serde_json::json!(dec!(1959.60)));

        // No ledger entry for an uncollected payment
        let history = f.s.ledger.history(f.account.id).await.unwrap();
        assert!(
            history
                .transactions
                .iter()
                .all(|t| t.transaction_type != TransactionType::CreditPayment)
        );
    }

    #[tokio::test]
    async fn test_overdue_entry_collected_once_funded() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );
        f.drain_to(dec!(0)).await;
        f.pass_due_date(1);
        p.run_sweep().await.unwrap();

        f.s.store
            .deposit(f.account.id, f.credit.monthly_payment)
            .await
            .unwrap();
        f.s.store
            .deposit(
                f.account.id,
                credit_types::Money::new(dec!(979.80), credit_types::Currency::RUB).unwrap(),
            )
            .await
            .unwrap();

        f.s.clock.advance(TimeDelta::hours(12));
        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.paid, 1);

        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Paid);
        // Both sweeps' penalties are on the entry, this sweep's was collected
        assert_eq!(entry.penalty_amount, dec!(1959.60));
        assert_eq!(entry.paid_amount, dec!(10777.77));
        assert!(f.balance().await.is_zero());
    }

    #[tokio::test]
    async fn test_one_failing_entry_does_not_stop_the_sweep() {
        let f = fixture().await;
        let other = open_account(&f.s.ledger).await;
        let other_credit = f
            .s
            .credits
            .create_credit(credit_request(&other, dec!(50000), 6))
            .await
            .unwrap();
        let other_schedule = f.s.store.get_schedule(other_credit.id).await.unwrap();
        f.s.store.fail_settlement_of(other_schedule[0].id);
        f.pass_due_date(1);

        let notifier = Arc::new(RecordingNotifier::default());
        let p = processor(&f, notifier.clone(), Duration::from_secs(60));
        let summary = p.run_sweep().await.unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.paid, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);

        let untouched = f.s.store.get_entry(other_schedule[0].id).await.unwrap().unwrap();
        assert_eq!(untouched.status, PaymentStatus::Pending);
        assert!(untouched.penalty_amount.is_zero());
        assert_eq!(notifier.kinds(), vec![NotificationKind::PaymentSucceeded]);
    }

    #[tokio::test]
    async fn test_blocked_account_accrues_penalty() {
        let f = fixture().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let p = processor(&f, notifier.clone(), Duration::from_secs(60));
        f.s.ledger
            .set_account_status(f.account.id, AccountStatus::Blocked)
            .await
            .unwrap();
        f.pass_due_date(1);

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                total: 1,
                processed: 1,
                paid: 0,
                overdue: 1,
                failed: 0,
            }
        );
        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Overdue);
        assert_eq!(entry.penalty_amount, dec!(979.80));
        assert_eq!(f.balance().await, dec!(100000));

        f.s.clock.advance(TimeDelta::hours(12));
        p.run_sweep().await.unwrap();
        assert_eq!(f.entry(1).await.penalty_amount, dec!(1959.60));
        assert_eq!(
            notifier.kinds(),
            vec![NotificationKind::PaymentOverdue, NotificationKind::PaymentOverdue]
        );

        // Collected as soon as the account is usable again
        f.s.ledger
            .set_account_status(f.account.id, AccountStatus::Active)
            .await
            .unwrap();
        f.s.clock.advance(TimeDelta::hours(12));
        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.paid, 1);
        assert_eq!(f.entry(1).await.status, PaymentStatus::Paid);
        assert_eq!(f.balance().await, dec!(89222.23));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_affect_settlement() {
        let f = fixture().await;
        let p = processor(&f, Arc::new(FailingNotifier), Duration::from_secs(60));
        f.pass_due_date(2);

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.paid, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(f.entry(2).await.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_final_payment_pays_off_credit() {
        let f = fixture().await;
        f.s.store
            .deposit(
                f.account.id,
                credit_types::Money::new(dec!(100000), credit_types::Currency::RUB).unwrap(),
            )
            .await
            .unwrap();
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );
        f.pass_due_date(12);

        let summary = p.run_sweep().await.unwrap();
        assert_eq!(summary.paid, 12);

        let credit = f.s.credits.get_credit(f.credit.id).await.unwrap();
        assert_eq!(credit.status, CreditStatus::PaidOff);
        assert!(credit.remaining_debt.is_zero());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweeps_are_serialised() {
        let f = fixture().await;
        let p = Arc::new(processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        ));
        f.pass_due_date(3);

        let first = tokio::spawn({
            let p = Arc::clone(&p);
            async move { p.run_sweep().await.unwrap() }
        });
        let second = tokio::spawn({
            let p = Arc::clone(&p);
            async move { p.run_sweep().await.unwrap() }
        });
        let a = first.await.unwrap();
        let b = second.await.unwrap();

        assert_eq!(a.paid + b.paid, 3);
        assert_eq!(a.failed + b.failed, 0);
        assert_eq!(f.balance().await, dec!(100000) - dec!(10777.77) * dec!(3));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_start_sweeps_immediately_then_on_interval() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );
        f.pass_due_date(1);

        assert_eq!(p.state().await, ProcessorState::Idle);
        p.start().await.unwrap();
        assert_eq!(p.state().await, ProcessorState::Running);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.entry(1).await.status, PaymentStatus::Paid);
        assert_eq!(f.entry(2).await.status, PaymentStatus::Pending);

        f.pass_due_date(2);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.entry(2).await.status, PaymentStatus::Pending);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(f.entry(2).await.status, PaymentStatus::Paid);

        p.stop().await;
        assert_eq!(p.state().await, ProcessorState::Stopped);

        f.pass_due_date(3);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(f.entry(3).await.status, PaymentStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_now_sweeps_before_next_tick() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(3600),
        );
        p.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        f.pass_due_date(1);
        p.trigger_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.entry(1).await.status, PaymentStatus::Paid);

        p.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_ignored_unless_running() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(3600),
        );
        f.drain_to(dec!(100)).await;
        f.pass_due_date(1);

        // A trigger before start must not queue a second sweep
        p.trigger_now().await;
        p.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let entry = f.entry(1).await;
        assert_eq!(entry.status, PaymentStatus::Overdue);
        assert_eq!(entry.penalty_amount, dec!(979.80));

        p.stop().await;
        p.trigger_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.entry(1).await.penalty_amount, dec!(979.80));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );

        p.start().await.unwrap();
        assert!(matches!(p.start().await, Err(AppError::Conflict(_))));

        p.stop().await;
        p.stop().await;
        assert_eq!(p.state().await, ProcessorState::Stopped);
        assert!(matches!(p.start().await, Err(AppError::Conflict(_))));

        // Manual sweeps keep working after the loop is gone
        assert!(p.run_sweep().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let f = fixture().await;
        let p = processor(
            &f,
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );

        p.stop().await;
        assert_eq!(p.state().await, ProcessorState::Stopped);
    }
}
