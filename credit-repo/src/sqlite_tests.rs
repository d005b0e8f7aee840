//! SQLite store tests, mostly against an in-memory database.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use credit_types::amortization::{build_schedule, compute_monthly_payment};
    use credit_types::domain::schedule::due_date_for;
    use credit_types::{
        Account, AccountId, AccountStatus, Credit, CreditStatus, CreditStore, Currency,
        DomainError, LedgerStore, Money, PaymentScheduleEntry, PaymentScheduleStore,
        PaymentStatus, RepoError, Transaction, TransactionType, UserId,
    };

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn rub(amount: Decimal) -> Money {
        Money::new(amount, Currency::RUB).unwrap()
    }

    async fn funded_account(repo: &SqliteRepo, balance: Decimal) -> Account {
        let account = repo
            .create_account(UserId::new(), Currency::RUB)
            .await
            .unwrap();
        if balance > Decimal::ZERO {
            repo.deposit(account.id, rub(balance)).await.unwrap();
        }
        repo.get_account(account.id).await.unwrap().unwrap()
    }

    async fn seeded_credit(
        repo: &SqliteRepo,
        account: &Account,
    ) -> (Credit, Vec<PaymentScheduleEntry>) {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let payment = compute_monthly_payment(dec!(100000), dec!(31), 12);
        let credit = Credit::issue(
            account.user_id,
            account.id,
            rub(dec!(100000)),
            dec!(31),
            12,
            rub(payment),
            issued_at,
        );
        // The schedule references the credit, so it must exist first
        repo.create_credit(&credit).await.unwrap();

        let entries: Vec<_> = build_schedule(dec!(100000), dec!(31), 12, payment)
            .iter()
            .map(|row| {
                let due = due_date_for(issued_at, row.payment_number).unwrap();
                PaymentScheduleEntry::pending(credit.id, row, due, issued_at)
            })
            .collect();
        repo.create_schedule(&entries).await.unwrap();
        (credit, entries)
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let repo = setup_repo().await;
        let user_id = UserId::new();

        let account = repo.create_account(user_id, Currency::RUB).await.unwrap();
        assert!(account.balance.is_zero());
        assert_eq!(account.status, AccountStatus::Active);

        let fetched = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, account.id);
        assert_eq!(fetched.user_id, user_id);
        assert_eq!(fetched.currency(), Currency::RUB);

        repo.create_account(user_id, Currency::RUB).await.unwrap();
        let listed = repo.list_accounts_for_user(user_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, account.id);
    }

    #[tokio::test]
    async fn test_deposit_withdraw_keeps_kopecks() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(1000.10)).await;

        let updated = repo.withdraw(account.id, rub(dec!(0.11))).await.unwrap();
        assert_eq!(updated.balance.amount(), dec!(999.99));

        let fetched = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(fetched.balance.amount(), dec!(999.99));
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(50)).await;

        let result = repo.withdraw(account.id, rub(dec!(60))).await;
        match result {
            Err(RepoError::Domain(DomainError::InsufficientFunds {
                available,
                requested,
            })) => {
                assert_eq!(available, dec!(50));
                assert_eq!(requested, dec!(60));
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }

        let fetched = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(fetched.balance.amount(), dec!(50));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let repo = setup_repo().await;
        let missing = AccountId::new();

        assert!(repo.get_account(missing).await.unwrap().is_none());
        assert!(matches!(
            repo.withdraw(missing, rub(dec!(1))).await,
            Err(RepoError::Domain(DomainError::AccountNotFound(_)))
        ));
        assert!(matches!(
            repo.set_account_status(missing, AccountStatus::Blocked).await,
            Err(RepoError::Domain(DomainError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_status_change_blocks_operations() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(100)).await;

        let blocked = repo
            .set_account_status(account.id, AccountStatus::Blocked)
            .await
            .unwrap();
        assert_eq!(blocked.status, AccountStatus::Blocked);

        assert!(matches!(
            repo.withdraw(account.id, rub(dec!(1))).await,
            Err(RepoError::Domain(DomainError::AccountInactive {
                status: AccountStatus::Blocked,
                ..
            }))
        ));

        repo.set_account_status(account.id, AccountStatus::Active)
            .await
            .unwrap();
        repo.withdraw(account.id, rub(dec!(1))).await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_rolls_back_on_inactive_destination() {
        let repo = setup_repo().await;
        let alice = funded_account(&repo, dec!(300)).await;
        let bob = funded_account(&repo, dec!(0)).await;

        let (from, to) = repo.transfer(alice.id, bob.id, rub(dec!(100))).await.unwrap();
        assert_eq!(from.balance.amount(), dec!(200));
        assert_eq!(to.balance.amount(), dec!(100));

        repo.set_account_status(bob.id, AccountStatus::Closed)
            .await
            .unwrap();
        let result = repo.transfer(alice.id, bob.id, rub(dec!(100))).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::AccountInactive { .. }))
        ));

        // The debit from the first step must not survive
        let alice = repo.get_account(alice.id).await.unwrap().unwrap();
        assert_eq!(alice.balance.amount(), dec!(200));
    }

    #[tokio::test]
    async fn test_transactions_listed_newest_first() {
        let repo = setup_repo().await;
        let alice = funded_account(&repo, dec!(0)).await;
        let bob = funded_account(&repo, dec!(0)).await;
        let now = Utc::now();

        let deposit = Transaction::deposit(alice.id, rub(dec!(10)), now);
        let transfer =
            Transaction::transfer(alice.id, bob.id, rub(dec!(4)), now + Duration::seconds(1));
        repo.record_transaction(&deposit).await.unwrap();
        repo.record_transaction(&transfer).await.unwrap();

        let history = repo.list_transactions_for_account(alice.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, transfer.id);
        assert_eq!(history[1].id, deposit.id);

        let bob_history = repo.list_transactions_for_account(bob.id).await.unwrap();
        assert_eq!(bob_history.len(), 1);
        assert_eq!(bob_history[0].transaction_type, TransactionType::Transfer);

        let fetched = repo.get_transaction(deposit.id).await.unwrap().unwrap();
        assert_eq!(fetched.amount, deposit.amount);
        assert_eq!(fetched.destination_account_id, Some(alice.id));
        assert!(fetched.source_account_id.is_none());
    }

    #[tokio::test]
    async fn test_credit_round_trips() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(0)).await;
        let (credit, _) = seeded_credit(&repo, &account).await;

        let stored = repo.get_credit(credit.id).await.unwrap().unwrap();
        assert_eq!(stored.amount, credit.amount);
        assert_eq!(stored.interest_rate, dec!(31));
        assert_eq!(stored.term_months, 12);
        assert_eq!(stored.monthly_payment.amount(), dec!(9797.97));
        assert_eq!(stored.status, CreditStatus::Active);

        let listed = repo.list_credits_for_user(account.user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_schedule_conflicts() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(0)).await;
        let (credit, entries) = seeded_credit(&repo, &account).await;

        let duplicate: Vec<_> = entries
            .iter()
            .map(|e| PaymentScheduleEntry {
                id: credit_types::EntryId::new(),
                ..e.clone()
            })
            .collect();
        assert!(matches!(
            repo.create_schedule(&duplicate).await,
            Err(RepoError::Conflict(_))
        ));

        let schedule = repo.get_schedule(credit.id).await.unwrap();
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule[11].remaining_balance, Decimal::ZERO);
        assert_eq!(schedule[0].due_date, entries[0].due_date);
    }

    #[tokio::test]
    async fn test_due_entries_by_date() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(0)).await;
        let (_, entries) = seeded_credit(&repo, &account).await;

        assert!(repo.due_entries(entries[0].due_date).await.unwrap().is_empty());

        let as_of = entries[1].due_date + Duration::hours(1);
        repo.accrue_penalty(entries[0].id, dec!(979.80), as_of)
            .await
            .unwrap();

        let due = repo.due_entries(as_of).await.unwrap();
        let numbers: Vec<_> = due.iter().map(|e| e.payment_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(due[0].status, PaymentStatus::Overdue);
        assert_eq!(due[0].penalty_amount, dec!(979.80));
    }

    #[tokio::test]
    async fn test_settle_entry() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(20000)).await;
        let (credit, entries) = seeded_credit(&repo, &account).await;
        let paid_at = entries[0].due_date + Duration::days(1);

        let settlement = repo
            .settle_entry(entries[0].id, dec!(979.80), paid_at)
            .await
            .unwrap();
        assert_eq!(settlement.account.balance.amount(), dec!(9222.23));

        let entry = repo.get_entry(entries[0].id).await.unwrap().unwrap();
        assert_eq!(entry.status, PaymentStatus::Paid);
        assert_eq!(entry.paid_amount, dec!(10777.77));
        assert_eq!(entry.paid_at, Some(paid_at));

        let stored = repo.get_credit(credit.id).await.unwrap().unwrap();
        assert_eq!(
            stored.remaining_debt.amount(),
            dec!(100000) - entries[0].principal_amount
        );
    }

    #[tokio::test]
    async fn test_settle_entry_insufficient_funds_is_atomic() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(9797.96)).await;
        let (credit, entries) = seeded_credit(&repo, &account).await;

        let result = repo
            .settle_entry(entries[0].id, Decimal::ZERO, Utc::now())
            .await;
        assert!(result.as_ref().is_err_and(|e| e.is_insufficient_funds()));

        let entry = repo.get_entry(entries[0].id).await.unwrap().unwrap();
        assert_eq!(entry.status, PaymentStatus::Pending);
        let account = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.balance.amount(), dec!(9797.96));
        let stored = repo.get_credit(credit.id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_debt, credit.amount);
    }

    #[tokio::test]
    async fn test_settle_entry_twice_rejected() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(50000)).await;
        let (_, entries) = seeded_credit(&repo, &account).await;

        repo.settle_entry(entries[0].id, Decimal::ZERO, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            repo.settle_entry(entries[0].id, Decimal::ZERO, Utc::now())
                .await,
            Err(RepoError::Domain(DomainError::EntryNotPayable {
                status: PaymentStatus::Paid,
                ..
            }))
        ));
        assert!(matches!(
            repo.settle_entry(credit_types::EntryId::new(), Decimal::ZERO, Utc::now())
                .await,
            Err(RepoError::Domain(DomainError::EntryNotFound(_)))
        ));

        let account = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(
            account.balance.amount(),
            dec!(50000) - entries[0].payment_amount
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settlement_collects_once() {
        let repo = Arc::new(setup_repo().await);
        let account = funded_account(&repo, dec!(50000)).await;
        let (_, entries) = seeded_credit(&repo, &account).await;
        let entry_id = entries[0].id;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.settle_entry(entry_id, Decimal::ZERO, Utc::now())
                    .await
                    .is_ok()
            }));
        }
        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
    }

    #[tokio::test]
    async fn test_paying_every_entry_pays_off_credit() {
        let repo = setup_repo().await;
        let account = funded_account(&repo, dec!(200000)).await;
        let (credit, entries) = seeded_credit(&repo, &account).await;

        for entry in &entries {
            repo.settle_entry(entry.id, Decimal::ZERO, entry.due_date)
                .await
                .unwrap();
        }

        let credit = repo.get_credit(credit.id).await.unwrap().unwrap();
        assert!(credit.remaining_debt.is_zero());
        assert_eq!(credit.status, CreditStatus::PaidOff);
        assert!(repo.due_entries(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_transfers_on_disk_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("credit.db").display());
        let repo = Arc::new(SqliteRepo::new(&url).await.unwrap());

        let mut pairs = Vec::new();
        for _ in 0..4 {
            let from = funded_account(&repo, dec!(100)).await;
            let to = funded_account(&repo, dec!(0)).await;
            pairs.push((from.id, to.id));
        }

        let mut handles = Vec::new();
        for &(from, to) in &pairs {
            for _ in 0..5 {
                let repo = Arc::clone(&repo);
                handles.push(tokio::spawn(async move {
                    repo.transfer(from, to, rub(dec!(10))).await
                }));
            }
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok(), "transfer failed: {:?}", result.err());
        }

        for (from, to) in pairs {
            let from = repo.get_account(from).await.unwrap().unwrap();
            let to = repo.get_account(to).await.unwrap().unwrap();
            assert_eq!(from.balance.amount(), dec!(50));
            assert_eq!(to.balance.amount(), dec!(50));
        }
    }
}
