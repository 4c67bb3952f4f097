//! Tests for the cash ledger against the in-memory store

use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use core_kernel::UserId;
use domain_ledger::{
    CashTransactionType, InMemoryLedgerStore, LedgerError, LedgerService, TransactionQuery,
    TransactionRequest,
};

fn ledger() -> LedgerService {
    LedgerService::new(Arc::new(InMemoryLedgerStore::new()))
}

// ============================================================================
// Recording
// ============================================================================

mod recording {
    use super::*;

    #[tokio::test]
    async fn test_charge_then_debit_updates_balance() {
        let ledger = ledger();
        let user = UserId::new();

        let charge = ledger.charge(user, 50_000, None).await.unwrap();
        assert_eq!(charge.amount, 50_000);
        assert_eq!(charge.balance_after, 50_000);

        let debit = ledger.debit(user, 30_000, None).await.unwrap();
        assert_eq!(debit.transaction_type, CashTransactionType::Confirm);
        assert_eq!(debit.amount, -30_000);
        assert_eq!(debit.balance_after, 20_000);

        assert_eq!(ledger.balance(user).await.unwrap(), 20_000);
    }

    #[tokio::test]
    async fn test_unknown_user_has_zero_balance() {
        let ledger = ledger();
        assert_eq!(ledger.balance(UserId::new()).await.unwrap(), 0);
        assert!(ledger.wallet(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_wallet_is_idempotent() {
        let ledger = ledger();
        let user = UserId::new();

        let first = ledger.open_wallet(user).await.unwrap();
        ledger.charge(user, 100, None).await.unwrap();
        let second = ledger.open_wallet(user).await.unwrap();

        assert_eq!(first.balance, 0);
        assert_eq!(second.balance, 100);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_hold_and_refund() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 10_000, None).await.unwrap();

        let hold = ledger.hold(user, 4_000, None).await.unwrap();
        assert_eq!(hold.amount, -4_000);
        let refund = ledger.refund(user, 4_000, None).await.unwrap();
        assert_eq!(refund.balance_after, 10_000);
    }

    #[tokio::test]
    async fn test_adjust_records_reason() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 1_000, None).await.unwrap();

        let tx = ledger
            .adjust(user, -250, "chargeback", "adjust-42")
            .await
            .unwrap();
        let reference = tx.reference.unwrap();
        assert_eq!(reference.ref_type, "adjustment");
        assert_eq!(reference.ref_id, "chargeback");
        assert_eq!(tx.balance_after, 750);
    }

    #[tokio::test]
    async fn test_wrong_sign_rejected() {
        let ledger = ledger();
        let user = UserId::new();

        let request = TransactionRequest::new(user, CashTransactionType::Charge, -5, "neg-charge");
        let err = ledger.record_transaction(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        assert!(matches!(
            ledger.debit(user, 0, None).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}

// ============================================================================
// Idempotency
// ============================================================================

mod idempotency {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_key_applies_once() {
        let ledger = ledger();
        let user = UserId::new();

        let request = TransactionRequest::new(user, CashTransactionType::Charge, 10_000, "pay-1");
        ledger.record_transaction(request.clone()).await.unwrap();

        let err = ledger.record_transaction(request).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(ledger.balance(user).await.unwrap(), 10_000);

        let history = ledger.history(&TransactionQuery::for_user(user)).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_global_across_users() {
        let ledger = ledger();

        let first = TransactionRequest::new(UserId::new(), CashTransactionType::Charge, 10, "shared");
        let second = TransactionRequest::new(UserId::new(), CashTransactionType::Charge, 10, "shared");

        ledger.record_transaction(first).await.unwrap();
        assert!(ledger.record_transaction(second).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn test_rejected_request_does_not_burn_key() {
        let ledger = ledger();
        let user = UserId::new();

        let overdraw = TransactionRequest::new(user, CashTransactionType::Confirm, -500, "spend-1");
        assert!(matches!(
            ledger.record_transaction(overdraw.clone()).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));

        ledger.charge(user, 500, None).await.unwrap();
        let tx = ledger.record_transaction(overdraw).await.unwrap();
        assert_eq!(tx.balance_after, 0);
    }

    #[tokio::test]
    async fn test_transaction_for_key() {
        let ledger = ledger();
        let user = UserId::new();
        let request = TransactionRequest::new(user, CashTransactionType::Charge, 700, "lookup-me")
            .with_reference("payment", "pg-1");
        let recorded = ledger.record_transaction(request).await.unwrap();

        let found = ledger.transaction_for_key("lookup-me").await.unwrap();
        assert_eq!(found, Some(recorded));
        assert!(ledger.transaction_for_key("missing").await.unwrap().is_none());
    }
}

// ============================================================================
// Balance Safety
// ============================================================================

mod balance_safety {
    use super::*;

    #[tokio::test]
    async fn test_overdraw_rejected_without_side_effects() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 1_000, None).await.unwrap();

        let err = ledger.debit(user, 1_001, None).await.unwrap_err();
        match err {
            LedgerError::InsufficientBalance { available, required, .. } => {
                assert_eq!(available, 1_000);
                assert_eq!(required, 1_001);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(ledger.balance(user).await.unwrap(), 1_000);
        let history = ledger.history(&TransactionQuery::for_user(user)).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_cannot_overdraw() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 10_000, None).await.unwrap();

        let a = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.debit(user, 8_000, None).await }
        });
        let b = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.debit(user, 8_000, None).await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(ledger.balance(user).await.unwrap(), 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_applies_once() {
        let ledger = ledger();
        let user = UserId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let request =
                    TransactionRequest::new(user, CashTransactionType::Charge, 1_000, "race-key");
                ledger.record_transaction(request).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => applied += 1,
                Err(err) => assert!(err.is_duplicate()),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(ledger.balance(user).await.unwrap(), 1_000);
    }
}

// ============================================================================
// History and Audit
// ============================================================================

mod history {
    use super::*;

    #[tokio::test]
    async fn test_history_filters_by_type_and_limit() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 1_000, None).await.unwrap();
        ledger.debit(user, 100, None).await.unwrap();
        ledger.charge(user, 2_000, None).await.unwrap();
        ledger.debit(user, 200, None).await.unwrap();

        let charges = ledger
            .history(&TransactionQuery::for_user(user).of_type(CashTransactionType::Charge))
            .await
            .unwrap();
        assert_eq!(charges.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![1_000, 2_000]);

        let recent = ledger
            .history(&TransactionQuery::for_user(user).limit(2))
            .await
            .unwrap();
        assert_eq!(recent.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![2_000, -200]);
    }

    #[tokio::test]
    async fn test_history_time_window() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 1_000, None).await.unwrap();

        let now = Utc::now();
        let past = TransactionQuery::for_user(user).between(now - Duration::days(2), now - Duration::days(1));
        assert!(ledger.history(&past).await.unwrap().is_empty());

        let around = TransactionQuery::for_user(user).between(now - Duration::hours(1), now + Duration::hours(1));
        assert_eq!(ledger.history(&around).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_isolated_per_user() {
        let ledger = ledger();
        let (alice, bob) = (UserId::new(), UserId::new());
        ledger.charge(alice, 10, None).await.unwrap();
        ledger.charge(bob, 20, None).await.unwrap();

        let history = ledger.history(&TransactionQuery::for_user(alice)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, alice);
    }

    #[tokio::test]
    async fn test_audit_replays_journal() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.charge(user, 5_000, None).await.unwrap();
        ledger.debit(user, 1_500, None).await.unwrap();
        ledger.adjust(user, 250, "goodwill", "adj-1").await.unwrap();

        let audit = ledger.audit_balance(user).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.transaction_count, 3);
        assert_eq!(audit.replayed_balance, 3_750);
        assert_eq!(audit.wallet_balance, 3_750);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_balance_equals_sum_of_accepted_amounts(
        amounts in prop::collection::vec(-5_000i64..5_000, 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let ledger = ledger();
            let user = UserId::new();

            for (i, amount) in amounts.iter().copied().filter(|a| *a != 0).enumerate() {
                let request = TransactionRequest::new(user, CashTransactionType::Adjust, amount, format!("k-{i}"));
                match ledger.record_transaction(request).await {
                    Ok(tx) => prop_assert!(tx.balance_after >= 0),
                    Err(err) => prop_assert!(
                        matches!(err, LedgerError::InsufficientBalance { .. }),
                        "unexpected error: {:?}",
                        err
                    ),
                }
            }

            let history = ledger.history(&TransactionQuery::for_user(user)).await.unwrap();
            let replayed: i64 = history.iter().map(|t| t.amount).sum();
            prop_assert_eq!(replayed, ledger.balance(user).await.unwrap());
            prop_assert!(ledger.audit_balance(user).await.unwrap().is_consistent());
            Ok(())
        })?;
    }
}
