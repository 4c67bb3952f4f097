//! Tests for the settlement engine against the in-memory adapters

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use core_kernel::{
    BookingId, CounselorId, CreditLotId, SessionId, SettlementPeriod, Timezone, UserId,
};
use domain_credit::{CreditInventory, CreditStore, CreditUsageLog, InMemoryCreditStore, UsageStatus};
use domain_settlement::{
    classify, BookingContext, EndReason, FinishedSession, InMemoryBookingDirectory,
    InMemorySettlementStore, SettlementEngine, SettlementError, SettlementPolicy,
    SettlementStatus, SettlementType,
};

struct Fixture {
    credits: InMemoryCreditStore,
    inventory: CreditInventory,
    bookings: Arc<InMemoryBookingDirectory>,
    engine: SettlementEngine,
}

fn fixture_with(policy: SettlementPolicy) -> Fixture {
    let credits = InMemoryCreditStore::new();
    let inventory = CreditInventory::new(Arc::new(credits.clone()));
    let bookings = Arc::new(InMemoryBookingDirectory::new());
    let store = InMemorySettlementStore::new(credits.clone());
    let engine = SettlementEngine::new(Arc::new(store), bookings.clone(), policy);
    Fixture { credits, inventory, bookings, engine }
}

fn fixture() -> Fixture {
    fixture_with(SettlementPolicy::default())
}

impl Fixture {
    /// Buys lots of the given sizes, reserves `units` for a new booking and
    /// registers it with the booking directory
    async fn booking(&self, counselor: CounselorId, lots: &[u32], units: u32) -> (UserId, BookingId) {
        let customer = UserId::new();
        let base = Utc::now() - Duration::days(10);
        for (i, size) in lots.iter().enumerate() {
            self.inventory
                .add_lot(customer, "pack", *size, base + Duration::days(i as i64))
                .await
                .unwrap();
        }

        let booking = BookingId::new();
        self.inventory.reserve(customer, booking, units).await.unwrap();
        self.bookings
            .insert(BookingContext {
                booking_id: booking,
                customer_id: customer,
                counselor_id: counselor,
                credits_reserved: units,
            })
            .await;
        (customer, booking)
    }

    async fn remaining(&self, customer: UserId) -> Vec<u32> {
        self.inventory
            .lots(customer)
            .await
            .unwrap()
            .iter()
            .map(|lot| lot.remaining_units)
            .collect()
    }
}

fn current_period() -> SettlementPeriod {
    SettlementPeriod::for_instant(Utc::now(), Timezone::default()).unwrap()
}

// ============================================================================
// Settlement Scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_normal_session_consumes_everything() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (_, booking) = fx.booking(counselor, &[2], 2).await;
        let session = FinishedSession::new(SessionId::new(), booking, 1800, EndReason::Normal);

        let tx = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(tx.settlement_type, SettlementType::Normal);
        assert_eq!((tx.credits_consumed, tx.credits_refunded), (2, 0));
        assert_eq!(tx.gross_amount(), 30_000);
        assert_eq!(tx.platform_fee, 6_000);
        assert_eq!(tx.counselor_earning, 24_000);

        let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
        assert!(logs.iter().all(|log| log.status == UsageStatus::Consumed));
        assert!(logs.iter().all(|log| log.actual_minutes == Some(30) && log.consumed_at.is_some()));

        let month = fx
            .engine
            .counselor_settlement(counselor, current_period())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(month.status, SettlementStatus::Pending);
        assert_eq!(month.total_sessions, 1);
        assert_eq!(month.total_duration_min, 30);
        assert_eq!(month.gross_amount, 30_000);
        assert_eq!(month.commission_amount, 6_000);
        assert_eq!(month.net_amount, 24_000);
    }

    #[tokio::test]
    async fn test_short_network_drop_refunds_everything() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[2], 2).await;
        let session = FinishedSession::new(SessionId::new(), booking, 300, EndReason::Network);

        let tx = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(tx.settlement_type, SettlementType::NetworkShort);
        assert_eq!((tx.credits_consumed, tx.credits_refunded), (0, 2));
        assert_eq!((tx.counselor_earning, tx.platform_fee), (0, 0));
        assert_eq!(fx.remaining(customer).await, vec![2]);

        let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
        assert_eq!(logs[0].status, UsageStatus::Released);
        assert_eq!(logs[0].refunded_units, 2);
        assert_eq!(logs[0].actual_minutes, Some(5));
    }

    #[tokio::test]
    async fn test_long_network_drop_refunds_unused_units() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[3], 3).await;
        let session = FinishedSession::new(SessionId::new(), booking, 900, EndReason::Network);

        let tx = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(tx.settlement_type, SettlementType::NetworkPartial);
        assert_eq!((tx.credits_consumed, tx.credits_refunded), (1, 2));
        assert_eq!(tx.gross_amount(), 15_000);
        assert_eq!(tx.counselor_earning, 12_000);
        assert_eq!(fx.remaining(customer).await, vec![2]);

        let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
        assert_eq!(logs[0].status, UsageStatus::PartialRefund);
        assert_eq!(logs[0].refunded_units, 2);
    }

    #[tokio::test]
    async fn test_partial_refund_unwinds_newest_lot_first() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[2, 2], 3).await;
        assert_eq!(fx.remaining(customer).await, vec![0, 1]);

        let session = FinishedSession::new(SessionId::new(), booking, 900, EndReason::Network);
        fx.engine.settle_session(&session).await.unwrap();

        let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
        assert_eq!(logs[0].status, UsageStatus::PartialRefund);
        assert_eq!(logs[0].refunded_units, 1);
        assert_eq!(logs[1].status, UsageStatus::Released);
        assert_eq!(logs[1].refunded_units, 1);
        assert_eq!(fx.remaining(customer).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_admin_end_refunds_everything() {
        let fx = fixture();
        let (customer, booking) = fx.booking(CounselorId::new(), &[1, 1], 2).await;
        let session = FinishedSession::new(SessionId::new(), booking, 3000, EndReason::Admin);

        let tx = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(tx.settlement_type, SettlementType::AdminRefund);
        assert_eq!(tx.credits_refunded, 2);
        assert_eq!(fx.remaining(customer).await, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_unknown_reason_falls_back_to_consumption() {
        let fx = fixture();
        let (_, booking) = fx.booking(CounselorId::new(), &[1], 1).await;
        let session = FinishedSession::new(SessionId::new(), booking, 120, "COUNSELOR_LEFT");

        let tx = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(tx.settlement_type, SettlementType::Other);
        assert_eq!(tx.credits_consumed, 1);
    }
}

// ============================================================================
// Exactly Once
// ============================================================================

mod exactly_once {
    use super::*;

    #[tokio::test]
    async fn test_second_settlement_returns_first_record() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[3], 3).await;
        let session = FinishedSession::new(SessionId::new(), booking, 900, EndReason::Network);

        let first = fx.engine.settle_session(&session).await.unwrap();
        let second = fx.engine.settle_session(&session).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.remaining(customer).await, vec![2]);
        let month = fx
            .engine
            .counselor_settlement(counselor, current_period())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(month.total_sessions, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settlements_apply_once() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[2], 2).await;
        let session = FinishedSession::new(SessionId::new(), booking, 300, EndReason::Network);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = fx.engine.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move { engine.settle_session(&session).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        assert_eq!(fx.remaining(customer).await, vec![2]);
        let month = fx
            .engine
            .counselor_settlement(counselor, current_period())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(month.total_sessions, 1);
    }

    #[tokio::test]
    async fn test_settled_booking_cannot_be_released() {
        let fx = fixture();
        let (customer, booking) = fx.booking(CounselorId::new(), &[2], 2).await;
        let session = FinishedSession::new(SessionId::new(), booking, 1800, EndReason::Normal);
        fx.engine.settle_session(&session).await.unwrap();

        assert!(fx.inventory.release(booking).await.is_err());
        assert_eq!(fx.remaining(customer).await, vec![0]);
    }
}

// ============================================================================
// Failures
// ============================================================================

mod insert_race {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use core_kernel::{
        DomainPort, HealthCheckResult, HealthCheckable, PortError, SettlementTransactionId,
    };
    use domain_credit::CreditLock;
    use domain_settlement::{
        CounselorSettlement, SettlementKey, SettlementScope, SettlementStore, SettlementTransaction,
    };

    /// Store where another worker's row for the session lands just before
    /// this worker's insert, which then fails with a unique violation
    struct RacedStore {
        inner: InMemorySettlementStore,
        winner: Arc<Mutex<Option<SettlementTransaction>>>,
    }

    struct RacedScope {
        inner: Box<dyn SettlementScope>,
        winner: Arc<Mutex<Option<SettlementTransaction>>>,
    }

    impl DomainPort for RacedStore {}

    #[async_trait]
    impl HealthCheckable for RacedStore {
        async fn health_check(&self) -> HealthCheckResult {
            self.inner.health_check().await
        }
    }

    #[async_trait]
    impl SettlementStore for RacedStore {
        async fn begin(&self, key: SettlementKey) -> Result<Box<dyn SettlementScope>, PortError> {
            Ok(Box::new(RacedScope {
                inner: self.inner.begin(key).await?,
                winner: self.winner.clone(),
            }))
        }

        async fn find_by_session(&self, session_id: SessionId) -> Result<Option<SettlementTransaction>, PortError> {
            if let Some(winner) = self.winner.lock().unwrap().clone() {
                return Ok(Some(winner));
            }
            self.inner.find_by_session(session_id).await
        }

        async fn counselor_settlement(
            &self,
            counselor_id: CounselorId,
            period: SettlementPeriod,
        ) -> Result<Option<CounselorSettlement>, PortError> {
            self.inner.counselor_settlement(counselor_id, period).await
        }

        async fn counselor_settlements(&self, counselor_id: CounselorId) -> Result<Vec<CounselorSettlement>, PortError> {
            self.inner.counselor_settlements(counselor_id).await
        }

        async fn session_settlements(
            &self,
            counselor_id: CounselorId,
            period: SettlementPeriod,
        ) -> Result<Vec<SettlementTransaction>, PortError> {
            self.inner.session_settlements(counselor_id, period).await
        }

        async fn update_status(
            &self,
            settlement: &CounselorSettlement,
            expected: SettlementStatus,
        ) -> Result<(), PortError> {
            self.inner.update_status(settlement, expected).await
        }
    }

    #[async_trait]
    impl SettlementScope for RacedScope {
        async fn existing(&mut self) -> Result<Option<SettlementTransaction>, PortError> {
            self.inner.existing().await
        }

        fn credits(&mut self) -> &mut dyn CreditLock {
            self.inner.credits()
        }

        async fn counselor_settlement(&mut self) -> Result<Option<CounselorSettlement>, PortError> {
            self.inner.counselor_settlement().await
        }

        async fn save_counselor_settlement(&mut self, settlement: &CounselorSettlement) -> Result<(), PortError> {
            self.inner.save_counselor_settlement(settlement).await
        }

        async fn insert_transaction(&mut self, transaction: &SettlementTransaction) -> Result<(), PortError> {
            let winner = SettlementTransaction {
                id: SettlementTransactionId::new_v7(),
                ..transaction.clone()
            };
            *self.winner.lock().unwrap() = Some(winner);
            Err(PortError::conflict("duplicate key value violates settlement_transactions_session_id_key"))
        }

        async fn commit(self: Box<Self>) -> Result<(), PortError> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn test_conflicting_insert_returns_stored_record() {
        let credits = InMemoryCreditStore::new();
        let inventory = CreditInventory::new(Arc::new(credits.clone()));
        let bookings = Arc::new(InMemoryBookingDirectory::new());
        let winner = Arc::new(Mutex::new(None));
        let store = RacedStore {
            inner: InMemorySettlementStore::new(credits.clone()),
            winner: winner.clone(),
        };
        let engine = SettlementEngine::new(Arc::new(store), bookings.clone(), SettlementPolicy::default());

        let customer = UserId::new();
        let counselor = CounselorId::new();
        let booking = BookingId::new();
        inventory
            .add_lot(customer, "pack", 3, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        inventory.reserve(customer, booking, 3).await.unwrap();
        bookings
            .insert(BookingContext {
                booking_id: booking,
                customer_id: customer,
                counselor_id: counselor,
                credits_reserved: 3,
            })
            .await;

        let session = FinishedSession::new(SessionId::new(), booking, 300, EndReason::Network);
        let settled = engine.settle_session(&session).await.unwrap();

        let stored = winner.lock().unwrap().clone().unwrap();
        assert_eq!(settled, stored);

        // the losing unit of work rolled back: nothing restored, no aggregate
        let lots = inventory.lots(customer).await.unwrap();
        assert_eq!(lots[0].remaining_units, 0);
        let usage = inventory.usage_for_booking(booking).await.unwrap();
        assert!(usage.iter().all(|log| log.status == UsageStatus::Reserved));
        assert!(engine
            .counselor_settlement(counselor, current_period())
            .await
            .unwrap()
            .is_none());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_unknown_booking_is_not_found() {
        let fx = fixture();
        let session = FinishedSession::new(SessionId::new(), BookingId::new(), 60, EndReason::Normal);

        let err = fx.engine.settle_session(&session).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_negative_duration_rejected() {
        let fx = fixture();
        let (_, booking) = fx.booking(CounselorId::new(), &[1], 1).await;
        let session = FinishedSession::new(SessionId::new(), booking, -30, EndReason::Normal);

        let err = fx.engine.settle_session(&session).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_log_mismatch_reported() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (customer, booking) = fx.booking(counselor, &[3], 2).await;
        fx.bookings
            .insert(BookingContext {
                booking_id: booking,
                customer_id: customer,
                counselor_id: counselor,
                credits_reserved: 3,
            })
            .await;
        let session = FinishedSession::new(SessionId::new(), booking, 1800, EndReason::Normal);

        let err = fx.engine.settle_session(&session).await.unwrap_err();
        assert!(matches!(err, SettlementError::ConservationViolation { .. }));
        assert!(fx.engine.settlement_for_session(session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_lot_is_not_skipped() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let customer = UserId::new();
        let booking = BookingId::new();

        let mut lock = fx.credits.lock_owner(customer).await.unwrap();
        lock.insert_usage(&CreditUsageLog::reserved(CreditLotId::new(), booking, 1))
            .await
            .unwrap();
        lock.commit().await.unwrap();
        fx.bookings
            .insert(BookingContext {
                booking_id: booking,
                customer_id: customer,
                counselor_id: counselor,
                credits_reserved: 1,
            })
            .await;

        let session = FinishedSession::new(SessionId::new(), booking, 60, EndReason::Network);
        let err = fx.engine.settle_session(&session).await.unwrap_err();

        assert!(matches!(err, SettlementError::NotFound { entity: "CreditLot", .. }));
        let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
        assert_eq!(logs[0].status, UsageStatus::Reserved);
        assert!(fx
            .engine
            .counselor_settlement(counselor, current_period())
            .await
            .unwrap()
            .is_none());
    }
}

// ============================================================================
// Monthly Aggregate
// ============================================================================

mod monthly {
    use super::*;

    #[tokio::test]
    async fn test_sessions_accumulate_within_month() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();

        let (_, first) = fx.booking(counselor, &[2], 2).await;
        let (_, second) = fx.booking(counselor, &[3], 3).await;
        fx.engine
            .settle_session_at(&FinishedSession::new(SessionId::new(), first, 1750, EndReason::Normal), at)
            .await
            .unwrap();
        fx.engine
            .settle_session_at(&FinishedSession::new(SessionId::new(), second, 900, EndReason::Network), at)
            .await
            .unwrap();

        let may = SettlementPeriod::month(2024, 5).unwrap();
        let month = fx.engine.counselor_settlement(counselor, may).await.unwrap().unwrap();
        assert_eq!(month.total_sessions, 2);
        assert_eq!(month.total_duration_min, 30 + 15);
        assert_eq!(month.gross_amount, 45_000);
        assert_eq!(month.commission_amount, 9_000);
        assert_eq!(month.net_amount, 36_000);

        let sessions = fx.engine.session_settlements(counselor, may).await.unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_months_are_kept_apart() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (_, may_booking) = fx.booking(counselor, &[1], 1).await;
        let (_, june_booking) = fx.booking(counselor, &[1], 1).await;

        fx.engine
            .settle_session_at(
                &FinishedSession::new(SessionId::new(), june_booking, 1800, EndReason::Normal),
                Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        fx.engine
            .settle_session_at(
                &FinishedSession::new(SessionId::new(), may_booking, 1800, EndReason::Normal),
                Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();

        let months = fx.engine.counselor_settlements(counselor).await.unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].period, SettlementPeriod::month(2024, 5).unwrap());
        assert_eq!(months[1].period, SettlementPeriod::month(2024, 6).unwrap());
        assert!(months.iter().all(|m| m.total_sessions == 1));
    }

    #[tokio::test]
    async fn test_month_resolved_in_operating_timezone() {
        let seoul: Timezone = "Asia/Seoul".parse().unwrap();
        let fx = fixture_with(SettlementPolicy::default().with_timezone(seoul));
        let counselor = CounselorId::new();
        let (_, booking) = fx.booking(counselor, &[1], 1).await;

        // 2024-05-31 16:00 UTC is already June 1st in Seoul
        let at = Utc.with_ymd_and_hms(2024, 5, 31, 16, 0, 0).unwrap();
        let tx = fx
            .engine
            .settle_session_at(&FinishedSession::new(SessionId::new(), booking, 1800, EndReason::Normal), at)
            .await
            .unwrap();

        let june = SettlementPeriod::month(2024, 6).unwrap();
        assert_eq!(tx.period_start, june.start());
        assert!(fx.engine.counselor_settlement(counselor, june).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_confirm_then_pay() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (_, booking) = fx.booking(counselor, &[2], 2).await;
        fx.engine
            .settle_session(&FinishedSession::new(SessionId::new(), booking, 1800, EndReason::Normal))
            .await
            .unwrap();
        let period = current_period();

        let err = fx.engine.mark_settlement_paid(counselor, period).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidStateTransition { .. }));

        let confirmed = fx.engine.confirm_settlement(counselor, period).await.unwrap();
        assert_eq!(confirmed.status, SettlementStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        let paid = fx.engine.mark_settlement_paid(counselor, period).await.unwrap();
        assert_eq!(paid.status, SettlementStatus::Paid);

        let stored = fx.engine.counselor_settlement(counselor, period).await.unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Paid);
        assert!(stored.paid_at.is_some());
        assert_eq!(stored.net_amount, 24_000);
    }

    #[tokio::test]
    async fn test_confirm_unknown_month_is_not_found() {
        let fx = fixture();
        let err = fx
            .engine
            .confirm_settlement(CounselorId::new(), current_period())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_confirmed_month_accepts_no_sessions() {
        let fx = fixture();
        let counselor = CounselorId::new();
        let (_, first) = fx.booking(counselor, &[1], 1).await;
        let (customer, second) = fx.booking(counselor, &[1], 1).await;
        fx.engine
            .settle_session(&FinishedSession::new(SessionId::new(), first, 1800, EndReason::Normal))
            .await
            .unwrap();
        fx.engine.confirm_settlement(counselor, current_period()).await.unwrap();

        let session = FinishedSession::new(SessionId::new(), second, 300, EndReason::Network);
        let err = fx.engine.settle_session(&session).await.unwrap_err();

        assert!(matches!(err, SettlementError::PeriodClosed { .. }));
        assert_eq!(fx.remaining(customer).await, vec![0]);
        assert!(fx.engine.settlement_for_session(session.session_id).await.unwrap().is_none());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn end_reason() -> impl Strategy<Value = EndReason> {
    prop_oneof![
        Just(EndReason::Normal),
        Just(EndReason::Timeout),
        Just(EndReason::Network),
        Just(EndReason::Admin),
        "[A-Z_]{1,12}".prop_map(|s| EndReason::Other(format!("X_{s}"))),
    ]
}

proptest! {
    #[test]
    fn prop_classification_conserves_units(
        reason in end_reason(),
        duration in 0u64..20_000,
        reserved in 0u32..10,
    ) {
        let outcome = classify(&reason, duration, reserved);
        prop_assert_eq!(outcome.consumed + outcome.refunded, reserved);
    }

    #[test]
    fn prop_settlement_conserves_units(
        lots in prop::collection::vec(1u32..4, 1..4),
        reason in end_reason(),
        duration in 0i64..10_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let fx = fixture();
            let total: u32 = lots.iter().sum();
            let (customer, booking) = fx.booking(CounselorId::new(), &lots, total).await;

            let tx = fx
                .engine
                .settle_session(&FinishedSession::new(SessionId::new(), booking, duration, reason))
                .await
                .unwrap();

            prop_assert_eq!(tx.credits_consumed + tx.credits_refunded, total);
            let remaining: u32 = fx.remaining(customer).await.iter().sum();
            prop_assert_eq!(remaining, tx.credits_refunded);

            let logs = fx.inventory.usage_for_booking(booking).await.unwrap();
            let refunded: u32 = logs.iter().map(|log| log.refunded_units).sum();
            prop_assert_eq!(refunded, tx.credits_refunded);
            prop_assert!(logs.iter().all(|log| log.refunded_units <= log.units_used));
            prop_assert_eq!(tx.counselor_earning + tx.platform_fee, 15_000 * i64::from(tx.credits_consumed));
            Ok(())
        })?;
    }
}
