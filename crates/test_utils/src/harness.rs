//! Wired marketplace for integration tests
//!
//! [`TestMarketplace`] assembles the ledger, credit inventory, purchase
//! service and settlement engine over one storage backend and offers the
//! customer journey as one-line steps: fund, buy, book, finish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::{BookingId, Cash, CounselorId, SessionId, UserId};
use domain_credit::{CreditInventory, CreditProduct, CreditPurchase, CreditPurchaseService, InMemoryCreditStore};
use domain_ledger::{CashTransaction, InMemoryLedgerStore, LedgerService};
use domain_settlement::{
    BookingContext, EndReason, FinishedSession, InMemoryBookingDirectory, InMemorySettlementStore,
    SettlementEngine, SettlementPolicy, SettlementResult, SettlementTransaction,
};
use infra_db::{DatabasePool, PgBookingDirectory, PgCreditStore, PgLedgerStore, PgSettlementStore};
use uuid::Uuid;

use crate::fixtures::PolicyFixtures;

/// Where bookings are registered for the settlement engine to find
enum BookingSeeder {
    Memory(Arc<InMemoryBookingDirectory>),
    Postgres(PgBookingDirectory),
}

impl BookingSeeder {
    async fn seed(&self, booking: &BookingContext) {
        match self {
            BookingSeeder::Memory(directory) => directory.insert(booking.clone()).await,
            BookingSeeder::Postgres(directory) => directory
                .upsert(booking)
                .await
                .expect("Failed to seed booking"),
        }
    }
}

/// The financial core, fully wired
pub struct TestMarketplace {
    pub ledger: LedgerService,
    pub inventory: CreditInventory,
    pub purchases: CreditPurchaseService,
    pub engine: SettlementEngine,
    bookings: BookingSeeder,
}

impl TestMarketplace {
    /// In-process stores with the standard policy
    pub fn in_memory() -> Self {
        Self::in_memory_with_policy(PolicyFixtures::standard())
    }

    pub fn in_memory_with_policy(policy: SettlementPolicy) -> Self {
        let ledger = LedgerService::new(Arc::new(InMemoryLedgerStore::new()));
        let credits = InMemoryCreditStore::new();
        let inventory = CreditInventory::new(Arc::new(credits.clone()));
        let directory = Arc::new(InMemoryBookingDirectory::new());
        let engine = SettlementEngine::new(
            Arc::new(InMemorySettlementStore::new(credits)),
            directory.clone(),
            policy,
        );

        Self {
            purchases: CreditPurchaseService::new(ledger.clone(), inventory.clone()),
            ledger,
            inventory,
            engine,
            bookings: BookingSeeder::Memory(directory),
        }
    }

    /// PostgreSQL stores on a migrated pool
    pub fn postgres(pool: DatabasePool, policy: SettlementPolicy) -> Self {
        let ledger = LedgerService::new(Arc::new(PgLedgerStore::new(pool.clone())));
        let inventory = CreditInventory::new(Arc::new(PgCreditStore::new(pool.clone())));
        let directory = PgBookingDirectory::new(pool.clone());
        let engine = SettlementEngine::new(
            Arc::new(PgSettlementStore::new(pool)),
            Arc::new(directory.clone()),
            policy,
        );

        Self {
            purchases: CreditPurchaseService::new(ledger.clone(), inventory.clone()),
            ledger,
            inventory,
            engine,
            bookings: BookingSeeder::Postgres(directory),
        }
    }

    /// Tops up the user's wallet
    pub async fn fund(&self, user_id: UserId, amount: Cash) -> CashTransaction {
        self.ledger
            .charge(user_id, amount, None)
            .await
            .expect("Failed to fund wallet")
    }

    /// Buys a product under a fresh idempotency key
    pub async fn buy(&self, user_id: UserId, product: &CreditProduct) -> CreditPurchase {
        let key = format!("purchase-{}", Uuid::now_v7());
        self.purchases
            .purchase(user_id, product, &key)
            .await
            .expect("Failed to purchase credits")
    }

    /// Reserves `units` for a new booking and registers it
    pub async fn book(&self, customer_id: UserId, counselor_id: CounselorId, units: u32) -> BookingContext {
        let booking = BookingContext {
            booking_id: BookingId::new(),
            customer_id,
            counselor_id,
            credits_reserved: units,
        };
        self.inventory
            .reserve(customer_id, booking.booking_id, units)
            .await
            .expect("Failed to reserve credits");
        self.bookings.seed(&booking).await;
        booking
    }

    /// Registers a booking without reserving anything
    pub async fn seed_booking(&self, booking: &BookingContext) {
        self.bookings.seed(booking).await;
    }

    /// Settles a new session for the booking as of `settled_at`
    pub async fn finish(
        &self,
        booking: &BookingContext,
        duration_sec: i64,
        reason: EndReason,
        settled_at: DateTime<Utc>,
    ) -> SettlementResult<SettlementTransaction> {
        let session = FinishedSession::new(SessionId::new(), booking.booking_id, duration_sec, reason);
        self.engine.settle_session_at(&session, settled_at).await
    }

    /// Unused credit units across all of the user's lots
    pub async fn remaining_units(&self, user_id: UserId) -> u64 {
        self.inventory
            .summary(user_id)
            .await
            .expect("Failed to read credit summary")
            .remaining_units
    }

    pub async fn balance(&self, user_id: UserId) -> Cash {
        self.ledger
            .balance(user_id)
            .await
            .expect("Failed to read balance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{IdFixtures, ProductFixtures, TemporalFixtures};

    #[tokio::test]
    async fn test_in_memory_journey() {
        let market = TestMarketplace::in_memory();
        let customer = UserId::new();

        market.fund(customer, 50_000).await;
        market.buy(customer, &ProductFixtures::double()).await;
        assert_eq!(market.balance(customer).await, 20_000);

        let booking = market.book(customer, IdFixtures::counselor(), 2).await;
        assert_eq!(market.remaining_units(customer).await, 0);

        let settlement = market
            .finish(&booking, 3600, EndReason::Normal, TemporalFixtures::mid_march())
            .await
            .unwrap();
        assert_eq!(settlement.credits_consumed, 2);
        assert_eq!(settlement.counselor_earning, 24_000);
    }
}
