//! Pre-built Test Fixtures
//!
//! Consistent, predictable data for unit and integration tests.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{
    Cash, CommissionRate, CounselorId, SettlementPeriod, Timezone, UserId, CREDIT_UNIT_PRICE,
};
use domain_credit::CreditProduct;
use domain_settlement::SettlementPolicy;
use uuid::Uuid;

/// Credit products sold in tests
pub struct ProductFixtures;

impl ProductFixtures {
    /// One unit, one thirty-minute slot
    pub fn single() -> CreditProduct {
        CreditProduct::new("single-30", 1, CREDIT_UNIT_PRICE)
    }

    /// Two units at list price
    pub fn double() -> CreditProduct {
        CreditProduct::new("double-60", 2, 2 * CREDIT_UNIT_PRICE)
    }

    /// Four units at a 10% discount
    pub fn bundle() -> CreditProduct {
        CreditProduct::new("bundle-120", 4, 54_000)
    }
}

/// Cash amounts
pub struct CashFixtures;

impl CashFixtures {
    /// A typical wallet top-up
    pub fn top_up() -> Cash {
        100_000
    }

    /// Enough to buy any fixture product several times
    pub fn large_top_up() -> Cash {
        1_000_000
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Middle of March 2025, UTC
    pub fn mid_march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    /// Middle of April 2025, UTC
    pub fn mid_april() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 15, 12, 0, 0).unwrap()
    }

    /// 2025-03-31 16:30 UTC, which is already April 1st in Seoul
    pub fn march_end_utc_april_in_seoul() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 31, 16, 30, 0).unwrap()
    }

    pub fn march_2025() -> SettlementPeriod {
        SettlementPeriod::month(2025, 3).unwrap()
    }

    pub fn april_2025() -> SettlementPeriod {
        SettlementPeriod::month(2025, 4).unwrap()
    }

    pub fn seoul() -> Timezone {
        "Asia/Seoul".parse().unwrap()
    }
}

/// Settlement policies
pub struct PolicyFixtures;

impl PolicyFixtures {
    /// List price, 20% commission, months cut in UTC
    pub fn standard() -> SettlementPolicy {
        SettlementPolicy::default()
    }

    /// Standard pricing with months cut in Asia/Seoul
    pub fn seoul() -> SettlementPolicy {
        SettlementPolicy::default().with_timezone(TemporalFixtures::seoul())
    }

    pub fn with_commission_percent(percent: u32) -> SettlementPolicy {
        SettlementPolicy::default().with_commission_rate(CommissionRate::from_percent(percent).unwrap())
    }
}

/// Fixed identifiers for readable test output
pub struct IdFixtures;

impl IdFixtures {
    pub fn customer() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x0193_0000_0000_7000_8000_0000_0000_0001))
    }

    pub fn other_customer() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x0193_0000_0000_7000_8000_0000_0000_0002))
    }

    pub fn counselor() -> CounselorId {
        CounselorId::from_uuid(Uuid::from_u128(0x0193_0000_0000_7000_8000_0000_0000_0101))
    }

    pub fn other_counselor() -> CounselorId {
        CounselorId::from_uuid(Uuid::from_u128(0x0193_0000_0000_7000_8000_0000_0000_0102))
    }
}
