//! Settlement pricing policy

use serde::{Deserialize, Serialize};

use core_kernel::{Cash, CommissionRate, Timezone, CREDIT_UNIT_PRICE};

use crate::error::{SettlementError, SettlementResult};

/// Prices consumed units and decides which month a settlement lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPolicy {
    /// Cash value of one consumed credit unit
    pub unit_price: Cash,
    pub commission_rate: CommissionRate,
    /// Calendar month boundaries are computed in this timezone
    pub timezone: Timezone,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            unit_price: CREDIT_UNIT_PRICE,
            commission_rate: CommissionRate::default(),
            timezone: Timezone::default(),
        }
    }
}

impl SettlementPolicy {
    pub fn new(unit_price: Cash, commission_rate: CommissionRate, timezone: Timezone) -> SettlementResult<Self> {
        if unit_price <= 0 {
            return Err(SettlementError::invalid(format!(
                "credit unit price must be positive: {}",
                unit_price
            )));
        }
        Ok(Self {
            unit_price,
            commission_rate,
            timezone,
        })
    }

    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_commission_rate(mut self, commission_rate: CommissionRate) -> Self {
        self.commission_rate = commission_rate;
        self
    }
}
