//! Test Data Builders
//!
//! Builders let a test name only the fields it cares about and take defaults
//! for everything else.

use chrono::{DateTime, Duration, Utc};
use core_kernel::{BookingId, CounselorId, CreditLotId, SessionId, UserId};
use domain_credit::CreditLot;
use domain_settlement::{BookingContext, EndReason, FinishedSession};

use crate::fixtures::{IdFixtures, TemporalFixtures};

/// Builder for the booking facts settlement reads
pub struct BookingBuilder {
    booking_id: BookingId,
    customer_id: UserId,
    counselor_id: CounselorId,
    credits_reserved: u32,
}

impl Default for BookingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingBuilder {
    pub fn new() -> Self {
        Self {
            booking_id: BookingId::new(),
            customer_id: IdFixtures::customer(),
            counselor_id: IdFixtures::counselor(),
            credits_reserved: 1,
        }
    }

    pub fn with_booking_id(mut self, booking_id: BookingId) -> Self {
        self.booking_id = booking_id;
        self
    }

    pub fn for_customer(mut self, customer_id: UserId) -> Self {
        self.customer_id = customer_id;
        self
    }

    pub fn with_counselor(mut self, counselor_id: CounselorId) -> Self {
        self.counselor_id = counselor_id;
        self
    }

    pub fn reserving(mut self, units: u32) -> Self {
        self.credits_reserved = units;
        self
    }

    pub fn build(self) -> BookingContext {
        BookingContext {
            booking_id: self.booking_id,
            customer_id: self.customer_id,
            counselor_id: self.counselor_id,
            credits_reserved: self.credits_reserved,
        }
    }
}

/// Builder for finished sessions
///
/// Defaults to a full thirty-minute session that ended normally.
pub struct SessionBuilder {
    session_id: SessionId,
    booking_id: BookingId,
    duration_sec: i64,
    end_reason: EndReason,
}

impl SessionBuilder {
    pub fn for_booking(booking_id: BookingId) -> Self {
        Self {
            session_id: SessionId::new(),
            booking_id,
            duration_sec: 30 * 60,
            end_reason: EndReason::Normal,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn lasting_secs(mut self, duration_sec: i64) -> Self {
        self.duration_sec = duration_sec;
        self
    }

    pub fn lasting_minutes(self, minutes: i64) -> Self {
        self.lasting_secs(minutes * 60)
    }

    pub fn ended_by(mut self, reason: impl Into<EndReason>) -> Self {
        self.end_reason = reason.into();
        self
    }

    pub fn network_drop(self) -> Self {
        self.ended_by(EndReason::Network)
    }

    pub fn timed_out(self) -> Self {
        self.ended_by(EndReason::Timeout)
    }

    pub fn admin_refund(self) -> Self {
        self.ended_by(EndReason::Admin)
    }

    pub fn build(self) -> FinishedSession {
        FinishedSession::new(self.session_id, self.booking_id, self.duration_sec, self.end_reason)
    }
}

/// Builder for credit lots with controlled purchase times
pub struct CreditLotBuilder {
    user_id: UserId,
    product_id: String,
    total_units: u32,
    remaining_units: Option<u32>,
    purchased_at: DateTime<Utc>,
}

impl Default for CreditLotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CreditLotBuilder {
    pub fn new() -> Self {
        Self {
            user_id: IdFixtures::customer(),
            product_id: "single-30".to_string(),
            total_units: 1,
            remaining_units: None,
            purchased_at: TemporalFixtures::mid_march(),
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self
    }

    pub fn with_units(mut self, units: u32) -> Self {
        self.total_units = units;
        self
    }

    /// Leaves only `units` unused; defaults to a full lot
    pub fn with_remaining(mut self, units: u32) -> Self {
        self.remaining_units = Some(units);
        self
    }

    pub fn purchased_at(mut self, at: DateTime<Utc>) -> Self {
        self.purchased_at = at;
        self
    }

    /// Shifts the purchase time by whole days from the default
    pub fn purchased_days_later(mut self, days: i64) -> Self {
        self.purchased_at += Duration::days(days);
        self
    }

    pub fn build(self) -> CreditLot {
        let mut lot = CreditLot::new(self.user_id, self.product_id, self.total_units, self.purchased_at)
            .expect("credit lot fixture must hold at least one unit");
        if let Some(remaining) = self.remaining_units {
            assert!(remaining <= lot.total_units, "remaining units exceed total");
            lot.remaining_units = remaining;
        }
        lot
    }

    /// Builds the lot with a fixed id
    pub fn build_with_id(self, id: CreditLotId) -> CreditLot {
        let mut lot = self.build();
        lot.id = id;
        lot
    }
}
