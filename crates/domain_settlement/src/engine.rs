//! Settlement Engine
//!
//! Turns a finished session into final credit consumption, counselor
//! earnings and a monthly aggregate update, at most once per session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use core_kernel::{CounselorId, EarningsSplit, SessionId, SettlementPeriod, SettlementTransactionId};

use crate::counselor::{CounselorSettlement, SettlementStatus};
use crate::error::{SettlementError, SettlementResult};
use crate::outcome::classify;
use crate::policy::SettlementPolicy;
use crate::ports::{BookingDirectory, SettlementKey, SettlementStore};
use crate::reconcile::refund_per_log;
use crate::session::{billable_minutes, FinishedSession};
use crate::settlement::SettlementTransaction;

/// Settlement engine
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn SettlementStore>,
    bookings: Arc<dyn BookingDirectory>,
    policy: SettlementPolicy,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        bookings: Arc<dyn BookingDirectory>,
        policy: SettlementPolicy,
    ) -> Self {
        Self { store, bookings, policy }
    }

    pub fn policy(&self) -> &SettlementPolicy {
        &self.policy
    }

    /// Settles a finished session now
    pub async fn settle_session(&self, session: &FinishedSession) -> SettlementResult<SettlementTransaction> {
        self.settle_session_at(session, Utc::now()).await
    }

    /// Settles a finished session as of `settled_at`
    ///
    /// A session that was already settled returns its existing record and
    /// changes nothing. Otherwise, in one unit of work:
    ///
    /// - every usage log of the booking is reconciled and refunded units go
    ///   back to their lots
    /// - the counselor's aggregate for the month containing `settled_at` is
    ///   opened if needed and updated
    /// - the settlement record is written
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a negative duration
    /// - `NotFound` if the booking or a credit lot is missing
    /// - `ConservationViolation` if the usage logs do not add up to the
    ///   booking's reserved credits
    /// - `PeriodClosed` if the month was already confirmed
    #[instrument(
        skip(self, session),
        fields(
            session_id = %session.session_id,
            booking_id = %session.booking_id,
            end_reason = %session.end_reason,
        )
    )]
    pub async fn settle_session_at(
        &self,
        session: &FinishedSession,
        settled_at: DateTime<Utc>,
    ) -> SettlementResult<SettlementTransaction> {
        let duration_sec = session.checked_duration()?;

        if let Some(existing) = self.store.find_by_session(session.session_id).await? {
            debug!("Session already settled");
            return Ok(existing);
        }

        let booking = self
            .bookings
            .find_booking(session.booking_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Booking", session.booking_id))?;

        let period = SettlementPeriod::for_instant(settled_at, self.policy.timezone)?;
        let key = SettlementKey {
            session_id: session.session_id,
            customer_id: booking.customer_id,
            counselor_id: booking.counselor_id,
            period,
        };

        let mut scope = self.store.begin(key).await?;
        if let Some(existing) = scope.existing().await? {
            debug!("Session settled by a concurrent worker");
            return Ok(existing);
        }

        let mut logs = scope.credits().usage_for_booking(booking.booking_id).await?;
        let logged: u64 = logs.iter().map(|log| u64::from(log.units_used)).sum();
        if logged != u64::from(booking.credits_reserved) {
            warn!(logged, reserved = booking.credits_reserved, "Usage logs disagree with booking");
            return Err(SettlementError::ConservationViolation {
                booking_id: booking.booking_id,
                message: format!(
                    "usage logs hold {} units, booking reserved {}",
                    logged, booking.credits_reserved
                ),
            });
        }
        if logs.iter().any(|log| !log.is_reserved()) {
            return Err(SettlementError::ConservationViolation {
                booking_id: booking.booking_id,
                message: "usage logs were reconciled without a settlement record".to_string(),
            });
        }

        let outcome = classify(&session.end_reason, duration_sec, booking.credits_reserved);
        let refunds = refund_per_log(&logs, outcome.refunded).ok_or_else(|| {
            SettlementError::ConservationViolation {
                booking_id: booking.booking_id,
                message: format!("cannot refund {} units", outcome.refunded),
            }
        })?;

        let actual_minutes = u32::try_from(billable_minutes(duration_sec))
            .map_err(|_| SettlementError::invalid(format!("duration out of range: {}s", duration_sec)))?;

        for (log, refund) in logs.iter_mut().zip(refunds) {
            log.settle(refund, actual_minutes, settled_at)?;
            if refund > 0 {
                let mut lot = scope
                    .credits()
                    .lot(log.credit_id)
                    .await?
                    .ok_or_else(|| SettlementError::not_found("CreditLot", log.credit_id))?;
                lot.restore(refund)?;
                scope.credits().save_lot(&lot).await?;
            }
            scope.credits().save_usage(log).await?;
        }

        let split = EarningsSplit::for_units(
            outcome.consumed,
            self.policy.unit_price,
            self.policy.commission_rate,
        )?;

        let transaction = SettlementTransaction {
            id: SettlementTransactionId::new_v7(),
            session_id: session.session_id,
            booking_id: booking.booking_id,
            customer_id: booking.customer_id,
            counselor_id: booking.counselor_id,
            credits_reserved: booking.credits_reserved,
            credits_consumed: outcome.consumed,
            credits_refunded: outcome.refunded,
            actual_duration_sec: duration_sec,
            settlement_type: outcome.settlement_type,
            counselor_earning: split.counselor_earning,
            platform_fee: split.platform_fee,
            commission_rate: self.policy.commission_rate,
            period_start: period.start(),
            settled_at,
        };

        let mut aggregate = scope.counselor_settlement().await?.unwrap_or_else(|| {
            CounselorSettlement::open(booking.counselor_id, period, self.policy.commission_rate)
        });
        aggregate.record(&transaction)?;
        scope.save_counselor_settlement(&aggregate).await?;
        // the unique session row may be rejected at insert or at commit
        let written = match scope.insert_transaction(&transaction).await {
            Ok(()) => scope.commit().await,
            Err(err) => {
                drop(scope);
                Err(err)
            }
        };

        match written {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                warn!("Settlement insert lost a race; returning the stored record");
                return self
                    .store
                    .find_by_session(session.session_id)
                    .await?
                    .ok_or_else(|| SettlementError::not_found("SettlementTransaction", session.session_id));
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            settlement_type = %transaction.settlement_type,
            consumed = transaction.credits_consumed,
            refunded = transaction.credits_refunded,
            counselor_earning = transaction.counselor_earning,
            platform_fee = transaction.platform_fee,
            "Session settled"
        );
        Ok(transaction)
    }

    pub async fn settlement_for_session(
        &self,
        session_id: SessionId,
    ) -> SettlementResult<Option<SettlementTransaction>> {
        Ok(self.store.find_by_session(session_id).await?)
    }

    pub async fn counselor_settlement(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> SettlementResult<Option<CounselorSettlement>> {
        Ok(self.store.counselor_settlement(counselor_id, period).await?)
    }

    pub async fn counselor_settlements(&self, counselor_id: CounselorId) -> SettlementResult<Vec<CounselorSettlement>> {
        Ok(self.store.counselor_settlements(counselor_id).await?)
    }

    pub async fn session_settlements(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> SettlementResult<Vec<SettlementTransaction>> {
        Ok(self.store.session_settlements(counselor_id, period).await?)
    }

    /// PENDING → CONFIRMED
    #[instrument(skip(self))]
    pub async fn confirm_settlement(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> SettlementResult<CounselorSettlement> {
        self.advance(counselor_id, period, SettlementStatus::Confirmed).await
    }

    /// CONFIRMED → PAID
    #[instrument(skip(self))]
    pub async fn mark_settlement_paid(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> SettlementResult<CounselorSettlement> {
        self.advance(counselor_id, period, SettlementStatus::Paid).await
    }

    async fn advance(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
        target: SettlementStatus,
    ) -> SettlementResult<CounselorSettlement> {
        let mut settlement = self
            .store
            .counselor_settlement(counselor_id, period)
            .await?
            .ok_or_else(|| SettlementError::not_found("CounselorSettlement", format!("{}/{}", counselor_id, period)))?;

        let expected = settlement.status;
        let now = Utc::now();
        match target {
            SettlementStatus::Confirmed => settlement.confirm(now)?,
            SettlementStatus::Paid => settlement.mark_paid(now)?,
            SettlementStatus::Pending => {
                return Err(SettlementError::InvalidStateTransition { from: expected, to: target })
            }
        }

        match self.store.update_status(&settlement, expected).await {
            Ok(()) => {
                info!(status = %settlement.status, "Counselor settlement advanced");
                Ok(settlement)
            }
            Err(err) if err.is_conflict() => {
                let current = self
                    .store
                    .counselor_settlement(counselor_id, period)
                    .await?
                    .map_or(expected, |current| current.status);
                warn!(%current, "Concurrent status change");
                Err(SettlementError::InvalidStateTransition { from: current, to: target })
            }
            Err(err) => Err(err.into()),
        }
    }
}

