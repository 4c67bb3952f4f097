//! Booking directory over the `bookings` projection

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use core_kernel::{BookingId, CounselorId, DomainPort, HealthCheckResult, HealthCheckable, PortError, UserId};
use domain_settlement::{BookingContext, BookingDirectory};

use super::{probe, units_from_db, units_to_db};
use crate::error::port_error;

#[derive(Debug, FromRow)]
struct BookingRow {
    booking_id: Uuid,
    customer_id: Uuid,
    counselor_id: Uuid,
    credits_reserved: i32,
}

impl TryFrom<BookingRow> for BookingContext {
    type Error = PortError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(BookingContext {
            booking_id: BookingId::from_uuid(row.booking_id),
            customer_id: UserId::from_uuid(row.customer_id),
            counselor_id: CounselorId::from_uuid(row.counselor_id),
            credits_reserved: units_from_db(row.credits_reserved, "credits_reserved")?,
        })
    }
}

/// Reads booking facts written by the booking service
#[derive(Debug, Clone)]
pub struct PgBookingDirectory {
    pool: PgPool,
}

impl PgBookingDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes a booking row; used by seeding and tests
    pub async fn upsert(&self, booking: &BookingContext) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO bookings (booking_id, customer_id, counselor_id, credits_reserved) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (booking_id) DO UPDATE SET \
                 customer_id = EXCLUDED.customer_id, \
                 counselor_id = EXCLUDED.counselor_id, \
                 credits_reserved = EXCLUDED.credits_reserved",
        )
        .bind(Uuid::from(booking.booking_id))
        .bind(Uuid::from(booking.customer_id))
        .bind(Uuid::from(booking.counselor_id))
        .bind(units_to_db(booking.credits_reserved)?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }
}

impl DomainPort for PgBookingDirectory {}

#[async_trait]
impl HealthCheckable for PgBookingDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-bookings").await
    }
}

#[async_trait]
impl BookingDirectory for PgBookingDirectory {
    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<BookingContext>, PortError> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT booking_id, customer_id, counselor_id, credits_reserved \
             FROM bookings WHERE booking_id = $1",
        )
        .bind(Uuid::from(booking_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        row.map(BookingContext::try_from).transpose()
    }
}
