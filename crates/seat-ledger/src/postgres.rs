use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use crate::{
    LedgerError, LedgerSnapshot, ReleaseOutcome, Reservation, ReservationId, Result, Revision,
    SeatId, ZoneName,
    store::{SeatLedger, find_conflicts, normalize_request},
};

/// Key for the transaction-scoped advisory lock that serializes ledger writers.
const LEDGER_LOCK_KEY: i64 = 0x5345_4154;

/// Converts a page offset or limit to a SQL bound, saturating at `i64::MAX`.
fn page_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed seat ledger.
///
/// Each mutation runs in its own transaction holding a transaction-scoped
/// advisory lock, so the held-seat scan and the write that follows it are
/// one serialized unit across every process sharing the database.
#[derive(Clone)]
pub struct PostgresSeatLedger {
    pool: PgPool,
}

impl PostgresSeatLedger {
    /// Creates a new PostgreSQL seat ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let seats: Json<Vec<SeatId>> = row.try_get("seat_identifiers")?;

        Ok(Reservation {
            id: ReservationId::new(row.try_get("id")?),
            zone: ZoneName::new(row.try_get::<String, _>("zone")?),
            seat_ids: seats.0,
            reserved_at: row.try_get("reserved_at")?,
        })
    }

    async fn lock_writers(conn: &mut PgConnection) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_LOCK_KEY)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn bump_revision(conn: &mut PgConnection) -> Result<Revision> {
        let revision: i64 = sqlx::query_scalar(
            "UPDATE ledger_revision SET revision = revision + 1 WHERE id = 1 RETURNING revision",
        )
        .fetch_one(conn)
        .await?;
        Ok(Revision::new(revision))
    }

    async fn load_held(conn: &mut PgConnection) -> Result<BTreeSet<SeatId>> {
        let rows: Vec<Json<Vec<SeatId>>> =
            sqlx::query_scalar("SELECT seat_identifiers FROM reservations")
                .fetch_all(conn)
                .await?;

        Ok(rows.into_iter().flat_map(|seats| seats.0).collect())
    }

    async fn load_all(conn: &mut PgConnection) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, zone, seat_identifiers, reserved_at
            FROM reservations
            ORDER BY id ASC
            "#,
        )
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}

#[async_trait]
impl SeatLedger for PostgresSeatLedger {
    #[tracing::instrument(skip(self, zone, seat_ids), fields(zone = %zone, seats = seat_ids.len()))]
    async fn reserve(&self, zone: ZoneName, seat_ids: Vec<SeatId>) -> Result<Reservation> {
        let seat_ids = normalize_request(&zone, seat_ids)?;

        let mut tx = self.pool.begin().await?;
        Self::lock_writers(&mut tx).await?;

        let held = Self::load_held(&mut tx).await?;
        let conflicts = find_conflicts(&held, &seat_ids);
        if !conflicts.is_empty() {
            // Dropping the transaction rolls it back and frees the lock
            return Err(LedgerError::Conflict { seats: conflicts });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO reservations (zone, seat_identifiers)
            VALUES ($1, $2)
            RETURNING id, zone, seat_identifiers, reserved_at
            "#,
        )
        .bind(zone.as_str())
        .bind(Json(&seat_ids))
        .fetch_one(&mut *tx)
        .await?;
        let reservation = Self::row_to_reservation(row)?;

        let revision = Self::bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::debug!(reservation_id = %reservation.id, %revision, "reservation committed");
        Ok(reservation)
    }

    #[tracing::instrument(skip(self, seat_id), fields(seat = %seat_id))]
    async fn release_seat(&self, seat_id: &SeatId) -> Result<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;
        Self::lock_writers(&mut tx).await?;

        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, zone, seat_identifiers, reserved_at
            FROM reservations
            WHERE seat_identifiers @> jsonb_build_array($1::text)
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(seat_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(LedgerError::SeatNotReserved(seat_id.clone()));
        };
        let mut reservation = Self::row_to_reservation(row)?;
        reservation.seat_ids.retain(|s| s != seat_id);

        let reservation_deleted = reservation.seat_ids.is_empty();
        if reservation_deleted {
            sqlx::query("DELETE FROM reservations WHERE id = $1")
                .bind(reservation.id.as_i64())
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE reservations SET seat_identifiers = $2 WHERE id = $1")
                .bind(reservation.id.as_i64())
                .bind(Json(&reservation.seat_ids))
                .execute(&mut *tx)
                .await?;
        }

        Self::bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(ReleaseOutcome {
            seat_id: seat_id.clone(),
            reservation_id: reservation.id,
            reservation_deleted,
        })
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, zone, seat_identifiers, reserved_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn list_all(&self, offset: usize, limit: usize) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, zone, seat_identifiers, reserved_at
            FROM reservations
            ORDER BY id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page_bound(limit))
        .bind(page_bound(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn list_by_zone(&self, zone: &ZoneName) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, zone, seat_identifiers, reserved_at
            FROM reservations
            WHERE zone = $1
            ORDER BY id ASC
            "#,
        )
        .bind(zone.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn held_seat_ids(&self) -> Result<BTreeSet<SeatId>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_held(&mut conn).await
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let revision: i64 = sqlx::query_scalar("SELECT revision FROM ledger_revision WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        let reservations = Self::load_all(&mut tx).await?;
        tx.commit().await?;

        Ok(LedgerSnapshot {
            revision: Revision::new(revision),
            reservations,
        })
    }
}
