//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need Docker, so they are
//! ignored by default. Run with:
//!
//! ```bash
//! cargo test -p seat-ledger --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use seat_ledger::{
    LedgerError, PostgresSeatLedger, ReservationQuery, Revision, SeatId, SeatLedger,
    SeatLedgerExt, ZoneName,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_reservations_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool and cleared tables
async fn get_test_ledger() -> PostgresSeatLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::raw_sql(
        "TRUNCATE TABLE reservations RESTART IDENTITY; UPDATE ledger_revision SET revision = 0;",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresSeatLedger::new(pool)
}

fn seats(ids: &[&str]) -> Vec<SeatId> {
    ids.iter().map(|s| SeatId::from(*s)).collect()
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn reserve_and_read_back() {
    let ledger = get_test_ledger().await;

    let created = ledger
        .reserve(ZoneName::from("A"), seats(&["A1", "A2"]))
        .await
        .unwrap();
    assert_eq!(created.id.as_i64(), 1);
    assert_eq!(created.seat_ids, seats(&["A1", "A2"]));

    let fetched = ledger.get(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.zone, ZoneName::from("A"));
    assert_eq!(fetched.seat_ids, created.seat_ids);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn conflicting_reserve_writes_nothing() {
    let ledger = get_test_ledger().await;
    ledger
        .reserve(ZoneName::from("A"), seats(&["A1", "A2"]))
        .await
        .unwrap();

    let result = ledger
        .reserve(ZoneName::from("B"), seats(&["A2", "A3", "A1"]))
        .await;

    match result {
        Err(LedgerError::Conflict { seats: colliding }) => {
            assert_eq!(colliding, seats(&["A1", "A2"]));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let snapshot = ledger.snapshot().await.unwrap();
    assert_eq!(snapshot.reservations.len(), 1);
    assert_eq!(snapshot.revision, Revision::new(1));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn release_updates_then_deletes() {
    let ledger = get_test_ledger().await;
    let created = ledger
        .reserve(ZoneName::from("A"), seats(&["A1", "A2"]))
        .await
        .unwrap();

    let first = ledger.release_seat(&SeatId::from("A1")).await.unwrap();
    assert!(!first.reservation_deleted);
    let remaining = ledger.get(created.id).await.unwrap().unwrap();
    assert_eq!(remaining.seat_ids, seats(&["A2"]));

    let second = ledger.release_seat(&SeatId::from("A2")).await.unwrap();
    assert!(second.reservation_deleted);
    assert_eq!(second.reservation_id, created.id);
    assert!(ledger.get(created.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn release_unknown_seat_is_not_found() {
    let ledger = get_test_ledger().await;
    ledger
        .reserve(ZoneName::from("A"), seats(&["A1"]))
        .await
        .unwrap();

    let result = ledger.release_seat(&SeatId::from("A9")).await;
    assert!(matches!(result, Err(LedgerError::SeatNotReserved(_))));
    assert_eq!(ledger.snapshot().await.unwrap().revision, Revision::new(1));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn listing_and_held_seats() {
    let ledger = get_test_ledger().await;
    ledger
        .reserve(ZoneName::from("A"), seats(&["A1"]))
        .await
        .unwrap();
    ledger
        .reserve(ZoneName::from("B"), seats(&["B2", "B1"]))
        .await
        .unwrap();
    ledger
        .reserve(ZoneName::from("A"), seats(&["A2"]))
        .await
        .unwrap();

    let page = ledger.list_all(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].zone, ZoneName::from("B"));

    let zone_a = ledger.query(ReservationQuery::for_zone("A")).await.unwrap();
    assert_eq!(zone_a.len(), 2);

    let held: Vec<_> = ledger.held_seat_ids().await.unwrap().into_iter().collect();
    assert_eq!(held, seats(&["A1", "A2", "B1", "B2"]));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn oversized_page_bounds_are_clamped() {
    let ledger = get_test_ledger().await;
    ledger
        .reserve(ZoneName::from("A"), seats(&["A1"]))
        .await
        .unwrap();

    let all = ledger.list_all(0, usize::MAX).await.unwrap();
    assert_eq!(all.len(), 1);

    let past_end = ledger.list_all(usize::MAX, 10).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn concurrent_reservations_for_the_same_seat() {
    let ledger = get_test_ledger().await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .reserve(
                    ZoneName::from("A"),
                    vec![SeatId::from("A1"), SeatId::new(format!("B{i}"))],
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerError::Conflict { seats: colliding }) => {
                assert_eq!(colliding, seats(&["A1"]));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    let snapshot = ledger.snapshot().await.unwrap();
    assert_eq!(snapshot.reservations.len(), 1);
}
