//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use ledger::{
    EntitlementStore, EntitlementStoreExt, GrantRequest, LedgerError, PostgresLedger, ProductId,
    UserId, UserStore,
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
                "../../../migrations/001_create_entitlements.sql"
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

/// Fresh ledger with its own pool and cleared tables.
async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE entitlements, processed_transactions, users")
        .execute(&pool)
        .await
        .unwrap();

    PostgresLedger::new(pool)
}

#[tokio::test]
#[serial]
async fn grant_creates_and_increments_record() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();

    let first = ledger
        .grant(GrantRequest::new(user, "batman_badge"))
        .await
        .unwrap();
    assert_eq!(first.record.quantity, 1);
    assert!(!first.duplicate);

    let second = ledger
        .grant(GrantRequest::new(user, "batman_badge").increment_by(2))
        .await
        .unwrap();
    assert_eq!(second.record.quantity, 3);
    assert_eq!(second.record.created_at, first.record.created_at);
}

#[tokio::test]
#[serial]
async fn missing_record_reads_as_zero() {
    let ledger = get_test_ledger().await;
    let quantity = ledger
        .get_quantity(UserId::new(), &ProductId::new("batman_badge"))
        .await
        .unwrap();
    assert_eq!(quantity, 0);
}

#[tokio::test]
#[serial]
async fn dedupe_key_prevents_double_grant() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();

    ledger
        .grant(GrantRequest::new(user, "batman_badge").dedupe_key("GPA.0001"))
        .await
        .unwrap();
    let repeat = ledger
        .grant(GrantRequest::new(user, "batman_badge").dedupe_key("GPA.0001"))
        .await
        .unwrap();

    assert!(repeat.duplicate);
    assert_eq!(repeat.record.quantity, 1);

    let transactions = ledger.processed_transactions(user).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].transaction_id.as_str(), "GPA.0001");
}

#[tokio::test]
#[serial]
async fn dedupe_key_reuse_across_products_is_rejected() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();

    ledger
        .grant(GrantRequest::new(user, "batman_badge").dedupe_key("GPA.0002"))
        .await
        .unwrap();
    let result = ledger
        .grant(GrantRequest::new(user, "premium_lifetime").dedupe_key("GPA.0002"))
        .await;

    assert!(matches!(result, Err(LedgerError::TransactionReused { .. })));
    assert_eq!(
        ledger
            .get_quantity(user, &ProductId::new("premium_lifetime"))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[serial]
async fn concurrent_grants_for_same_pair_all_apply() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .grant(GrantRequest::new(user, "gold_frame").dedupe_key(format!("GPA.C{i}")))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let quantity = ledger
        .get_quantity(user, &ProductId::new("gold_frame"))
        .await
        .unwrap();
    assert_eq!(quantity, 20);
}

#[tokio::test]
#[serial]
async fn concurrent_retries_of_one_transaction_apply_once() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .grant(GrantRequest::new(user, "batman_badge").dedupe_key("GPA.RETRY"))
                .await
                .unwrap()
        }));
    }

    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().duplicate {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(
        ledger
            .get_quantity(user, &ProductId::new("batman_badge"))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
#[serial]
async fn project_premium_tracks_premium_products() {
    let ledger = get_test_ledger().await;
    let user = UserId::new();
    let premium = vec![ProductId::new("premium_lifetime")];

    assert!(!ledger.is_premium(user).await.unwrap());

    ledger
        .grant(GrantRequest::new(user, "batman_badge"))
        .await
        .unwrap();
    let projection = ledger.project_premium(user, &premium).await.unwrap();
    assert!(!projection.is_premium);
    assert!(!projection.changed);

    ledger
        .grant(GrantRequest::new(user, "premium_lifetime"))
        .await
        .unwrap();
    let projection = ledger.project_premium(user, &premium).await.unwrap();
    assert!(projection.is_premium);
    assert!(projection.changed);
    assert!(ledger.is_premium(user).await.unwrap());
}

#[tokio::test]
#[serial]
async fn stream_users_returns_distinct_users() {
    let ledger = get_test_ledger().await;
    let alice = UserId::new();
    let bob = UserId::new();

    ledger
        .grant(GrantRequest::new(alice, "batman_badge"))
        .await
        .unwrap();
    ledger
        .grant(GrantRequest::new(alice, "gold_frame"))
        .await
        .unwrap();
    ledger.project_premium(bob, &[]).await.unwrap();

    let users: Vec<_> = ledger.stream_users().await.unwrap().collect().await;
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.is_ok()));
}
