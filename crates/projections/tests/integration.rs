//! Integration tests: concurrent grants and reprojections against the
//! in-memory ledger.

use catalog::ProductCatalog;
use ledger::{EntitlementStore, EntitlementStoreExt, GrantRequest, InMemoryLedger, UserId};
use projections::PremiumProjector;

fn setup() -> (InMemoryLedger, PremiumProjector<InMemoryLedger>, ProductCatalog) {
    let store = InMemoryLedger::new();
    let catalog = ProductCatalog::builtin();
    let projector = PremiumProjector::new(store.clone(), &catalog);
    (store, projector, catalog)
}

/// The stored flag must agree with the ledger after every projection.
async fn assert_premium_consistent(
    store: &InMemoryLedger,
    projector: &PremiumProjector<InMemoryLedger>,
    catalog: &ProductCatalog,
    user: UserId,
) {
    let mut expected = false;
    for product in catalog.premium_product_ids() {
        if store.get_quantity(user, &product).await.unwrap() >= 1 {
            expected = true;
        }
    }
    assert_eq!(projector.is_premium(user).await.unwrap(), expected);
}

#[tokio::test]
async fn premium_flag_tracks_grants_for_many_users() {
    let (store, projector, catalog) = setup();
    let products = ["batman_badge", "gold_frame", "premium_monthly", "premium_lifetime"];

    let mut users = Vec::new();
    for i in 0..12 {
        let user = UserId::new();
        store
            .grant(GrantRequest::new(user, products[i % products.len()]))
            .await
            .unwrap();
        projector.reproject(user).await.unwrap();
        users.push(user);
    }

    for user in users {
        assert_premium_consistent(&store, &projector, &catalog, user).await;
    }
}

#[tokio::test]
async fn concurrent_grant_and_reproject_converge() {
    let (store, projector, catalog) = setup();
    let user = UserId::new();

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        let projector = projector.clone();
        let product = if i == 17 { "premium_lifetime" } else { "batman_badge" };
        handles.push(tokio::spawn(async move {
            store
                .grant(GrantRequest::new(user, product).dedupe_key(format!("TXN-{i}")))
                .await
                .unwrap();
            projector.reproject(user).await.unwrap()
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        store
            .get_quantity(user, &"batman_badge".into())
            .await
            .unwrap(),
        31
    );
    assert!(projector.is_premium(user).await.unwrap());
    assert_premium_consistent(&store, &projector, &catalog, user).await;
}

#[tokio::test]
async fn rebuild_after_skipped_projections() {
    let (store, projector, catalog) = setup();
    let users: Vec<_> = (0..5).map(|_| UserId::new()).collect();

    for user in &users {
        store
            .grant(GrantRequest::new(*user, "premium_monthly"))
            .await
            .unwrap();
    }

    let summary = projector.rebuild_all().await.unwrap();
    assert_eq!(summary.users, 5);
    assert_eq!(summary.changed, 5);

    let again = projector.rebuild_all().await.unwrap();
    assert_eq!(again.changed, 0);

    for user in users {
        assert_premium_consistent(&store, &projector, &catalog, user).await;
    }
}
