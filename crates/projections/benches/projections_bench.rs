use catalog::ProductCatalog;
use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{EntitlementStore, GrantRequest, InMemoryLedger, UserId};
use projections::PremiumProjector;

/// Populate a ledger with N users, every third one owning a premium product.
async fn populate_ledger(store: &InMemoryLedger, n: usize) {
    for i in 0..n {
        let user = UserId::new();
        let product = if i % 3 == 0 { "premium_monthly" } else { "batman_badge" };
        store.grant(GrantRequest::new(user, product)).await.unwrap();
    }
}

fn bench_reproject_single_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedger::new();
    let projector = PremiumProjector::new(store.clone(), &ProductCatalog::builtin());
    let user = UserId::new();

    rt.block_on(async {
        populate_ledger(&store, 100).await;
        store
            .grant(GrantRequest::new(user, "premium_lifetime"))
            .await
            .unwrap();
    });

    c.bench_function("projections/reproject_single_user", |b| {
        b.iter(|| {
            rt.block_on(async {
                projector.reproject(user).await.unwrap();
            });
        });
    });
}

fn bench_rebuild_1000_users(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedger::new();

    rt.block_on(populate_ledger(&store, 1000));

    c.bench_function("projections/rebuild_1000_users", |b| {
        b.iter(|| {
            rt.block_on(async {
                let projector = PremiumProjector::new(store.clone(), &ProductCatalog::builtin());
                projector.rebuild_all().await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_reproject_single_user, bench_rebuild_1000_users);
criterion_main!(benches);
