use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{
    EntitlementStore, EntitlementStoreExt, GrantRequest, InMemoryLedger, ProductId, UserId,
};

fn bench_grant_new_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/grant_new_record", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryLedger::new();
                ledger
                    .grant(GrantRequest::new(UserId::new(), "batman_badge"))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_grant_with_dedupe_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new();
    let user = UserId::new();
    let mut n: u64 = 0;

    c.bench_function("ledger/grant_with_dedupe_key", |b| {
        b.iter(|| {
            n += 1;
            let request = GrantRequest::new(user, "batman_badge").dedupe_key(format!("TXN-{n}"));
            rt.block_on(async {
                ledger.grant(request).await.unwrap();
            });
        });
    });
}

fn bench_duplicate_grant(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new();
    let user = UserId::new();

    rt.block_on(async {
        ledger
            .grant(GrantRequest::new(user, "batman_badge").dedupe_key("TXN-DUP"))
            .await
            .unwrap();
    });

    c.bench_function("ledger/duplicate_grant", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .grant(GrantRequest::new(user, "batman_badge").dedupe_key("TXN-DUP"))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_get_quantity(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new();
    let user = UserId::new();
    let product = ProductId::new("batman_badge");

    rt.block_on(async {
        for i in 0..100 {
            ledger
                .grant(GrantRequest::new(UserId::new(), format!("product_{i}")))
                .await
                .unwrap();
        }
        ledger
            .grant(GrantRequest::new(user, product.clone()))
            .await
            .unwrap();
    });

    c.bench_function("ledger/get_quantity", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.get_quantity(user, &product).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_grant_new_record,
    bench_grant_with_dedupe_key,
    bench_duplicate_grant,
    bench_get_quantity
);
criterion_main!(benches);
