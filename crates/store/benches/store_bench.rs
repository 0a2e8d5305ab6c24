use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use store::{
    Bounds, Document, DocumentQuery, DocumentStore, InMemoryDocumentStore, SaveOptions, Version,
};

fn make_product(key: &str, price: i64) -> Document {
    Document::builder()
        .collection("products")
        .key(key)
        .body_raw(json!({
            "name": format!("Product {key}"),
            "category": if price % 2 == 0 { "Clothing" } else { "Electronics" },
            "base_price": price,
            "is_active": true,
            "variants": [{"id": "v1", "sku": format!("SKU-{key}"), "inventory": 1_000_000}]
        }))
        .build()
}

fn bench_save_new(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/save_new_document", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryDocumentStore::new();
                store
                    .save(make_product("p", 1000), SaveOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_save_with_version_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    let mut version = rt.block_on(async {
        store
            .save(make_product("p", 1000), SaveOptions::expect_new())
            .await
            .unwrap()
            .version
    });

    c.bench_function("store/save_with_version_check", |b| {
        b.iter(|| {
            version = rt.block_on(async {
                store
                    .save(make_product("p", 1000), SaveOptions::expect_version(version))
                    .await
                    .unwrap()
                    .version
            });
        });
    });
    assert!(version > Version::first());
}

fn bench_adjust_inventory(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    rt.block_on(async {
        store
            .save(make_product("p", 1000), SaveOptions::new())
            .await
            .unwrap();
    });

    c.bench_function("store/adjust_inventory", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .adjust("products", "p", "/variants/0/inventory", -1, Bounds::non_negative())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_query_1000_documents(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    rt.block_on(async {
        for i in 0..1000 {
            store
                .save(make_product(&format!("p{i}"), i), SaveOptions::new())
                .await
                .unwrap();
        }
    });

    c.bench_function("store/query_filtered_page_of_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let page = store
                    .query(
                        DocumentQuery::collection("products")
                            .equals("/category", "Clothing")
                            .gte("/base_price", 100.0)
                            .sort_by("/base_price", true)
                            .page(2, 20),
                    )
                    .await
                    .unwrap();
                assert_eq!(page.len(), 20);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_new,
    bench_save_with_version_check,
    bench_adjust_inventory,
    bench_query_1000_documents,
);
criterion_main!(benches);
