use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quillapi::{toggle_like_in_page_doc, ClientStorage, Paginated, Post, ACCESS_TOKEN_KEY};
use serde_json::json;
use tempfile::TempDir;

fn page_doc(len: u64) -> String {
    let data: Vec<_> = (1..=len)
        .map(|id| {
            json!({
                "id": id, "title": format!("Post {}", id), "content": "<p>body</p>".repeat(20),
                "tags": ["rust", "cache"], "createdAt": "2024-01-01T00:00:00Z",
                "likes": id, "comments": 2, "likedByMe": id % 2 == 0,
                "author": { "id": 1, "name": "Ana" }, "readingTime": 3
            })
        })
        .collect();
    json!({ "data": data, "total": len, "page": 1, "lastPage": 1 }).to_string()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("page_of_50_posts", |b| {
        let doc = page_doc(50);
        b.iter(|| {
            let page: Paginated<Post> = serde_json::from_str(black_box(&doc)).unwrap();
            black_box(page);
        });
    });
    group.finish();
}

fn bench_toggle(c: &mut Criterion) {
    let mut group = c.benchmark_group("toggle");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("toggle_like_in_page_of_50", |b| {
        let page: serde_json::Value = serde_json::from_str(&page_doc(50)).unwrap();
        b.iter(|| {
            let mut patched = page.clone();
            toggle_like_in_page_doc(&mut patched, 25).unwrap();
            black_box(patched);
        });
    });
    group.finish();
}

fn bench_storage_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage");
    group.sample_size(20);
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_token_flush", |b| {
        let dir = TempDir::new().unwrap();
        let storage = ClientStorage::open(dir.path()).unwrap();
        let mut counter = 0u64;

        b.iter(|| {
            storage.set(ACCESS_TOKEN_KEY, &format!("tok-{}", counter)).unwrap();
            counter += 1;
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_toggle, bench_storage_set);
criterion_main!(benches);
