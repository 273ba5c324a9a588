use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use wordstore::{SqliteStorage, TableStore, Word, WordDatabase};

fn seeded_store(n: usize) -> SqliteStorage {
    let store = SqliteStorage::open_memory().expect("open store");
    let words: Vec<Word> = (0..n)
        .map(|i| Word::new(format!("word-{i:05}")).expect("valid key"))
        .collect();
    store.insert_all(&words).expect("seed store");
    store
}

fn bench_table_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_store");

    group.bench_function("insert_single", |b| {
        let store = SqliteStorage::open_memory().expect("open store");
        let mut i = 0_u64;
        b.iter(|| {
            i += 1;
            let word = Word::new(format!("w{i}")).expect("valid key");
            store.insert(black_box(&word)).expect("insert");
        });
    });

    group.bench_function("insert_duplicate", |b| {
        let store = seeded_store(1);
        let word = Word::new("word-00000").expect("valid key");
        b.iter(|| store.insert(black_box(&word)).expect("insert"));
    });

    for size in [100, 1_000, 10_000] {
        let store = seeded_store(size);
        group.bench_function(format!("select_all_{size}"), |b| {
            b.iter(|| black_box(store.select_all().expect("select")));
        });
    }

    group.bench_function("replace_all_1000", |b| {
        let words: Vec<Word> = (0..1_000)
            .map(|i| Word::new(format!("seed-{i}")).expect("valid key"))
            .collect();
        b.iter_batched(
            || seeded_store(100),
            |store| store.replace_all(&words).expect("replace"),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_live_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_query");

    group.bench_function("insert_and_publish", |b| {
        let db = WordDatabase::open_in_memory().expect("open database");
        let repo = db.repository();
        let _sub = repo
            .get_all()
            .subscribe(|words| {
                black_box(words.len());
            })
            .expect("subscribe");
        let mut i = 0_u64;
        b.iter(|| {
            i += 1;
            repo.insert_word(&format!("live-{i}")).expect("insert");
            repo.flush().expect("flush");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_table_store, bench_live_query);
criterion_main!(benches);
