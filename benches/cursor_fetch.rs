use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nodedb::collation::Collator;
use nodedb::store::{MemoryNodeDb, NodeDb, SledNodeDb};
use nodedb::tree::node::{DirectoryNode, FileNode, Node};
use nodedb::types::SortType;
use tempfile::TempDir;

fn children(n: usize) -> Vec<Node> {
    (0..n)
        .map(|i| {
            if i % 10 == 0 {
                DirectoryNode::new(format!("Folder {i:04}")).into()
            } else {
                FileNode::new(format!("document_{i:04}.pdf"), i as u64).into()
            }
        })
        .collect()
}

fn filled(db: &dyn NodeDb, n: usize) -> DirectoryNode {
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, children(n))
        .expect("fill store");
    root
}

fn bench_cursor_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor_fetch");
    let dir = TempDir::new().expect("tempdir");

    for size in [10, 100, 1000] {
        let memory = MemoryNodeDb::open(Collator::new("en")).expect("memory store");
        let sled = SledNodeDb::open(&dir.path().join(format!("sled-{size}")), Collator::new("en"))
            .expect("sled store");
        let backends: [(&str, &dyn NodeDb); 2] = [("memory", &memory), ("sled", &sled)];

        group.throughput(Throughput::Elements(size as u64));
        for (name, db) in backends {
            let root = filled(db, size);
            for sort_type in [SortType::ByName, SortType::Unsorted] {
                group.bench_with_input(
                    BenchmarkId::new(format!("{name}/{sort_type:?}"), size),
                    &size,
                    |b, _| {
                        b.iter(|| {
                            let cursor = db
                                .cursor_for_directory(&root, sort_type)
                                .unwrap()
                                .unwrap();
                            for index in 0..cursor.count() {
                                black_box(cursor.fetch_node_at_index(index).unwrap());
                            }
                        });
                    },
                );
            }
        }
    }
    group.finish();
}

fn bench_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace_nodes_in_directory");
    let db = MemoryNodeDb::open(Collator::new("en")).expect("memory store");
    let mut root = db.root_directory_node();

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                db.replace_nodes_in_directory(&mut root, children(size))
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cursor_fetch, bench_replace);
criterion_main!(benches);
