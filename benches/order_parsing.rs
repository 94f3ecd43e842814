//! Reference List Benchmarks
//!
//! Parsing, scanning and editing of layer ordering arrays.
//!
//! Run with: `cargo bench --bench order_parsing`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pdf_sandbox::ocg::{RefList, Reference};

/// Ordering array with `groups` top-level layers, each with `children` nested layers
fn create_order(groups: u32, children: u32) -> String {
    let mut out = String::from("[");
    let mut next = 10;
    for _ in 0..groups {
        out.push_str(&format!("{next} 0 R ["));
        next += 1;
        for _ in 0..children {
            out.push_str(&format!("{next} 0 R "));
            next += 1;
        }
        out.push_str("(Label)] ");
    }
    out.push(']');
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_parse");

    for (groups, children) in [(4, 4), (32, 8), (256, 16)] {
        let order = create_order(groups, children);
        group.throughput(Throughput::Bytes(order.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{groups}x{children}")),
            &order,
            |b, order| b.iter(|| RefList::parse(black_box(order))),
        );
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let list = RefList::parse(&create_order(256, 16));

    c.bench_function("order_scan", |b| b.iter(|| black_box(&list).scan()));
}

fn bench_reparent(c: &mut Criterion) {
    let list = RefList::parse(&create_order(64, 8));
    let parent = Reference::new(10);
    let child = Reference::new(5);

    c.bench_function("order_insert_child", |b| {
        b.iter(|| {
            let mut edited = list.clone();
            edited.push(child);
            edited.remove_first_at_root(child);
            edited.insert_child(black_box(parent), child);
            edited.to_string()
        })
    });
}

criterion_group!(benches, bench_parse, bench_scan, bench_reparent);
criterion_main!(benches);
