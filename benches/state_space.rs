use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use pn_reach::analysis::reachability_graph;
use pn_reach::export::Exporter;
use pn_reach::net::{Marking, Net, Transition};

/// n 个相互独立的两状态分量，可达状态数为 2^n。
fn parallel_toggles(n: usize) -> (Net, Marking) {
    let mut builder = Net::builder();
    for i in 0..n {
        builder
            .place(format!("off{i}"))
            .place(format!("on{i}"))
            .transition(Transition::new(format!("up{i}")))
            .transition(Transition::new(format!("down{i}")))
            .arc(format!("off{i}"), format!("up{i}"), 1)
            .arc(format!("up{i}"), format!("on{i}"), 1)
            .arc(format!("on{i}"), format!("down{i}"), 1)
            .arc(format!("down{i}"), format!("off{i}"), 1);
    }
    let net = builder.build().unwrap();
    let names = (0..n).map(|i| format!("off{i}")).collect::<Vec<_>>();
    let initial = net.marking(names.iter().map(|name| (name.as_str(), 1))).unwrap();
    (net, initial)
}

fn explore(c: &mut Criterion) {
    let mut group = c.benchmark_group("explore");
    for n in [4, 8, 12] {
        let (net, initial) = parallel_toggles(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| reachability_graph(black_box(&net), black_box(&initial)).unwrap())
        });
    }
    group.finish();
}

fn export(c: &mut Criterion) {
    let (net, initial) = parallel_toggles(10);
    let graph = reachability_graph(&net, &initial).unwrap();
    c.bench_function("export_1024_states", |b| {
        b.iter(|| Exporter::new(&net).export(black_box(&graph)).unwrap())
    });
}

criterion_group!(benches, explore, export);
criterion_main!(benches);
