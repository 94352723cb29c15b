//! Benchmarks for the solution engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fea_analysis::graph::Graph;
use fea_analysis::prelude::*;
use nalgebra::{DMatrix, DVector};

/// Spring chain of `n` free nodes fixed at node 0, pulled at the end
fn spring_chain(n: usize, law: SpringLaw) -> Domain {
    let mut domain = Domain::new();
    for tag in 0..=n {
        domain.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
    }
    for tag in 0..n {
        domain
            .add_element(Box::new(Spring::new(tag + 1, tag, tag + 1, 0, law)))
            .unwrap();
    }
    domain.fix(0, &[0], 1).unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(n, &[1.0])))
        .unwrap();
    domain
}

/// Tridiagonal SPD system of size `n`
fn tridiagonal(kind: SystemKind, n: usize) -> Box<dyn fea_analysis::soe::LinearSoe> {
    let mut graph = Graph::new(n);
    for i in 1..n {
        graph.add_edge(i - 1, i);
    }
    let mut soe = kind.build();
    soe.set_size(&graph).unwrap();
    let k = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
    for i in 1..n {
        soe.add_a(&k, &[(i - 1) as isize, i as isize], 1.0).unwrap();
    }
    soe.add_a(&DMatrix::from_element(1, 1, 1.0), &[0], 1.0).unwrap();
    soe.set_b(&DVector::from_element(n, 1.0)).unwrap();
    soe
}

fn benchmark_linear_systems(c: &mut Criterion) {
    for (name, kind) in [
        ("full_general_200", SystemKind::FullGeneral),
        ("profile_spd_200", SystemKind::ProfileSpd),
        ("sparse_spd_200", SystemKind::SparseSpd),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut soe = tridiagonal(kind, 200);
                soe.solve().unwrap();
                black_box(soe.x()[199]);
            })
        });
    }
}

fn benchmark_newton_chain(c: &mut Criterion) {
    let law = SpringLaw::Polynomial {
        k1: 10.0,
        k2: 0.0,
        k3: 5.0,
    };
    c.bench_function("newton_chain_100_static", |b| {
        b.iter(|| {
            let mut analysis = StaticAnalysis::new(spring_chain(100, law), StaticIntegrator::load_control(0.25));
            let report = analysis.analyze(4);
            black_box(report.total_iterations());
        })
    });
    c.bench_function("bfgs_chain_100_static", |b| {
        b.iter(|| {
            let mut analysis = StaticAnalysis::new(spring_chain(100, law), StaticIntegrator::load_control(0.25))
                .with_algorithm(AlgorithmKind::QuasiNewton {
                    update: SecantUpdate::Bfgs,
                    count: 10,
                    line_search: None,
                });
            let report = analysis.analyze(4);
            black_box(report.total_iterations());
        })
    });
}

fn benchmark_modal(c: &mut Criterion) {
    c.bench_function("modal_chain_50_all_modes", |b| {
        b.iter(|| {
            let mut domain = Domain::new();
            for tag in 0..=50 {
                let node = Node::new(tag, 1, &[tag as f64]);
                let node = if tag > 0 { node.with_lumped_mass(1.0) } else { node };
                domain.add_node(node).unwrap();
            }
            for tag in 0..50 {
                domain
                    .add_element(Box::new(Spring::new(tag + 1, tag, tag + 1, 0, SpringLaw::Linear { k: 1.0 })))
                    .unwrap();
            }
            domain.fix(0, &[0], 1).unwrap();
            let results = ModalAnalysis::new(domain).analyze(0).unwrap();
            black_box(results.num_modes());
        })
    });
}

criterion_group!(
    benches,
    benchmark_linear_systems,
    benchmark_newton_chain,
    benchmark_modal,
);

criterion_main!(benches);
