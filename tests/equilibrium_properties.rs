use approx::assert_relative_eq;
use fea_analysis::prelude::*;

/// One free dof on a grounded spring, loaded at `force` over one unit of
/// pseudo-time
fn sdof(law: SpringLaw, force: f64) -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain
        .add_element(Box::new(Spring::grounded(1, 1, 0, law)))
        .unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(1, &[force])))
        .unwrap();
    domain
}

/// `K = [[2,-1],[-1,2]]` from two grounded springs and a coupling spring
fn two_dof() -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain.add_node(Node::new(2, 1, &[1.0])).unwrap();
    let k = SpringLaw::Linear { k: 1.0 };
    domain.add_element(Box::new(Spring::grounded(1, 1, 0, k))).unwrap();
    domain.add_element(Box::new(Spring::grounded(2, 2, 0, k))).unwrap();
    domain.add_element(Box::new(Spring::new(3, 1, 2, 0, k))).unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(1, &[1.0])))
        .unwrap();
    domain
}

/// Chain of stiffening springs fixed at node 0
fn chain(n: usize, force: f64) -> Domain {
    let mut domain = Domain::new();
    for tag in 0..=n {
        domain.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
    }
    for tag in 0..n {
        let law = SpringLaw::Polynomial {
            k1: 2.0 + tag as f64,
            k2: 0.3,
            k3: 0.0,
        };
        domain
            .add_element(Box::new(Spring::new(tag + 1, tag, tag + 1, 0, law)))
            .unwrap();
    }
    domain.fix(0, &[0], 1).unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(n, &[force])))
        .unwrap();
    domain
}

#[test]
fn newton_takes_one_iteration_on_linear_sdof_for_every_norm() {
    let kinds = [
        TestKind::NormDispIncr,
        TestKind::NormUnbalance,
        TestKind::EnergyIncr,
        TestKind::RelativeNormDispIncr,
        TestKind::RelativeNormUnbalance,
        TestKind::RelativeEnergyIncr,
    ];
    for kind in kinds {
        for norm in [NormType::Euclidean, NormType::Max] {
            let mut analysis = StaticAnalysis::new(
                sdof(SpringLaw::Linear { k: 4.0 }, 2.0),
                StaticIntegrator::load_control(1.0),
            )
            .with_test(ConvergenceTest::new(kind, 1e-10, 10).with_norm(norm));
            let step = analysis.analyze_step().unwrap();
            assert_eq!(step.iterations, 1, "{:?} / {:?}", kind, norm);
            assert_relative_eq!(analysis.response(1, 0).unwrap(), 0.5, epsilon = 1e-14);
        }
    }
}

#[test]
fn linear_algorithm_solves_two_dof_closed_form_on_every_system() {
    let systems = [
        SystemKind::FullGeneral,
        SystemKind::ProfileSpd,
        SystemKind::SparseSpd,
        SystemKind::SparsePcg {
            tol: 1e-14,
            max_iterations: 50,
        },
    ];
    for system in systems {
        let options = AnalysisOptions::linear().with_system(system);
        let mut analysis =
            StaticAnalysis::from_options(two_dof(), StaticIntegrator::load_control(1.0), &options).unwrap();
        let report = analysis.analyze(1);
        assert!(report.succeeded(), "{:?}", system);
        assert_relative_eq!(analysis.response(1, 0).unwrap(), 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(analysis.response(2, 0).unwrap(), 1.0 / 3.0, epsilon = 1e-12);
    }
}

#[test]
fn quasi_newton_matches_newton_with_fewer_tangents() {
    let test = ConvergenceTest::new(TestKind::NormUnbalance, 1e-10, 60);

    let mut newton = StaticAnalysis::new(chain(5, 3.0), StaticIntegrator::load_control(1.0)).with_test(test.clone());
    let newton_step = newton.analyze_step().unwrap();

    for update in [SecantUpdate::Bfgs, SecantUpdate::Broyden] {
        let mut secant = StaticAnalysis::new(chain(5, 3.0), StaticIntegrator::load_control(1.0))
            .with_algorithm(AlgorithmKind::QuasiNewton {
                update,
                count: 30,
                line_search: None,
            })
            .with_test(test.clone());
        let secant_step = secant.analyze_step().unwrap();

        assert!(
            secant_step.tangent_formations < newton_step.tangent_formations,
            "{:?}: {} vs {}",
            update,
            secant_step.tangent_formations,
            newton_step.tangent_formations
        );
        for node in 1..=5 {
            assert_relative_eq!(
                secant.response(node, 0).unwrap(),
                newton.response(node, 0).unwrap(),
                epsilon = 1e-8
            );
        }
    }
}

#[test]
fn every_line_search_reaches_the_hardening_spring_root() {
    let methods = [
        LineSearchMethod::Bisection,
        LineSearchMethod::Secant,
        LineSearchMethod::RegulaFalsi,
        LineSearchMethod::InitialInterpolated,
    ];
    let law = SpringLaw::Polynomial {
        k1: 1.0,
        k2: 0.0,
        k3: 1.0,
    };
    for method in methods {
        let mut analysis = StaticAnalysis::new(sdof(law, 2.0), StaticIntegrator::load_control(1.0))
            .with_algorithm(AlgorithmKind::NewtonRaphson {
                policy: TangentPolicy::EveryIteration,
                line_search: Some(LineSearch::new(method)),
            })
            .with_test(ConvergenceTest::new(TestKind::NormUnbalance, 1e-10, 30))
            .with_subdivision(SubdivisionPolicy::none());
        let step = analysis.analyze_step().unwrap();
        assert_eq!(step.subdivisions, 0, "{:?}", method);
        // u + u^3 = 2
        assert_relative_eq!(analysis.response(1, 0).unwrap(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn newton_increment_norms_do_not_grow_on_convex_problem() {
    let law = SpringLaw::Polynomial {
        k1: 1.0,
        k2: 0.5,
        k3: 0.0,
    };
    let mut analysis = StaticAnalysis::new(sdof(law, 2.0), StaticIntegrator::load_control(1.0))
        .with_test(ConvergenceTest::new(TestKind::NormDispIncr, 1e-12, 20));
    let step = analysis.analyze_step().unwrap();

    assert!(step.norms.len() >= 3);
    for pair in step.norms.windows(2) {
        assert!(pair[1] <= pair[0], "norms grew: {:?}", step.norms);
    }
    // u + u^2 / 2 = 2
    assert_relative_eq!(analysis.response(1, 0).unwrap(), -1.0 + 5.0_f64.sqrt(), epsilon = 1e-10);
}

#[test]
fn failed_step_subdivides_once_and_matches_two_half_steps() {
    // u + u^3 = 1.043 has the root u = 0.7
    let law = SpringLaw::Polynomial {
        k1: 1.0,
        k2: 0.0,
        k3: 1.0,
    };
    let modified = AlgorithmKind::NewtonRaphson {
        policy: TangentPolicy::OncePerStep,
        line_search: None,
    };
    let test = ConvergenceTest::new(TestKind::NormUnbalance, 1e-10, 100);

    let mut whole = StaticAnalysis::new(sdof(law, 1.043), StaticIntegrator::load_control(1.0))
        .with_algorithm(modified)
        .with_test(test.clone())
        .with_subdivision(SubdivisionPolicy::new(3, 0.5));
    let step = whole.analyze_step().unwrap();
    assert_eq!(step.subdivisions, 1);
    assert_relative_eq!(whole.domain().committed_time(), 1.0, epsilon = 1e-12);

    let mut halves = StaticAnalysis::new(sdof(law, 1.043), StaticIntegrator::load_control(0.5))
        .with_algorithm(modified)
        .with_test(test)
        .with_subdivision(SubdivisionPolicy::none());
    assert!(halves.analyze(2).succeeded());

    let u = whole.response(1, 0).unwrap();
    assert_relative_eq!(u, halves.response(1, 0).unwrap(), epsilon = 1e-9);
    assert_relative_eq!(u, 0.7, epsilon = 1e-9);
}

#[test]
fn without_subdivision_the_same_step_fails_and_keeps_last_commit() {
    let law = SpringLaw::Polynomial {
        k1: 1.0,
        k2: 0.0,
        k3: 1.0,
    };
    let mut analysis = StaticAnalysis::new(sdof(law, 1.043), StaticIntegrator::load_control(1.0))
        .with_algorithm(AlgorithmKind::NewtonRaphson {
            policy: TangentPolicy::OncePerStep,
            line_search: None,
        })
        .with_test(ConvergenceTest::new(TestKind::NormUnbalance, 1e-10, 100))
        .with_subdivision(SubdivisionPolicy::none());
    let report = analysis.analyze(1);

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.status, AnalysisError::Convergence { iterations: 100, norm: 0.0 }.status_code());
    assert_eq!(report.committed_steps(), 0);
    assert_eq!(analysis.domain().committed_time(), 0.0);
    assert_eq!(analysis.domain().node(1).unwrap().committed_disp()[0], 0.0);
}

#[test]
fn displacement_control_reaches_target_displacement() {
    let law = SpringLaw::Polynomial {
        k1: 1.0,
        k2: 0.0,
        k3: 1.0,
    };
    let mut analysis = StaticAnalysis::new(sdof(law, 1.0), StaticIntegrator::displacement_control(1, 0, 0.1));
    assert!(analysis.analyze(7).succeeded());
    assert_relative_eq!(analysis.response(1, 0).unwrap(), 0.7, epsilon = 1e-9);
    // load factor balances u + u^3 for a unit reference load
    assert_relative_eq!(analysis.domain().committed_time(), 1.043, epsilon = 1e-8);
}
