use approx::assert_relative_eq;
use fea_analysis::prelude::*;

/// Two grounded springs (k = 1 and 3) whose dofs are tied together, loaded
/// with 4 on the retained node
fn tied_pair() -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain.add_node(Node::new(2, 1, &[1.0])).unwrap();
    domain
        .add_element(Box::new(Spring::grounded(1, 1, 0, SpringLaw::Linear { k: 1.0 })))
        .unwrap();
    domain
        .add_element(Box::new(Spring::grounded(2, 2, 0, SpringLaw::Linear { k: 3.0 })))
        .unwrap();
    domain
        .add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0]))
        .unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(1, &[4.0])))
        .unwrap();
    domain
}

/// Node 1 fixed, node 2 driven to 0.5 by pattern 1, node 3 follows through
/// a spring pair
fn prescribed_chain() -> Domain {
    let mut domain = Domain::new();
    for tag in 1..=3 {
        domain.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
    }
    let k = SpringLaw::Linear { k: 1.0 };
    domain.add_element(Box::new(Spring::new(1, 1, 2, 0, k))).unwrap();
    domain.add_element(Box::new(Spring::new(2, 2, 3, 0, k))).unwrap();
    domain.add_element(Box::new(Spring::grounded(3, 3, 0, k))).unwrap();
    domain.fix(1, &[0], 1).unwrap();
    domain
        .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()))
        .unwrap();
    domain
        .add_sp_constraint(SpConstraint::prescribed(2, 2, 0, 0.5, 1))
        .unwrap();
    domain
}

/// Penalty residuals carry round-off of order `alpha * eps`, so judge the
/// increment instead
fn options_for(handler: ConstraintHandler) -> AnalysisOptions {
    let options = AnalysisOptions::default()
        .with_handler(handler)
        .with_test(ConvergenceTest::new(TestKind::NormDispIncr, 1e-10, 10));
    if handler.keeps_definiteness() {
        options
    } else {
        options.with_system(SystemKind::FullGeneral)
    }
}

#[test]
fn plain_handler_refuses_multi_point_constraints() {
    let mut analysis = StaticAnalysis::new(tied_pair(), StaticIntegrator::load_control(1.0));
    let report = analysis.analyze(1);
    let failure = report.failure.unwrap();
    assert_eq!(failure.status, AnalysisError::Constraint(String::new()).status_code());
    assert_eq!(report.steps.len(), 1);
}

#[test]
fn tied_dofs_move_together_under_every_capable_handler() {
    let handlers = [
        ConstraintHandler::Transformation,
        ConstraintHandler::Penalty {
            alpha_sp: 1e8,
            alpha_mp: 1e8,
        },
        ConstraintHandler::Lagrange {
            alpha_sp: 1.0,
            alpha_mp: 1.0,
        },
    ];
    for handler in handlers {
        let mut analysis =
            StaticAnalysis::from_options(tied_pair(), StaticIntegrator::load_control(1.0), &options_for(handler))
                .unwrap();
        assert!(analysis.analyze(1).succeeded(), "{:?}", handler);
        assert_relative_eq!(analysis.response(1, 0).unwrap(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(analysis.response(2, 0).unwrap(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn prescribed_displacement_is_imposed_by_every_handler() {
    let handlers = [
        ConstraintHandler::Plain,
        ConstraintHandler::Transformation,
        ConstraintHandler::Penalty {
            alpha_sp: 1e8,
            alpha_mp: 1e8,
        },
        ConstraintHandler::Lagrange {
            alpha_sp: 1.0,
            alpha_mp: 1.0,
        },
    ];
    for handler in handlers {
        let mut analysis = StaticAnalysis::from_options(
            prescribed_chain(),
            StaticIntegrator::load_control(0.5),
            &options_for(handler),
        )
        .unwrap();
        assert!(analysis.analyze(2).succeeded(), "{:?}", handler);
        assert_relative_eq!(analysis.response(2, 0).unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(analysis.response(3, 0).unwrap(), 0.25, epsilon = 1e-6);
    }
}

#[test]
fn lagrange_with_positive_definite_system_is_rejected() {
    let options = AnalysisOptions::default().with_handler(ConstraintHandler::Lagrange {
        alpha_sp: 1.0,
        alpha_mp: 1.0,
    });
    let result = StaticAnalysis::from_options(tied_pair(), StaticIntegrator::load_control(1.0), &options);
    assert!(matches!(result, Err(AnalysisError::Configuration(_))));
}

#[test]
fn lagrange_set_on_a_built_driver_is_rejected_before_solving() {
    let lagrange = ConstraintHandler::Lagrange {
        alpha_sp: 1.0,
        alpha_mp: 1.0,
    };
    let mut analysis =
        StaticAnalysis::new(tied_pair(), StaticIntegrator::load_control(1.0)).with_handler(lagrange);
    let report = analysis.analyze(1);
    let failure = report.failure.unwrap();
    assert_eq!(failure.status, AnalysisError::Configuration(String::new()).status_code());
    assert_relative_eq!(analysis.domain().committed_time(), 0.0);

    // a general system accepts the indefinite matrix
    let mut analysis = StaticAnalysis::new(tied_pair(), StaticIntegrator::load_control(1.0))
        .with_handler(lagrange)
        .with_system(SystemKind::FullGeneral);
    assert!(analysis.analyze(1).succeeded());
    assert_relative_eq!(analysis.response(2, 0).unwrap(), 1.0, epsilon = 1e-8);
}

#[test]
fn topology_change_triggers_renumbering() {
    let mut analysis = StaticAnalysis::new(prescribed_chain(), StaticIntegrator::load_control(0.5));
    assert_eq!(analysis.initialize().unwrap(), 1);

    analysis.domain_mut().add_node(Node::new(4, 1, &[4.0])).unwrap();
    analysis
        .domain_mut()
        .add_element(Box::new(Spring::new(4, 3, 4, 0, SpringLaw::Linear { k: 1.0 })))
        .unwrap();
    assert_eq!(analysis.initialize().unwrap(), 2);
    assert!(analysis.analyze(2).succeeded());
    // node 4 hangs free on node 3 and carries no force
    assert_relative_eq!(analysis.response(4, 0).unwrap(), analysis.response(3, 0).unwrap(), epsilon = 1e-10);
}

#[test]
fn saved_options_drive_an_identical_analysis() {
    let options = AnalysisOptions::default()
        .with_algorithm(AlgorithmKind::QuasiNewton {
            update: SecantUpdate::Bfgs,
            count: 8,
            line_search: Some(LineSearch::new(LineSearchMethod::RegulaFalsi)),
        })
        .with_test(ConvergenceTest::new(TestKind::RelativeNormUnbalance, 1e-9, 40))
        .with_subdivision(SubdivisionPolicy::new(2, 0.25));

    let restored = AnalysisOptions::restore(&options.save().unwrap()).unwrap();
    assert_eq!(restored.algorithm, options.algorithm);
    assert_eq!(restored.subdivision, options.subdivision);

    let run = |options: &AnalysisOptions| {
        let options = options.clone().with_handler(ConstraintHandler::Transformation);
        let mut analysis =
            StaticAnalysis::from_options(tied_pair(), StaticIntegrator::load_control(0.5), &options).unwrap();
        let report = analysis.analyze(2);
        (report, analysis.response(2, 0).unwrap())
    };
    let (first, u_first) = run(&options);
    let (second, u_second) = run(&restored);
    assert_eq!(first, second);
    assert_eq!(u_first, u_second);
}

#[test]
fn envelope_of_another_component_is_rejected() {
    let json = DofNumberer::ReverseCuthillMckee.save().unwrap();
    assert!(matches!(
        SystemKind::restore(&json),
        Err(AnalysisError::InvalidInput(_))
    ));
    assert!(matches!(
        DofNumberer::restore("{\"class_tag\": 3}"),
        Err(AnalysisError::Serialization(_))
    ));
}

#[test]
fn snapshot_restarts_an_analysis_where_it_stopped() {
    let mut first = StaticAnalysis::new(prescribed_chain(), StaticIntegrator::load_control(0.25));
    assert!(first.analyze(2).succeeded());
    let saved = ResponseSnapshot::capture(first.domain()).save().unwrap();

    let mut domain = prescribed_chain();
    ResponseSnapshot::restore(&saved).unwrap().apply(&mut domain).unwrap();
    let mut resumed = StaticAnalysis::new(domain, StaticIntegrator::load_control(0.25));
    assert!(resumed.analyze(2).succeeded());

    assert!(first.analyze(2).succeeded());
    assert_relative_eq!(resumed.domain().committed_time(), 1.0, epsilon = 1e-12);
    for node in 2..=3 {
        assert_relative_eq!(
            resumed.response(node, 0).unwrap(),
            first.response(node, 0).unwrap(),
            epsilon = 1e-12
        );
    }
}
