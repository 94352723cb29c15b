use std::f64::consts::PI;

use approx::assert_relative_eq;
use fea_analysis::analysis::AnalysisModel;
use fea_analysis::prelude::*;

/// Uncoupled grounded springs, so `K` and `M` are both diagonal
fn diagonal(stiffness: &[f64], masses: &[f64]) -> Domain {
    let mut domain = Domain::new();
    for (i, (&k, &m)) in stiffness.iter().zip(masses).enumerate() {
        let tag = i + 1;
        domain
            .add_node(Node::new(tag, 1, &[tag as f64]).with_lumped_mass(m))
            .unwrap();
        domain
            .add_element(Box::new(Spring::grounded(tag, tag, 0, SpringLaw::Linear { k })))
            .unwrap();
    }
    domain
}

#[test]
fn diagonal_problem_gives_ratios_and_unit_vectors() {
    let stiffness = [6.0, 2.0, 12.0, 10.0];
    let masses = [2.0, 1.0, 3.0, 1.0];
    // k/m = 3, 2, 4, 10; ascending order visits nodes 2, 1, 3, 4
    let expected = [(2.0, 2), (3.0, 1), (4.0, 3), (10.0, 4)];

    for (kind, modes) in [
        (EigenSystemKind::FullGeneral, 4),
        (
            EigenSystemKind::Subspace {
                tol: 1e-12,
                max_iterations: 50,
            },
            2,
        ),
    ] {
        let mut modal = ModalAnalysis::new(diagonal(&stiffness, &masses)).with_eigen_system(kind);
        let results = modal.analyze(modes).unwrap();
        assert_eq!(results.num_modes(), modes, "{:?}", kind);

        for (mode, &(value, node)) in expected.iter().take(modes).enumerate() {
            assert_relative_eq!(results.eigenvalues[mode], value, max_relative = 1e-10);
            for tag in 1..=4 {
                let component = modal.domain().node(tag).unwrap().eigenvector(mode).unwrap()[0];
                if tag == node {
                    // mass normalized
                    assert_relative_eq!(component.abs(), 1.0 / masses[tag - 1].sqrt(), epsilon = 1e-8);
                } else {
                    assert_relative_eq!(component, 0.0, epsilon = 1e-8);
                }
            }
        }
    }
}

#[test]
fn modal_results_report_periods_and_mass_participation() {
    let mut modal = ModalAnalysis::new(diagonal(&[4.0, 9.0], &[1.0, 1.0]));
    let results = modal.analyze(0).unwrap();

    assert_relative_eq!(results.angular_frequencies[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(results.periods[1], 2.0 * PI / 3.0, epsilon = 1e-12);
    assert_relative_eq!(results.fundamental_period().unwrap(), PI, epsilon = 1e-12);

    // each mode carries the mass of its own node
    assert_relative_eq!(results.total_mass[0], 2.0, epsilon = 1e-12);
    let x = &results.participation[0];
    assert_relative_eq!(x[0].effective_mass, 1.0, epsilon = 1e-10);
    assert_relative_eq!(x[0].mass_ratio, 0.5, epsilon = 1e-10);
    assert_relative_eq!(x[1].cumulative_ratio, 1.0, epsilon = 1e-10);
}

/// Vertical cantilever of `segments` P-Delta beam-columns with an axial
/// compression of `load` at the tip
fn cantilever(segments: usize, length: f64, load: f64) -> Domain {
    let mut domain = Domain::new();
    for i in 0..=segments {
        let z = length * i as f64 / segments as f64;
        domain.add_node(Node::new(i + 1, 6, &[0.0, 0.0, z])).unwrap();
    }
    let section = Section::rectangular(0.1, 0.1);
    for i in 0..segments {
        let member = ElasticBeamColumn3d::new(i + 1, i + 1, i + 2, Material::steel(), section).with_p_delta();
        domain.add_element(Box::new(member)).unwrap();
    }
    domain.fix(1, &[0, 1, 2, 3, 4, 5], 1).unwrap();
    domain
        .add_load_pattern(
            LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::on_dof(segments + 1, 6, 2, -load)),
        )
        .unwrap();
    domain
}

#[test]
fn cantilever_buckling_load_matches_euler() {
    let length = 2.0;
    let material = Material::steel();
    let section = Section::rectangular(0.1, 0.1);
    let euler = PI * PI * material.e * section.iy.min(section.iz) / (4.0 * length * length);

    let reference = 0.1 * euler;
    let mut statics = StaticAnalysis::new(cantilever(10, length, reference), StaticIntegrator::load_control(1.0));
    assert!(statics.analyze(1).succeeded());

    let mut buckling = BucklingAnalysis::new(statics.into_model());
    let results = buckling.analyze(2).unwrap();
    let critical = results.critical().unwrap() * reference;
    assert_relative_eq!(critical, euler, max_relative = 1e-3);

    // the square section buckles about both axes at the same load
    assert_relative_eq!(results.load_factors[1], results.load_factors[0], max_relative = 1e-6);
    assert!(results.mode_shapes.contains_key(&11));
}

#[test]
fn buckling_without_reference_load_is_an_error() {
    let model = AnalysisModel::new(cantilever(4, 2.0, 0.0));
    let mut buckling = BucklingAnalysis::new(model);
    assert!(matches!(buckling.analyze(1), Err(AnalysisError::EigenSolver(_))));
}
