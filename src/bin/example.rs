//! FEA Analysis Example - P-Delta column, modes and buckling
//!
//! Usage: `fea-example [options.json]`
//!
//! Without an argument the default analysis options are used; otherwise the
//! file is read as `AnalysisOptions` JSON.

use std::env;
use std::fs;

use anyhow::{Context, Result};
use fea_analysis::prelude::*;
use log::info;

const HEIGHT: f64 = 4.0;
const SEGMENTS: usize = 8;

/// Fixed-base steel column along Z, loaded axially and laterally at the top
fn column(axial: f64, lateral: f64) -> Result<Domain> {
    let mut domain = Domain::new();
    for i in 0..=SEGMENTS {
        let z = HEIGHT * i as f64 / SEGMENTS as f64;
        domain.add_node(Node::new(i + 1, 6, &[0.0, 0.0, z]))?;
    }
    let section = Section::rectangular(0.3, 0.3);
    for i in 0..SEGMENTS {
        let member = ElasticBeamColumn3d::new(i + 1, i + 1, i + 2, Material::steel(), section).with_p_delta();
        domain.add_element(Box::new(member))?;
    }
    domain.fix(1, &[0, 1, 2, 3, 4, 5], 1)?;

    let top = SEGMENTS + 1;
    domain.add_load_pattern(
        LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(top, &[lateral, 0.0, -axial, 0.0, 0.0, 0.0])),
    )?;
    Ok(domain)
}

fn load_options() -> Result<AnalysisOptions> {
    match env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path).with_context(|| format!("reading options from {}", path))?;
            let options = AnalysisOptions::from_json(&json).with_context(|| format!("parsing {}", path))?;
            info!("using analysis options from {}", path);
            Ok(options)
        }
        None => Ok(AnalysisOptions::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let options = load_options()?;

    println!("=== FEA Analysis Example: P-Delta Column ===\n");

    // Static: 10 load increments to full load
    let mut analysis = StaticAnalysis::from_options(
        column(2.0e6, 2.0e4)?,
        StaticIntegrator::load_control(0.1),
        &options,
    )?;
    let report = analysis.analyze(10);
    if let Some(failure) = &report.failure {
        println!("Static analysis stopped at step {}: {}", failure.step, failure.message);
    }
    println!(
        "Static: {} steps, {} iterations, {} subdivisions",
        report.committed_steps(),
        report.total_iterations(),
        report.total_subdivisions()
    );
    let top = SEGMENTS + 1;
    let drift = analysis.response(top, 0).unwrap_or(0.0);
    println!("Top drift: {:.6} mm", drift * 1000.0);

    // Buckling about the loaded state
    let mut buckling = BucklingAnalysis::new(analysis.into_model());
    let buckling_results = buckling.analyze(3)?;
    if let Some(lambda) = buckling_results.critical() {
        println!("Critical load factor: {:.4}", lambda);
    }

    // Modes of the unloaded column
    let mut modal = ModalAnalysis::from_options(column(0.0, 0.0)?, &options)?;
    let modes = modal.analyze(4)?;
    println!("\nMode  Period (s)   Frequency (Hz)");
    for (i, (period, frequency)) in modes.periods.iter().zip(&modes.frequencies).enumerate() {
        println!("{:>4}  {:>10.5}   {:>14.4}", i + 1, period, frequency);
    }

    println!("\n{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
