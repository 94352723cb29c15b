//! Versioned, self-describing persistence of configurable components and
//! committed response

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    AlgorithmKind, AnalysisOptions, ConstraintHandler, ConvergenceTest, DofNumberer, LineSearch, RayleighDamping,
    StaticScheme, SubdivisionPolicy, TransientScheme,
};
use crate::domain::Domain;
use crate::eigen::EigenSystemKind;
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::SystemKind;

/// Tagged wrapper every persisted component travels in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub class_tag: String,
    pub version: u32,
    pub state: serde_json::Value,
}

/// A component that can be saved and restored through an [`Envelope`]
pub trait Persist: Serialize + DeserializeOwned {
    const CLASS_TAG: &'static str;
    const VERSION: u32;

    fn to_envelope(&self) -> AnalysisResult<Envelope> {
        Ok(Envelope {
            class_tag: Self::CLASS_TAG.to_string(),
            version: Self::VERSION,
            state: serde_json::to_value(self)?,
        })
    }

    /// Rejects envelopes of another class or version
    fn from_envelope(envelope: Envelope) -> AnalysisResult<Self> {
        if envelope.class_tag != Self::CLASS_TAG {
            return Err(AnalysisError::InvalidInput(format!(
                "expected class {}, found {}",
                Self::CLASS_TAG,
                envelope.class_tag
            )));
        }
        if envelope.version != Self::VERSION {
            return Err(AnalysisError::InvalidInput(format!(
                "{} version {} cannot be read by version {}",
                Self::CLASS_TAG,
                envelope.version,
                Self::VERSION
            )));
        }
        Ok(serde_json::from_value(envelope.state)?)
    }

    fn save(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }

    fn restore(json: &str) -> AnalysisResult<Self> {
        Self::from_envelope(serde_json::from_str(json)?)
    }
}

macro_rules! persist {
    ($($ty:ty => $tag:literal, $version:literal;)*) => {
        $(
            impl Persist for $ty {
                const CLASS_TAG: &'static str = $tag;
                const VERSION: u32 = $version;
            }
        )*
    };
}

persist! {
    ConstraintHandler => "ConstraintHandler", 1;
    DofNumberer => "DofNumberer", 1;
    SystemKind => "LinearSoe", 1;
    EigenSystemKind => "EigenSoe", 1;
    AlgorithmKind => "SolutionAlgorithm", 1;
    LineSearch => "LineSearch", 1;
    ConvergenceTest => "ConvergenceTest", 1;
    SubdivisionPolicy => "SubdivisionPolicy", 1;
    StaticScheme => "StaticIntegrator", 1;
    TransientScheme => "TransientIntegrator", 1;
    RayleighDamping => "RayleighDamping", 1;
    AnalysisOptions => "AnalysisOptions", 1;
    ResponseSnapshot => "ResponseSnapshot", 1;
}

/// Committed response of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub disp: Vec<f64>,
    pub vel: Vec<f64>,
    pub accel: Vec<f64>,
}

/// Committed nodal response of a domain at one time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub time: f64,
    pub nodes: BTreeMap<usize, NodeResponse>,
}

impl ResponseSnapshot {
    pub fn capture(domain: &Domain) -> Self {
        let nodes = domain
            .nodes()
            .map(|n| {
                (
                    n.tag(),
                    NodeResponse {
                        disp: n.committed_disp().iter().copied().collect(),
                        vel: n.committed_vel().iter().copied().collect(),
                        accel: n.committed_accel().iter().copied().collect(),
                    },
                )
            })
            .collect();
        Self {
            time: domain.committed_time(),
            nodes,
        }
    }

    /// Write the snapshot into `domain` as its committed state
    pub fn apply(&self, domain: &mut Domain) -> AnalysisResult<()> {
        for (&tag, response) in &self.nodes {
            let node = domain.node_mut(tag).ok_or(AnalysisError::NodeNotFound(tag))?;
            if response.disp.len() != node.ndf() {
                return Err(AnalysisError::InvalidInput(format!(
                    "snapshot of node {} has {} dofs, node has {}",
                    tag,
                    response.disp.len(),
                    node.ndf()
                )));
            }
            for dof in 0..node.ndf() {
                node.set_trial_disp_component(dof, response.disp[dof]);
                node.set_trial_vel_component(dof, response.vel.get(dof).copied().unwrap_or(0.0));
                node.set_trial_accel_component(dof, response.accel.get(dof).copied().unwrap_or(0.0));
            }
        }
        domain.apply_load(self.time);
        domain.update()?;
        domain.commit();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{TangentPolicy, TestKind};
    use crate::domain::Node;

    #[test]
    fn test_options_round_trip() {
        let options = AnalysisOptions::default()
            .with_algorithm(AlgorithmKind::NewtonRaphson {
                policy: TangentPolicy::OncePerStep,
                line_search: None,
            })
            .with_test(ConvergenceTest::new(TestKind::EnergyIncr, 1e-10, 12));
        let json = options.save().unwrap();
        let back = AnalysisOptions::restore(&json).unwrap();
        assert_eq!(back.algorithm, options.algorithm);
        assert_eq!(back.test.kind, TestKind::EnergyIncr);
        assert_eq!(back.test.max_iterations, 12);
    }

    #[test]
    fn test_wrong_tag_or_version_is_rejected() {
        let mut envelope = DofNumberer::Plain.to_envelope().unwrap();
        assert!(ConstraintHandler::from_envelope(envelope.clone()).is_err());
        envelope.version = 2;
        assert!(matches!(
            DofNumberer::from_envelope(envelope),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_snapshot_restores_committed_state() {
        let mut domain = Domain::new();
        domain.add_node(Node::new(1, 2, &[0.0, 0.0])).unwrap();
        {
            let node = domain.node_mut(1).unwrap();
            node.set_trial_disp_component(1, 0.25);
            node.set_trial_vel_component(0, -1.0);
        }
        domain.apply_load(2.0);
        domain.commit();

        let snapshot = ResponseSnapshot::restore(&ResponseSnapshot::capture(&domain).save().unwrap()).unwrap();
        let mut fresh = Domain::new();
        fresh.add_node(Node::new(1, 2, &[0.0, 0.0])).unwrap();
        snapshot.apply(&mut fresh).unwrap();

        let node = fresh.node(1).unwrap();
        assert_eq!(node.committed_disp()[1], 0.25);
        assert_eq!(node.committed_vel()[0], -1.0);
        assert_eq!(fresh.committed_time(), 2.0);
    }
}
