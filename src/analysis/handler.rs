//! Constraint handlers - map model dofs onto the solved equations

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{AnalysisModel, ConstraintRef, DofMap, DofRef, FeKind};
use crate::error::{AnalysisError, AnalysisResult};

/// How SP and MP constraints enter the system of equations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintHandler {
    /// Eliminate SP dofs; MP constraints are refused
    Plain,
    /// Eliminate SP dofs and express MP-constrained dofs through retained dofs
    Transformation,
    /// Add `alpha * G^T G` stiffness per constraint
    Penalty { alpha_sp: f64, alpha_mp: f64 },
    /// Add one multiplier unknown per constraint equation
    Lagrange { alpha_sp: f64, alpha_mp: f64 },
}

impl Default for ConstraintHandler {
    fn default() -> Self {
        ConstraintHandler::Plain
    }
}

impl ConstraintHandler {
    /// Whether the resulting system stays positive definite for SPD elements
    pub fn keeps_definiteness(&self) -> bool {
        !matches!(self, ConstraintHandler::Lagrange { .. })
    }

    /// Whether the handler can be used to form an eigenproblem
    pub fn supports_eigen(&self) -> bool {
        self.keeps_definiteness()
    }

    /// Rebuild the model's dof groups and FE elements.
    /// Returns the number of dofs left for the numberer.
    pub fn handle(&self, model: &mut AnalysisModel) -> AnalysisResult<usize> {
        let (sp_dofs, mp_constrained, mp_retained) = Self::validate(model)?;

        if let ConstraintHandler::Plain = self {
            if !mp_constrained.is_empty() {
                return Err(AnalysisError::Constraint(
                    "plain handler cannot enforce multi-point constraints".to_string(),
                ));
            }
        }
        if let ConstraintHandler::Transformation = self {
            for sp in model.domain().sp_constraints() {
                if !sp.is_homogeneous() && mp_retained.contains(&(sp.node, sp.dof)) {
                    return Err(AnalysisError::Constraint(format!(
                        "non-homogeneous constraint {} acts on retained dof {} of node {}",
                        sp.tag, sp.dof, sp.node
                    )));
                }
            }
        }

        model.clear_equations();
        let eliminates_sp = matches!(
            self,
            ConstraintHandler::Plain | ConstraintHandler::Transformation
        );

        let nodes: Vec<(usize, usize)> = model.domain().nodes().map(|n| (n.tag(), n.ndf())).collect();
        for &(tag, ndf) in &nodes {
            let maps = (0..ndf)
                .map(|d| {
                    if eliminates_sp && sp_dofs.contains_key(&(tag, d)) {
                        DofMap::Eliminated
                    } else {
                        DofMap::Free
                    }
                })
                .collect();
            model.add_node_group(tag, maps);
        }

        if let ConstraintHandler::Transformation = self {
            self.link_constrained_dofs(model, &sp_dofs)?;
        }

        let element_tags: Vec<usize> = model.domain().elements().map(|e| e.tag()).collect();
        for tag in element_tags {
            let rows = model.element_rows(tag)?;
            model.add_fe_element(FeKind::Element(tag), rows);
        }

        match *self {
            ConstraintHandler::Penalty { alpha_sp, alpha_mp } => {
                Self::add_constraint_elements(model, alpha_sp, alpha_mp, false)?
            }
            ConstraintHandler::Lagrange { alpha_sp, alpha_mp } => {
                Self::add_constraint_elements(model, alpha_sp, alpha_mp, true)?
            }
            _ => {}
        }

        model.complete_handling();
        let count = model.num_to_number();
        debug!("{:?} handler leaves {} dofs to number", self, count);
        Ok(count)
    }

    /// Consistency checks shared by every handler.
    /// Returns SP dofs, MP-constrained dofs and MP-retained dofs.
    #[allow(clippy::type_complexity)]
    fn validate(
        model: &AnalysisModel,
    ) -> AnalysisResult<(
        BTreeMap<(usize, usize), usize>,
        BTreeMap<(usize, usize), usize>,
        BTreeSet<(usize, usize)>,
    )> {
        let domain = model.domain();
        let check_dof = |node: usize, dof: usize, what: &str| -> AnalysisResult<()> {
            let n = domain.node(node).ok_or_else(|| {
                AnalysisError::Constraint(format!("{} references unknown node {}", what, node))
            })?;
            if dof >= n.ndf() {
                return Err(AnalysisError::Constraint(format!(
                    "{} references dof {} but node {} has {} dofs",
                    what,
                    dof,
                    node,
                    n.ndf()
                )));
            }
            Ok(())
        };

        let mut sp_dofs = BTreeMap::new();
        for sp in domain.sp_constraints() {
            check_dof(sp.node, sp.dof, &format!("constraint {}", sp.tag))?;
            if let Some(other) = sp_dofs.insert((sp.node, sp.dof), sp.tag) {
                return Err(AnalysisError::Constraint(format!(
                    "constraints {} and {} both fix dof {} of node {}",
                    other, sp.tag, sp.dof, sp.node
                )));
            }
        }

        let mut constrained = BTreeMap::new();
        let mut retained = BTreeSet::new();
        for mp in domain.mp_constraints() {
            let what = format!("multi-point constraint {}", mp.tag);
            for &d in &mp.constrained_dofs {
                check_dof(mp.constrained_node, d, &what)?;
                if let Some(other) = constrained.insert((mp.constrained_node, d), mp.tag) {
                    return Err(AnalysisError::Constraint(format!(
                        "dof {} of node {} is constrained by both {} and {}",
                        d, mp.constrained_node, other, mp.tag
                    )));
                }
            }
            for &d in &mp.retained_dofs {
                check_dof(mp.retained_node, d, &what)?;
                retained.insert((mp.retained_node, d));
            }
        }

        if let Some((node, dof)) = retained.iter().find(|k| constrained.contains_key(*k)) {
            return Err(AnalysisError::Constraint(format!(
                "retained dof {} of node {} is itself constrained",
                dof, node
            )));
        }
        if let Some((node, dof)) = sp_dofs.keys().find(|k| constrained.contains_key(*k)) {
            return Err(AnalysisError::Constraint(format!(
                "dof {} of node {} carries both a single-point and a multi-point constraint",
                dof, node
            )));
        }

        Ok((sp_dofs, constrained, retained))
    }

    fn link_constrained_dofs(
        &self,
        model: &mut AnalysisModel,
        sp_dofs: &BTreeMap<(usize, usize), usize>,
    ) -> AnalysisResult<()> {
        let mps: Vec<_> = model.domain().mp_constraints().cloned().collect();
        for mp in mps {
            let c_group = model
                .node_group(mp.constrained_node)
                .ok_or(AnalysisError::NodeNotFound(mp.constrained_node))?;
            let r_group = model
                .node_group(mp.retained_node)
                .ok_or(AnalysisError::NodeNotFound(mp.retained_node))?;
            for (i, &cd) in mp.constrained_dofs.iter().enumerate() {
                let terms: Vec<(DofRef, f64)> = mp
                    .retained_dofs
                    .iter()
                    .enumerate()
                    .filter(|(_, rd)| !sp_dofs.contains_key(&(mp.retained_node, **rd)))
                    .map(|(j, &rd)| (DofRef::new(r_group, rd), mp.matrix[(i, j)]))
                    .filter(|(_, c)| *c != 0.0)
                    .collect();
                model.set_dof_map(c_group, cd, DofMap::Linked(terms));
            }
        }
        Ok(())
    }

    fn add_constraint_elements(
        model: &mut AnalysisModel,
        alpha_sp: f64,
        alpha_mp: f64,
        lagrange: bool,
    ) -> AnalysisResult<()> {
        let sps: Vec<(usize, usize, usize)> = model
            .domain()
            .sp_constraints()
            .map(|sp| (sp.tag, sp.node, sp.dof))
            .collect();
        for (tag, node, dof) in sps {
            let group = model.node_group(node).ok_or(AnalysisError::NodeNotFound(node))?;
            let mut rows = vec![DofRef::new(group, dof)];
            if lagrange {
                let multiplier = model.add_lagrange_group(ConstraintRef::Sp(tag), 1);
                rows.push(DofRef::new(multiplier, 0));
                model.add_fe_element(FeKind::LagrangeSp { sp: tag, alpha: alpha_sp }, rows);
            } else {
                model.add_fe_element(FeKind::PenaltySp { sp: tag, alpha: alpha_sp }, rows);
            }
        }

        let mps: Vec<_> = model.domain().mp_constraints().cloned().collect();
        for mp in mps {
            let c_group = model
                .node_group(mp.constrained_node)
                .ok_or(AnalysisError::NodeNotFound(mp.constrained_node))?;
            let r_group = model
                .node_group(mp.retained_node)
                .ok_or(AnalysisError::NodeNotFound(mp.retained_node))?;
            let mut rows: Vec<DofRef> = mp
                .constrained_dofs
                .iter()
                .map(|&d| DofRef::new(c_group, d))
                .chain(mp.retained_dofs.iter().map(|&d| DofRef::new(r_group, d)))
                .collect();
            if lagrange {
                let nc = mp.constrained_dofs.len();
                let multiplier = model.add_lagrange_group(ConstraintRef::Mp(mp.tag), nc);
                rows.extend((0..nc).map(|d| DofRef::new(multiplier, d)));
                model.add_fe_element(FeKind::LagrangeMp { mp: mp.tag, alpha: alpha_mp }, rows);
            } else {
                model.add_fe_element(FeKind::PenaltyMp { mp: mp.tag, alpha: alpha_mp }, rows);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, MpConstraint, Node, SpConstraint};
    use crate::elements::{Spring, SpringLaw};

    fn two_nodes() -> Domain {
        let mut d = Domain::new();
        d.add_node(Node::new(1, 2, &[0.0])).unwrap();
        d.add_node(Node::new(2, 2, &[1.0])).unwrap();
        d.add_element(Box::new(Spring::new(1, 1, 2, 0, SpringLaw::Linear { k: 1.0 })))
            .unwrap();
        d
    }

    #[test]
    fn test_plain_eliminates_fixed_dofs() {
        let mut d = two_nodes();
        d.fix(1, &[0, 1], 1).unwrap();
        let mut model = AnalysisModel::new(d);
        assert_eq!(ConstraintHandler::Plain.handle(&mut model).unwrap(), 2);
        assert!(!model.domain_changed());
    }

    #[test]
    fn test_plain_refuses_mp() {
        let mut d = two_nodes();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[1])).unwrap();
        let mut model = AnalysisModel::new(d);
        assert!(matches!(
            ConstraintHandler::Plain.handle(&mut model),
            Err(AnalysisError::Constraint(_))
        ));
    }

    #[test]
    fn test_transformation_links_constrained_dofs() {
        let mut d = two_nodes();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[1])).unwrap();
        let mut model = AnalysisModel::new(d);
        assert_eq!(ConstraintHandler::Transformation.handle(&mut model).unwrap(), 3);
    }

    #[test]
    fn test_lagrange_adds_multipliers() {
        let mut d = two_nodes();
        d.fix(1, &[0], 1).unwrap();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[1])).unwrap();
        let mut model = AnalysisModel::new(d);
        let handler = ConstraintHandler::Lagrange {
            alpha_sp: 1.0,
            alpha_mp: 1.0,
        };
        assert_eq!(handler.handle(&mut model).unwrap(), 6);
        assert!(!handler.supports_eigen());
    }

    #[test]
    fn test_inconsistent_constraints_are_rejected() {
        // sp on a constrained dof
        let mut d = two_nodes();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0])).unwrap();
        d.add_sp_constraint(SpConstraint::fixed(1, 2, 0)).unwrap();
        let mut model = AnalysisModel::new(d);
        assert!(ConstraintHandler::Transformation.handle(&mut model).is_err());

        // chained retained dof
        let mut d = two_nodes();
        d.add_node(Node::new(3, 2, &[2.0])).unwrap();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0])).unwrap();
        d.add_mp_constraint(MpConstraint::equal_dof(2, 2, 3, &[0])).unwrap();
        let mut model = AnalysisModel::new(d);
        assert!(ConstraintHandler::Transformation.handle(&mut model).is_err());

        // dof beyond the node
        let mut d = two_nodes();
        d.add_sp_constraint(SpConstraint::fixed(1, 2, 5)).unwrap();
        let mut model = AnalysisModel::new(d);
        assert!(ConstraintHandler::Plain.handle(&mut model).is_err());

        // non-homogeneous value on a retained dof
        let mut d = two_nodes();
        d.add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0])).unwrap();
        d.add_sp_constraint(SpConstraint {
            tag: 1,
            node: 1,
            dof: 0,
            value: 0.1,
            pattern: None,
        })
        .unwrap();
        let mut model = AnalysisModel::new(d);
        assert!(ConstraintHandler::Transformation.handle(&mut model).is_err());
        let penalty = ConstraintHandler::Penalty {
            alpha_sp: 1e8,
            alpha_mp: 1e8,
        };
        assert!(penalty.handle(&mut model).is_ok());
    }
}
