//! AnalysisModel - numbered DOF groups and FE-element assembly handles
//!
//! The constraint handler fills the model with one DOF group per node (plus
//! one per Lagrange multiplier set) and one FE element per element or
//! penalty/multiplier term. Each DOF of a group is free, eliminated, or
//! linked to free DOFs of other groups. FE elements and DOF groups carry a
//! transformation `T` from their local rows onto free DOFs, so a local
//! matrix `K` assembles as `T^T K T` and an equation vector `x` reads back as
//! `T x[ids]`. After numbering, every free DOF owns one equation.

use std::collections::BTreeMap;

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, MpConstraint, SpConstraint};
use crate::error::{AnalysisError, AnalysisResult, Stage};
use crate::graph::Graph;
use crate::math;

/// Id of a dof that does not become an equation
pub const CONSTRAINED: isize = -1;
/// Id of a free dof waiting for the numberer
pub const TO_NUMBER: isize = -2;

/// Which stiffness an element contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangentKind {
    Current,
    Initial,
    Committed,
}

/// Address of one dof of one DOF group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DofRef {
    pub group: usize,
    pub dof: usize,
}

impl DofRef {
    pub fn new(group: usize, dof: usize) -> Self {
        Self { group, dof }
    }
}

/// How a group dof relates to the solved unknowns
#[derive(Debug, Clone, PartialEq)]
pub enum DofMap {
    Free,
    /// Value imposed directly on the node
    Eliminated,
    /// `u = sum(c * u_free)` over free dofs of other groups
    Linked(Vec<(DofRef, f64)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRef {
    Sp(usize),
    Mp(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofGroupKind {
    Node(usize),
    Lagrange(ConstraintRef),
}

#[derive(Debug, Clone)]
struct Multipliers {
    trial: DVector<f64>,
    committed: DVector<f64>,
}

/// Map from local rows onto free dofs
#[derive(Debug, Clone, Default)]
struct Transform {
    columns: Vec<DofRef>,
    matrix: Option<DMatrix<f64>>,
    ids: Vec<isize>,
}

#[derive(Debug, Clone)]
pub struct DofGroup {
    kind: DofGroupKind,
    maps: Vec<DofMap>,
    ids: Vec<isize>,
    multipliers: Option<Multipliers>,
    transform: Transform,
}

impl DofGroup {
    pub fn kind(&self) -> DofGroupKind {
        self.kind
    }

    pub fn node_tag(&self) -> Option<usize> {
        match self.kind {
            DofGroupKind::Node(tag) => Some(tag),
            DofGroupKind::Lagrange(_) => None,
        }
    }

    pub fn num_dof(&self) -> usize {
        self.maps.len()
    }

    pub fn maps(&self) -> &[DofMap] {
        &self.maps
    }

    /// Equation number per dof, `CONSTRAINED` or `TO_NUMBER` otherwise
    pub fn ids(&self) -> &[isize] {
        &self.ids
    }

    pub fn num_free(&self) -> usize {
        self.maps.iter().filter(|m| **m == DofMap::Free).count()
    }
}

/// What an FE element assembles
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeKind {
    Element(usize),
    PenaltySp { sp: usize, alpha: f64 },
    PenaltyMp { mp: usize, alpha: f64 },
    LagrangeSp { sp: usize, alpha: f64 },
    LagrangeMp { mp: usize, alpha: f64 },
}

#[derive(Debug, Clone)]
pub struct FeElement {
    kind: FeKind,
    rows: Vec<DofRef>,
    transform: Transform,
}

impl FeElement {
    pub fn kind(&self) -> FeKind {
        self.kind
    }

    /// Equation numbers of the transformed contributions
    pub fn ids(&self) -> &[isize] {
        &self.transform.ids
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, FeKind::Element(_))
    }
}

#[derive(Debug)]
pub struct AnalysisModel {
    domain: Domain,
    dof_groups: Vec<DofGroup>,
    node_groups: BTreeMap<usize, usize>,
    fe_elements: Vec<FeElement>,
    num_eqn: usize,
    handled_stamp: Option<u64>,
}

impl AnalysisModel {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            dof_groups: Vec::new(),
            node_groups: BTreeMap::new(),
            fe_elements: Vec::new(),
            num_eqn: 0,
            handled_stamp: None,
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Mutable access for model edits; topology edits bump the domain stamp
    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    pub fn into_domain(self) -> Domain {
        self.domain
    }

    /// True when the domain changed since the constraint handler last ran
    pub fn domain_changed(&self) -> bool {
        self.handled_stamp != Some(self.domain.stamp())
    }

    pub fn num_equations(&self) -> usize {
        self.num_eqn
    }

    pub fn dof_groups(&self) -> &[DofGroup] {
        &self.dof_groups
    }

    pub fn fe_elements(&self) -> &[FeElement] {
        &self.fe_elements
    }

    pub fn node_group(&self, node: usize) -> Option<usize> {
        self.node_groups.get(&node).copied()
    }

    // ----- building, used by the constraint handler -----

    pub(crate) fn clear_equations(&mut self) {
        self.dof_groups.clear();
        self.node_groups.clear();
        self.fe_elements.clear();
        self.num_eqn = 0;
        self.handled_stamp = None;
    }

    pub(crate) fn add_node_group(&mut self, node: usize, maps: Vec<DofMap>) -> usize {
        let index = self.dof_groups.len();
        let ids = maps
            .iter()
            .map(|m| if *m == DofMap::Free { TO_NUMBER } else { CONSTRAINED })
            .collect();
        self.dof_groups.push(DofGroup {
            kind: DofGroupKind::Node(node),
            maps,
            ids,
            multipliers: None,
            transform: Transform::default(),
        });
        self.node_groups.insert(node, index);
        index
    }

    pub(crate) fn add_lagrange_group(&mut self, constraint: ConstraintRef, size: usize) -> usize {
        let index = self.dof_groups.len();
        self.dof_groups.push(DofGroup {
            kind: DofGroupKind::Lagrange(constraint),
            maps: vec![DofMap::Free; size],
            ids: vec![TO_NUMBER; size],
            multipliers: Some(Multipliers {
                trial: DVector::zeros(size),
                committed: DVector::zeros(size),
            }),
            transform: Transform::default(),
        });
        index
    }

    pub(crate) fn set_dof_map(&mut self, group: usize, dof: usize, map: DofMap) {
        let g = &mut self.dof_groups[group];
        g.ids[dof] = if map == DofMap::Free { TO_NUMBER } else { CONSTRAINED };
        g.maps[dof] = map;
    }

    pub(crate) fn add_fe_element(&mut self, kind: FeKind, rows: Vec<DofRef>) {
        self.fe_elements.push(FeElement {
            kind,
            rows,
            transform: Transform::default(),
        });
    }

    /// Rows of the element's nodes, in connection order
    pub(crate) fn element_rows(&self, tag: usize) -> AnalysisResult<Vec<DofRef>> {
        let element = self
            .domain
            .element(tag)
            .ok_or(AnalysisError::ElementNotFound(tag))?;
        let mut rows = Vec::with_capacity(element.num_dof());
        for node in element.connected_nodes() {
            let group = self.node_group(*node).ok_or(AnalysisError::NodeNotFound(*node))?;
            rows.extend((0..self.dof_groups[group].num_dof()).map(|d| DofRef::new(group, d)));
        }
        Ok(rows)
    }

    fn transform_for(&self, rows: &[DofRef]) -> Transform {
        let mut columns: Vec<DofRef> = Vec::new();
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();
        let mut identity = true;
        for (r, row) in rows.iter().enumerate() {
            let terms: Vec<(DofRef, f64)> = match &self.dof_groups[row.group].maps[row.dof] {
                DofMap::Free => vec![(*row, 1.0)],
                DofMap::Eliminated => Vec::new(),
                DofMap::Linked(terms) => terms.clone(),
            };
            if terms.len() != 1 || terms[0] != (*row, 1.0) {
                identity = false;
            }
            for (dof, c) in terms {
                let col = match columns.iter().position(|x| *x == dof) {
                    Some(col) => col,
                    None => {
                        columns.push(dof);
                        columns.len() - 1
                    }
                };
                entries.push((r, col, c));
            }
        }
        let matrix = if identity && columns.len() == rows.len() {
            None
        } else {
            let mut t = DMatrix::zeros(rows.len(), columns.len());
            for (r, c, v) in entries {
                t[(r, c)] += v;
            }
            Some(t)
        };
        Transform {
            columns,
            matrix,
            ids: Vec::new(),
        }
    }

    /// Build the row-to-free-dof transformations once all groups exist
    pub(crate) fn complete_handling(&mut self) {
        for g in 0..self.dof_groups.len() {
            let rows: Vec<DofRef> = (0..self.dof_groups[g].num_dof())
                .map(|d| DofRef::new(g, d))
                .collect();
            self.dof_groups[g].transform = self.transform_for(&rows);
        }
        for f in 0..self.fe_elements.len() {
            let transform = self.transform_for(&self.fe_elements[f].rows);
            self.fe_elements[f].transform = transform;
        }
        self.handled_stamp = Some(self.domain.stamp());
        debug!(
            "analysis model holds {} dof groups and {} fe elements",
            self.dof_groups.len(),
            self.fe_elements.len()
        );
    }

    /// Number of dofs the numberer has to assign
    pub fn num_to_number(&self) -> usize {
        self.dof_groups
            .iter()
            .flat_map(|g| g.ids.iter())
            .filter(|&&id| id == TO_NUMBER)
            .count()
    }

    /// Graph of DOF groups connected through an FE element or a linked dof
    pub fn dof_group_graph(&self) -> Graph {
        let mut graph = Graph::new(self.dof_groups.len());
        for fe in &self.fe_elements {
            let mut groups: Vec<usize> = fe.transform.columns.iter().map(|c| c.group).collect();
            groups.sort_unstable();
            groups.dedup();
            graph.add_clique(&groups);
        }
        for (g, group) in self.dof_groups.iter().enumerate() {
            for col in &group.transform.columns {
                graph.add_edge(g, col.group);
            }
        }
        graph
    }

    pub(crate) fn set_group_ids(&mut self, group: usize, ids: Vec<isize>) -> AnalysisResult<()> {
        let g = self
            .dof_groups
            .get_mut(group)
            .ok_or_else(|| AnalysisError::InvalidInput(format!("no dof group {}", group)))?;
        if ids.len() != g.ids.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "dof group {} expects {} ids",
                group,
                g.ids.len()
            )));
        }
        g.ids = ids;
        Ok(())
    }

    /// Assign an equation number to a free dof that is waiting for one
    pub(crate) fn number_dof(&mut self, group: usize, dof: usize, eq: usize) {
        if self.dof_groups[group].ids[dof] == TO_NUMBER {
            self.dof_groups[group].ids[dof] = eq as isize;
        }
    }

    /// Resolve transformation ids after numbering and fix the equation count
    pub fn finalize_equations(&mut self) -> AnalysisResult<usize> {
        let mut max_id: isize = -1;
        let mut count = 0usize;
        for (g, group) in self.dof_groups.iter().enumerate() {
            for (d, &id) in group.ids.iter().enumerate() {
                if id == TO_NUMBER {
                    return Err(AnalysisError::formulation(
                        Stage::Numberer,
                        format!("dof {} of group {} was not numbered", d, g),
                    ));
                }
                if id >= 0 {
                    count += 1;
                    max_id = max_id.max(id);
                }
            }
        }
        if (max_id + 1) as usize != count {
            return Err(AnalysisError::formulation(
                Stage::Numberer,
                format!("equation numbers are not contiguous: {} dofs, max id {}", count, max_id),
            ));
        }
        self.resolve_transforms(count);
        Ok(count)
    }

    /// Accept ids numbered against a larger system this model is one part of.
    /// Ids only need to be below `num_eqn`.
    pub(crate) fn finalize_partial_equations(&mut self, num_eqn: usize) -> AnalysisResult<usize> {
        for (g, group) in self.dof_groups.iter().enumerate() {
            for (d, &id) in group.ids.iter().enumerate() {
                if id == TO_NUMBER || id >= num_eqn as isize {
                    return Err(AnalysisError::formulation(
                        Stage::Numberer,
                        format!("dof {} of group {} has id {} in a system of {}", d, g, id, num_eqn),
                    ));
                }
            }
        }
        self.resolve_transforms(num_eqn);
        Ok(num_eqn)
    }

    fn resolve_transforms(&mut self, num_eqn: usize) {
        let groups = &self.dof_groups;
        let resolve = |t: &Transform| -> Vec<isize> {
            t.columns.iter().map(|c| groups[c.group].ids[c.dof]).collect()
        };
        let group_ids: Vec<Vec<isize>> = groups.iter().map(|g| resolve(&g.transform)).collect();
        let fe_ids: Vec<Vec<isize>> = self.fe_elements.iter().map(|f| resolve(&f.transform)).collect();
        for (g, ids) in self.dof_groups.iter_mut().zip(group_ids) {
            g.transform.ids = ids;
        }
        for (f, ids) in self.fe_elements.iter_mut().zip(fe_ids) {
            f.transform.ids = ids;
        }
        self.num_eqn = num_eqn;
    }

    /// Equation connectivity used to size a system of equations
    pub fn equation_graph(&self) -> Graph {
        let mut graph = Graph::new(self.num_eqn);
        let mut connect = |ids: &[isize]| {
            let eqs: Vec<usize> = ids.iter().filter(|&&i| i >= 0).map(|&i| i as usize).collect();
            graph.add_clique(&eqs);
        };
        for fe in &self.fe_elements {
            connect(&fe.transform.ids);
        }
        for group in &self.dof_groups {
            connect(&group.transform.ids);
        }
        graph
    }

    // ----- state -----

    /// Apply loads at `time`, impose eliminated SP values and update elements
    pub fn apply_load(&mut self, time: f64) -> AnalysisResult<()> {
        self.domain.apply_load(time);
        self.impose_eliminated();
        self.update_domain()
    }

    fn impose_eliminated(&mut self) {
        let imposed: Vec<(usize, usize, f64)> = self
            .domain
            .sp_constraints()
            .filter(|sp| self.is_eliminated(sp))
            .map(|sp| (sp.node, sp.dof, self.domain.sp_value(sp)))
            .collect();
        for (node, dof, value) in imposed {
            if let Some(n) = self.domain.node_mut(node) {
                n.set_trial_disp_component(dof, value);
            }
        }
    }

    fn is_eliminated(&self, sp: &SpConstraint) -> bool {
        self.node_group(sp.node)
            .and_then(|g| self.dof_groups[g].maps.get(sp.dof))
            .map_or(false, |m| *m == DofMap::Eliminated)
    }

    pub fn update_domain(&mut self) -> AnalysisResult<()> {
        self.domain.update()
    }

    fn linked_value(&self, terms: &[(DofRef, f64)], x: &DVector<f64>) -> f64 {
        terms
            .iter()
            .map(|(r, c)| {
                let id = self.dof_groups[r.group].ids[r.dof];
                if id >= 0 {
                    c * x[id as usize]
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// Expand an equation vector onto one group's dofs; eliminated dofs read 0
    pub fn expand_group(&self, group: usize, x: &DVector<f64>) -> DVector<f64> {
        let g = &self.dof_groups[group];
        DVector::from_iterator(
            g.maps.len(),
            g.maps.iter().zip(&g.ids).map(|(map, &id)| match map {
                DofMap::Free if id >= 0 => x[id as usize],
                DofMap::Linked(terms) => self.linked_value(terms, x),
                _ => 0.0,
            }),
        )
    }

    /// Set trial response from equation vectors. Eliminated dofs keep the
    /// values imposed by `apply_load`.
    pub fn set_response(
        &mut self,
        disp: Option<&DVector<f64>>,
        vel: Option<&DVector<f64>>,
        accel: Option<&DVector<f64>>,
    ) {
        for g in 0..self.dof_groups.len() {
            let constrained: Vec<bool> = self.dof_groups[g]
                .maps
                .iter()
                .map(|m| *m == DofMap::Eliminated)
                .collect();
            let expanded = [disp, vel, accel].map(|x| x.map(|x| self.expand_group(g, x)));
            match self.dof_groups[g].kind {
                DofGroupKind::Node(tag) => {
                    let Some(node) = self.domain.node_mut(tag) else { continue };
                    for (d, skip) in constrained.iter().enumerate() {
                        if *skip {
                            continue;
                        }
                        if let Some(u) = &expanded[0] {
                            node.set_trial_disp_component(d, u[d]);
                        }
                        if let Some(v) = &expanded[1] {
                            node.set_trial_vel_component(d, v[d]);
                        }
                        if let Some(a) = &expanded[2] {
                            node.set_trial_accel_component(d, a[d]);
                        }
                    }
                }
                DofGroupKind::Lagrange(_) => {
                    if let (Some(u), Some(m)) = (&expanded[0], self.dof_groups[g].multipliers.as_mut()) {
                        m.trial.copy_from(u);
                    }
                }
            }
        }
    }

    /// Add an equation-space increment to the trial displacements
    pub fn increment_trial_disp(&mut self, dx: &DVector<f64>) {
        for g in 0..self.dof_groups.len() {
            let delta = self.expand_group(g, dx);
            let group = &mut self.dof_groups[g];
            match group.kind {
                DofGroupKind::Node(tag) => {
                    let Some(node) = self.domain.node_mut(tag) else { continue };
                    for (d, map) in group.maps.iter().enumerate() {
                        if *map != DofMap::Eliminated {
                            node.incr_trial_disp_component(d, delta[d]);
                        }
                    }
                }
                DofGroupKind::Lagrange(_) => {
                    if let Some(m) = group.multipliers.as_mut() {
                        m.trial += delta;
                    }
                }
            }
        }
    }

    /// Gather a node response into equation space
    pub fn eq_response(&self, kind: ResponseKind) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_eqn);
        for group in &self.dof_groups {
            let values = match group.kind {
                DofGroupKind::Node(tag) => match self.domain.node(tag) {
                    Some(node) => match kind {
                        ResponseKind::Disp => node.trial_disp().clone(),
                        ResponseKind::Vel => node.trial_vel().clone(),
                        ResponseKind::Accel => node.trial_accel().clone(),
                    },
                    None => continue,
                },
                DofGroupKind::Lagrange(_) => match (&group.multipliers, kind) {
                    (Some(m), ResponseKind::Disp) => m.trial.clone(),
                    _ => continue,
                },
            };
            for (d, &id) in group.ids.iter().enumerate() {
                if id >= 0 {
                    x[id as usize] = values[d];
                }
            }
        }
        x
    }

    /// Trial displacement of a node dof
    pub fn response(&self, node: usize, dof: usize) -> Option<f64> {
        self.domain
            .node(node)
            .and_then(|n| n.trial_disp().get(dof).copied())
    }

    pub fn commit(&mut self) -> AnalysisResult<()> {
        self.domain.commit();
        for m in self.dof_groups.iter_mut().filter_map(|g| g.multipliers.as_mut()) {
            m.committed.copy_from(&m.trial);
        }
        Ok(())
    }

    pub fn revert_to_last_commit(&mut self) -> AnalysisResult<()> {
        self.domain.revert_to_last_commit();
        for m in self.dof_groups.iter_mut().filter_map(|g| g.multipliers.as_mut()) {
            m.trial.copy_from(&m.committed);
        }
        Ok(())
    }

    pub fn revert_to_start(&mut self) -> AnalysisResult<()> {
        self.domain.revert_to_start();
        for m in self.dof_groups.iter_mut().filter_map(|g| g.multipliers.as_mut()) {
            m.trial.fill(0.0);
            m.committed.fill(0.0);
        }
        Ok(())
    }

    // ----- assembly -----

    fn row_values(&self, rows: &[DofRef]) -> DVector<f64> {
        DVector::from_iterator(
            rows.len(),
            rows.iter().map(|r| match self.dof_groups[r.group].kind {
                DofGroupKind::Node(tag) => self
                    .domain
                    .node(tag)
                    .map_or(0.0, |n| n.trial_disp()[r.dof]),
                DofGroupKind::Lagrange(_) => self.dof_groups[r.group]
                    .multipliers
                    .as_ref()
                    .map_or(0.0, |m| m.trial[r.dof]),
            }),
        )
    }

    fn sp(&self, tag: usize) -> AnalysisResult<&SpConstraint> {
        self.domain.sp_constraint(tag).ok_or_else(|| {
            AnalysisError::Constraint(format!("single-point constraint {} vanished", tag))
        })
    }

    fn mp(&self, tag: usize) -> AnalysisResult<&MpConstraint> {
        self.domain.mp_constraint(tag).ok_or_else(|| {
            AnalysisError::Constraint(format!("multi-point constraint {} vanished", tag))
        })
    }

    fn fe_stiffness(&self, fe: &FeElement, kind: TangentKind) -> AnalysisResult<DMatrix<f64>> {
        Ok(match fe.kind {
            FeKind::Element(tag) => {
                let e = self
                    .domain
                    .element(tag)
                    .ok_or(AnalysisError::ElementNotFound(tag))?;
                match kind {
                    TangentKind::Current => e.tangent_stiff(),
                    TangentKind::Initial => e.initial_stiff(),
                    TangentKind::Committed => e.committed_stiff(),
                }
            }
            FeKind::PenaltySp { alpha, .. } => DMatrix::from_element(1, 1, alpha),
            FeKind::PenaltyMp { mp, alpha } => {
                let g = self.mp(mp)?.gradient();
                g.transpose() * g * alpha
            }
            FeKind::LagrangeSp { alpha, .. } => {
                DMatrix::from_row_slice(2, 2, &[0.0, alpha, alpha, 0.0])
            }
            FeKind::LagrangeMp { mp, alpha } => {
                let g = self.mp(mp)?.gradient();
                let (nc, nu) = g.shape();
                let mut k = DMatrix::zeros(nu + nc, nu + nc);
                k.view_mut((0, nu), (nu, nc)).copy_from(&(g.transpose() * alpha));
                k.view_mut((nu, 0), (nc, nu)).copy_from(&(&g * alpha));
                k
            }
        })
    }

    fn fe_resisting_force(&self, fe: &FeElement) -> AnalysisResult<DVector<f64>> {
        Ok(match fe.kind {
            FeKind::Element(tag) => self
                .domain
                .element(tag)
                .ok_or(AnalysisError::ElementNotFound(tag))?
                .resisting_force(),
            FeKind::PenaltySp { sp, alpha } => {
                let target = self.domain.sp_value(self.sp(sp)?);
                let u = self.row_values(&fe.rows);
                DVector::from_element(1, alpha * (u[0] - target))
            }
            FeKind::PenaltyMp { mp, alpha } => {
                let g = self.mp(mp)?.gradient();
                let u = self.row_values(&fe.rows);
                g.transpose() * (&g * u) * alpha
            }
            FeKind::LagrangeSp { sp, alpha } => {
                let target = self.domain.sp_value(self.sp(sp)?);
                let v = self.row_values(&fe.rows);
                DVector::from_vec(vec![alpha * v[1], alpha * (v[0] - target)])
            }
            FeKind::LagrangeMp { mp, alpha } => {
                let g = self.mp(mp)?.gradient();
                let (nc, nu) = g.shape();
                let v = self.row_values(&fe.rows);
                let u = v.rows(0, nu).into_owned();
                let lambda = v.rows(nu, nc).into_owned();
                let mut f = DVector::zeros(nu + nc);
                f.rows_mut(0, nu).copy_from(&(g.transpose() * lambda * alpha));
                f.rows_mut(nu, nc).copy_from(&(&g * u * alpha));
                f
            }
        })
    }

    fn transformed_vector(v: &DVector<f64>, t: &Transform) -> DVector<f64> {
        match &t.matrix {
            Some(m) => m.transpose() * v,
            None => v.clone(),
        }
    }

    /// Hand every FE element's stiffness, in equation space, to `sink`
    pub fn visit_stiffness<F>(&self, kind: TangentKind, mut sink: F) -> AnalysisResult<()>
    where
        F: FnMut(&DMatrix<f64>, &[isize]) -> AnalysisResult<()>,
    {
        for fe in &self.fe_elements {
            let k = self.fe_stiffness(fe, kind)?;
            sink(&math::congruent(&k, fe.transform.matrix.as_ref()), &fe.transform.ids)?;
        }
        Ok(())
    }

    /// Hand element and nodal mass matrices, in equation space, to `sink`
    pub fn visit_mass<F>(&self, mut sink: F) -> AnalysisResult<()>
    where
        F: FnMut(&DMatrix<f64>, &[isize]) -> AnalysisResult<()>,
    {
        for fe in &self.fe_elements {
            if let FeKind::Element(tag) = fe.kind {
                let e = self
                    .domain
                    .element(tag)
                    .ok_or(AnalysisError::ElementNotFound(tag))?;
                let m = e.mass();
                if m.iter().any(|v| *v != 0.0) {
                    sink(&math::congruent(&m, fe.transform.matrix.as_ref()), &fe.transform.ids)?;
                }
            }
        }
        for group in &self.dof_groups {
            let DofGroupKind::Node(tag) = group.kind else { continue };
            if let Some(m) = self.domain.node(tag).and_then(|n| n.mass()) {
                sink(&math::congruent(m, group.transform.matrix.as_ref()), &group.transform.ids)?;
            }
        }
        Ok(())
    }

    /// Hand every FE element's resisting force, in equation space, to `sink`
    pub fn visit_resisting_forces<F>(&self, mut sink: F) -> AnalysisResult<()>
    where
        F: FnMut(&DVector<f64>, &[isize]) -> AnalysisResult<()>,
    {
        for fe in &self.fe_elements {
            let f = self.fe_resisting_force(fe)?;
            sink(&Self::transformed_vector(&f, &fe.transform), &fe.transform.ids)?;
        }
        Ok(())
    }

    /// Hand every node's applied load, in equation space, to `sink`
    pub fn visit_nodal_loads<F>(&self, mut sink: F) -> AnalysisResult<()>
    where
        F: FnMut(&DVector<f64>, &[isize]) -> AnalysisResult<()>,
    {
        for group in &self.dof_groups {
            let DofGroupKind::Node(tag) = group.kind else { continue };
            if let Some(p) = self.domain.node(tag).and_then(|n| n.unbalanced_load()) {
                sink(&Self::transformed_vector(p, &group.transform), &group.transform.ids)?;
            }
        }
        Ok(())
    }

    /// Applied nodal load vector at `time` without changing the domain
    pub fn load_vector_at(&self, time: f64) -> DVector<f64> {
        let mut out = DVector::zeros(self.num_eqn);
        for (tag, load) in self.domain.nodal_loads_at(time) {
            let Some(g) = self.node_group(tag) else { continue };
            let t = &self.dof_groups[g].transform;
            let v = Self::transformed_vector(&load, t);
            for (value, &id) in v.iter().zip(&t.ids) {
                if id >= 0 {
                    out[id as usize] += value;
                }
            }
        }
        out
    }

    /// Unit rigid-body translation along `dof` for every node that has it
    pub fn influence_vector(&self, dof: usize) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_eqn);
        for group in &self.dof_groups {
            let DofGroupKind::Node(tag) = group.kind else { continue };
            let translational = self.domain.node(tag).map_or(0, |n| n.coords().len());
            if dof < translational {
                if let Some(&id) = group.ids.get(dof) {
                    if id >= 0 {
                        r[id as usize] = 1.0;
                    }
                }
            }
        }
        r
    }

    /// Expand an equation vector to per-node dof vectors
    pub fn node_vectors(&self, x: &DVector<f64>) -> BTreeMap<usize, DVector<f64>> {
        self.dof_groups
            .iter()
            .enumerate()
            .filter_map(|(g, group)| group.node_tag().map(|tag| (tag, self.expand_group(g, x))))
            .collect()
    }
}

/// Node response quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Disp,
    Vel,
    Accel,
}
