//! Domain - the model provider the solution engine works on
//!
//! Holds nodes, elements, constraints and load patterns, tracks a stamp that
//! changes whenever topology or constraints change, and owns the trial and
//! committed state of every node and element.

mod constraint;
mod node;

use std::collections::BTreeMap;

use log::debug;
use nalgebra::DVector;

use crate::elements::Element;
use crate::error::{AnalysisError, AnalysisResult, Stage};
use crate::loads::LoadPattern;

pub use constraint::{MpConstraint, SpConstraint};
pub use node::{Node, Response};

#[derive(Debug, Default)]
pub struct Domain {
    nodes: BTreeMap<usize, Node>,
    elements: BTreeMap<usize, Box<dyn Element>>,
    sp_constraints: BTreeMap<usize, SpConstraint>,
    mp_constraints: BTreeMap<usize, MpConstraint>,
    patterns: BTreeMap<usize, LoadPattern>,
    current_time: f64,
    committed_time: f64,
    stamp: u64,
    eigenvalues: Vec<f64>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change counter for topology and constraints
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    fn touch(&mut self) {
        self.stamp += 1;
    }

    pub fn add_node(&mut self, node: Node) -> AnalysisResult<()> {
        if self.nodes.contains_key(&node.tag()) {
            return Err(AnalysisError::InvalidInput(format!(
                "node {} already exists",
                node.tag()
            )));
        }
        self.nodes.insert(node.tag(), node);
        self.touch();
        Ok(())
    }

    pub fn add_element(&mut self, mut element: Box<dyn Element>) -> AnalysisResult<()> {
        let tag = element.tag();
        if self.elements.contains_key(&tag) {
            return Err(AnalysisError::InvalidInput(format!(
                "element {} already exists",
                tag
            )));
        }
        let nodes = element
            .connected_nodes()
            .iter()
            .map(|n| self.nodes.get(n).ok_or(AnalysisError::NodeNotFound(*n)))
            .collect::<AnalysisResult<Vec<&Node>>>()?;
        element.set_nodes(&nodes)?;
        self.elements.insert(tag, element);
        self.touch();
        Ok(())
    }

    pub fn remove_element(&mut self, tag: usize) -> AnalysisResult<Box<dyn Element>> {
        let element = self
            .elements
            .remove(&tag)
            .ok_or(AnalysisError::ElementNotFound(tag))?;
        self.touch();
        Ok(element)
    }

    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> AnalysisResult<()> {
        if self.sp_constraints.contains_key(&sp.tag) {
            return Err(AnalysisError::InvalidInput(format!(
                "single-point constraint {} already exists",
                sp.tag
            )));
        }
        self.sp_constraints.insert(sp.tag, sp);
        self.touch();
        Ok(())
    }

    /// Fix the listed dofs of a node, tagging constraints from `first_tag`
    pub fn fix(&mut self, node: usize, dofs: &[usize], first_tag: usize) -> AnalysisResult<()> {
        for (i, &dof) in dofs.iter().enumerate() {
            self.add_sp_constraint(SpConstraint::fixed(first_tag + i, node, dof))?;
        }
        Ok(())
    }

    pub fn remove_sp_constraint(&mut self, tag: usize) -> Option<SpConstraint> {
        let sp = self.sp_constraints.remove(&tag);
        if sp.is_some() {
            self.touch();
        }
        sp
    }

    pub fn add_mp_constraint(&mut self, mp: MpConstraint) -> AnalysisResult<()> {
        if self.mp_constraints.contains_key(&mp.tag) {
            return Err(AnalysisError::InvalidInput(format!(
                "multi-point constraint {} already exists",
                mp.tag
            )));
        }
        if mp.matrix.shape() != (mp.constrained_dofs.len(), mp.retained_dofs.len()) {
            return Err(AnalysisError::InvalidInput(format!(
                "multi-point constraint {} matrix shape does not match its dofs",
                mp.tag
            )));
        }
        self.mp_constraints.insert(mp.tag, mp);
        self.touch();
        Ok(())
    }

    pub fn add_load_pattern(&mut self, pattern: LoadPattern) -> AnalysisResult<()> {
        for load in &pattern.node_loads {
            let node = self
                .nodes
                .get(&load.node)
                .ok_or(AnalysisError::NodeNotFound(load.node))?;
            if load.values.len() != node.ndf() {
                return Err(AnalysisError::InvalidInput(format!(
                    "load on node {} has {} values for {} dofs",
                    load.node,
                    load.values.len(),
                    node.ndf()
                )));
            }
        }
        self.patterns.insert(pattern.tag, pattern);
        Ok(())
    }

    pub fn node(&self, tag: usize) -> Option<&Node> {
        self.nodes.get(&tag)
    }

    pub fn node_mut(&mut self, tag: usize) -> Option<&mut Node> {
        self.nodes.get_mut(&tag)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn element(&self, tag: usize) -> Option<&dyn Element> {
        self.elements.get(&tag).map(|e| e.as_ref())
    }

    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> {
        self.elements.values().map(|e| e.as_ref())
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn sp_constraints(&self) -> impl Iterator<Item = &SpConstraint> {
        self.sp_constraints.values()
    }

    pub fn sp_constraint(&self, tag: usize) -> Option<&SpConstraint> {
        self.sp_constraints.get(&tag)
    }

    pub fn mp_constraints(&self) -> impl Iterator<Item = &MpConstraint> {
        self.mp_constraints.values()
    }

    pub fn mp_constraint(&self, tag: usize) -> Option<&MpConstraint> {
        self.mp_constraints.get(&tag)
    }

    pub fn load_patterns(&self) -> impl Iterator<Item = &LoadPattern> {
        self.patterns.values()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    /// Prescribed value of an SP constraint at the current time
    pub fn sp_value(&self, sp: &SpConstraint) -> f64 {
        self.sp_value_at(sp, self.current_time)
    }

    pub fn sp_value_at(&self, sp: &SpConstraint, time: f64) -> f64 {
        match sp.pattern.and_then(|p| self.patterns.get(&p)) {
            Some(pattern) => sp.value * pattern.series.factor(time),
            None => sp.value,
        }
    }

    /// Nodal loads of every pattern evaluated at `time`, summed per node
    pub fn nodal_loads_at(&self, time: f64) -> BTreeMap<usize, DVector<f64>> {
        let mut loads: BTreeMap<usize, DVector<f64>> = BTreeMap::new();
        for pattern in self.patterns.values() {
            let factor = pattern.series.factor(time);
            for load in &pattern.node_loads {
                let entry = loads
                    .entry(load.node)
                    .or_insert_with(|| DVector::zeros(load.values.len()));
                entry.axpy(factor, &load.values, 1.0);
            }
        }
        loads
    }

    /// Set the pseudo-time and the nodal unbalanced loads it implies
    pub fn apply_load(&mut self, time: f64) {
        for node in self.nodes.values_mut() {
            node.zero_unbalanced_load();
        }
        for (tag, load) in self.nodal_loads_at(time) {
            if let Some(node) = self.nodes.get_mut(&tag) {
                node.add_unbalanced_load(&load, 1.0);
            }
        }
        self.current_time = time;
    }

    /// Trial displacements of an element's nodes, concatenated in connection order
    pub fn element_trial_disp(&self, element: &dyn Element) -> AnalysisResult<DVector<f64>> {
        let mut values = Vec::with_capacity(element.num_dof());
        for tag in element.connected_nodes() {
            let node = self.nodes.get(tag).ok_or(AnalysisError::NodeNotFound(*tag))?;
            values.extend(node.trial_disp().iter());
        }
        Ok(DVector::from_vec(values))
    }

    /// Bring every element to its nodes' trial displacements
    pub fn update(&mut self) -> AnalysisResult<()> {
        let nodes = &self.nodes;
        for element in self.elements.values_mut() {
            let mut values = Vec::with_capacity(element.num_dof());
            for tag in element.connected_nodes() {
                let node = nodes.get(tag).ok_or(AnalysisError::NodeNotFound(*tag))?;
                values.extend(node.trial_disp().iter());
            }
            element.update(&DVector::from_vec(values)).map_err(|e| match e {
                AnalysisError::Formulation { .. } => e,
                other => AnalysisError::formulation(Stage::Update, other.to_string()),
            })?;
        }
        Ok(())
    }

    /// Make the trial state of every node and element the committed state
    pub fn commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.commit_state();
        }
        for element in self.elements.values_mut() {
            element.commit_state();
        }
        self.committed_time = self.current_time;
        debug!("domain committed at time {}", self.committed_time);
    }

    /// Discard trial state and restore the loads of the committed time
    pub fn revert_to_last_commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_last_commit();
        }
        for element in self.elements.values_mut() {
            element.revert_to_last_commit();
        }
        self.apply_load(self.committed_time);
    }

    pub fn revert_to_start(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_start();
        }
        for element in self.elements.values_mut() {
            element.revert_to_start();
        }
        self.current_time = 0.0;
        self.committed_time = 0.0;
        self.eigenvalues.clear();
    }

    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Store eigenvalues and per-node mode shapes
    pub fn set_eigen(&mut self, values: Vec<f64>, mut vectors: BTreeMap<usize, Vec<DVector<f64>>>) {
        self.eigenvalues = values;
        for (tag, node) in self.nodes.iter_mut() {
            node.set_eigenvectors(vectors.remove(tag).unwrap_or_default());
        }
    }

    /// Split into parts for partitioning
    pub(crate) fn into_parts(self) -> DomainParts {
        DomainParts {
            nodes: self.nodes,
            elements: self.elements,
            sp_constraints: self.sp_constraints,
            mp_constraints: self.mp_constraints,
            patterns: self.patterns,
        }
    }
}

/// Owned contents of a domain
pub(crate) struct DomainParts {
    pub nodes: BTreeMap<usize, Node>,
    pub elements: BTreeMap<usize, Box<dyn Element>>,
    pub sp_constraints: BTreeMap<usize, SpConstraint>,
    pub mp_constraints: BTreeMap<usize, MpConstraint>,
    pub patterns: BTreeMap<usize, LoadPattern>,
}
