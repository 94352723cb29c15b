//! Partition worker: owns one sub-domain and answers coordinator requests

use std::collections::BTreeMap;

use log::{debug, trace};
use nalgebra::DVector;
use tokio::sync::{mpsc, oneshot};

use crate::analysis::{AnalysisModel, ConstraintHandler, IncrementalIntegrator, StaticIntegrator, TangentKind};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::soe::{Contribution, ContributionSoe, LinearSoe};

type Reply<T> = oneshot::Sender<AnalysisResult<T>>;

/// Node ids and node connectivity of a handled sub-domain
#[derive(Debug, Clone, Default)]
pub(crate) struct LocalLayout {
    /// `(node tag, ids)` with `CONSTRAINED` or `TO_NUMBER` per dof
    pub nodes: Vec<(usize, Vec<isize>)>,
    /// Node tag pairs sharing an element
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug)]
pub(crate) enum Command {
    Handle(Reply<LocalLayout>),
    Number {
        ids: BTreeMap<usize, Vec<isize>>,
        num_eqn: usize,
        reply: Reply<Graph>,
    },
    NewStep {
        scale: f64,
        reply: Reply<f64>,
    },
    FormTangent {
        kind: TangentKind,
        reply: Reply<Vec<Contribution>>,
    },
    FormUnbalance(Reply<DVector<f64>>),
    Update {
        dx: DVector<f64>,
        reply: Reply<()>,
    },
    Commit(Reply<()>),
    Revert(Reply<()>),
    Response {
        node: usize,
        dof: usize,
        reply: oneshot::Sender<Option<f64>>,
    },
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct Worker {
    id: usize,
    model: AnalysisModel,
    integrator: StaticIntegrator,
    soe: ContributionSoe,
}

impl Worker {
    pub fn new(id: usize, domain: Domain, increment: f64) -> Self {
        Self {
            id,
            model: AnalysisModel::new(domain),
            integrator: StaticIntegrator::load_control(increment),
            soe: ContributionSoe::new(),
        }
    }

    /// Serve commands until shutdown or until the coordinator goes away
    pub fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!("worker {} started", self.id);
        while let Some(command) = rx.blocking_recv() {
            trace!("worker {} <- {:?}", self.id, command);
            // a dropped reply means the coordinator stopped waiting
            match command {
                Command::Handle(reply) => {
                    let _ = reply.send(self.handle());
                }
                Command::Number { ids, num_eqn, reply } => {
                    let _ = reply.send(self.number(&ids, num_eqn));
                }
                Command::NewStep { scale, reply } => {
                    let _ = reply.send(self.integrator.new_step(&mut self.model, &mut self.soe, scale));
                }
                Command::FormTangent { kind, reply } => {
                    let _ = reply.send(self.form_tangent(kind));
                }
                Command::FormUnbalance(reply) => {
                    let _ = reply.send(self.form_unbalance());
                }
                Command::Update { dx, reply } => {
                    let _ = reply.send(self.integrator.update(&mut self.model, &dx));
                }
                Command::Commit(reply) => {
                    let _ = reply.send(self.integrator.commit(&mut self.model));
                }
                Command::Revert(reply) => {
                    let _ = reply.send(self.integrator.revert_to_last_step(&mut self.model));
                }
                Command::Response { node, dof, reply } => {
                    let _ = reply.send(self.model.response(node, dof));
                }
                Command::Shutdown => break,
            }
        }
        debug!("worker {} stopped", self.id);
    }

    fn handle(&mut self) -> AnalysisResult<LocalLayout> {
        ConstraintHandler::Plain.handle(&mut self.model)?;
        let groups = self.model.dof_groups();
        let nodes = groups
            .iter()
            .filter_map(|g| g.node_tag().map(|tag| (tag, g.ids().to_vec())))
            .collect();
        let edges = self
            .model
            .dof_group_graph()
            .edges()
            .into_iter()
            .filter_map(|(a, b)| Some((groups[a].node_tag()?, groups[b].node_tag()?)))
            .collect();
        Ok(LocalLayout { nodes, edges })
    }

    /// Take over the global ids of the local nodes and return the local
    /// share of the equation graph
    fn number(&mut self, ids: &BTreeMap<usize, Vec<isize>>, num_eqn: usize) -> AnalysisResult<Graph> {
        let local: Vec<(usize, usize)> = self
            .model
            .dof_groups()
            .iter()
            .enumerate()
            .filter_map(|(g, group)| group.node_tag().map(|tag| (g, tag)))
            .collect();
        for (group, tag) in local {
            let global = ids.get(&tag).ok_or(AnalysisError::NodeNotFound(tag))?;
            self.model.set_group_ids(group, global.clone())?;
        }
        self.model.finalize_partial_equations(num_eqn)?;
        self.soe.resize(num_eqn);
        self.integrator.domain_changed(&self.model)?;
        Ok(self.model.equation_graph())
    }

    fn form_tangent(&mut self, kind: TangentKind) -> AnalysisResult<Vec<Contribution>> {
        self.integrator.form_tangent(&self.model, &mut self.soe, kind)?;
        Ok(self.soe.take_matrices())
    }

    fn form_unbalance(&mut self) -> AnalysisResult<DVector<f64>> {
        self.integrator.form_unbalance(&self.model, &mut self.soe)?;
        Ok(self.soe.b().clone())
    }
}
