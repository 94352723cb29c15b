//! Coordinator side of the distributed analysis

use std::collections::BTreeMap;

use log::{debug, info};
use nalgebra::DVector;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};

use super::partitioner::Partitioner;
use super::worker::{Command, LocalLayout, Worker};
use crate::analysis::{DofNumberer, SystemAssembler, TangentKind, TO_NUMBER};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::soe::{ContributionSoe, LinearSoe};

const CHANNEL_CAPACITY: usize = 8;

fn disconnected(worker: usize) -> AnalysisError {
    AnalysisError::Configuration(format!("partition worker {} is no longer running", worker))
}

/// Drives one worker per partition and assembles their contributions into
/// the global system.
///
/// All calls block the caller until every worker answered, so a coordinator
/// must not be used from inside an async context.
#[derive(Debug)]
pub struct Coordinator {
    // senders drop before the runtime so idle workers see a closed channel
    workers: Vec<mpsc::Sender<Command>>,
    _runtime: Runtime,
    num_eqn: usize,
}

impl Coordinator {
    /// Partition `domain` and start a load-control worker with the given
    /// increment on each part
    pub fn spawn(domain: Domain, partitioner: &Partitioner, increment: f64) -> AnalysisResult<Self> {
        let parts = partitioner.partition(domain)?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(parts.len())
            .thread_name("fea-partition")
            .enable_all()
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("cannot start worker runtime: {}", e)))?;

        let mut workers = Vec::with_capacity(parts.len());
        for (id, sub) in parts.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let worker = Worker::new(id, sub, increment);
            runtime.spawn_blocking(move || worker.run(rx));
            workers.push(tx);
        }
        info!("coordinator started {} partition workers", workers.len());
        Ok(Self {
            workers,
            _runtime: runtime,
            num_eqn: 0,
        })
    }

    pub fn num_partitions(&self) -> usize {
        self.workers.len()
    }

    /// Send one command to every worker, then collect all answers
    fn broadcast<T, F>(&self, make: F) -> AnalysisResult<Vec<T>>
    where
        F: Fn(oneshot::Sender<AnalysisResult<T>>) -> Command,
    {
        let mut pending = Vec::with_capacity(self.workers.len());
        for (id, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            worker.blocking_send(make(tx)).map_err(|_| disconnected(id))?;
            pending.push((id, rx));
        }
        pending
            .into_iter()
            .map(|(id, rx)| rx.blocking_recv().map_err(|_| disconnected(id)).and_then(|answer| answer))
            .collect()
    }

    /// Handle every partition, number the merged node graph and hand the
    /// global ids back. Returns the global equation graph.
    pub fn number(&mut self, numberer: &DofNumberer) -> AnalysisResult<Graph> {
        let layouts = self.broadcast(Command::Handle)?;
        let (mut ids, graph) = merge_layouts(&layouts)?;
        let tags: Vec<usize> = ids.keys().copied().collect();

        let mut eq = 0usize;
        for vertex in numberer.order(&graph) {
            if let Some(node_ids) = ids.get_mut(&tags[vertex]) {
                for id in node_ids.iter_mut().filter(|id| **id == TO_NUMBER) {
                    *id = eq as isize;
                    eq += 1;
                }
            }
        }
        let num_eqn = eq;

        let locals = self.broadcast(|reply| Command::Number {
            ids: ids.clone(),
            num_eqn,
            reply,
        })?;
        let mut merged = Graph::new(num_eqn);
        for local in &locals {
            merged.merge(local);
        }
        self.num_eqn = num_eqn;
        info!(
            "{} nodes across {} partitions numbered into {} equations ({:?})",
            tags.len(),
            self.workers.len(),
            num_eqn,
            numberer
        );
        Ok(merged)
    }

    /// Apply the next load increment on every partition; returns the target
    /// load factor
    pub fn new_step(&mut self, scale: f64) -> AnalysisResult<f64> {
        let targets = self.broadcast(|reply| Command::NewStep { scale, reply })?;
        targets
            .first()
            .copied()
            .ok_or_else(|| AnalysisError::Configuration("no partition workers".to_string()))
    }

    pub fn commit(&mut self) -> AnalysisResult<()> {
        self.broadcast(Command::Commit).map(|_| ())
    }

    pub fn revert(&mut self) -> AnalysisResult<()> {
        self.broadcast(Command::Revert).map(|_| ())
    }

    /// Trial displacement of a node dof from the first partition holding it
    pub fn response(&self, node: usize, dof: usize) -> Option<f64> {
        for worker in &self.workers {
            let (tx, rx) = oneshot::channel();
            if worker.blocking_send(Command::Response { node, dof, reply: tx }).is_err() {
                continue;
            }
            if let Ok(Some(value)) = rx.blocking_recv() {
                return Some(value);
            }
        }
        None
    }
}

/// Union of the partitions' node ids plus the node graph over sorted tags
fn merge_layouts(layouts: &[LocalLayout]) -> AnalysisResult<(BTreeMap<usize, Vec<isize>>, Graph)> {
    let mut ids: BTreeMap<usize, Vec<isize>> = BTreeMap::new();
    for layout in layouts {
        for (tag, node_ids) in &layout.nodes {
            match ids.get(tag) {
                Some(existing) if existing != node_ids => {
                    return Err(AnalysisError::Constraint(format!(
                        "partitions disagree on the constrained dofs of node {}",
                        tag
                    )));
                }
                Some(_) => {}
                None => {
                    ids.insert(*tag, node_ids.clone());
                }
            }
        }
    }
    let index: BTreeMap<usize, usize> = ids.keys().enumerate().map(|(v, &tag)| (tag, v)).collect();
    let mut graph = Graph::new(ids.len());
    for layout in layouts {
        for (a, b) in &layout.edges {
            if let (Some(&va), Some(&vb)) = (index.get(a), index.get(b)) {
                graph.add_edge(va, vb);
            }
        }
    }
    Ok((ids, graph))
}

impl SystemAssembler for Coordinator {
    fn num_equations(&self) -> usize {
        self.num_eqn
    }

    fn form_tangent(&mut self, soe: &mut dyn LinearSoe, kind: TangentKind) -> AnalysisResult<()> {
        let parts = self.broadcast(|reply| Command::FormTangent { kind, reply })?;
        soe.zero_a();
        for contributions in &parts {
            ContributionSoe::replay_into(contributions, soe)?;
        }
        debug!("tangent assembled from {} partitions", parts.len());
        Ok(())
    }

    fn form_unbalance(&mut self, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        let parts = self.broadcast(Command::FormUnbalance)?;
        let mut b = DVector::zeros(self.num_eqn);
        for part in &parts {
            b += part;
        }
        soe.set_b(&b)
    }

    fn update(&mut self, dx: &DVector<f64>) -> AnalysisResult<()> {
        self.broadcast(|reply| Command::Update { dx: dx.clone(), reply })
            .map(|_| ())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.try_send(Command::Shutdown);
        }
        debug!("coordinator shutting down {} workers", self.workers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rejects_inconsistent_constraints() {
        let a = LocalLayout {
            nodes: vec![(1, vec![-1]), (2, vec![TO_NUMBER])],
            edges: vec![(1, 2)],
        };
        let b = LocalLayout {
            nodes: vec![(2, vec![-1]), (3, vec![TO_NUMBER])],
            edges: vec![(2, 3)],
        };
        assert!(matches!(merge_layouts(&[a, b]), Err(AnalysisError::Constraint(_))));
    }

    #[test]
    fn test_merge_joins_shared_nodes() {
        let a = LocalLayout {
            nodes: vec![(1, vec![-1]), (2, vec![TO_NUMBER])],
            edges: vec![(1, 2)],
        };
        let b = LocalLayout {
            nodes: vec![(2, vec![TO_NUMBER]), (3, vec![TO_NUMBER])],
            edges: vec![(2, 3)],
        };
        let (ids, graph) = merge_layouts(&[a, b]).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(graph.num_edges(), 2);
        assert!(graph.has_edge(1, 2));
        assert!(!graph.has_edge(0, 2));
    }
}
