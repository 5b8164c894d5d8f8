//! Provisioning engine
//!
//! Drives a declaration through the scheduler layer by layer. Nodes of one
//! layer are applied concurrently; the next layer starts only after every
//! node of the current one has finished. State is saved after each layer so
//! an interrupted run resumes without repeating completed work.

use crate::action::{Action, ActionType, Plan, RunReport};
use crate::error::{CloudError, Result};
use crate::operator::{Decision, NodeOutcome, Operator};
use crate::state::{GlobalState, ResourceState, StateManager};
use futures_util::future::join_all;
use stackflow_core::{
    Declaration, DependencyGraph, ExportSet, GraphScope, ResolveError, Schedule, Scope,
    materialize, resolve_inputs,
};
use std::collections::HashSet;
use std::time::Instant;

/// Runs plans, applies and teardowns against one backend and state file
pub struct Engine {
    operator: Operator,
    state: StateManager,
}

impl Engine {
    pub fn new(operator: Operator, state: StateManager) -> Self {
        Self { operator, state }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    /// Build and schedule the graph, refusing kinds the backend cannot manage
    fn prepare(&self, declaration: &Declaration) -> Result<(DependencyGraph, Schedule)> {
        declaration.validate()?;
        let graph = DependencyGraph::build(&declaration.resources)?;
        let schedule = graph.schedule()?;

        for node in graph.nodes() {
            let kind = &node.descriptor().kind;
            if !self.operator.backend().supports(kind) {
                return Err(CloudError::UnsupportedKind(kind.clone()));
            }
        }

        Ok((graph, schedule))
    }

    /// Apply a declaration
    ///
    /// Fatal errors (cycles, unknown references, unsupported kinds) are
    /// returned before any backend call. Node failures are recorded in the
    /// report: sibling nodes of the failing layer still finish, later layers
    /// are skipped and no exports are computed.
    pub async fn apply(&self, declaration: &Declaration) -> Result<RunReport> {
        let start = Instant::now();
        let (mut graph, schedule) = self.prepare(declaration)?;
        let mut state = self.state.load().await?;
        warn_orphans(declaration, &state);

        let mut report = RunReport::new();
        let mut halted = false;
        tracing::info!(
            "Applying stack '{}': {} resources in {} layers",
            declaration.name,
            graph.len(),
            schedule.len()
        );

        for (index, layer) in schedule.layers().iter().enumerate() {
            for name in layer {
                graph.node_mut(name)?.mark_applying();
            }
            tracing::debug!("Layer {}: {:?}", index + 1, layer);

            let results = {
                let scope = GraphScope::new(&graph, &declaration.variables);
                let tasks = layer.iter().map(|name| {
                    let scope = &scope;
                    let graph = &graph;
                    let prior = state.get_resource(name).cloned();
                    async move { (name, self.apply_node(graph, scope, name, prior).await) }
                });
                join_all(tasks).await
            };

            let mut failed = false;
            for (name, (action, result)) in results {
                match result {
                    Ok(outcome) => {
                        graph.node_mut(name)?.mark_applied(outcome.live)?;
                        state.set_resource(name.clone(), outcome.state);
                        report.add_success(name.clone(), outcome.action);
                    }
                    Err(e) => {
                        tracing::error!("Failed to apply {}: {}", name, e);
                        if e.resource_gone() {
                            state.remove_resource(name);
                        }
                        graph.node_mut(name)?.mark_failed();
                        report.add_failure(name.clone(), action, e.to_string());
                        failed = true;
                    }
                }
            }

            self.state.save(&state).await?;

            if failed {
                for name in schedule.remaining_after(index) {
                    graph.node_mut(name)?.mark_skipped();
                    report.add_skipped(name);
                }
                halted = true;
                break;
            }
        }

        if halted {
            tracing::warn!("Run halted; derived values and exports are not computed");
        } else {
            match materialize(declaration, &graph) {
                Ok((_, exports)) => report.exports = Some(exports),
                Err(e) => {
                    tracing::warn!("Exports not materialized: {}", e);
                    report.export_error = Some(e.to_string());
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Apply finished in {}ms ({} nodes)",
            report.duration_ms,
            report.nodes.len()
        );
        Ok(report)
    }

    async fn apply_node(
        &self,
        graph: &DependencyGraph,
        scope: &dyn Scope,
        name: &str,
        prior: Option<ResourceState>,
    ) -> (Option<ActionType>, Result<NodeOutcome>) {
        let Some(node) = graph.node(name) else {
            return (None, Err(CloudError::StateError(format!("{} is not in the graph", name))));
        };
        let descriptor = node.descriptor();

        let resolved = match resolve_inputs(&descriptor.inputs, scope) {
            Ok(resolved) => resolved,
            Err(e) => return (None, Err(e.into())),
        };
        if resolved.contains_secret() {
            tracing::debug!("{} receives secret inputs {:?}", name, resolved.secret_keys);
        }

        let decision = self
            .operator
            .decide(descriptor, &resolved.values, prior.as_ref());
        let action = decision.action_type();
        let result = self
            .operator
            .execute(descriptor, resolved.values, prior, decision)
            .await;
        (Some(action), result)
    }

    /// Compute the actions an apply would take, without mutating calls
    ///
    /// Resources whose inputs depend on not-yet-created resources are
    /// reported with `pending_inputs`.
    pub async fn plan(&self, declaration: &Declaration) -> Result<Plan> {
        let (mut graph, schedule) = self.prepare(declaration)?;
        let state = self.state.load().await?;
        warn_orphans(declaration, &state);

        for name in schedule.apply_order() {
            if let Some(prior) = state.get_resource(name) {
                graph.node_mut(name)?.mark_applied(prior.live_state())?;
            }
        }

        let scope = GraphScope::new(&graph, &declaration.variables);
        let mut changing: HashSet<&str> = HashSet::new();
        let mut actions = Vec::new();

        for name in schedule.apply_order() {
            let Some(node) = graph.node(name) else {
                continue;
            };
            let descriptor = node.descriptor();
            let prior = state.get_resource(name);
            let upstream_changing = node
                .dependencies()
                .iter()
                .any(|dep| changing.contains(dep.as_str()));

            let (action_type, fields, pending) = match resolve_inputs(&descriptor.inputs, &scope) {
                Ok(resolved) => {
                    let decision = self.operator.decide(descriptor, &resolved.values, prior);
                    match decision {
                        Decision::NoOp if upstream_changing => {
                            (ActionType::Update, Vec::new(), true)
                        }
                        other => (other.action_type(), other.fields(), upstream_changing),
                    }
                }
                Err(ResolveError::UnresolvedReference(_)) => {
                    let action_type = match (prior, descriptor.policy.import_id()) {
                        (Some(_), _) => ActionType::Update,
                        (None, Some(_)) => ActionType::Import,
                        (None, None) => ActionType::Create,
                    };
                    (action_type, Vec::new(), true)
                }
                Err(e) => return Err(e.into()),
            };

            if matches!(
                action_type,
                ActionType::Create | ActionType::Import | ActionType::Replace
            ) || pending
            {
                changing.insert(name);
            }

            actions.push(Action {
                resource: name.to_string(),
                kind: descriptor.kind.clone(),
                action_type,
                fields,
                pending_inputs: pending,
            });
        }

        Ok(Plan::new(actions))
    }

    /// Tear down in reverse layer order
    ///
    /// Protected and imported resources are retained. A failure stops the
    /// teardown after the current layer.
    pub async fn destroy(&self, declaration: &Declaration) -> Result<RunReport> {
        let start = Instant::now();
        let (graph, schedule) = self.prepare(declaration)?;
        let mut state = self.state.load().await?;
        let mut report = RunReport::new();

        let layers = schedule.destroy_layers();
        for (index, layer) in layers.iter().enumerate() {
            let results = {
                let tasks = layer.iter().map(|name| {
                    let graph = &graph;
                    let prior = state.get_resource(name);
                    async move {
                        let result = match graph.node(name) {
                            Some(node) => self.operator.destroy(node.descriptor(), prior).await,
                            None => Ok(ActionType::Absent),
                        };
                        (name, result)
                    }
                });
                join_all(tasks).await
            };

            let mut failed = false;
            for (name, result) in results {
                match result {
                    Ok(action) => {
                        if action == ActionType::Delete {
                            state.remove_resource(name);
                        }
                        report.add_success(name.clone(), action);
                    }
                    Err(e) => {
                        tracing::error!("Failed to delete {}: {}", name, e);
                        report.add_failure(name.clone(), Some(ActionType::Delete), e.to_string());
                        failed = true;
                    }
                }
            }

            self.state.save(&state).await?;

            if failed {
                for name in layers.iter().skip(index + 1).flat_map(|l| l.iter()) {
                    report.add_skipped(name.clone());
                }
                break;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Exports computed from recorded state, without backend calls
    pub async fn outputs(&self, declaration: &Declaration) -> Result<ExportSet> {
        let (mut graph, schedule) = self.prepare(declaration)?;
        let state = self.state.load().await?;

        for name in schedule.apply_order() {
            if let Some(prior) = state.get_resource(name) {
                graph.node_mut(name)?.mark_applied(prior.live_state())?;
            }
        }

        let (_, exports) = materialize(declaration, &graph)?;
        Ok(exports)
    }
}

/// Resources recorded in state but no longer declared are left alone
fn warn_orphans(declaration: &Declaration, state: &GlobalState) {
    for (name, resource) in &state.resources {
        if !declaration.resources.iter().any(|r| &r.name == name) {
            tracing::warn!(
                "{} ({} {}) is in state but no longer declared; leaving it untouched",
                name,
                resource.kind,
                resource.id
            );
        }
    }
}
