use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use strand_core::config::EngineConfig;
use strand_core::error::{Result, StrandError};
use strand_core::event::EventBus;
use strand_core::traits::Controller;
use strand_core::types::{LogEvent, LogLevel, NodeState, RunId, RunSummary};

use crate::context::{ExecutionContext, SharedContext};
use crate::graph::{FlowGraph, Node};
use crate::registry::{Branch, NodeBehavior, NodeRegistry, ProcessScope};
use crate::runtime::RunStore;

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// `None` when the graph had no start node and nothing ran.
    pub run_id: Option<RunId>,
    pub context: ExecutionContext,
    /// Node states at the moment the run stopped.
    pub states: HashMap<String, NodeState>,
    pub summary: RunSummary,
    pub logs: Vec<LogEvent>,
}

impl RunReport {
    fn empty(context: ExecutionContext) -> Self {
        Self {
            run_id: None,
            context,
            states: HashMap::new(),
            summary: RunSummary::default(),
            logs: Vec::new(),
        }
    }

    pub fn state(&self, node_id: &str) -> NodeState {
        self.states.get(node_id).copied().unwrap_or_default()
    }

    /// Ids of failed nodes, sorted.
    pub fn failed_nodes(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| **state == NodeState::Failed)
            .map(|(id, _)| id.clone())
            .collect();
        failed.sort();
        failed
    }
}

/// Runs flow graphs.
///
/// Starting from the start node, each node's processor decides which
/// outgoing nodes run next; those are visited concurrently. Branches are
/// futures on the calling task, so there is no parallelism beyond what the
/// processors' awaits give. One executor runs one flow at a time.
pub struct FlowExecutor {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    store: Arc<RunStore>,
}

impl FlowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            config,
            store: Arc::new(RunStore::new(bus)),
        }
    }

    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    pub async fn run(&self, graph: &FlowGraph, initial: ExecutionContext) -> RunReport {
        self.run_with_cancel(graph, initial, CancellationToken::new())
            .await
    }

    /// Run until every branch ends or `cancel` fires. Cancellation is
    /// checked when a node is entered; running processors finish.
    pub async fn run_with_cancel(
        &self,
        graph: &FlowGraph,
        initial: ExecutionContext,
        cancel: CancellationToken,
    ) -> RunReport {
        let starts = graph.start_nodes();
        let Some(start) = starts.first().copied() else {
            info!("Flow has no start node, nothing to run");
            return RunReport::empty(initial);
        };
        if starts.len() > 1 {
            warn!(
                count = starts.len(),
                start = %start.id,
                "Flow has several start nodes, using the first"
            );
        }

        let run_id = self.store.start();
        info!(run_id = %run_id, nodes = graph.node_count(), "Flow run started");
        self.store
            .set_states(&graph.reachable_from(&start.id), NodeState::Waiting);

        let run = Run {
            graph,
            registry: &self.registry,
            store: &self.store,
            config: &self.config,
            context: SharedContext::new(initial),
            cancel,
            visits: Mutex::new(HashMap::new()),
        };
        run.visit(start).await;

        let summary = self.store.stop();
        let report = RunReport {
            run_id: Some(run_id.clone()),
            context: run.context.snapshot(),
            states: self.store.states(),
            summary,
            logs: self.store.logs(),
        };
        info!(
            run_id = %run_id,
            duration = %report.summary.duration_display(),
            in_tokens = report.summary.in_tokens,
            out_tokens = report.summary.out_tokens,
            cost = %report.summary.amount_display(),
            failed = report.failed_nodes().len(),
            "Flow run finished"
        );
        self.schedule_reset(run_id);
        report
    }

    fn schedule_reset(&self, run_id: RunId) {
        let delay = self.config.reset_delay();
        if delay.is_zero() {
            self.store.reset_states(&run_id);
            return;
        }
        let store = self.store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.reset_states(&run_id);
        });
    }
}

/// State of one run, borrowed by every branch.
struct Run<'g> {
    graph: &'g FlowGraph,
    registry: &'g NodeRegistry,
    store: &'g RunStore,
    config: &'g EngineConfig,
    context: SharedContext,
    cancel: CancellationToken,
    visits: Mutex<HashMap<String, usize>>,
}

impl<'g> Run<'g> {
    fn visit<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                debug!(node_id = %node.id, "Run cancelled, not entering node");
                return;
            }
            if self.store.state(&node.id) == NodeState::Running {
                debug!(node_id = %node.id, "Node already running");
                return;
            }
            let visits = self.count_visit(&node.id);
            if visits > self.config.max_node_visits {
                warn!(
                    node_id = %node.id,
                    visits,
                    limit = self.config.max_node_visits,
                    "Node visit limit reached, not running it again"
                );
                return;
            }

            let Some(behavior) = self.registry.behavior(node.kind) else {
                self.fail(node, &StrandError::UnknownNodeType(node.kind.to_string()));
                return;
            };

            self.store.set_state(&node.id, NodeState::Running);
            debug!(node_id = %node.id, node_type = %node.kind, "Executing node");

            match self.process(behavior, node).await {
                Ok(next) => {
                    self.store.set_state(&node.id, NodeState::Completed);
                    join_all(next.into_iter().map(|n| self.visit(n))).await;
                }
                Err(e) => self.fail(node, &e),
            }
        })
    }

    fn count_visit(&self, node_id: &str) -> usize {
        let mut visits = self
            .visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = visits.entry(node_id.to_string()).or_default();
        *count += 1;
        *count
    }

    async fn process<'a>(
        &'a self,
        behavior: &'a dyn NodeBehavior,
        node: &'a Node,
    ) -> Result<Vec<&'a Node>> {
        let scope = ProcessScope {
            context: &self.context,
            node,
            outgoing: self
                .graph
                .outgoing(&node.id)
                .filter_map(|edge| {
                    self.graph
                        .node(&edge.target)
                        .map(|target| Branch { edge, node: target })
                })
                .collect(),
            incoming: self.graph.parents(&node.id),
            controller: self.store,
            states: self.store.watch(),
            merge_timeout: self.config.merge_timeout(),
        };
        let work = behavior.process(scope);

        // Barriers are bounded by the merge timeout instead.
        match self.config.node_timeout() {
            Some(limit) if !node.kind.is_merge() => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| StrandError::NodeTimeout {
                    node_id: node.id.clone(),
                    timeout_secs: limit.as_secs(),
                })?,
            _ => work.await,
        }
    }

    /// Mark the node failed, and every not yet started node below it.
    fn fail(&self, node: &Node, err: &StrandError) {
        error!(node_id = %node.id, node_type = %node.kind, error = %err, "Node failed");
        self.store.set_state(&node.id, NodeState::Failed);

        let cascaded: Vec<String> = self
            .graph
            .reachable_from(&node.id)
            .into_iter()
            .filter(|id| {
                id != &node.id
                    && matches!(self.store.state(id), NodeState::Idle | NodeState::Waiting)
            })
            .collect();
        self.store.set_states(&cascaded, NodeState::Failed);

        self.store.log(
            LogEvent::new(&node.id, node.kind.as_str(), LogLevel::Error, "Node failed")
                .with_payload(json!({
                    "error": err.to_string(),
                    "cascaded": cascaded,
                })),
        );
    }
}
