use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::event::EventBus;
use strand_core::traits::Controller;
use strand_core::types::{FlowEvent, LogEvent, NodeState, RunId, RunSummary};

/// Read side of the run's node states.
///
/// Barriers wait on it; every state change wakes them.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<HashMap<String, NodeState>>,
}

impl StateWatch {
    pub fn get(&self, node_id: &str) -> NodeState {
        self.rx.borrow().get(node_id).copied().unwrap_or_default()
    }

    /// Wait until none of `node_ids` is idle, waiting or running.
    pub async fn wait_resolved(&mut self, node_ids: &[String]) -> Result<()> {
        self.rx
            .wait_for(|states| {
                node_ids
                    .iter()
                    .all(|id| !states.get(id).copied().unwrap_or_default().is_pending())
            })
            .await
            .map(|_| ())
            .map_err(|_| StrandError::Cancelled)
    }
}

#[derive(Default)]
struct Totals {
    run_id: Option<RunId>,
    summary: RunSummary,
    logs: Vec<LogEvent>,
}

/// Run-scoped state: node states, token and cost accumulators, and the
/// ordered event log. Every change is also published on the event bus.
pub struct RunStore {
    bus: Arc<EventBus>,
    states: watch::Sender<HashMap<String, NodeState>>,
    totals: Mutex<Totals>,
    running: AtomicBool,
}

impl RunStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        let (states, _) = watch::channel(HashMap::new());
        Self {
            bus,
            states,
            totals: Mutex::new(Totals::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn totals(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset accumulators and logs and open a new run.
    pub fn start(&self) -> RunId {
        let run_id = RunId::new();
        {
            let mut totals = self.totals();
            *totals = Totals {
                run_id: Some(run_id.clone()),
                summary: RunSummary {
                    started_at: Some(Utc::now()),
                    ..RunSummary::default()
                },
                logs: Vec::new(),
            };
        }
        self.running.store(true, Ordering::SeqCst);
        self.bus.publish(FlowEvent::RunStarted {
            run_id: run_id.clone(),
        });
        run_id
    }

    /// Close the current run and return its totals.
    pub fn stop(&self) -> RunSummary {
        let (run_id, summary) = {
            let mut totals = self.totals();
            totals.summary.ended_at = Some(Utc::now());
            (totals.run_id.clone().unwrap_or_default(), totals.summary.clone())
        };
        self.running.store(false, Ordering::SeqCst);
        self.bus.publish(FlowEvent::RunStopped {
            run_id,
            summary: summary.clone(),
        });
        summary
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.totals().run_id.clone()
    }

    pub fn set_state(&self, node_id: &str, state: NodeState) {
        self.states.send_modify(|states| {
            states.insert(node_id.to_string(), state);
        });
        debug!(node_id, state = %state, "Node state changed");
        self.bus.publish(FlowEvent::NodeStateChanged {
            node_id: node_id.to_string(),
            state,
        });
    }

    pub fn set_states(&self, node_ids: &[String], state: NodeState) {
        self.states.send_modify(|states| {
            for id in node_ids {
                states.insert(id.clone(), state);
            }
        });
        for id in node_ids {
            self.bus.publish(FlowEvent::NodeStateChanged {
                node_id: id.clone(),
                state,
            });
        }
    }

    pub fn state(&self, node_id: &str) -> NodeState {
        self.states.borrow().get(node_id).copied().unwrap_or_default()
    }

    pub fn states(&self) -> HashMap<String, NodeState> {
        self.states.borrow().clone()
    }

    pub fn watch(&self) -> StateWatch {
        StateWatch {
            rx: self.states.subscribe(),
        }
    }

    /// Return every node to `idle`, unless a newer run has started since
    /// `run_id` stopped.
    pub fn reset_states(&self, run_id: &RunId) {
        if self.is_running() || self.run_id().as_ref() != Some(run_id) {
            return;
        }
        let previous = self.states.send_replace(HashMap::new());
        for (node_id, state) in previous {
            if state != NodeState::Idle {
                self.bus.publish(FlowEvent::NodeStateChanged {
                    node_id,
                    state: NodeState::Idle,
                });
            }
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.totals().summary.clone()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.totals().logs.clone()
    }

    fn publish_usage(&self) {
        let summary = self.summary();
        self.bus.publish(FlowEvent::UsageUpdate {
            in_tokens: summary.in_tokens,
            out_tokens: summary.out_tokens,
            amount: summary.amount,
        });
    }
}

impl Controller for RunStore {
    fn log(&self, event: LogEvent) {
        self.totals().logs.push(event.clone());
        self.bus.publish(FlowEvent::NodeLog(event));
    }

    fn increase_in_token(&self, tokens: u64) {
        self.totals().summary.in_tokens += tokens;
        self.publish_usage();
    }

    fn increase_out_token(&self, tokens: u64) {
        self.totals().summary.out_tokens += tokens;
        self.publish_usage();
    }

    fn increase_amount(&self, cost: f64) {
        self.totals().summary.amount += cost;
        self.publish_usage();
    }
}
