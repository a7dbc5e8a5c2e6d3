//! In-process stand-ins for [`ActionRouter`] and [`ConfigSource`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devgraph::config::{ConfigGraph, ConfigSource};
use devgraph::errors::{Result, TaskError};
use devgraph::router::{ActionResult, ActionRouter, BoxFuture, ResolvedAction, StatusReport};
use devgraph::types::ActionStatus;

#[derive(Debug, Default)]
struct Ledger {
    executed: Vec<String>,
    status_checks: Vec<String>,
    specs: HashMap<String, toml::Table>,
    dev_mode: HashSet<String>,
    running: usize,
    peak: usize,
}

/// A router that "executes" actions by sleeping and recording them.
///
/// Actions are addressed by their `kind.name` description, e.g. `build.api`.
#[derive(Debug, Default)]
pub struct FakeRouter {
    ledger: Mutex<Ledger>,
    failing: Mutex<HashSet<String>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    outputs: Mutex<HashMap<String, BTreeMap<String, String>>>,
    statuses: HashMap<String, ActionStatus>,
}

impl FakeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(self, action: &str) -> Self {
        self.set_failing(action, true);
        self
    }

    pub fn delay(mut self, action: &str, delay: Duration) -> Self {
        self.delays.insert(action.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn output(self, action: &str, key: &str, value: &str) -> Self {
        self.set_output(action, key, value);
        self
    }

    /// Answer status checks for `action` with `status`.
    pub fn status(mut self, action: &str, status: ActionStatus) -> Self {
        self.statuses.insert(action.to_string(), status);
        self
    }

    pub fn set_failing(&self, action: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(action.to_string());
        } else {
            set.remove(action);
        }
    }

    /// Change what later executions of `action` report for `key`.
    pub fn set_output(&self, action: &str, key: &str, value: &str) {
        self.outputs
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn outputs_of(&self, action: &str) -> BTreeMap<String, String> {
        self.outputs
            .lock()
            .unwrap()
            .get(action)
            .cloned()
            .unwrap_or_default()
    }

    /// Every execution so far, in start order.
    pub fn executions(&self) -> Vec<String> {
        self.ledger.lock().unwrap().executed.clone()
    }

    pub fn execution_count(&self, action: &str) -> usize {
        self.ledger
            .lock()
            .unwrap()
            .executed
            .iter()
            .filter(|a| *a == action)
            .count()
    }

    pub fn status_checks(&self) -> Vec<String> {
        self.ledger.lock().unwrap().status_checks.clone()
    }

    /// Spec of the last execution of `action`, as the router received it.
    pub fn resolved_spec(&self, action: &str) -> Option<toml::Table> {
        self.ledger.lock().unwrap().specs.get(action).cloned()
    }

    pub fn ran_in_dev_mode(&self, action: &str) -> bool {
        self.ledger.lock().unwrap().dev_mode.contains(action)
    }

    /// Highest number of simultaneous executions observed.
    pub fn peak_concurrency(&self) -> usize {
        self.ledger.lock().unwrap().peak
    }

    pub fn reset(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.executed.clear();
        ledger.status_checks.clear();
        ledger.specs.clear();
        ledger.dev_mode.clear();
        ledger.peak = ledger.running;
    }
}

impl ActionRouter for FakeRouter {
    fn execute<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, std::result::Result<ActionResult, TaskError>> {
        Box::pin(async move {
            let name = action.action.describe();
            {
                let mut ledger = self.ledger.lock().unwrap();
                ledger.executed.push(name.clone());
                ledger.specs.insert(name.clone(), action.spec.clone());
                if action.dev_mode {
                    ledger.dev_mode.insert(name.clone());
                }
                ledger.running += 1;
                ledger.peak = ledger.peak.max(ledger.running);
            }

            let delay = self.delays.get(&name).copied().unwrap_or(self.default_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.ledger.lock().unwrap().running -= 1;

            if self.failing.lock().unwrap().contains(&name) {
                return Err(TaskError::Execution(format!("{name} failed")));
            }
            Ok(ActionResult {
                outputs: self.outputs_of(&name),
            })
        })
    }

    fn get_status<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, std::result::Result<StatusReport, TaskError>> {
        Box::pin(async move {
            let name = action.action.describe();
            self.ledger.lock().unwrap().status_checks.push(name.clone());
            Ok(StatusReport {
                status: self.statuses.get(&name).copied().unwrap_or_default(),
                outputs: self.outputs_of(&name),
            })
        })
    }
}

/// A config source that replays queued load results.
///
/// Once the queue is empty, every load returns the last graph that loaded
/// successfully.
pub struct ScriptedConfigSource {
    queue: Mutex<VecDeque<Result<Arc<dyn ConfigGraph>>>>,
    current: Mutex<Arc<dyn ConfigGraph>>,
    loads: Mutex<usize>,
}

impl ScriptedConfigSource {
    pub fn new(initial: Arc<dyn ConfigGraph>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(initial),
            loads: Mutex::new(0),
        }
    }

    /// Queue the result of the next load.
    pub fn push(&self, next: Result<Arc<dyn ConfigGraph>>) {
        self.queue.lock().unwrap().push_back(next);
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock().unwrap()
    }
}

impl ConfigSource for ScriptedConfigSource {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ConfigGraph>>> {
        Box::pin(async move {
            *self.loads.lock().unwrap() += 1;
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(Ok(graph)) => {
                    *self.current.lock().unwrap() = graph.clone();
                    Ok(graph)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.current.lock().unwrap().clone()),
            }
        })
    }
}
