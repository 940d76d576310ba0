//! In-memory orchestrator for testing and single-process use
//!
//! Tracks runs by name and wait tokens by value. Each token resolves at
//! most once. An optional step script plays the workflow's part: whenever
//! a run starts or a step succeeds, it may deposit the next `ActionResult`
//! on the run's session queue.

use super::{Orchestrator, StartOutcome, StartRequest};
use crate::action::ActionResult;
use crate::error::{RelayError, Result};
use crate::queue::{QueueRef, SessionQueueService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What resumed (or created) the current step
#[derive(Debug, Clone, PartialEq)]
pub enum StepTrigger {
    Start,
    Success(serde_json::Value),
}

/// Context handed to the step script
#[derive(Debug)]
pub struct StepContext<'a> {
    pub run_name: &'a str,
    /// 1-based step number
    pub step: u32,
    /// Token the new step waits on
    pub wait_token: &'a str,
    pub trigger: &'a StepTrigger,
}

/// Produces the next action list for a step, or `None` to stay silent
pub type StepScript = Arc<dyn Fn(&StepContext<'_>) -> Option<ActionResult> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Suspended on a wait token
    Waiting,
    /// Resumed with a failure; the run no longer waits
    Failed { reason: String },
}

/// A recorded orchestration run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub name: String,
    pub template_id: String,
    pub input: super::StartInput,
    pub started_at: DateTime<Utc>,
    pub steps: u32,
    pub status: RunStatus,
}

/// A token resolution observed by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Success {
        token: String,
        payload: serde_json::Value,
    },
    Failure {
        token: String,
        reason: String,
    },
}

#[derive(Default)]
struct State {
    runs: HashMap<String, RunRecord>,
    /// Live token → run name
    tokens: HashMap<String, String>,
    /// Run name → token its current step waits on
    current: HashMap<String, String>,
    start_attempts: usize,
    resolutions: Vec<Resolution>,
}

/// In-memory orchestrator
pub struct MemoryOrchestrator {
    state: Mutex<State>,
    steps: Option<(Arc<dyn SessionQueueService>, StepScript)>,
    available: AtomicBool,
}

impl Default for MemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrchestrator {
    /// Orchestrator that records calls but never produces actions
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            steps: None,
            available: AtomicBool::new(true),
        }
    }

    /// Orchestrator that runs `script` on each new step and deposits its
    /// output on the run's session queue
    pub fn with_steps(queues: Arc<dyn SessionQueueService>, script: StepScript) -> Self {
        Self {
            steps: Some((queues, script)),
            ..Self::new()
        }
    }

    /// Simulate the orchestrator being unreachable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn run(&self, name: &str) -> Option<RunRecord> {
        self.state.lock().await.runs.get(name).cloned()
    }

    pub async fn run_count(&self) -> usize {
        self.state.lock().await.runs.len()
    }

    /// Number of start requests received, including duplicates
    pub async fn start_attempts(&self) -> usize {
        self.state.lock().await.start_attempts
    }

    /// Token the run's current step waits on
    pub async fn current_token(&self, run_name: &str) -> Option<String> {
        self.state.lock().await.current.get(run_name).cloned()
    }

    pub async fn resolutions(&self) -> Vec<Resolution> {
        self.state.lock().await.resolutions.clone()
    }

    /// Invalidate a token as if its step had timed out
    pub async fn expire_token(&self, token: &str) {
        let mut state = self.state.lock().await;
        if let Some(run) = state.tokens.remove(token) {
            state.current.remove(&run);
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelayError::Connection("memory orchestrator unavailable".to_string()))
        }
    }

    /// Register a new step on `run_name` and return (step, token, queue)
    fn advance(state: &mut State, run_name: &str) -> Option<(u32, String, QueueRef)> {
        let run = state.runs.get_mut(run_name)?;
        run.steps += 1;
        run.status = RunStatus::Waiting;
        let step = run.steps;
        let queue = QueueRef::new(run.input.queue_url.clone());

        let token = format!("tok-{}", uuid::Uuid::new_v4());
        state.tokens.insert(token.clone(), run_name.to_string());
        state.current.insert(run_name.to_string(), token.clone());
        Some((step, token, queue))
    }

    async fn emit(
        &self,
        run_name: &str,
        step: u32,
        token: &str,
        queue: &QueueRef,
        trigger: StepTrigger,
    ) -> Result<()> {
        let Some((queues, script)) = &self.steps else {
            return Ok(());
        };
        let ctx = StepContext {
            run_name,
            step,
            wait_token: token,
            trigger: &trigger,
        };
        if let Some(result) = script(&ctx) {
            let body = serde_json::to_string(&result)?;
            queues.send(queue, &body).await?;
            tracing::debug!(run = run_name, step, "Step actions deposited");
        }
        Ok(())
    }

    async fn consume_token(&self, wait_token: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let run = state.tokens.remove(wait_token).ok_or_else(|| RelayError::StaleToken {
            token: wait_token.to_string(),
            reason: "TaskDoesNotExist".to_string(),
        })?;
        state.current.remove(&run);
        Ok(run)
    }
}

#[async_trait]
impl Orchestrator for MemoryOrchestrator {
    async fn start(&self, request: &StartRequest) -> Result<StartOutcome> {
        self.ensure_available()?;

        let (step, token, queue) = {
            let mut state = self.state.lock().await;
            state.start_attempts += 1;
            if state.runs.contains_key(&request.run_name) {
                return Ok(StartOutcome::AlreadyRunning);
            }
            state.runs.insert(
                request.run_name.clone(),
                RunRecord {
                    name: request.run_name.clone(),
                    template_id: request.template_id.clone(),
                    input: request.input.clone(),
                    started_at: Utc::now(),
                    steps: 0,
                    status: RunStatus::Waiting,
                },
            );
            match Self::advance(&mut state, &request.run_name) {
                Some(next) => next,
                None => return Ok(StartOutcome::Started),
            }
        };

        self.emit(&request.run_name, step, &token, &queue, StepTrigger::Start)
            .await?;
        Ok(StartOutcome::Started)
    }

    async fn resolve_success(&self, wait_token: &str, payload: &serde_json::Value) -> Result<()> {
        self.ensure_available()?;
        let run_name = self.consume_token(wait_token).await?;

        let next = {
            let mut state = self.state.lock().await;
            state.resolutions.push(Resolution::Success {
                token: wait_token.to_string(),
                payload: payload.clone(),
            });
            Self::advance(&mut state, &run_name)
        };

        if let Some((step, token, queue)) = next {
            self.emit(&run_name, step, &token, &queue, StepTrigger::Success(payload.clone()))
                .await?;
        }
        Ok(())
    }

    async fn resolve_failure(&self, wait_token: &str, reason: &str) -> Result<()> {
        self.ensure_available()?;
        let run_name = self.consume_token(wait_token).await?;

        let mut state = self.state.lock().await;
        state.resolutions.push(Resolution::Failure {
            token: wait_token.to_string(),
            reason: reason.to_string(),
        });
        if let Some(run) = state.runs.get_mut(&run_name) {
            run.status = RunStatus::Failed {
                reason: reason.to_string(),
            };
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
