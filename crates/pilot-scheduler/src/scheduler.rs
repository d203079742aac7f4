//! Agent scheduler - one interval timer per scheduled agent id

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use pilot_core::config::OverlapPolicy;
use pilot_core::{AgentId, Error, Result};
use pilot_state_store::AgentStore;

use crate::runner::AgentJobRunner;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Jobs may be registered; no timer ticks yet
    Pending,
    Running,
    /// Timers aborted; cannot be restarted
    Stopped,
}

/// Timer changes applied by one `reconcile` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<AgentId>,
    pub updated: Vec<AgentId>,
    pub removed: Vec<AgentId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

struct ScheduledJob {
    interval: Duration,
    /// Timer task, present only while the scheduler is running
    task: Option<JoinHandle<()>>,
}

struct Inner {
    state: SchedulerState,
    jobs: HashMap<AgentId, ScheduledJob>,
    /// Per-agent run gates used by the skip and serial overlap policies
    gates: HashMap<AgentId, Arc<Mutex<()>>>,
    reconciler: Option<JoinHandle<()>>,
}

/// Periodic trigger for agent executions.
///
/// Holds exactly one timer per scheduled agent id. Firings never wait for
/// each other: every one runs the job on its own task, subject to the
/// overlap policy.
pub struct AgentScheduler {
    runner: Arc<dyn AgentJobRunner>,
    policy: OverlapPolicy,
    inner: Mutex<Inner>,
}

impl AgentScheduler {
    pub fn new(runner: Arc<dyn AgentJobRunner>, policy: OverlapPolicy) -> Self {
        Self {
            runner,
            policy,
            inner: Mutex::new(Inner {
                state: SchedulerState::Pending,
                jobs: HashMap::new(),
                gates: HashMap::new(),
                reconciler: None,
            }),
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Install a job for every enabled agent in `store`
    pub async fn load_jobs(&self, store: &dyn AgentStore) -> Result<usize> {
        let agents = store.list_enabled_agent_definitions().await?;
        for agent in &agents {
            self.add_or_update_job(agent.id, agent.schedule_seconds).await?;
        }
        info!(count = agents.len(), "Loaded agent jobs");
        Ok(agents.len())
    }

    /// Install the job for `agent_id`, replacing any existing timer
    pub async fn add_or_update_job(&self, agent_id: AgentId, interval_seconds: u64) -> Result<()> {
        if interval_seconds == 0 {
            return Err(Error::invalid_argument(format!(
                "agent {} interval must be positive",
                agent_id
            )));
        }
        let interval = Duration::from_secs(interval_seconds);
        let first_tick = first_deadline(agent_id, interval)?;

        let mut inner = self.inner.lock().await;
        let replaced = match inner.jobs.remove(&agent_id) {
            Some(old) => {
                if let Some(task) = old.task {
                    task.abort();
                }
                true
            }
            None => false,
        };

        let task = if inner.state == SchedulerState::Running {
            let gate = Arc::clone(inner.gates.entry(agent_id).or_default());
            Some(self.spawn_timer(agent_id, first_tick, interval, gate))
        } else {
            None
        };
        inner.jobs.insert(agent_id, ScheduledJob { interval, task });

        info!(agent_id, interval_seconds, replaced, "Scheduled agent job");
        Ok(())
    }

    /// Tear down the job for `agent_id`; `false` if none was scheduled
    pub async fn remove_job(&self, agent_id: AgentId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = match inner.jobs.remove(&agent_id) {
            Some(job) => {
                if let Some(task) = job.task {
                    task.abort();
                }
                info!(agent_id, "Removed agent job");
                true
            }
            None => false,
        };

        // A gate outlives its job while a run or a dying timer still holds
        // it, so a re-added job keeps excluding the in-flight run
        let Inner { jobs, gates, .. } = &mut *inner;
        gates.retain(|id, gate| jobs.contains_key(id) || Arc::strong_count(gate) > 1);
        removed
    }

    /// Start ticking every registered job
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SchedulerState::Running => return Ok(()),
            SchedulerState::Stopped => {
                return Err(Error::invalid_argument("scheduler has been shut down"))
            }
            SchedulerState::Pending => {}
        }

        let first_ticks = inner
            .jobs
            .iter()
            .map(|(id, job)| first_deadline(*id, job.interval).map(|at| (*id, at)))
            .collect::<Result<HashMap<_, _>>>()?;
        inner.state = SchedulerState::Running;

        let Inner { jobs, gates, .. } = &mut *inner;
        for (agent_id, job) in jobs.iter_mut() {
            let gate = Arc::clone(gates.entry(*agent_id).or_default());
            let first_tick = first_ticks[agent_id];
            job.task = Some(self.spawn_timer(*agent_id, first_tick, job.interval, gate));
        }

        info!(jobs = jobs.len(), policy = ?self.policy, "Scheduler started");
        Ok(())
    }

    /// Abort every timer and the reconciler.
    ///
    /// Runs already in flight are not cancelled; they finish and record
    /// their outcome on their own.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = SchedulerState::Stopped;
        for job in inner.jobs.values_mut() {
            if let Some(task) = job.task.take() {
                task.abort();
            }
        }
        if let Some(reconciler) = inner.reconciler.take() {
            reconciler.abort();
        }
        info!("Scheduler stopped");
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// Scheduled agent ids, sorted
    pub async fn job_ids(&self) -> Vec<AgentId> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<_> = inner.jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn job_interval(&self, agent_id: AgentId) -> Option<Duration> {
        self.inner.lock().await.jobs.get(&agent_id).map(|job| job.interval)
    }

    pub async fn is_scheduled(&self, agent_id: AgentId) -> bool {
        self.inner.lock().await.jobs.contains_key(&agent_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    /// Bring the job set in line with the enabled agents in `store`.
    ///
    /// Jobs whose interval is unchanged keep their timer and phase.
    pub async fn reconcile(&self, store: &dyn AgentStore) -> Result<ReconcileReport> {
        let desired: HashMap<AgentId, u64> = store
            .list_enabled_agent_definitions()
            .await?
            .into_iter()
            .map(|agent| (agent.id, agent.schedule_seconds))
            .collect();

        let current: HashMap<AgentId, Duration> = {
            let inner = self.inner.lock().await;
            inner
                .jobs
                .iter()
                .map(|(id, job)| (*id, job.interval))
                .collect()
        };

        let mut report = ReconcileReport::default();

        let stale: HashSet<AgentId> = current
            .keys()
            .filter(|id| !desired.contains_key(id))
            .copied()
            .collect();
        for agent_id in stale {
            if self.remove_job(agent_id).await {
                report.removed.push(agent_id);
            }
        }

        for (&agent_id, &seconds) in &desired {
            match current.get(&agent_id) {
                None => {
                    self.add_or_update_job(agent_id, seconds).await?;
                    report.added.push(agent_id);
                }
                Some(interval) if interval.as_secs() != seconds => {
                    self.add_or_update_job(agent_id, seconds).await?;
                    report.updated.push(agent_id);
                }
                Some(_) => {}
            }
        }

        report.added.sort_unstable();
        report.updated.sort_unstable();
        report.removed.sort_unstable();
        if !report.is_empty() {
            info!(
                added = report.added.len(),
                updated = report.updated.len(),
                removed = report.removed.len(),
                "Reconciled agent jobs"
            );
        }
        Ok(report)
    }

    /// Run `reconcile` against `store` every `period` until shutdown
    pub async fn spawn_reconciler(
        self: &Arc<Self>,
        store: Arc<dyn AgentStore>,
        period: Duration,
    ) -> Result<()> {
        if period.is_zero() {
            return Err(Error::invalid_argument("reconcile period must be positive"));
        }

        let scheduler: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                if let Err(e) = scheduler.reconcile(store.as_ref()).await {
                    error!(error = %e, "Job reconciliation failed");
                }
            }
        });

        let mut inner = self.inner.lock().await;
        if inner.state == SchedulerState::Stopped {
            task.abort();
            return Err(Error::invalid_argument("scheduler has been shut down"));
        }
        if let Some(previous) = inner.reconciler.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn spawn_timer(
        &self,
        agent_id: AgentId,
        first_tick: Instant,
        interval: Duration,
        gate: Arc<Mutex<()>>,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let policy = self.policy;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                debug!(agent_id, "Agent timer fired");
                tokio::spawn(run_job(
                    Arc::clone(&runner),
                    agent_id,
                    policy,
                    Arc::clone(&gate),
                ));
            }
        })
    }
}

impl Drop for AgentScheduler {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for job in inner.jobs.values_mut() {
            if let Some(task) = job.task.take() {
                task.abort();
            }
        }
        if let Some(reconciler) = inner.reconciler.take() {
            reconciler.abort();
        }
    }
}

/// First firing, one full interval from now
fn first_deadline(agent_id: AgentId, interval: Duration) -> Result<Instant> {
    Instant::now().checked_add(interval).ok_or_else(|| {
        Error::invalid_argument(format!(
            "agent {} interval of {}s is out of range",
            agent_id,
            interval.as_secs()
        ))
    })
}

async fn run_job(
    runner: Arc<dyn AgentJobRunner>,
    agent_id: AgentId,
    policy: OverlapPolicy,
    gate: Arc<Mutex<()>>,
) {
    let _guard = match policy {
        OverlapPolicy::Allow => None,
        OverlapPolicy::SkipIfRunning => match gate.try_lock_owned() {
            Ok(guard) => Some(guard),
            Err(_) => {
                debug!(agent_id, "Previous run still in flight, skipping firing");
                return;
            }
        },
        OverlapPolicy::Serial => Some(gate.lock_owned().await),
    };

    match runner.run_agent_job(agent_id).await {
        Ok(result) if result.get("error").is_some() => {
            warn!(agent_id, %result, "Scheduled agent did not run");
        }
        Ok(_) => debug!(agent_id, "Scheduled run finished"),
        // The executor has already recorded the failure on the run
        Err(e) => warn!(agent_id, error = %e, "Scheduled run failed"),
    }
}
