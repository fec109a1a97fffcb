//! Periodic driver for the orchestrator.
//!
//! Runs on its own named thread and talks to its handle through an `mpsc`
//! command channel. The first tick fires immediately; missed ticks are skipped
//! rather than run back to back.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::events::CycleTrigger;
use crate::orchestrator::{CycleError, RebalanceOrchestrator};

#[derive(Debug)]
enum SchedulerCommand {
    RebalanceNow,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub interval: Duration,
    /// Stop after this many cycles (periodic and manual together).
    pub max_cycles: Option<u64>,
}

impl SchedulerOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }
}

/// How the scheduler thread ended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub manual_cycles: u64,
    pub error: Option<String>,
}

pub struct Scheduler {
    tx: Sender<SchedulerCommand>,
    orchestrator: Arc<RebalanceOrchestrator>,
    handle: Option<JoinHandle<SchedulerSummary>>,
}

impl Scheduler {
    pub fn spawn(orchestrator: Arc<RebalanceOrchestrator>, options: SchedulerOptions) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let orch = Arc::clone(&orchestrator);
        let handle = thread::Builder::new()
            .name("hatrend-scheduler".into())
            .spawn(move || scheduler_loop(&orch, &rx, options))?;
        Ok(Self {
            tx,
            orchestrator,
            handle: Some(handle),
        })
    }

    /// Queue one manual pass. The periodic schedule is unaffected.
    pub fn rebalance_now(&self) {
        let _ = self.tx.send(SchedulerCommand::RebalanceNow);
    }

    /// Let the current cycle finish, then stop.
    pub fn stop(mut self) -> SchedulerSummary {
        let _ = self.tx.send(SchedulerCommand::Stop);
        self.join_inner()
    }

    /// Cancel orders not yet submitted and stop.
    pub fn abort(mut self) -> SchedulerSummary {
        self.orchestrator.abort();
        let _ = self.tx.send(SchedulerCommand::Stop);
        self.join_inner()
    }

    /// Wait for the thread to end on its own (cycle limit or error).
    pub fn join(mut self) -> SchedulerSummary {
        self.join_inner()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    fn join_inner(&mut self) -> SchedulerSummary {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(summary)) => summary,
            Some(Err(_)) => SchedulerSummary {
                error: Some("scheduler thread panicked".into()),
                ..SchedulerSummary::default()
            },
            None => SchedulerSummary::default(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.tx.send(SchedulerCommand::Stop);
            self.join_inner();
        }
    }
}

fn scheduler_loop(
    orch: &RebalanceOrchestrator,
    rx: &Receiver<SchedulerCommand>,
    options: SchedulerOptions,
) -> SchedulerSummary {
    let mut summary = SchedulerSummary::default();
    let mut next_tick = Instant::now();

    loop {
        if options.max_cycles.is_some_and(|max| summary.cycles >= max) {
            break;
        }

        let wait = next_tick.saturating_duration_since(Instant::now());
        let trigger = match rx.recv_timeout(wait) {
            Ok(SchedulerCommand::RebalanceNow) => CycleTrigger::Manual,
            Ok(SchedulerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                if options.interval.is_zero() {
                    next_tick = now;
                } else {
                    while next_tick <= now {
                        next_tick += options.interval;
                    }
                }
                CycleTrigger::Periodic
            }
        };

        match orch.run_cycle(trigger) {
            Ok(_) => {
                summary.cycles += 1;
                if trigger == CycleTrigger::Manual {
                    summary.manual_cycles += 1;
                }
            }
            Err(CycleError::Lifecycle(_)) => break,
            Err(e) => {
                tracing::error!(error = %e, "scheduler stopping");
                summary.error = Some(e.to_string());
                break;
            }
        }
    }

    orch.stop();
    tracing::info!(cycles = summary.cycles, manual = summary.manual_cycles, "scheduler stopped");
    summary
}
