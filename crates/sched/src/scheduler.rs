use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of one step of a cooperative task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains; the scheduler may call again in this quantum.
    Continue,
    /// Waiting on work running elsewhere; end the quantum and retry later.
    Pending,
    /// The task has finished.
    Done,
}

/// A unit of work expressed as a sequence of steps.
///
/// Every call to `step` is a suspension point. Implementations must leave the
/// context consistent between steps and re-validate anything they hold
/// (handles into the tree, ids) at the start of the next step.
pub trait Task<C> {
    fn step(&mut self, ctx: &mut C) -> Step;

    /// Short label for tracing.
    fn label(&self) -> &'static str {
        "task"
    }
}

impl<C, F> Task<C> for F
where
    F: FnMut(&mut C) -> Step,
{
    fn step(&mut self, ctx: &mut C) -> Step {
        self(ctx)
    }
}

/// What happened during one scheduling quantum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantumReport {
    pub steps: usize,
    pub tasks_completed: usize,
    pub elapsed: Duration,
    /// The budget ran out with work still queued.
    pub suspended: bool,
    /// The front task is waiting on background work.
    pub waiting: bool,
}

/// Cumulative scheduler statistics for instrumentation.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub quanta: u64,
    pub total_steps: u64,
    pub tasks_completed: u64,
    pub suspensions: u64,
    /// Execution time of the most recent quantum.
    pub last_execution_time: Duration,
}

/// Runs a FIFO queue of cooperative tasks under a per-quantum time budget.
///
/// Only the front task runs; it keeps running across quanta until it is done,
/// so tasks never interleave and each task's steps run in program order.
pub struct Scheduler<C> {
    queue: VecDeque<Box<dyn Task<C>>>,
    budget: Option<Duration>,
    stats: SchedulerStats,
    history: QuantumHistory,
}

impl<C> Scheduler<C> {
    /// `None` means unbounded: a quantum runs until the queue drains or the
    /// front task is waiting.
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            queue: VecDeque::new(),
            budget,
            stats: SchedulerStats::default(),
            history: QuantumHistory::new(60),
        }
    }

    /// Budget in milliseconds, 0 for unbounded.
    pub fn with_budget_ms(ms: u64) -> Self {
        Self::new((ms > 0).then(|| Duration::from_millis(ms)))
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Option<Duration>) {
        self.budget = budget;
    }

    pub fn push(&mut self, task: impl Task<C> + 'static) {
        self.queue.push_back(Box::new(task));
    }

    pub fn push_boxed(&mut self, task: Box<dyn Task<C>>) {
        self.queue.push_back(task);
    }

    /// Number of queued tasks, including a suspended one.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn history(&self) -> &QuantumHistory {
        &self.history
    }

    /// Run queued tasks until the budget is spent, the queue drains, or the
    /// front task is waiting. At least one step runs if work is queued.
    pub fn run_quantum(&mut self, ctx: &mut C) -> QuantumReport {
        let _span = tracing::debug_span!("scheduler_quantum", depth = self.queue.len()).entered();
        let start = Instant::now();
        let mut report = QuantumReport::default();

        while let Some(task) = self.queue.front_mut() {
            let step = task.step(ctx);
            report.steps += 1;
            match step {
                Step::Done => {
                    tracing::trace!(task = task.label(), "task complete");
                    self.queue.pop_front();
                    report.tasks_completed += 1;
                }
                Step::Pending => {
                    report.waiting = true;
                    break;
                }
                Step::Continue => {}
            }
            if let Some(budget) = self.budget {
                if start.elapsed() >= budget {
                    report.suspended = !self.queue.is_empty();
                    break;
                }
            }
        }

        report.elapsed = start.elapsed();
        self.stats.quanta += 1;
        self.stats.total_steps += report.steps as u64;
        self.stats.tasks_completed += report.tasks_completed as u64;
        if report.suspended {
            self.stats.suspensions += 1;
        }
        self.stats.last_execution_time = report.elapsed;
        self.history.record(&report);

        tracing::trace!(
            steps = report.steps,
            completed = report.tasks_completed,
            suspended = report.suspended,
            remaining = self.queue.len(),
            "quantum complete"
        );
        report
    }

    /// Run quanta until the queue is empty. Returns the number of quanta.
    pub fn run_until_idle(&mut self, ctx: &mut C) -> usize {
        let mut quanta = 0;
        while !self.is_idle() {
            let report = self.run_quantum(ctx);
            quanta += 1;
            if report.waiting {
                std::thread::yield_now();
            }
        }
        quanta
    }
}

/// The most recent quantum reports, for budget readouts.
///
/// Only quanta that ran at least one step are kept; idle frames would drag the
/// average toward zero.
#[derive(Debug, Clone)]
pub struct QuantumHistory {
    reports: VecDeque<QuantumReport>,
    capacity: usize,
}

impl QuantumHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reports: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, report: &QuantumReport) {
        if report.steps == 0 {
            return;
        }
        if self.reports.len() == self.capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report.clone());
    }

    /// Oldest first.
    pub fn reports(&self) -> impl Iterator<Item = &QuantumReport> + '_ {
        self.reports.iter()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn average(&self) -> Duration {
        match self.reports.len() {
            0 => Duration::ZERO,
            n => self.reports.iter().map(|r| r.elapsed).sum::<Duration>() / n as u32,
        }
    }

    pub fn max(&self) -> Duration {
        self.reports.iter().map(|r| r.elapsed).max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.reports.iter().map(|r| r.elapsed).min().unwrap_or_default()
    }

    /// Share of kept quanta that ran out of budget with work still queued.
    pub fn suspension_rate(&self) -> f32 {
        match self.reports.len() {
            0 => 0.0,
            n => self.reports.iter().filter(|r| r.suspended).count() as f32 / n as f32,
        }
    }
}
