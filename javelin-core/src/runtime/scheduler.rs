//! Cooperative scheduling of threads over an [`Executable`].
//!
//! The host drives execution by calling [`Scheduler::run_slice`] with a step
//! budget and its clock. Each slice walks the runnable threads round-robin,
//! giving each a bounded batch of steps; a throttled thread only gets as
//! many steps as its rate allows for the time since it last ran. Steps are
//! never interrupted; pausing, breakpoints and stepping all take effect
//! between steps.

use serde::Serialize;

use crate::codegen::TestEntry;
use crate::error::CoreError;
use crate::executable::Executable;
use crate::repl::{ReplJob, ReplSession};
use crate::runtime::interp::{self, Machine, StepOutcome};
use crate::runtime::program::StepList;
use crate::runtime::thread::{Thread, ThreadId, ThreadState, UncaughtException, WaitReason};
use crate::runtime::value::Value;
use crate::runtime::{PrintSink, RuntimeContext};
use crate::span::{ModuleId, Range};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Most steps one thread runs before the next thread gets its turn.
    pub steps_per_slice: u64,
    /// Rate limit given to every new thread; `None` runs at full speed.
    pub default_max_steps_per_second: Option<f64>,
    /// Steps a synchronous REPL evaluation may take.
    pub repl_step_cap: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            steps_per_slice: 1_000,
            default_max_steps_per_second: None,
            repl_step_cap: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    Run,
    Into { thread: ThreadId },
    Over { thread: ThreadId, depth: usize },
    Out { thread: ThreadId, depth: usize },
}

impl StepMode {
    fn thread(self) -> Option<ThreadId> {
        match self {
            StepMode::Run => None,
            StepMode::Into { thread } | StepMode::Over { thread, .. } | StepMode::Out { thread, .. } => {
                Some(thread)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub max_steps: u64,
    /// Host clock in milliseconds.
    pub now_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PauseReason {
    Breakpoint,
    Step,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PausedAt {
    pub thread: ThreadId,
    pub module: Option<ModuleId>,
    pub range: Range,
    pub reason: PauseReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SliceResult {
    pub paused_at: Option<PausedAt>,
    /// The step budget ran out with work left.
    pub exhausted_budget: bool,
    pub terminated_threads: Vec<ThreadId>,
    pub steps_executed: u64,
    /// The run is over: every thread ended or the main thread threw.
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished,
    Paused(PausedAt),
    StepCapReached,
    /// Every live thread waits for input nobody provided.
    WaitingForInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub steps: u64,
}

/// How one thread's turn ended.
enum Turn {
    Yield,
    Paused,
    Stopped,
}

pub struct Scheduler {
    pub(crate) executable: Executable,
    pub(crate) ctx: RuntimeContext,
    pub(crate) config: SchedulerConfig,
    pub(crate) threads: Vec<Thread>,
    current: usize,
    state: RunState,
    mode: StepMode,
    /// A step request has executed its first step.
    mode_armed: bool,
    /// Thread allowed to run past the breakpoint it paused on.
    skip_breakpoint: Option<ThreadId>,
    paused_at: Option<PausedAt>,
    pub(crate) next_thread_id: ThreadId,
    /// Threads started through `Thread.start()`, for naming.
    spawned: usize,
    main_thread: Option<ThreadId>,
    main_exception: Option<UncaughtException>,
    total_steps: u64,
    started_ms: Option<f64>,
    pub(crate) repl: ReplSession,
    pub(crate) repl_jobs: Vec<ReplJob>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("threads", &self.threads.len())
            .field("mode", &self.mode)
            .field("total_steps", &self.total_steps)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(executable: Executable, output: Box<dyn PrintSink>, config: SchedulerConfig) -> Self {
        let ctx = RuntimeContext::new(&executable.types, output);
        Self {
            executable,
            ctx,
            config,
            threads: Vec::new(),
            current: 0,
            state: RunState::Stopped,
            mode: StepMode::Run,
            mode_armed: false,
            skip_breakpoint: None,
            paused_at: None,
            next_thread_id: 0,
            spawned: 0,
            main_thread: None,
            main_exception: None,
            total_steps: 0,
            started_ms: None,
            repl: ReplSession::default(),
            repl_jobs: Vec::new(),
        }
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    /// Mutable access for breakpoint changes.
    pub fn executable_mut(&mut self) -> &mut Executable {
        &mut self.executable
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn paused_at(&self) -> Option<PausedAt> {
        self.paused_at
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn main_thread(&self) -> Option<ThreadId> {
        self.main_thread
    }

    /// Exception that ended the main thread, if any.
    pub fn main_exception(&self) -> Option<&UncaughtException> {
        self.main_exception.as_ref()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Change the rate limit of every thread and of threads started later.
    pub fn set_max_steps_per_second(&mut self, rate: Option<f64>) {
        self.config.default_max_steps_per_second = rate;
        for thread in &mut self.threads {
            thread.max_steps_per_second = rate;
            thread.last_ran_ms = None;
        }
    }

    pub(crate) fn new_thread(&mut self, name: impl Into<String>) -> Thread {
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        let mut thread = Thread::new(id, name);
        thread.max_steps_per_second = self.config.default_max_steps_per_second;
        thread
    }

    fn reset_run(&mut self) {
        self.threads.clear();
        self.repl_jobs.clear();
        self.current = 0;
        self.mode = StepMode::Run;
        self.mode_armed = false;
        self.skip_breakpoint = None;
        self.paused_at = None;
        self.main_exception = None;
        self.total_steps = 0;
        self.spawned = 0;
        self.started_ms = None;
        self.ctx.reset(&self.executable.types);
    }

    // -----------------------------------------------------------------
    // Starting runs
    // -----------------------------------------------------------------

    /// Start the executable's main entry, preceded by every static initializer.
    pub fn start_main(&mut self) -> Result<ThreadId, CoreError> {
        let Some(main) = self.executable.main else {
            let reason = if self.executable.static_init.is_complete() {
                "no module declares a main method without errors"
            } else {
                "static initializers depend on each other cyclically"
            };
            return Err(CoreError::NotStartable(reason.into()));
        };
        self.reset_run();
        let program = self
            .executable
            .program(main.program)
            .cloned()
            .ok_or_else(|| CoreError::NotStartable("main program is missing".into()))?;
        let mut thread = self.new_thread("main");
        if main.takes_args {
            thread.push(interp::make_array(&self.ctx, "String".into(), Vec::new()));
            thread.enter(program, 1);
        } else {
            thread.enter(program, 0);
        }
        self.push_static_initializers(&mut thread);
        tracing::info!(target: "scheduler", module = main.module.0, "starting main");
        Ok(self.launch(thread))
    }

    /// Start one `@Test` method on a fresh instance of its class.
    pub fn init_test(&mut self, test: &TestEntry) -> Result<ThreadId, CoreError> {
        if !self.executable.static_init.is_complete() {
            return Err(CoreError::NotStartable(
                "static initializers depend on each other cyclically".into(),
            ));
        }
        self.reset_run();
        let program = self
            .executable
            .program(test.program)
            .cloned()
            .ok_or_else(|| CoreError::NotStartable("test runner is missing".into()))?;
        let mut thread = self.new_thread("test");
        thread.enter(program, 0);
        self.push_static_initializers(&mut thread);
        tracing::info!(
            target: "scheduler",
            test = %self.executable.method_name(test.method),
            "starting test"
        );
        Ok(self.launch(thread))
    }

    fn push_static_initializers(&self, thread: &mut Thread) {
        for (_, program) in self.executable.static_init.sequence.iter().rev() {
            if let Some(program) = self.executable.program(*program) {
                thread.enter(program.clone(), 0);
            }
        }
    }

    fn launch(&mut self, mut thread: Thread) -> ThreadId {
        let id = thread.id;
        thread.state = ThreadState::Runnable;
        self.threads.push(thread);
        self.main_thread = Some(id);
        self.state = RunState::Running;
        id
    }

    /// Start a thread for a `Thread` object whose `start()` was called.
    fn spawn(&mut self, thread_object: Value) -> Result<(), CoreError> {
        let mut thread = self.new_thread(format!("Thread-{}", self.spawned));
        self.spawned += 1;
        thread.state = ThreadState::Runnable;
        let types = &self.executable.types;
        let run = types
            .find_methods(types.well_known("Thread"), "run")
            .first()
            .copied()
            .ok_or_else(|| CoreError::Internal {
                program: "Thread".into(),
                step: 0,
                message: "library class Thread has no run method".into(),
            })?;
        let mut m = Machine {
            types,
            programs: &self.executable.programs,
            ctx: &mut self.ctx,
        };
        interp::call_virtual(&mut m, &mut thread, run, vec![thread_object])?;
        tracing::debug!(target: "scheduler", thread = thread.id, name = %thread.name, "thread spawned");
        self.threads.push(thread);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------

    /// Pause before the next step of the thread that would run next.
    pub fn pause(&mut self) -> Option<PausedAt> {
        if self.state != RunState::Running {
            return self.paused_at;
        }
        let index = self
            .next_candidate()
            .or_else(|| self.threads.iter().position(|t| !t.frames.is_empty()));
        match index {
            Some(index) => self.pause_thread(index, PauseReason::Request),
            None => {
                self.state = RunState::Paused;
                self.paused_at = None;
            }
        }
        self.paused_at
    }

    pub fn resume(&mut self) {
        if self.state != RunState::Paused {
            return;
        }
        self.clear_mode();
        self.state = RunState::Running;
        for thread in &mut self.threads {
            thread.last_ran_ms = None;
        }
        tracing::debug!(target: "scheduler", "resumed");
    }

    /// Stop the run, discarding every thread.
    pub fn stop(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }
        self.finish_run();
    }

    pub fn step_into(&mut self) -> Result<(), CoreError> {
        let thread = self.step_target()?;
        self.begin_step(StepMode::Into { thread });
        Ok(())
    }

    pub fn step_over(&mut self) -> Result<(), CoreError> {
        let thread = self.step_target()?;
        let depth = self.thread(thread).map_or(0, Thread::depth);
        if let Some(t) = self.threads.iter_mut().find(|t| t.id == thread) {
            for frame in &mut t.frames {
                frame.list = StepList::Multiple;
            }
        }
        self.begin_step(StepMode::Over { thread, depth });
        Ok(())
    }

    pub fn step_out(&mut self) -> Result<(), CoreError> {
        let thread = self.step_target()?;
        let depth = self.thread(thread).map_or(0, Thread::depth);
        self.begin_step(StepMode::Out { thread, depth });
        Ok(())
    }

    fn step_target(&self) -> Result<ThreadId, CoreError> {
        match (self.state, self.paused_at) {
            (RunState::Paused, Some(at)) => Ok(at.thread),
            _ => Err(CoreError::ReplTarget("stepping needs a paused thread".into())),
        }
    }

    fn begin_step(&mut self, mode: StepMode) {
        self.mode = mode;
        self.mode_armed = false;
        self.state = RunState::Running;
    }

    fn clear_mode(&mut self) {
        if let Some(id) = self.mode.thread() {
            if let Some(thread) = self.threads.iter_mut().find(|t| t.id == id) {
                for frame in &mut thread.frames {
                    frame.list = StepList::Single;
                }
            }
        }
        self.mode = StepMode::Run;
        self.mode_armed = false;
    }

    /// Hand a line of input to the first thread waiting for one, or buffer it.
    pub fn provide_input(&mut self, line: &str) -> Result<(), CoreError> {
        let waiting = self.threads.iter().position(|t| {
            matches!(t.state, ThreadState::Waiting(WaitReason::Input { .. }))
        });
        let Some(index) = waiting else {
            self.ctx.push_input(line);
            return Ok(());
        };
        let int = matches!(
            self.threads[index].state,
            ThreadState::Waiting(WaitReason::Input { int: true })
        );
        let mut m = Machine {
            types: &self.executable.types,
            programs: &self.executable.programs,
            ctx: &mut self.ctx,
        };
        let thread = &mut self.threads[index];
        thread.state = ThreadState::Runnable;
        thread.last_ran_ms = None;
        interp::deliver_input(&mut m, thread, line, int)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------

    pub fn run_slice(&mut self, tick: Tick) -> Result<SliceResult, CoreError> {
        let mut result = SliceResult::default();
        self.ctx.now_ms = tick.now_ms;
        self.started_ms.get_or_insert(tick.now_ms);
        self.wake_sleepers(tick.now_ms);

        let mut budget = tick.max_steps;
        if !self.repl_jobs.is_empty() {
            budget -= self.run_repl_jobs(budget, &mut result)?.min(budget);
        }
        if self.state != RunState::Running {
            result.paused_at = self.paused_at;
            result.finished = self.state == RunState::Stopped;
            return Ok(result);
        }

        'rounds: while budget > 0 && self.state == RunState::Running {
            let before = result.steps_executed;
            let count = self.threads.len();
            for _ in 0..count {
                if budget == 0 || self.state != RunState::Running {
                    break 'rounds;
                }
                if self.current >= self.threads.len() {
                    self.current = 0;
                }
                let index = self.current;
                if !self.may_run(index) {
                    self.current += 1;
                    continue;
                }
                let allowance = self.allowance(index, tick.now_ms).min(budget);
                if allowance == 0 {
                    self.current += 1;
                    continue;
                }
                let (executed, turn) = self.run_thread(index, allowance, &mut result)?;
                budget -= executed.min(budget);
                result.steps_executed += executed;
                self.pay_throttle(index, executed);
                match turn {
                    Turn::Paused | Turn::Stopped => break 'rounds,
                    Turn::Yield => {}
                }
                if self.mode == StepMode::Run {
                    self.current += 1;
                }
                self.reap_terminated();
            }
            if result.steps_executed == before {
                break;
            }
        }
        self.reap_terminated();
        self.total_steps += result.steps_executed;

        if self.state == RunState::Running && self.threads.iter().all(|t| t.state.is_terminated()) {
            self.finish_run();
        }
        result.exhausted_budget = budget == 0 && self.state == RunState::Running;
        result.paused_at = if self.state == RunState::Paused { self.paused_at } else { None };
        result.finished = self.state == RunState::Stopped;
        Ok(result)
    }

    /// Run headless until the program ends, pauses, stalls on input or
    /// executes `step_cap` steps. Sleeping and throttled threads see a
    /// virtual clock that jumps ahead instead of waiting.
    pub fn run_to_completion(&mut self, step_cap: u64) -> Result<RunSummary, CoreError> {
        let mut now = self.ctx.now_ms;
        let mut steps = 0;
        let mut idle = 0;
        loop {
            let remaining = step_cap.saturating_sub(steps);
            if remaining == 0 {
                return Ok(RunSummary {
                    outcome: RunOutcome::StepCapReached,
                    steps,
                });
            }
            let slice = self.run_slice(Tick {
                max_steps: remaining.min(self.config.steps_per_slice.max(1) * 16),
                now_ms: now,
            })?;
            steps += slice.steps_executed;
            if slice.finished {
                return Ok(RunSummary {
                    outcome: RunOutcome::Finished,
                    steps,
                });
            }
            if let Some(at) = slice.paused_at {
                return Ok(RunSummary {
                    outcome: RunOutcome::Paused(at),
                    steps,
                });
            }
            if slice.steps_executed > 0 {
                idle = 0;
                continue;
            }
            idle += 1;
            match self.next_event_ms(now) {
                Some(at) if at > now => now = at,
                // Rounding can leave a throttled thread just short of its next step.
                Some(_) if idle < 3 => now += 1.0,
                _ => {
                    return Ok(RunSummary {
                        outcome: RunOutcome::WaitingForInput,
                        steps,
                    });
                }
            }
        }
    }

    /// Earliest time something could run again: a sleeper waking or a
    /// throttled thread earning its next step.
    fn next_event_ms(&self, now: f64) -> Option<f64> {
        self.threads
            .iter()
            .filter(|t| !t.state.is_terminated())
            .filter_map(|t| match t.state {
                ThreadState::Waiting(WaitReason::Sleep { until_ms }) => Some(until_ms),
                ThreadState::Waiting(WaitReason::Input { .. }) => None,
                ThreadState::Waiting(WaitReason::Monitor { object }) => {
                    self.ctx.monitor_available(object, t.id).then_some(now)
                }
                _ => match t.max_steps_per_second {
                    Some(rate) if rate > 0.0 => {
                        Some(t.last_ran_ms.unwrap_or(now) + 1000.0 / rate)
                    }
                    _ => Some(now),
                },
            })
            .min_by(|a, b| a.total_cmp(b))
    }

    fn wake_sleepers(&mut self, now: f64) {
        for thread in &mut self.threads {
            let wake = match thread.state {
                ThreadState::Waiting(WaitReason::Sleep { until_ms }) => until_ms <= now,
                ThreadState::Waiting(WaitReason::Monitor { object }) => {
                    self.ctx.monitor_available(object, thread.id)
                }
                _ => false,
            };
            if wake {
                thread.state = ThreadState::Runnable;
                thread.last_ran_ms = None;
            }
        }
    }

    fn may_run(&self, index: usize) -> bool {
        let Some(thread) = self.threads.get(index) else { return false };
        let is_target = self.mode.thread().is_none_or(|t| t == thread.id);
        is_target && thread.is_runnable()
    }

    fn next_candidate(&self) -> Option<usize> {
        let count = self.threads.len();
        (0..count)
            .map(|offset| (self.current + offset) % count)
            .find(|i| self.may_run(*i))
    }

    /// Steps the thread at `index` may run now.
    fn allowance(&mut self, index: usize, now: f64) -> u64 {
        let cap = self.config.steps_per_slice.max(1);
        let thread = &mut self.threads[index];
        match thread.max_steps_per_second {
            Some(rate) if rate > 0.0 => {
                let ms_per_step = 1000.0 / rate;
                let last = *thread.last_ran_ms.get_or_insert(now);
                let earned = ((now - last) / ms_per_step).floor();
                if earned <= 0.0 { 0 } else { (earned as u64).min(cap) }
            }
            _ => cap,
        }
    }

    fn pay_throttle(&mut self, index: usize, executed: u64) {
        let Some(thread) = self.threads.get_mut(index) else { return };
        if let (Some(rate), Some(last)) = (thread.max_steps_per_second, thread.last_ran_ms) {
            if rate > 0.0 {
                thread.last_ran_ms = Some(last + executed as f64 * 1000.0 / rate);
            }
        }
    }

    /// Run up to `allowance` steps of one thread.
    fn run_thread(&mut self, index: usize, allowance: u64, result: &mut SliceResult) -> Result<(u64, Turn), CoreError> {
        let mut executed = 0;
        while executed < allowance {
            if self.threads[index].frames.is_empty() {
                self.end_thread(index, result);
                return Ok((executed, self.turn_after_end()));
            }
            if let Some(reason) = self.pause_reason(index) {
                self.pause_thread(index, reason);
                return Ok((executed, Turn::Paused));
            }

            let mut m = Machine {
                types: &self.executable.types,
                programs: &self.executable.programs,
                ctx: &mut self.ctx,
            };
            let thread = &mut self.threads[index];
            thread.state = ThreadState::Running;
            let outcome = interp::step(&mut m, thread)?;
            thread.steps_executed += 1;
            executed += 1;

            if self.skip_breakpoint == Some(thread.id) {
                self.skip_breakpoint = None;
            }
            if self.mode.thread() == Some(thread.id) {
                self.mode_armed = true;
            }

            match outcome {
                StepOutcome::Continue => {
                    let thread = &mut self.threads[index];
                    if thread.state == ThreadState::Running {
                        thread.state = ThreadState::Runnable;
                    }
                }
                StepOutcome::Spawn(object) => {
                    self.threads[index].state = ThreadState::Runnable;
                    self.spawn(object)?;
                }
                StepOutcome::Waiting(reason) => {
                    self.threads[index].state = ThreadState::Waiting(reason);
                    tracing::trace!(target: "scheduler", thread = self.threads[index].id, ?reason, "thread waiting");
                    return Ok((executed, Turn::Yield));
                }
                StepOutcome::Finished | StepOutcome::Uncaught => {
                    self.end_thread(index, result);
                    return Ok((executed, self.turn_after_end()));
                }
            }
        }
        Ok((executed, Turn::Yield))
    }

    /// Run a thread outside the schedule, such as a REPL evaluation, for at
    /// most `cap` steps. Breakpoints and stepping do not apply to it.
    pub(crate) fn run_detached(&mut self, thread: &mut Thread, cap: u64) -> Result<u64, CoreError> {
        let wake = match thread.state {
            ThreadState::Waiting(WaitReason::Sleep { until_ms }) => until_ms <= self.ctx.now_ms,
            ThreadState::Waiting(WaitReason::Monitor { object }) => {
                self.ctx.monitor_available(object, thread.id)
            }
            _ => false,
        };
        if wake {
            thread.state = ThreadState::Runnable;
        }
        let mut executed = 0;
        while executed < cap && thread.is_runnable() {
            if thread.frames.is_empty() {
                thread.state = ThreadState::Terminated;
                break;
            }
            let mut m = Machine {
                types: &self.executable.types,
                programs: &self.executable.programs,
                ctx: &mut self.ctx,
            };
            let outcome = interp::step(&mut m, thread)?;
            thread.steps_executed += 1;
            executed += 1;
            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Spawn(object) => self.spawn(object)?,
                StepOutcome::Waiting(reason) => thread.state = ThreadState::Waiting(reason),
                StepOutcome::Finished => thread.state = ThreadState::Terminated,
                StepOutcome::Uncaught => {}
            }
        }
        if thread.state.is_terminated() {
            self.ctx.release_monitors(thread.id);
        }
        Ok(executed)
    }

    fn run_repl_jobs(&mut self, budget: u64, result: &mut SliceResult) -> Result<u64, CoreError> {
        let mut jobs = std::mem::take(&mut self.repl_jobs);
        let mut executed = 0;
        let mut outcome = Ok(());
        for job in jobs.iter_mut().filter(|j| j.is_running()) {
            if executed >= budget {
                break;
            }
            match self.run_detached(&mut job.thread, budget - executed) {
                Ok(steps) => executed += steps,
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.repl_jobs = jobs;
        result.steps_executed += executed;
        outcome.map(|()| executed)
    }

    fn turn_after_end(&self) -> Turn {
        match self.state {
            RunState::Running => Turn::Yield,
            RunState::Paused => Turn::Paused,
            RunState::Stopped => Turn::Stopped,
        }
    }

    /// Decide whether the thread must pause before its next step.
    fn pause_reason(&self, index: usize) -> Option<PauseReason> {
        let thread = &self.threads[index];
        let frame = thread.top()?;
        let step = frame.program.step(frame.step, StepList::Single)?;
        if step.breakpoint.get() && self.skip_breakpoint != Some(thread.id) {
            return Some(PauseReason::Breakpoint);
        }
        if !self.mode_armed {
            return None;
        }
        let depth = thread.depth();
        let stop = match self.mode {
            StepMode::Run => false,
            StepMode::Into { thread: id } => id == thread.id && !step.range.is_empty(),
            StepMode::Over { thread: id, depth: start } => {
                let statement = frame
                    .program
                    .step(frame.step, StepList::Multiple)
                    .is_some_and(|s| s.stop_step_over_before);
                id == thread.id && depth <= start && statement
            }
            StepMode::Out { thread: id, depth: start } => id == thread.id && depth < start,
        };
        stop.then_some(PauseReason::Step)
    }

    fn pause_thread(&mut self, index: usize, reason: PauseReason) {
        self.clear_mode();
        let thread = &mut self.threads[index];
        if thread.state == ThreadState::Running {
            thread.state = ThreadState::Runnable;
        }
        let (module, range) = thread
            .top()
            .map_or((None, Range::EMPTY), |f| (f.program.module, f.current_range()));
        let at = PausedAt {
            thread: thread.id,
            module,
            range,
            reason,
        };
        self.skip_breakpoint = Some(thread.id);
        self.current = index;
        self.paused_at = Some(at);
        self.state = RunState::Paused;
        tracing::debug!(target: "scheduler", thread = at.thread, ?reason, position = %range, "paused");
    }

    fn end_thread(&mut self, index: usize, result: &mut SliceResult) {
        let thread = &mut self.threads[index];
        let exception = thread.exception.clone();
        let id = thread.id;
        let name = thread.name.clone();
        if thread.state != ThreadState::TerminatedWithException {
            thread.state = ThreadState::Terminated;
        }
        thread.frames.clear();
        self.ctx.release_monitors(id);
        result.terminated_threads.push(id);
        tracing::debug!(target: "scheduler", thread = id, %name, failed = exception.is_some(), "thread terminated");

        if let Some(exception) = exception {
            self.ctx.print(&format!("Exception in thread \"{name}\" {exception}\n"));
            if self.main_thread == Some(id) {
                self.main_exception = Some(exception);
                self.finish_run();
            }
        }
    }

    /// Drop finished threads except the main thread, which keeps its result.
    fn reap_terminated(&mut self) {
        let before = self.threads.len();
        let current_id = self.threads.get(self.current).map(|t| t.id);
        let main = self.main_thread;
        self.threads
            .retain(|t| !t.state.is_terminated() || Some(t.id) == main);
        if self.threads.len() != before {
            self.current = current_id
                .and_then(|id| self.threads.iter().position(|t| t.id == id))
                .unwrap_or(0);
        }
    }

    fn finish_run(&mut self) {
        let elapsed = self.started_ms.map_or(0.0, |start| self.ctx.now_ms - start);
        let total = self.total_steps;
        tracing::info!(
            target: "scheduler",
            steps = total,
            elapsed_ms = elapsed,
            steps_per_second = if elapsed > 0.0 { total as f64 / elapsed * 1000.0 } else { 0.0 },
            "run finished"
        );
        self.clear_mode();
        self.state = RunState::Stopped;
        self.paused_at = None;
        for thread in &mut self.threads {
            thread.terminate();
        }
        let main = self.main_thread;
        self.threads.retain(|t| Some(t.id) == main);
    }

    /// Result value of the main thread's bottom frame, once it returned.
    pub fn main_result(&self) -> Option<&Value> {
        self.main_thread
            .and_then(|id| self.thread(id))
            .and_then(|t| t.result.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::runtime::SharedBuffer;

    fn scheduler(source: &str) -> (Scheduler, SharedBuffer) {
        let exe = compile_source("Main.java", source);
        assert!(!exe.has_errors(), "{:?}", exe.all_diagnostics());
        let buffer = SharedBuffer::new();
        let scheduler = Scheduler::new(exe, Box::new(buffer.clone()), SchedulerConfig::default());
        (scheduler, buffer)
    }

    #[test]
    fn runs_main_to_completion() {
        let (mut s, out) = scheduler(
            "public class Main { public static void main(String[] args) { int a = 2; System.out.println(a * 21); } }",
        );
        s.start_main().unwrap();
        let summary = s.run_to_completion(10_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "42\n");
        assert_eq!(s.state(), RunState::Stopped);
    }

    #[test]
    fn throttled_thread_respects_its_rate() {
        let (mut s, _) = scheduler(
            "public class Main { public static void main(String[] args) { while (true) { int x = 1; } } }",
        );
        s.set_max_steps_per_second(Some(100.0));
        s.start_main().unwrap();
        let mut total = 0;
        let mut now = 0.0;
        while now <= 1000.0 {
            let slice = s.run_slice(Tick { max_steps: 10_000, now_ms: now }).unwrap();
            total += slice.steps_executed;
            now += 10.0;
        }
        assert!(total <= 100, "ran {total} steps");
        assert!(total >= 90, "ran {total} steps");
    }

    #[test]
    fn breakpoint_pauses_and_resume_skips_it_once() {
        let source = "public class Main {\n  public static void main(String[] args) {\n    int a = 1;\n    System.out.println(a);\n    System.out.println(a + 1);\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        let bp = s.executable_mut().set_breakpoint(ModuleId(0), 4).unwrap();
        assert_eq!(bp.range.start_line, 4);
        s.start_main().unwrap();
        let slice = s.run_slice(Tick { max_steps: 1_000, now_ms: 0.0 }).unwrap();
        let at = slice.paused_at.unwrap();
        assert_eq!(at.reason, PauseReason::Breakpoint);
        assert_eq!(at.range.start_line, 4);
        assert_eq!(out.contents(), "");
        s.resume();
        let summary = s.run_to_completion(1_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "1\n2\n");
    }

    #[test]
    fn step_over_stops_at_next_statement() {
        let source = "public class Main {\n  static int twice(int x) {\n    int y = x * 2;\n    return y;\n  }\n  public static void main(String[] args) {\n    int a = twice(3);\n    int b = a + 1;\n    System.out.println(b);\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        s.executable_mut().set_breakpoint(ModuleId(0), 7).unwrap();
        s.start_main().unwrap();
        let first = s.run_to_completion(1_000).unwrap();
        assert!(matches!(first.outcome, RunOutcome::Paused(at) if at.range.start_line == 7));
        s.step_over().unwrap();
        let second = s.run_to_completion(1_000).unwrap();
        let RunOutcome::Paused(at) = second.outcome else { panic!("expected a pause") };
        assert_eq!(at.reason, PauseReason::Step);
        assert_eq!(at.range.start_line, 8);
        s.step_into().unwrap();
        s.run_to_completion(1_000).unwrap();
        s.resume();
        s.run_to_completion(1_000).unwrap();
        assert_eq!(out.contents(), "7\n");
    }

    #[test]
    fn step_into_enters_the_callee_and_step_out_returns() {
        let source = "public class Main {\n  static int twice(int x) {\n    int y = x * 2;\n    return y;\n  }\n  public static void main(String[] args) {\n    int a = twice(3);\n    System.out.println(a);\n  }\n}\n";
        let (mut s, _) = scheduler(source);
        s.executable_mut().set_breakpoint(ModuleId(0), 7).unwrap();
        s.start_main().unwrap();
        s.run_to_completion(1_000).unwrap();
        let mut line = 7;
        for _ in 0..10 {
            s.step_into().unwrap();
            let RunOutcome::Paused(at) = s.run_to_completion(1_000).unwrap().outcome else {
                panic!("expected a pause")
            };
            line = at.range.start_line;
            if line == 3 {
                break;
            }
        }
        assert_eq!(line, 3);
        s.step_out().unwrap();
        let RunOutcome::Paused(at) = s.run_to_completion(1_000).unwrap().outcome else {
            panic!("expected a pause")
        };
        assert_eq!(at.range.start_line, 7);
    }

    #[test]
    fn breakpoint_pauses_before_the_call_on_its_line() {
        let source = "public class Main {\n  static int loud(int x) {\n    System.out.println(\"called\");\n    return x;\n  }\n  public static void main(String[] args) {\n    int a = loud(3);\n    System.out.println(a);\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        let bp = s.executable_mut().set_breakpoint(ModuleId(0), 7).unwrap();
        assert_eq!(bp.range.start_line, 7);
        s.start_main().unwrap();
        let RunOutcome::Paused(at) = s.run_to_completion(1_000).unwrap().outcome else {
            panic!("expected to stop at the breakpoint")
        };
        assert_eq!(at.range.start_line, 7);
        assert_eq!(out.contents(), "");

        s.step_into().unwrap();
        let RunOutcome::Paused(at) = s.run_to_completion(1_000).unwrap().outcome else {
            panic!("expected a pause")
        };
        assert!(at.range.start_line <= 7, "{:?}", at.range);
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn uncaught_exception_in_main_finishes_the_run() {
        let (mut s, out) = scheduler(
            "public class Main { public static void main(String[] args) { int[] a = new int[2]; a[5] = 1; } }",
        );
        s.start_main().unwrap();
        let summary = s.run_to_completion(1_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        let exc = s.main_exception().unwrap();
        assert_eq!(exc.class_name, "ArrayIndexOutOfBoundsException");
        assert_eq!(exc.message.as_deref(), Some("Index 5 out of bounds for length 2"));
        assert!(out.contents().starts_with("Exception in thread \"main\" ArrayIndexOutOfBoundsException"));
    }

    #[test]
    fn waiting_thread_resumes_after_input() {
        let (mut s, out) = scheduler(
            "public class Main { public static void main(String[] args) { int n = Input.readInt(); System.out.println(n + 1); } }",
        );
        s.start_main().unwrap();
        let first = s.run_to_completion(1_000).unwrap();
        assert_eq!(first.outcome, RunOutcome::WaitingForInput);
        s.provide_input("41").unwrap();
        let second = s.run_to_completion(1_000).unwrap();
        assert_eq!(second.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "42\n");
    }

    #[test]
    fn sleeping_threads_interleave_by_wake_time() {
        let source = "public class Main {\n  public static void main(String[] args) {\n    Thread t = new Thread(() -> { Thread.sleep(50); System.out.println(\"worker\"); });\n    t.start();\n    Thread.sleep(100);\n    System.out.println(\"main\");\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        s.start_main().unwrap();
        let summary = s.run_to_completion(10_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "worker\nmain\n");
    }

    #[test]
    fn synchronized_block_makes_contending_thread_wait() {
        let source = "public class Main {\n  static Object lock = new Object();\n  public static void main(String[] args) {\n    Thread t = new Thread(() -> { synchronized (lock) { System.out.println(\"worker\"); } });\n    synchronized (lock) {\n      t.start();\n      Thread.sleep(50);\n      System.out.println(\"main\");\n    }\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        s.start_main().unwrap();
        let summary = s.run_to_completion(10_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "main\nworker\n");
    }

    #[test]
    fn monitor_is_reentrant_and_released_by_exceptions() {
        let body = "    synchronized (lock) { synchronized (lock) { System.out.println(\"nested\"); } }\n    try {\n      synchronized (lock) { throw new IllegalStateException(\"x\"); }\n    } catch (IllegalStateException e) {\n      System.out.println(\"caught\");\n    }\n    Thread t = new Thread(() -> { synchronized (lock) { System.out.println(\"worker\"); } });\n    t.start();\n";
        let source = format!(
            "public class Main {{\n  static Object lock = new Object();\n  public static void main(String[] args) {{\n{body}  }}\n}}\n"
        );
        let (mut s, out) = scheduler(&source);
        s.start_main().unwrap();
        let summary = s.run_to_completion(10_000).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(out.contents(), "nested\ncaught\nworker\n");
    }

    #[test]
    fn stop_discards_threads() {
        let (mut s, _) = scheduler(
            "public class Main { public static void main(String[] args) { while (true) { } } }",
        );
        s.start_main().unwrap();
        let slice = s.run_slice(Tick { max_steps: 50, now_ms: 0.0 }).unwrap();
        assert!(slice.exhausted_budget);
        s.stop();
        assert_eq!(s.state(), RunState::Stopped);
        assert!(s.threads().iter().all(|t| t.frames.is_empty()));
    }
}
