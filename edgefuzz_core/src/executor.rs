use crate::context::{DeadlineExceeded, ExecutionContext};
use std::any::Any;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Outcome of one target invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    /// The target raised a benign exception. Not a finding.
    Exception(String),
    Crash(String),
    Timeout(Duration),
}

impl ExecutionStatus {
    /// Description recorded on the corpus entry, `None` unless the run counts as a crash.
    pub fn crash_info(&self) -> Option<String> {
        match self {
            ExecutionStatus::Ok | ExecutionStatus::Exception(_) => None,
            ExecutionStatus::Crash(msg) => Some(msg.clone()),
            ExecutionStatus::Timeout(elapsed) => {
                Some(format!("Timeout after {} ms", elapsed.as_millis()))
            }
        }
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, ExecutionStatus::Crash(_) | ExecutionStatus::Timeout(_))
    }
}

/// What a target may report besides completing normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// Expected, intentional signalling by the target. Swallowed.
    #[error("exception: {0}")]
    Exception(String),
    /// An abnormal condition. Recorded as a crash.
    #[error("error: {0}")]
    Error(String),
    /// The harness or its instrumentation is broken. Aborts the whole run.
    #[error("harness failure: {0}")]
    Harness(String),
}

/// A unary function over a byte buffer whose instrumented code reports into the context.
pub trait Target {
    fn run(&mut self, input: &[u8], ctx: &mut ExecutionContext) -> Result<(), TargetError>;
}

impl<F> Target for F
where
    F: FnMut(&[u8], &mut ExecutionContext) -> Result<(), TargetError>,
{
    fn run(&mut self, input: &[u8], ctx: &mut ExecutionContext) -> Result<(), TargetError> {
        self(input, ctx)
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Harness is broken: {0}")]
    HarnessBroken(String),
}

pub trait Executor {
    /// Resets `ctx`, runs the target once, and classifies the outcome. Coverage recorded up to
    /// the point the target stopped stays in `ctx`.
    fn execute(
        &mut self,
        input: &[u8],
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionStatus, ExecutorError>;
}

thread_local! {
    static IN_TARGET: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside a target invocation.
///
/// Panic hooks use this to tell target crashes, which the executor catches, from panics in the
/// fuzzer itself.
pub fn in_target() -> bool {
    IN_TARGET.with(Cell::get)
}

pub struct InProcessExecutor<T: Target> {
    target: T,
    timeout: Duration,
}

impl<T: Target> InProcessExecutor<T> {
    pub fn new(target: T, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T: Target> Executor for InProcessExecutor<T> {
    fn execute(
        &mut self,
        input: &[u8],
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionStatus, ExecutorError> {
        ctx.reset();
        let start = Instant::now();
        if let Some(deadline) = start.checked_add(self.timeout) {
            ctx.arm_deadline(deadline);
        }

        let target = &mut self.target;
        IN_TARGET.with(|flag| flag.set(true));
        let result = catch_unwind(AssertUnwindSafe(|| target.run(input, ctx)));
        IN_TARGET.with(|flag| flag.set(false));
        ctx.disarm_deadline();

        let elapsed = start.elapsed();
        let overran = elapsed > self.timeout;
        let status = match result {
            Ok(Err(TargetError::Harness(msg))) => return Err(ExecutorError::HarnessBroken(msg)),
            _ if overran => ExecutionStatus::Timeout(elapsed),
            Ok(Ok(())) => ExecutionStatus::Ok,
            Ok(Err(TargetError::Exception(msg))) => ExecutionStatus::Exception(msg),
            Ok(Err(TargetError::Error(msg))) => ExecutionStatus::Crash(msg),
            Err(payload) if payload.is::<DeadlineExceeded>() => ExecutionStatus::Timeout(elapsed),
            Err(payload) => ExecutionStatus::Crash(panic_message(payload.as_ref())),
        };
        Ok(status)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic type".to_string()
    }
}
