use crate::feature::{self, BlockId, EdgeId, FeatureSet};
use indexmap::IndexMap;
use std::time::Instant;

/// How many probes run between two deadline checks.
const DEADLINE_CHECK_INTERVAL: u32 = 64;

/// Unwind payload used by probes to abort a target that overran its deadline.
#[derive(Debug)]
pub(crate) struct DeadlineExceeded;

/// Per-invocation coverage state written by instrumentation probes.
///
/// The executor calls [`ExecutionContext::reset`] before every target invocation, reads the
/// edge counts afterwards, and never shares the context between invocations. Edge counts keep
/// the order in which each edge was first hit.
#[derive(Debug)]
pub struct ExecutionContext {
    prev_block: BlockId,
    edges: IndexMap<EdgeId, u32>,
    deadline: Option<Instant>,
    probes_until_check: u32,
}

impl ExecutionContext {
    /// Predecessor of the first probe in a run.
    pub const START_BLOCK: BlockId = 0;

    pub fn new() -> Self {
        Self {
            prev_block: Self::START_BLOCK,
            edges: IndexMap::new(),
            deadline: None,
            probes_until_check: DEADLINE_CHECK_INTERVAL,
        }
    }

    /// Forgets the previous block, all edge counts, and any armed deadline.
    pub fn reset(&mut self) {
        self.prev_block = Self::START_BLOCK;
        self.edges.clear();
        self.deadline = None;
        self.probes_until_check = DEADLINE_CHECK_INTERVAL;
    }

    pub(crate) fn arm_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
        self.probes_until_check = DEADLINE_CHECK_INTERVAL;
    }

    pub(crate) fn disarm_deadline(&mut self) {
        self.deadline = None;
    }

    /// Statement probe: records the edge from the previous block into `block`.
    pub fn trace_block(&mut self, block: BlockId) {
        let edge = feature::edge_id(self.prev_block, block);
        let count = self.edges.entry(edge).or_insert(0);
        *count = count.saturating_add(1);
        self.prev_block = block;
        self.check_deadline();
    }

    /// Value-transparent probe for expression positions such as the right operand of `&&`.
    pub fn trace_value<T>(&mut self, block: BlockId, value: T) -> T {
        self.trace_block(block);
        value
    }

    fn check_deadline(&mut self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        self.probes_until_check -= 1;
        if self.probes_until_check > 0 {
            return;
        }
        self.probes_until_check = DEADLINE_CHECK_INTERVAL;
        if Instant::now() >= deadline {
            self.deadline = None;
            // resume_unwind skips the panic hook, so a hang does not print a panic message.
            std::panic::resume_unwind(Box::new(DeadlineExceeded));
        }
    }

    pub fn prev_block(&self) -> BlockId {
        self.prev_block
    }

    pub fn edge_counts(&self) -> &IndexMap<EdgeId, u32> {
        &self.edges
    }

    /// Edges in first-hit order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys().copied()
    }

    pub fn features(&self) -> FeatureSet {
        feature::encode(&self.edges)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::edge_id;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    #[test]
    fn trace_records_transitions_in_order() {
        let mut ctx = ExecutionContext::new();
        ctx.trace_block(3);
        ctx.trace_block(5);
        ctx.trace_block(3);
        ctx.trace_block(5);

        let edges: Vec<EdgeId> = ctx.edges().collect();
        assert_eq!(edges, vec![edge_id(0, 3), edge_id(3, 5), edge_id(5, 3)]);
        assert_eq!(ctx.edge_counts()[&edge_id(3, 5)], 2);
        assert_eq!(ctx.prev_block(), 5);
    }

    #[test]
    fn trace_value_returns_value_unchanged() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.trace_value(9, true));
        assert_eq!(ctx.trace_value(10, "abc"), "abc");
        assert_eq!(ctx.edge_counts().len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = ExecutionContext::new();
        ctx.trace_block(1);
        ctx.reset();
        assert_eq!(ctx.prev_block(), ExecutionContext::START_BLOCK);
        assert!(ctx.edge_counts().is_empty());
        assert!(ctx.features().is_empty());
    }

    #[test]
    fn expired_deadline_unwinds_from_probe() {
        let mut ctx = ExecutionContext::new();
        ctx.arm_deadline(Instant::now() - Duration::from_millis(1));
        let result = catch_unwind(AssertUnwindSafe(|| {
            loop {
                ctx.trace_block(1);
            }
        }));
        let payload = result.expect_err("probe loop should have been interrupted");
        assert!(payload.is::<DeadlineExceeded>());
    }
}
