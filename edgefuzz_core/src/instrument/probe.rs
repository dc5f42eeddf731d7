use crate::feature::BlockId;

/// Renders probe text for one target language.
///
/// All three texts must stay on a single line so instrumentation never shifts line numbers.
pub trait ProbeSyntax {
    /// Statement inserted at a block entry or join point.
    fn statement_probe(&self, block: BlockId) -> String;
    /// Opens a value-transparent wrapper around an expression.
    fn wrap_prefix(&self, block: BlockId) -> String;
    /// Closes the wrapper opened by [`ProbeSyntax::wrap_prefix`].
    fn wrap_suffix(&self, block: BlockId) -> String;
}

/// Probes as plain function calls: `trace_block(7); ` and `trace_value(8, (expr))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallProbeSyntax {
    pub trace_block_fn: String,
    pub trace_value_fn: String,
}

impl CallProbeSyntax {
    pub fn new(trace_block_fn: impl Into<String>, trace_value_fn: impl Into<String>) -> Self {
        Self {
            trace_block_fn: trace_block_fn.into(),
            trace_value_fn: trace_value_fn.into(),
        }
    }
}

impl Default for CallProbeSyntax {
    fn default() -> Self {
        Self::new("__edgefuzz_trace_block", "__edgefuzz_trace_value")
    }
}

impl ProbeSyntax for CallProbeSyntax {
    fn statement_probe(&self, block: BlockId) -> String {
        format!("{}({}); ", self.trace_block_fn, block)
    }

    fn wrap_prefix(&self, block: BlockId) -> String {
        format!("{}({}, (", self.trace_value_fn, block)
    }

    fn wrap_suffix(&self, _block: BlockId) -> String {
        "))".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_syntax_renders_calls() {
        let syntax = CallProbeSyntax::new("ctx.trace_block", "ctx.trace_value");
        assert_eq!(syntax.statement_probe(7), "ctx.trace_block(7); ");
        assert_eq!(
            format!("{}a || b{}", syntax.wrap_prefix(8), syntax.wrap_suffix(8)),
            "ctx.trace_value(8, (a || b))"
        );
    }
}
