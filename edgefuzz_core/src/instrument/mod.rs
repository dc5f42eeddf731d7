//! Control-flow instrumentation.
//!
//! Instrumenting a file is two passes. The walker visits the control-flow tree, hands out block
//! ids and records `(offset, text, order)` insertions. [`edits::EditBuffer`] then applies those
//! insertions to the untouched source in one linear scan. Probes are single-line text, so the
//! output has exactly the line structure of the input.
//!
//! Probe placement:
//! - block entry: function and closure bodies, `if`/`elseif`/`else` branches, loop bodies,
//!   `switch` cases, `try` bodies, `catch` and `finally` blocks;
//! - exit join, just past the construct: `while`, `do`, `for`, `foreach`, `switch`, labels;
//! - value-transparent wrapper: right operands of `&&`, `||` and `??`, both ternary branches,
//!   and every `yield`, whose resumption is a new block.

pub mod edits;
pub mod probe;
pub mod syntax;

use crate::feature::{BlockId, MAX_BLOCK_ID};
use edits::EditBuffer;
use probe::{CallProbeSyntax, ProbeSyntax};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use syntax::{Block, Expr, Stmt};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("Offset {offset} is past the end of the source ({len} bytes)")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("Offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },
    #[error("Span {start}..{end} is inverted")]
    InvalidSpan { start: usize, end: usize },
    #[error("More than {} blocks in one program", MAX_BLOCK_ID)]
    TooManyBlocks,
    #[error("Probe text must be a single line: {0:?}")]
    MultilineProbe(String),
    #[error("Invalid control-flow tree: {0}")]
    Tree(String),
}

/// Where in the source a probe was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeSite {
    Entry { pos: usize },
    Exit { pos: usize },
    Wrap { start: usize, end: usize },
}

impl ProbeSite {
    /// Offset reported to coverage consumers.
    pub fn pos(&self) -> usize {
        match *self {
            ProbeSite::Entry { pos } | ProbeSite::Exit { pos } => pos,
            ProbeSite::Wrap { start, .. } => start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub block: BlockId,
    pub site: ProbeSite,
}

/// Block id to source offset map of one instrumented file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub block_index_to_pos: BTreeMap<BlockId, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub code: String,
    pub file_info: FileInfo,
    pub probes: Vec<Probe>,
}

/// Hands out block ids across every file instrumented by one instance.
#[derive(Debug, Clone)]
pub struct Instrumentor<S: ProbeSyntax = CallProbeSyntax> {
    syntax: S,
    next_block: BlockId,
}

impl Instrumentor {
    pub fn new() -> Self {
        Self::with_syntax(CallProbeSyntax::default())
    }
}

impl Default for Instrumentor {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ProbeSyntax> Instrumentor<S> {
    pub fn with_syntax(syntax: S) -> Self {
        // Id 0 is the "no predecessor" block.
        Self {
            syntax,
            next_block: 1,
        }
    }

    pub fn blocks_assigned(&self) -> u32 {
        self.next_block - 1
    }

    /// Continues numbering after `last`, for files instrumented by an earlier run.
    pub fn continue_after(&mut self, last: BlockId) {
        self.next_block = self.next_block.max(last.saturating_add(1));
    }

    /// Instruments one file. Block ids are only consumed if the whole file succeeds.
    pub fn instrument(
        &mut self,
        source: &str,
        tree: &[Stmt],
    ) -> Result<Instrumented, InstrumentError> {
        let mut walker = Walker {
            syntax: &self.syntax,
            source_len: source.len(),
            next_block: self.next_block,
            edits: EditBuffer::new(),
            probes: Vec::new(),
        };
        walker.stmts(tree)?;

        let Walker {
            next_block,
            edits,
            probes,
            ..
        } = walker;
        let code = edits.apply(source)?;
        let block_index_to_pos = probes.iter().map(|p| (p.block, p.site.pos())).collect();
        self.next_block = next_block;
        Ok(Instrumented {
            code,
            file_info: FileInfo { block_index_to_pos },
            probes,
        })
    }
}

struct Walker<'a, S: ProbeSyntax> {
    syntax: &'a S,
    source_len: usize,
    next_block: BlockId,
    edits: EditBuffer,
    probes: Vec<Probe>,
}

impl<S: ProbeSyntax> Walker<'_, S> {
    fn new_block(&mut self) -> Result<BlockId, InstrumentError> {
        if self.next_block > MAX_BLOCK_ID {
            return Err(InstrumentError::TooManyBlocks);
        }
        let block = self.next_block;
        self.next_block += 1;
        Ok(block)
    }

    fn check_offset(&self, offset: usize) -> Result<(), InstrumentError> {
        if offset > self.source_len {
            return Err(InstrumentError::OffsetOutOfBounds {
                offset,
                len: self.source_len,
            });
        }
        Ok(())
    }

    fn insert(&mut self, pos: usize, text: String) -> Result<(), InstrumentError> {
        if text.contains(['\n', '\r']) {
            return Err(InstrumentError::MultilineProbe(text));
        }
        self.check_offset(pos)?;
        self.edits.insert(pos, text);
        Ok(())
    }

    fn statement_probe(&mut self, site: ProbeSite) -> Result<(), InstrumentError> {
        let block = self.new_block()?;
        let text = self.syntax.statement_probe(block);
        self.insert(site.pos(), text)?;
        self.probes.push(Probe { block, site });
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), InstrumentError> {
        self.statement_probe(ProbeSite::Entry { pos: block.open })?;
        self.stmts(&block.stmts)
    }

    fn exit_probe(&mut self, end: usize) -> Result<(), InstrumentError> {
        self.statement_probe(ProbeSite::Exit { pos: end })
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), InstrumentError> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), InstrumentError> {
        match stmt {
            Stmt::Expr { expr } | Stmt::Throw { value: expr } => self.expr(expr),
            Stmt::Return { value } => value.iter().try_for_each(|e| self.expr(e)),
            Stmt::Function { body } => self.block(body),
            Stmt::If {
                cond,
                then,
                else_ifs,
                otherwise,
            } => {
                self.expr(cond)?;
                self.block(then)?;
                for else_if in else_ifs {
                    self.expr(&else_if.cond)?;
                    self.block(&else_if.body)?;
                }
                otherwise.iter().try_for_each(|b| self.block(b))
            }
            Stmt::While { cond, body, end } => {
                self.expr(cond)?;
                self.block(body)?;
                self.exit_probe(*end)
            }
            Stmt::DoWhile { body, cond, end } => {
                self.block(body)?;
                self.expr(cond)?;
                self.exit_probe(*end)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                end,
            } => {
                for expr in init.iter().chain(cond).chain(step) {
                    self.expr(expr)?;
                }
                self.block(body)?;
                self.exit_probe(*end)
            }
            Stmt::Foreach { subject, body, end } => {
                self.expr(subject)?;
                self.block(body)?;
                self.exit_probe(*end)
            }
            Stmt::Switch {
                subject,
                cases,
                end,
            } => {
                self.expr(subject)?;
                for case in cases {
                    case.test.iter().try_for_each(|e| self.expr(e))?;
                    self.block(&case.body)?;
                }
                self.exit_probe(*end)
            }
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                self.block(body)?;
                catches.iter().try_for_each(|b| self.block(b))?;
                finally.iter().try_for_each(|b| self.block(b))
            }
            Stmt::Label { end } => self.exit_probe(*end),
            Stmt::Break | Stmt::Continue => Ok(()),
        }
    }

    /// Wraps `expr` so its evaluation records a fresh block and yields the original value.
    fn wrapped(&mut self, expr: &Expr) -> Result<(), InstrumentError> {
        self.wrap_with(expr, |w| w.expr(expr))
    }

    fn wrap_with(
        &mut self,
        expr: &Expr,
        inner: impl FnOnce(&mut Self) -> Result<(), InstrumentError>,
    ) -> Result<(), InstrumentError> {
        let span = expr.span();
        if span.start > span.end {
            return Err(InstrumentError::InvalidSpan {
                start: span.start,
                end: span.end,
            });
        }
        let block = self.new_block()?;
        let prefix = self.syntax.wrap_prefix(block);
        self.insert(span.start, prefix)?;
        self.probes.push(Probe {
            block,
            site: ProbeSite::Wrap {
                start: span.start,
                end: span.end,
            },
        });
        inner(self)?;
        let suffix = self.syntax.wrap_suffix(block);
        self.insert(span.end, suffix)
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), InstrumentError> {
        match expr {
            Expr::Yield { .. } => self.wrap_with(expr, |w| w.expr_children(expr)),
            _ => self.expr_children(expr),
        }
    }

    fn expr_children(&mut self, expr: &Expr) -> Result<(), InstrumentError> {
        match expr {
            Expr::Var { .. } | Expr::Int { .. } => Ok(()),
            Expr::And { lhs, rhs, .. }
            | Expr::Or { lhs, rhs, .. }
            | Expr::Coalesce { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.wrapped(rhs)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.expr(cond)?;
                then.iter().try_for_each(|e| self.wrapped(e))?;
                self.wrapped(otherwise)
            }
            Expr::Yield { value, .. } => value.iter().try_for_each(|e| self.expr(e)),
            Expr::Match { subject, arms, .. } => {
                self.expr(subject)?;
                arms.iter().try_for_each(|e| self.wrapped(e))
            }
            Expr::Closure { body, .. } => self.block(body),
            Expr::Other { children, .. } => children.iter().try_for_each(|e| self.expr(e)),
        }
    }
}
