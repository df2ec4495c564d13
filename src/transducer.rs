use std::fmt;

use crate::rules::RulePair;
use crate::symbol::Symbol;

pub type StateId = usize;

/// Capability tag for grammar components that need special treatment:
/// unknown-word and POS transducers of the finest grammar are shared with the
/// coarser levels, and POS transducers see the POS-annotated lattice labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransducerKind {
  Rules,
  Unknown,
  Pos,
}

/// A grammar component exposed as a state machine over rule source sides.
///
/// `next` returns `root()` when there is no transition, so the root doubles as
/// the failure state. Implementations are queried read-only from many parser
/// instances at once.
pub trait Transducer: fmt::Debug + Send + Sync {
  fn kind(&self) -> TransducerKind {
    TransducerKind::Rules
  }

  fn root(&self) -> StateId;

  /// Whether rules of this transducer may cover `[first, last)`, whose
  /// shortest lattice path has `distance` arcs
  fn valid_span(&self, first: usize, last: usize, distance: usize) -> bool;

  fn has_next(&self, state: StateId) -> bool;

  fn next(&self, state: StateId, label: &Symbol) -> StateId;

  /// Rule pairs whose source side ends at `state`
  fn rules(&self, state: StateId) -> &[RulePair];
}
