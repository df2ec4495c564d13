use std::collections::HashMap;

use crate::chart::Chart;
use crate::semiring::Semiring;
use crate::symbol::Symbol;

/// Posterior score of every label surviving at a span
pub type LabelScoreChart<S> = Chart<HashMap<Symbol, S>>;

/// Decides which spans and labels a parser may skip.
pub trait Pruner {
  /// true when nothing may be built at `[first, last)`
  fn prune_span(&self, first: usize, last: usize) -> bool;

  /// true when `label` may not be built at `[first, last)`
  fn prune_label(&self, first: usize, last: usize, label: &Symbol) -> bool;
}

/// Prunes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneNone;

impl Pruner for PruneNone {
  fn prune_span(&self, _first: usize, _last: usize) -> bool {
    false
  }

  fn prune_label(&self, _first: usize, _last: usize, _label: &Symbol) -> bool {
    false
  }
}

/// Maps a fine label onto the label set of a coarser grammar
pub trait Coarser {
  fn coarse(&self, symbol: &Symbol) -> Symbol;
}

/// Collapses every non-terminal to `[x]`, or `[x^]` when binarized
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseSimple;

impl Coarser for CoarseSimple {
  fn coarse(&self, symbol: &Symbol) -> Symbol {
    lazy_static! {
      static ref X: Symbol = Symbol::new("[x]");
      static ref X_BINARIZED: Symbol = Symbol::new("[x^]");
    }

    if !symbol.is_non_terminal() {
      symbol.clone()
    } else if symbol.binarized() {
      X_BINARIZED.clone()
    } else {
      X.clone()
    }
  }
}

/// Keeps the lowest `bits` bits of a latent annotation
#[derive(Debug, Clone, Copy)]
pub struct CoarseSymbol {
  pub bits: u32,
}

impl CoarseSymbol {
  pub fn new(bits: u32) -> Self {
    Self { bits }
  }
}

impl Coarser for CoarseSymbol {
  fn coarse(&self, symbol: &Symbol) -> Symbol {
    symbol.coarse(self.bits)
  }
}

/// Prunes against the posteriors of a coarser pass. A label survives if
/// its own posterior reaches `cutoff`, or, when the coarser pass never saw
/// the label, if its coarsened form does.
#[derive(Debug)]
pub struct PruneCoarse<'a, S, C> {
  prunes: &'a LabelScoreChart<S>,
  cutoff: S,
  coarser: C,
}

impl<'a, S: Semiring, C: Coarser> PruneCoarse<'a, S, C> {
  pub fn new(prunes: &'a LabelScoreChart<S>, cutoff: S, coarser: C) -> Self {
    Self {
      prunes,
      cutoff,
      coarser,
    }
  }
}

impl<S: Semiring, C: Coarser> Pruner for PruneCoarse<'_, S, C> {
  fn prune_span(&self, first: usize, last: usize) -> bool {
    self.prunes.get(first, last).is_empty()
  }

  fn prune_label(&self, first: usize, last: usize, label: &Symbol) -> bool {
    let labels = self.prunes.get(first, last);
    if labels.is_empty() {
      return true;
    }

    if let Some(score) = labels.get(label) {
      return *score < self.cutoff;
    }
    match labels.get(&self.coarser.coarse(label)) {
      Some(score) => *score < self.cutoff,
      None => true,
    }
  }
}
