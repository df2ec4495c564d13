use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::Index;
use std::path::Path;
use std::slice;
use std::sync::Arc;

use crate::error::Result;
use crate::rules::RulePair;
use crate::symbol::Symbol;
use crate::transducer::{StateId, Transducer, TransducerKind};

/// An ordered collection of transducers, queried together by the parsers
#[derive(Debug, Clone, Default)]
pub struct Grammar(Vec<Arc<dyn Transducer>>);

impl Grammar {
  pub fn new() -> Self {
    Self(Vec::new())
  }

  pub fn push(&mut self, transducer: Arc<dyn Transducer>) {
    self.0.push(transducer);
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> slice::Iter<'_, Arc<dyn Transducer>> {
    self.0.iter()
  }

  pub fn has_kind(&self, kind: TransducerKind) -> bool {
    self.0.iter().any(|t| t.kind() == kind)
  }

  pub fn find_kind(&self, kind: TransducerKind) -> Option<&Arc<dyn Transducer>> {
    self.0.iter().find(|t| t.kind() == kind)
  }
}

impl Index<usize> for Grammar {
  type Output = Arc<dyn Transducer>;

  fn index(&self, idx: usize) -> &Self::Output {
    &self.0[idx]
  }
}

impl From<Vec<Arc<dyn Transducer>>> for Grammar {
  fn from(transducers: Vec<Arc<dyn Transducer>>) -> Self {
    Self(transducers)
  }
}

impl<T: Transducer + 'static> From<T> for Grammar {
  fn from(transducer: T) -> Self {
    Self(vec![Arc::new(transducer)])
  }
}

#[derive(Debug, Default)]
struct TrieNode {
  children: HashMap<Symbol, StateId>,
  rules: Vec<RulePair>,
}

/// In-memory rule table. Source sides are stored in a trie whose edges are
/// terminals and index-free non-terminals.
#[derive(Debug)]
pub struct GrammarStatic {
  nodes: Vec<TrieNode>,
  kind: TransducerKind,
  max_span: Option<usize>,
}

impl Default for GrammarStatic {
  fn default() -> Self {
    Self::new()
  }
}

impl GrammarStatic {
  pub fn new() -> Self {
    Self {
      nodes: vec![TrieNode::default()],
      kind: TransducerKind::Rules,
      max_span: None,
    }
  }

  pub fn with_kind(mut self, kind: TransducerKind) -> Self {
    self.kind = kind;
    self
  }

  /// Rules only cover spans whose shortest lattice path has at most `max_span` arcs
  pub fn with_max_span(mut self, max_span: usize) -> Self {
    self.max_span = Some(max_span);
    self
  }

  pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
    fs::read_to_string(path)?.parse()
  }

  pub fn insert(&mut self, pair: RulePair) {
    let mut state = 0;
    for symbol in pair.source.rhs.iter() {
      let key = symbol.non_terminal();
      state = match self.nodes[state].children.get(&key) {
        Some(&next) => next,
        None => {
          let next = self.nodes.len();
          self.nodes.push(TrieNode::default());
          self.nodes[state].children.insert(key, next);
          next
        }
      };
    }
    self.nodes[state].rules.push(pair);
  }

  /// Number of rule pairs stored
  pub fn len(&self) -> usize {
    self.nodes.iter().map(|n| n.rules.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Transducer for GrammarStatic {
  fn kind(&self) -> TransducerKind {
    self.kind
  }

  fn root(&self) -> StateId {
    0
  }

  fn valid_span(&self, _first: usize, _last: usize, distance: usize) -> bool {
    match self.max_span {
      Some(max_span) => distance <= max_span,
      None => true,
    }
  }

  fn has_next(&self, state: StateId) -> bool {
    !self.nodes[state].children.is_empty()
  }

  fn next(&self, state: StateId, label: &Symbol) -> StateId {
    self.nodes[state]
      .children
      .get(label)
      .copied()
      .unwrap_or(self.root())
  }

  fn rules(&self, state: StateId) -> &[RulePair] {
    &self.nodes[state].rules
  }
}

impl fmt::Display for GrammarStatic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for rule in self.nodes.iter().flat_map(|n| n.rules.iter()) {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}
