use std::fmt;
use std::sync::Arc;

use crate::feature::{AttributeVector, FeatureVector};
use crate::symbol::Symbol;

/// A single side of a synchronous rule: `lhs -> rhs`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
  pub lhs: Symbol,
  pub rhs: Vec<Symbol>,
}

impl Rule {
  pub fn new(lhs: Symbol, rhs: Vec<Symbol>) -> Self {
    Self { lhs, rhs }
  }

  pub fn len(&self) -> usize {
    self.rhs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn arity(&self) -> usize {
    self.rhs.iter().filter(|s| s.is_non_terminal()).count()
  }

  /// Non-terminals of the rhs with the tail position each one refers to:
  /// its 1-based index when present, otherwise its order of appearance.
  pub fn tail_positions(&self) -> Vec<usize> {
    self
      .rhs
      .iter()
      .filter(|s| s.is_non_terminal())
      .enumerate()
      .map(|(order, s)| match s.non_terminal_index() {
        0 => order,
        index => index - 1,
      })
      .collect()
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.lhs)?;
    for s in self.rhs.iter() {
      write!(f, " {}", s)?;
    }
    Ok(())
  }
}

/// What a transducer yields at a final state: both sides of a synchronous rule
/// with its features
#[derive(Debug, Clone, PartialEq)]
pub struct RulePair {
  pub source: Arc<Rule>,
  pub target: Arc<Rule>,
  pub features: FeatureVector,
  pub attributes: AttributeVector,
}

impl RulePair {
  pub fn new(source: Arc<Rule>, target: Arc<Rule>, features: FeatureVector) -> Self {
    Self {
      source,
      target,
      features,
      attributes: AttributeVector::new(),
    }
  }

  /// The side whose yield the parse produces
  pub fn side(&self, yield_source: bool) -> &Arc<Rule> {
    if yield_source { &self.source } else { &self.target }
  }
}

impl fmt::Display for RulePair {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} |||", self.source.lhs)?;
    for s in self.source.rhs.iter() {
      write!(f, " {}", s)?;
    }
    write!(f, " |||")?;
    for s in self.target.rhs.iter() {
      write!(f, " {}", s)?;
    }
    if !self.features.is_empty() {
      write!(f, " ||| {}", self.features)?;
    }
    Ok(())
  }
}

#[test]
fn test_tail_positions() {
  let r = Rule::new(
    "[S]".into(),
    vec!["[B,2]".into(), "x".into(), "[A,1]".into()],
  );
  assert_eq!(r.arity(), 2);
  assert_eq!(r.tail_positions(), vec![1, 0]);

  let r = Rule::new("[S]".into(), vec!["[A]".into(), "[B]".into()]);
  assert_eq!(r.tail_positions(), vec![0, 1]);
}
