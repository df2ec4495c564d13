use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::feature::FeatureVector;
use crate::symbol::Symbol;

/// An arc leaving some position and ending `distance` positions later
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeArc {
  pub label: Symbol,
  pub distance: usize,
  pub features: FeatureVector,
}

impl LatticeArc {
  pub fn new(label: impl Into<Symbol>, distance: usize) -> Self {
    Self {
      label: label.into(),
      distance,
      features: FeatureVector::new(),
    }
  }

  pub fn with_features(mut self, features: FeatureVector) -> Self {
    self.features = features;
    self
  }
}

/// A weighted word lattice: `arcs(p)` lists the arcs leaving position `p`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lattice {
  arcs: Vec<Vec<LatticeArc>>,
  // (size + 1) x (size + 1), row major
  distances: Vec<usize>,
}

impl Lattice {
  /// Validates the arcs and precomputes shortest distances
  pub fn new(arcs: Vec<Vec<LatticeArc>>) -> Result<Self> {
    let size = arcs.len();
    for (pos, position_arcs) in arcs.iter().enumerate() {
      for arc in position_arcs {
        if arc.distance == 0 {
          return Err(Error::Lattice(format!(
            "arc {} at position {} has zero distance",
            arc.label, pos
          )));
        }
        if pos + arc.distance > size {
          return Err(Error::Lattice(format!(
            "arc {} at position {} runs past the lattice end {}",
            arc.label, pos, size
          )));
        }
      }
    }

    let distances = Self::compute_distances(&arcs);
    Ok(Self { arcs, distances })
  }

  /// One distance-1 arc per token
  pub fn from_sentence(words: &[&str]) -> Self {
    let arcs = words
      .iter()
      .map(|w| vec![LatticeArc::new(*w, 1)])
      .collect::<Vec<_>>();
    let distances = Self::compute_distances(&arcs);
    Self { arcs, distances }
  }

  /// Arcs only go forward, so one pass in position order relaxes every path.
  /// Epsilon arcs cost nothing.
  fn compute_distances(arcs: &[Vec<LatticeArc>]) -> Vec<usize> {
    let width = arcs.len() + 1;
    let mut distances = vec![usize::MAX; width * width];

    for first in 0..width {
      distances[first * width + first] = 0;
      for pos in first..arcs.len() {
        let here = distances[first * width + pos];
        if here == usize::MAX {
          continue;
        }
        for arc in arcs[pos].iter() {
          let cost = if arc.label.is_epsilon() { 0 } else { 1 };
          let next = &mut distances[first * width + pos + arc.distance];
          *next = (*next).min(here + cost);
        }
      }
    }

    distances
  }

  pub fn size(&self) -> usize {
    self.arcs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.arcs.is_empty()
  }

  pub fn arcs(&self, pos: usize) -> &[LatticeArc] {
    &self.arcs[pos]
  }

  /// Number of non-epsilon arcs on the shortest path from `first` to `last`,
  /// `usize::MAX` when `last` is unreachable
  pub fn shortest_distance(&self, first: usize, last: usize) -> usize {
    let width = self.size() + 1;
    if first >= width || last >= width {
      return usize::MAX;
    }
    self.distances[first * width + last]
  }
}

impl FromStr for Lattice {
  type Err = Error;

  /// Whitespace separated tokens, one arc each
  fn from_str(s: &str) -> Result<Self> {
    Ok(Self::from_sentence(&s.split_whitespace().collect::<Vec<_>>()))
  }
}

impl fmt::Display for Lattice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (pos, arcs) in self.arcs.iter().enumerate() {
      write!(f, "{}:", pos)?;
      for arc in arcs {
        write!(f, " {}/{}", arc.label, arc.distance)?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sentence_distances() {
    let lattice: Lattice = "a b c".parse().unwrap();
    assert_eq!(lattice.size(), 3);
    assert_eq!(lattice.shortest_distance(0, 3), 3);
    assert_eq!(lattice.shortest_distance(1, 2), 1);
    assert_eq!(lattice.shortest_distance(2, 2), 0);
    assert_eq!(lattice.shortest_distance(2, 1), usize::MAX);
  }

  #[test]
  fn test_lattice_shortcuts() {
    let lattice = Lattice::new(vec![
      vec![LatticeArc::new("a", 1), LatticeArc::new("a_b", 2)],
      vec![LatticeArc::new("b", 1), LatticeArc::new("<epsilon>", 2)],
      vec![LatticeArc::new("c", 1)],
    ])
    .unwrap();

    assert_eq!(lattice.shortest_distance(0, 2), 1);
    assert_eq!(lattice.shortest_distance(0, 3), 1);
    assert_eq!(lattice.shortest_distance(1, 3), 0);
  }

  #[test]
  fn test_invalid_arcs() {
    assert!(Lattice::new(vec![vec![LatticeArc::new("a", 0)]]).is_err());
    assert!(Lattice::new(vec![vec![LatticeArc::new("a", 2)]]).is_err());
  }
}
