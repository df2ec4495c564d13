use std::marker::PhantomData;

use crate::feature::{FeatureVector, WeightVector};
use crate::semiring::Semiring;

/// Turns a feature vector into a score, injected per parsing pass
pub trait WeightFunction {
  type Score: Semiring;

  fn apply(&self, features: &FeatureVector) -> Self::Score;
}

/// Ignores weights: every derivation scores `one`
#[derive(Debug, Clone, Copy)]
pub struct WeightsOne<S>(PhantomData<fn() -> S>);

impl<S> WeightsOne<S> {
  pub fn new() -> Self {
    Self(PhantomData)
  }
}

impl<S> Default for WeightsOne<S> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: Semiring> WeightFunction for WeightsOne<S> {
  type Score = S;

  fn apply(&self, _features: &FeatureVector) -> S {
    S::one()
  }
}

/// Log-linear score `w . f`
#[derive(Debug, Clone)]
pub struct Weighted<S> {
  weights: WeightVector,
  _score: PhantomData<fn() -> S>,
}

impl<S> Weighted<S> {
  pub fn new(weights: WeightVector) -> Self {
    Self {
      weights,
      _score: PhantomData,
    }
  }
}

impl<S: Semiring> WeightFunction for Weighted<S> {
  type Score = S;

  fn apply(&self, features: &FeatureVector) -> S {
    S::from_log(features.dot(&self.weights))
  }
}

/// Log-linear score where `extra` weights take precedence over the base
/// vector for the features they name
#[derive(Debug, Clone)]
pub struct WeightedExtra<S> {
  weights: WeightVector,
  extra: WeightVector,
  _score: PhantomData<fn() -> S>,
}

impl<S> WeightedExtra<S> {
  pub fn new(weights: WeightVector, extra: WeightVector) -> Self {
    Self {
      weights,
      extra,
      _score: PhantomData,
    }
  }
}

impl<S: Semiring> WeightFunction for WeightedExtra<S> {
  type Score = S;

  fn apply(&self, features: &FeatureVector) -> S {
    let score = features
      .iter()
      .map(|(name, value)| {
        let weight = self
          .extra
          .lookup(name)
          .unwrap_or_else(|| self.weights.get(name));
        value * weight
      })
      .sum();
    S::from_log(score)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::semiring::LogProb;

  #[test]
  fn test_weight_functions() {
    let features: FeatureVector = vec![("tm", 2.0), ("lm", -1.0)].into_iter().collect();
    let weights: WeightVector = vec![("tm", 0.5), ("lm", 1.0)].into_iter().collect();
    let extra: WeightVector = vec![("lm", 3.0)].into_iter().collect();

    assert_eq!(WeightsOne::<LogProb>::new().apply(&features), LogProb(0.0));
    assert_eq!(Weighted::<LogProb>::new(weights.clone()).apply(&features), LogProb(0.0));
    assert_eq!(WeightedExtra::<LogProb>::new(weights, extra).apply(&features), LogProb(-2.0));
  }
}
