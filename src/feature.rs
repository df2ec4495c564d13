use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Sparse named feature values attached to rules, lattice arcs and edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, name: &str) -> f64 {
    self.0.get(name).copied().unwrap_or(0.0)
  }

  pub fn insert(&mut self, name: impl Into<String>, value: f64) {
    self.0.insert(name.into(), value);
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.0.iter().map(|(k, v)| (k.as_str(), *v))
  }

  pub fn dot(&self, weights: &WeightVector) -> f64 {
    self.iter().map(|(name, value)| value * weights.get(name)).sum()
  }
}

impl AddAssign<&FeatureVector> for FeatureVector {
  fn add_assign(&mut self, other: &FeatureVector) {
    for (name, value) in other.0.iter() {
      *self.0.entry(name.clone()).or_insert(0.0) += value;
    }
  }
}

impl Add<&FeatureVector> for &FeatureVector {
  type Output = FeatureVector;

  fn add(self, other: &FeatureVector) -> FeatureVector {
    let mut sum = self.clone();
    sum += other;
    sum
  }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
  fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }
}

impl fmt::Display for FeatureVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for (name, value) in self.0.iter() {
      if !first {
        write!(f, " ")?;
      }
      write!(f, "{}={}", name, value)?;
      first = false;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
  Int(i64),
  Real(f64),
  Text(String),
}

impl fmt::Display for AttributeValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(i) => write!(f, "{}", i),
      Self::Real(r) => write!(f, "{}", r),
      Self::Text(s) => write!(f, "{:?}", s),
    }
  }
}

/// Non-scoring annotations, e.g. the span an edge was built over
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeVector(BTreeMap<String, AttributeValue>);

impl AttributeVector {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, name: &str) -> Option<&AttributeValue> {
    self.0.get(name)
  }

  pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) {
    self.0.insert(name.into(), value);
  }

  /// Copies every attribute of `other` over this one
  pub fn merge(&mut self, other: &AttributeVector) {
    for (name, value) in other.0.iter() {
      self.0.insert(name.clone(), value.clone());
    }
  }
}

impl fmt::Display for AttributeVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for (name, value) in self.0.iter() {
      if !first {
        write!(f, " ")?;
      }
      write!(f, "{}={}", name, value)?;
      first = false;
    }
    Ok(())
  }
}

/// Feature weights, missing names weigh 0
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightVector(HashMap<String, f64>);

impl WeightVector {
  pub fn new() -> Self {
    Self(HashMap::new())
  }

  pub fn get(&self, name: &str) -> f64 {
    self.lookup(name).unwrap_or(0.0)
  }

  pub fn lookup(&self, name: &str) -> Option<f64> {
    self.0.get(name).copied()
  }

  pub fn set(&mut self, name: impl Into<String>, value: f64) {
    self.0.insert(name.into(), value);
  }
}

impl<S: Into<String>> FromIterator<(S, f64)> for WeightVector {
  fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }
}

#[test]
fn test_feature_sum_and_dot() {
  let a: FeatureVector = vec![("lm", 1.0), ("tm", 2.0)].into_iter().collect();
  let b: FeatureVector = vec![("tm", 0.5), ("wp", -1.0)].into_iter().collect();
  let sum = &a + &b;
  assert_eq!(sum.get("lm"), 1.0);
  assert_eq!(sum.get("tm"), 2.5);
  assert_eq!(sum.get("wp"), -1.0);
  assert_eq!(sum.get("missing"), 0.0);

  let w: WeightVector = vec![("tm", 2.0), ("wp", 1.0)].into_iter().collect();
  assert_eq!(sum.dot(&w), 4.0);
}
