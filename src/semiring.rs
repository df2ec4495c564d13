use std::fmt;
use std::ops::{Add, Div, Mul};

use num_traits::{One, Zero};

/// Scores combined by the parsers.
///
/// `+` combines alternatives, `*` combines in sequence. The coarse-to-fine
/// machinery additionally needs an order (to keep the best alternative and to
/// compare against cutoffs) and division (to normalize marginals).
pub trait Semiring:
  Copy + fmt::Debug + PartialOrd + Zero + One + Mul<Output = Self> + Div<Output = Self>
{
  /// Builds a score from a log-linear model score
  fn from_log(value: f64) -> Self;

  fn to_log(self) -> f64;

  fn max(self, other: Self) -> Self {
    if other > self { other } else { self }
  }
}

/// Max-times semiring over plain probabilities
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Viterbi(pub f64);

impl Add for Viterbi {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    Viterbi(self.0.max(other.0))
  }
}

impl Mul for Viterbi {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    Viterbi(self.0 * other.0)
  }
}

impl Div for Viterbi {
  type Output = Self;

  fn div(self, other: Self) -> Self {
    Viterbi(self.0 / other.0)
  }
}

impl Zero for Viterbi {
  fn zero() -> Self {
    Viterbi(0.0)
  }

  fn is_zero(&self) -> bool {
    self.0 == 0.0
  }
}

impl One for Viterbi {
  fn one() -> Self {
    Viterbi(1.0)
  }
}

impl Semiring for Viterbi {
  fn from_log(value: f64) -> Self {
    Viterbi(value.exp())
  }

  fn to_log(self) -> f64 {
    self.0.ln()
  }
}

impl fmt::Display for Viterbi {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Log-space probabilities; `+` is log-sum-exp, `*` is addition of logs.
/// Larger is better.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LogProb(pub f64);

impl Default for LogProb {
  fn default() -> Self {
    Self::zero()
  }
}

impl Add for LogProb {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    let (x, y) = if self.0 > other.0 { (self.0, other.0) } else { (other.0, self.0) };
    if y == f64::NEG_INFINITY {
      LogProb(x)
    } else {
      LogProb(x + (y - x).exp().ln_1p())
    }
  }
}

impl Mul for LogProb {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    LogProb(self.0 + other.0)
  }
}

impl Div for LogProb {
  type Output = Self;

  fn div(self, other: Self) -> Self {
    LogProb(self.0 - other.0)
  }
}

impl Zero for LogProb {
  fn zero() -> Self {
    LogProb(f64::NEG_INFINITY)
  }

  fn is_zero(&self) -> bool {
    self.0 == f64::NEG_INFINITY
  }
}

impl One for LogProb {
  fn one() -> Self {
    LogProb(0.0)
  }
}

impl Semiring for LogProb {
  fn from_log(value: f64) -> Self {
    LogProb(value)
  }

  fn to_log(self) -> f64 {
    self.0
  }
}

impl fmt::Display for LogProb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.exp())
  }
}
