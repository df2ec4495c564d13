use regex::Regex;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::symbol::Symbol;

/// Iterations without a new label after which the chart parser's unary loop
/// at a span stops
pub const COMPOSE_UNARY_STAGNATION: usize = 1;
/// Iterations without a new label after which a cached unary closure of the
/// scoring parser stops growing
pub const INSIDE_CLOSURE_STAGNATION: usize = 4;
/// Factor applied to every threshold after a failed coarse-to-fine round
pub const RELAXATION_DECAY: f64 = 0.1;
pub const MAX_RELAXATIONS: usize = 8;

/// Bounds on the unary fixpoint loops. Unary rules may form cycles, so
/// neither loop runs to convergence. A `compose_stagnation` of zero turns
/// the chart parser's unary loop off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureLimits {
  pub compose_stagnation: usize,
  pub inside_stagnation: usize,
}

impl Default for ClosureLimits {
  fn default() -> Self {
    Self {
      compose_stagnation: COMPOSE_UNARY_STAGNATION,
      inside_stagnation: INSIDE_CLOSURE_STAGNATION,
    }
  }
}

/// How coarse-to-fine thresholds are relaxed when a round fails
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relaxation {
  pub decay: f64,
  /// after this many relaxations the controller reports no parse
  pub max_relaxations: usize,
}

impl Default for Relaxation {
  fn default() -> Self {
    Self {
      decay: RELAXATION_DECAY,
      max_relaxations: MAX_RELAXATIONS,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
  pub goal: Symbol,
  /// build edges from the source side of each rule pair instead of the target
  pub yield_source: bool,
  /// only span-1 cells consume lattice terminals
  pub treebank: bool,
  /// lattice labels are `word|POS`
  pub pos_mode: bool,
  pub closure: ClosureLimits,
  pub relaxation: Relaxation,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self::new("[S]")
  }
}

impl ParseOptions {
  pub fn new(goal: impl Into<Symbol>) -> Self {
    Self {
      goal: goal.into(),
      yield_source: false,
      treebank: false,
      pos_mode: false,
      closure: ClosureLimits::default(),
      relaxation: Relaxation::default(),
    }
  }

  pub fn yield_source(mut self, yield_source: bool) -> Self {
    self.yield_source = yield_source;
    self
  }

  pub fn treebank(mut self, treebank: bool) -> Self {
    self.treebank = treebank;
    self
  }

  pub fn pos_mode(mut self, pos_mode: bool) -> Self {
    self.pos_mode = pos_mode;
    self
  }

  pub fn max_relaxations(mut self, max_relaxations: usize) -> Self {
    self.relaxation.max_relaxations = max_relaxations;
    self
  }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
  match value.to_ascii_lowercase().as_str() {
    "true" | "yes" | "1" => Ok(true),
    "false" | "no" | "0" => Ok(false),
    _ => Err(Error::Config(format!("{}: expected a boolean, got {}", key, value))),
  }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
  value
    .parse::<T>()
    .map_err(|_| Error::Config(format!("{}: expected a number, got {}", key, value)))
}

impl FromStr for ParseOptions {
  type Err = Error;

  /// Comma separated `key=value` pairs, e.g.
  /// `goal=[S],yield=source,treebank=true,max-relax=4`
  fn from_str(s: &str) -> Result<Self> {
    lazy_static! {
      static ref PAIR: Regex = Regex::new(r"^\s*([a-z\-]+)\s*=\s*([^,]*?)\s*$").unwrap();
    }

    let mut options = ParseOptions::default();
    for field in s.split(',').filter(|f| !f.trim().is_empty()) {
      let caps = PAIR
        .captures(field)
        .ok_or_else(|| Error::Config(format!("malformed option {:?}", field.trim())))?;
      let (key, value) = (&caps[1], &caps[2]);

      match key {
        "goal" => {
          let goal = Symbol::new(value);
          if !goal.is_non_terminal() {
            return Err(Error::Config(format!("goal must be a non-terminal, got {}", value)));
          }
          options.goal = goal;
        }
        "yield" => {
          options.yield_source = match value {
            "source" => true,
            "target" => false,
            _ => return Err(Error::Config(format!("unknown yield: {}", value))),
          }
        }
        "treebank" => options.treebank = parse_bool(key, value)?,
        "pos-mode" | "pos" => options.pos_mode = parse_bool(key, value)?,
        "unary-stagnation" => options.closure.compose_stagnation = parse_number(key, value)?,
        "closure-stagnation" => options.closure.inside_stagnation = parse_number(key, value)?,
        "max-relax" => options.relaxation.max_relaxations = parse_number(key, value)?,
        "decay" => {
          let decay: f64 = parse_number(key, value)?;
          if !(decay > 0.0 && decay < 1.0) {
            return Err(Error::Config(format!("decay must lie in (0, 1), got {}", decay)));
          }
          options.relaxation.decay = decay;
        }
        _ => return Err(Error::Config(format!("unknown option: {}", key))),
      }
    }

    Ok(options)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_options() {
    let options: ParseOptions = "goal=[ROOT], yield=source,treebank=yes,max-relax=3".parse().unwrap();
    assert_eq!(options.goal, Symbol::new("[ROOT]"));
    assert!(options.yield_source);
    assert!(options.treebank);
    assert!(!options.pos_mode);
    assert_eq!(options.relaxation.max_relaxations, 3);
    assert_eq!(options.closure, ClosureLimits::default());
  }

  #[test]
  fn test_option_errors() {
    assert!("goal=S".parse::<ParseOptions>().is_err());
    assert!("yield=both".parse::<ParseOptions>().is_err());
    assert!("speed=fast".parse::<ParseOptions>().is_err());
    assert!("decay=1.5".parse::<ParseOptions>().is_err());
    assert!("treebank".parse::<ParseOptions>().is_err());
    assert!("".parse::<ParseOptions>().is_ok());
  }
}
