use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

lazy_static! {
  static ref EPSILON: Symbol = Symbol::new("<epsilon>");
  static ref GOAL: Symbol = Symbol::new("[goal]");
}

/// A terminal or non-terminal label.
///
/// Non-terminals are bracketed: `[NP]`. They may carry an alignment index
/// (`[NP,2]`), a binarization marker (`[NP^]`) and a latent annotation
/// (`[NP@5]`). Terminals may carry a POS annotation (`dog|NN`).
///
/// Cloning is a refcount bump, so symbols can be shared freely between
/// grammars, charts and hypergraphs on different threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
  pub fn new(name: impl AsRef<str>) -> Self {
    Self(Arc::from(name.as_ref()))
  }

  pub fn epsilon() -> Self {
    EPSILON.clone()
  }

  /// Head label of the synthetic goal rule
  pub fn goal() -> Self {
    GOAL.clone()
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_non_terminal(&self) -> bool {
    self.0.len() >= 2 && self.0.starts_with('[') && self.0.ends_with(']')
  }

  pub fn is_terminal(&self) -> bool {
    !self.is_non_terminal()
  }

  pub fn is_epsilon(&self) -> bool {
    *self == *EPSILON
  }

  /// Inside of the brackets, index included: `NP,2` for `[NP,2]`
  fn bracketed(&self) -> &str {
    &self.0[1..self.0.len() - 1]
  }

  /// The category without brackets or index: `NP` for `[NP,2]`.
  /// Terminals are returned unchanged.
  pub fn non_terminal_strip(&self) -> &str {
    if !self.is_non_terminal() {
      return self.as_str();
    }
    let inner = self.bracketed();
    match inner.rfind(',') {
      Some(pos) if inner[pos + 1..].parse::<usize>().is_ok() => &inner[..pos],
      _ => inner,
    }
  }

  /// The non-terminal with its index removed: `[NP]` for `[NP,2]`
  pub fn non_terminal(&self) -> Symbol {
    if !self.is_non_terminal() || self.non_terminal_index() == 0 {
      self.clone()
    } else {
      Symbol::new(format!("[{}]", self.non_terminal_strip()))
    }
  }

  pub fn non_terminal_with_index(&self, index: usize) -> Symbol {
    Symbol::new(format!("[{},{}]", self.non_terminal_strip(), index))
  }

  /// 1-based alignment index, 0 when the symbol carries none
  pub fn non_terminal_index(&self) -> usize {
    if !self.is_non_terminal() {
      return 0;
    }
    let inner = self.bracketed();
    inner
      .rfind(',')
      .and_then(|pos| inner[pos + 1..].parse::<usize>().ok())
      .unwrap_or(0)
  }

  pub fn binarized(&self) -> bool {
    self.is_non_terminal() && self.non_terminal_strip().contains('^')
  }

  /// Coarsens a latent annotation `[NP@k]` to its lowest `bits` bits.
  /// With `bits == 0` the annotation is dropped entirely.
  pub fn coarse(&self, bits: u32) -> Symbol {
    if !self.is_non_terminal() {
      return self.clone();
    }

    let strip = self.non_terminal_strip();
    let Some(pos) = strip.rfind('@') else {
      return self.non_terminal();
    };
    let (category, annotation) = (&strip[..pos], &strip[pos + 1..]);

    match annotation.parse::<u64>() {
      Ok(_) if bits == 0 => Symbol::new(format!("[{}]", category)),
      Ok(latent) => {
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        Symbol::new(format!("[{}@{}]", category, latent & mask))
      }
      Err(_) => self.non_terminal(),
    }
  }

  /// The word part of a POS-annotated terminal: `dog` for `dog|NN`
  pub fn terminal(&self) -> Symbol {
    if self.is_non_terminal() {
      return self.clone();
    }
    match self.0.rfind('|') {
      Some(pos) if pos > 0 => Symbol::new(&self.0[..pos]),
      _ => self.clone(),
    }
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for Symbol {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

impl From<String> for Symbol {
  fn from(s: String) -> Self {
    Self(Arc::from(s))
  }
}

impl Borrow<str> for Symbol {
  fn borrow(&self) -> &str {
    &self.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_non_terminal_parts() {
    let s = Symbol::new("[NP,2]");
    assert!(s.is_non_terminal());
    assert_eq!(s.non_terminal_index(), 2);
    assert_eq!(s.non_terminal_strip(), "NP");
    assert_eq!(s.non_terminal(), Symbol::new("[NP]"));
    assert_eq!(Symbol::new("[NP]").non_terminal_with_index(1), Symbol::new("[NP,1]"));

    let t = Symbol::new("dog");
    assert!(t.is_terminal());
    assert_eq!(t.non_terminal_index(), 0);
    assert_eq!(t.non_terminal(), t);
  }

  #[test]
  fn test_binarized() {
    assert!(Symbol::new("[NP^]").binarized());
    assert!(Symbol::new("[NP^,1]").binarized());
    assert!(!Symbol::new("[NP]").binarized());
    assert!(!Symbol::new("a^b").binarized());
  }

  #[test]
  fn test_coarse() {
    assert_eq!(Symbol::new("[NP@5]").coarse(0), Symbol::new("[NP]"));
    assert_eq!(Symbol::new("[NP@5]").coarse(1), Symbol::new("[NP@1]"));
    assert_eq!(Symbol::new("[NP@5]").coarse(2), Symbol::new("[NP@1]"));
    assert_eq!(Symbol::new("[NP@6]").coarse(2), Symbol::new("[NP@2]"));
    assert_eq!(Symbol::new("[NP]").coarse(3), Symbol::new("[NP]"));
    assert_eq!(Symbol::new("[NP@3,1]").coarse(0), Symbol::new("[NP]"));
    assert_eq!(Symbol::new("x@1").coarse(0), Symbol::new("x@1"));
  }

  #[test]
  fn test_pos_annotation() {
    let s = Symbol::new("dog|NN");
    assert_eq!(s.terminal(), Symbol::new("dog"));
    assert_eq!(Symbol::new("|").terminal(), Symbol::new("|"));
  }

  #[test]
  fn test_special_symbols() {
    assert!(Symbol::epsilon().is_epsilon());
    assert!(Symbol::goal().is_non_terminal());
    assert!(!Symbol::new("a").is_epsilon());
  }
}
