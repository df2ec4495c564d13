//! Simple recursive-descent parsing of rule tables:
//!
//! ```text
//! [LHS] ||| source symbols ||| target symbols ||| name=value ... ||| name=value ...
//! ```
//!
//! The target, feature and attribute fields are optional, a missing target
//! copies the source. Attribute values are integers, reals or `"quoted text"`.
//! `//` starts a comment.

use regex::Regex;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;
use crate::feature::{AttributeValue, AttributeVector, FeatureVector};
use crate::grammar::GrammarStatic;
use crate::rules::{Rule, RulePair};
use crate::symbol::Symbol;

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), String>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {:?}", re, s))
  }
}

fn skip_whitespace(s: &str) -> &str {
  s.trim_start()
}

fn parse_separator(s: &str) -> Infallible<'_, bool> {
  regex_static!(SEPARATOR, r"\|\|\|");
  let (sep, rest) = optional_re(&*SEPARATOR, s);
  (sep.is_some(), rest)
}

/// A bracketed non-terminal without whitespace or nested brackets
fn parse_non_terminal(s: &str) -> ParseResult<'_, Symbol> {
  regex_static!(NON_TERMINAL, r"\[[^\[\]\s]+\]");
  let (name, s) = needed_re(&*NON_TERMINAL, s).map_err(|e| format!("non-terminal: {}", e))?;
  Ok((Symbol::new(name), s))
}

/// Symbols up to the next `|||` or the end of the line
fn parse_symbols(s: &str) -> ParseResult<'_, Vec<Symbol>> {
  regex_static!(TOKEN, r"\S+");
  let mut symbols = Vec::new();
  let mut rem = skip_whitespace(s);
  while !rem.is_empty() && !rem.starts_with("|||") {
    let (token, s) = needed_re(&*TOKEN, rem)?;
    if token.starts_with('[') && !Symbol::new(token).is_non_terminal() {
      return Err(format!("malformed non-terminal {}", token));
    }
    symbols.push(Symbol::new(token));
    rem = skip_whitespace(s);
  }
  Ok((symbols, rem))
}

fn parse_features(s: &str) -> ParseResult<'_, FeatureVector> {
  regex_static!(FEATURE, r"([^=\s]+)=(\S+)");
  let mut features = FeatureVector::new();
  let mut rem = skip_whitespace(s);
  while !rem.is_empty() && !rem.starts_with("|||") {
    let (pair, s) = needed_re(&*FEATURE, rem).map_err(|e| format!("feature: {}", e))?;
    let (name, value) = pair.split_at(pair.find('=').unwrap_or(pair.len()));
    let value = value
      .trim_start_matches('=')
      .parse::<f64>()
      .map_err(|e| format!("feature {}: {}", name, e))?;
    features.insert(name, value);
    rem = skip_whitespace(s);
  }
  Ok((features, rem))
}

fn parse_attribute_value(name: &str, value: &str) -> Result<AttributeValue, String> {
  if let Some(text) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
    return Ok(AttributeValue::Text(text.to_string()));
  }
  if let Ok(int) = value.parse::<i64>() {
    return Ok(AttributeValue::Int(int));
  }
  value
    .parse::<f64>()
    .map(AttributeValue::Real)
    .map_err(|_| format!("attribute {}: bad value {}", name, value))
}

fn parse_attributes(s: &str) -> ParseResult<'_, AttributeVector> {
  regex_static!(ATTRIBUTE, r#"([^=\s]+)=("[^"]*"|[^"\s]+)"#);
  let mut attributes = AttributeVector::new();
  let mut rem = skip_whitespace(s);
  while !rem.is_empty() {
    let caps = ATTRIBUTE
      .captures(rem)
      .filter(|c| c.get(0).is_some_and(|m| m.start() == 0))
      .ok_or_else(|| format!("attribute: couldn't match {} at {:?}", *ATTRIBUTE, rem))?;
    let (name, value) = (&caps[1], &caps[2]);
    attributes.insert(name, parse_attribute_value(name, value)?);
    rem = skip_whitespace(&rem[caps[0].len()..]);
  }
  Ok((attributes, rem))
}

/// Both sides must agree on their non-terminals, and indices, when used,
/// must name each tail exactly once
fn check_alignment(source: &Rule, target: &Rule) -> Result<(), String> {
  let arity = source.arity();
  if target.arity() != arity {
    return Err(format!(
      "source has {} non-terminals but target has {}",
      arity,
      target.arity()
    ));
  }

  for rule in [source, target] {
    let mut positions = rule.tail_positions();
    positions.sort_unstable();
    if positions.iter().enumerate().any(|(i, p)| i != *p) {
      return Err(format!("inconsistent non-terminal indices in {}", rule));
    }
  }

  Ok(())
}

fn parse_rule_pair(s: &str) -> Result<RulePair, String> {
  let s = skip_whitespace(s);
  let (lhs, s) = parse_non_terminal(s).map_err(|e| format!("rule lhs: {}", e))?;

  let (sep, s) = parse_separator(skip_whitespace(s));
  if !sep {
    return Err(format!("expected ||| after {}", lhs));
  }
  let (source, s) = parse_symbols(s).map_err(|e| format!("rule source: {}", e))?;

  let (target, s) = match parse_separator(s) {
    (false, s) => (source.clone(), s),
    (true, s) => parse_symbols(s).map_err(|e| format!("rule target: {}", e))?,
  };
  let (features, s) = match parse_separator(s) {
    (false, s) => (FeatureVector::new(), s),
    (true, s) => parse_features(s)?,
  };
  let attributes = match parse_separator(s) {
    (false, _) => AttributeVector::new(),
    (true, s) => parse_attributes(s)?.0,
  };

  let source = Rule::new(lhs.clone(), source);
  let target = Rule::new(lhs, target);
  check_alignment(&source, &target)?;

  let mut pair = RulePair::new(Arc::new(source), Arc::new(target), features);
  pair.attributes = attributes;
  Ok(pair)
}

fn strip_comment(line: &str) -> &str {
  match line.find("//") {
    Some(pos) => &line[..pos],
    None => line,
  }
}

impl FromStr for GrammarStatic {
  type Err = Error;

  /// Parses a rule table, one rule pair per line
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut grammar = GrammarStatic::new();
    for (idx, line) in s.lines().enumerate() {
      let line = strip_comment(line).trim();
      if line.is_empty() {
        continue;
      }
      let pair = parse_rule_pair(line).map_err(|message| Error::Grammar {
        line: idx + 1,
        message,
      })?;
      grammar.insert(pair);
    }
    Ok(grammar)
  }
}
