#[macro_use]
extern crate lazy_static;

pub mod chart;
pub mod coarse;
pub mod compose;
pub mod config;
pub mod debinarize;
pub mod error;
pub mod feature;
pub mod grammar;
pub mod hypergraph;
pub mod inside_outside;
pub mod lattice;
pub mod parse_grammar;
pub mod prune;
pub mod rules;
pub mod semiring;
pub mod symbol;
pub mod transducer;
pub mod utils;
pub mod weight;

pub use crate::coarse::{CoarseParse, ParseCoarse};
pub use crate::compose::ComposeCky;
pub use crate::config::ParseOptions;
pub use crate::debinarize::Debinarize;
pub use crate::error::{Error, Result};
pub use crate::grammar::{Grammar, GrammarStatic};
pub use crate::hypergraph::HyperGraph;
pub use crate::lattice::Lattice;
pub use crate::semiring::{LogProb, Semiring, Viterbi};
pub use crate::symbol::Symbol;
pub use crate::weight::{WeightFunction, Weighted, WeightedExtra, WeightsOne};

impl Grammar {
  /// Composes `lattice` with this grammar, without pruning
  pub fn compose(&self, lattice: &Lattice, options: &ParseOptions) -> HyperGraph {
    ComposeCky::new(self.clone(), options.clone()).parse(lattice)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feature::AttributeValue;

  const AMBIGUOUS: &str = r#"
    [S] ||| [NP,1] [VP,2]
    [NP] ||| [NP,1] [PP,2]
    [VP] ||| [V,1] [NP,2]
    [VP] ||| [VP,1] [PP,2]
    [PP] ||| [P,1] [NP,2]
    [NP] ||| [N,1]
    [NP] ||| i
    [N] ||| man
    [N] ||| telescope
    [V] ||| saw
    [P] ||| with
  "#;

  fn grammar(rules: &str) -> Grammar {
    rules.parse::<GrammarStatic>().unwrap().into()
  }

  fn lhs(graph: &HyperGraph, node: usize) -> Symbol {
    let edge = &graph.edges[graph.nodes[node].edges[0]];
    edge.rule.as_ref().unwrap().lhs.clone()
  }

  fn span(graph: &HyperGraph, node: usize) -> (i64, i64) {
    let edge = &graph.edges[graph.nodes[node].edges[0]];
    match (edge.attributes.get("span-first"), edge.attributes.get("span-last")) {
      (Some(AttributeValue::Int(first)), Some(AttributeValue::Int(last))) => (*first, *last),
      _ => panic!("edge without span"),
    }
  }

  /// Edges described independently of node numbering, sorted
  fn edge_signatures(graph: &HyperGraph) -> Vec<String> {
    let mut signatures = graph
      .edges
      .iter()
      .map(|edge| {
        let tails = edge
          .tails
          .iter()
          .map(|t| format!("{}{:?}", lhs(graph, *t), span(graph, *t)))
          .collect::<Vec<_>>();
        format!(
          "{}{:?} <- {} ||| {}",
          lhs(graph, edge.head),
          span(graph, edge.head),
          tails.join(" "),
          edge.rule.as_ref().unwrap()
        )
      })
      .collect::<Vec<_>>();
    signatures.sort();
    signatures
  }

  #[test]
  fn test_two_terminal_sentence() {
    let g = grammar("[S] ||| a b").compose(&"a b".parse().unwrap(), &ParseOptions::default());

    assert!(g.is_valid());
    assert_eq!(g.nodes.len(), 2);
    assert_eq!(g.edges.len(), 2);

    let goal = g.goal.unwrap();
    let s = (0..g.nodes.len()).find(|n| *n != goal).unwrap();
    assert_eq!(lhs(&g, s), Symbol::new("[S]"));
    assert_eq!(span(&g, s), (0, 2));
    assert_eq!(g.nodes[s].edges.len(), 1);

    assert_eq!(g.nodes[goal].edges.len(), 1);
    let goal_edge = &g.edges[g.nodes[goal].edges[0]];
    assert_eq!(goal_edge.tails, vec![s]);
    assert_eq!(goal_edge.rule.as_ref().unwrap().lhs, Symbol::goal());
  }

  #[test]
  fn test_missing_terminal() {
    let lattice = Lattice::from_sentence(&["a"]);
    let g = grammar("[S] ||| a b").compose(&lattice, &ParseOptions::default());
    assert!(!g.is_valid());
  }

  #[test]
  fn test_forest_is_connected() {
    let lattice: Lattice = "i saw man with telescope".parse().unwrap();
    let g = grammar(AMBIGUOUS).compose(&lattice, &ParseOptions::default());
    assert!(g.is_valid());

    let mut reachable = vec![false; g.nodes.len()];
    let mut stack = vec![g.goal.unwrap()];
    while let Some(node) = stack.pop() {
      if reachable[node] {
        continue;
      }
      reachable[node] = true;
      for edge in g.nodes[node].edges.iter() {
        assert_eq!(g.edges[*edge].head, node);
        for tail in g.edges[*edge].tails.iter() {
          assert!(*tail < g.nodes.len());
          stack.push(*tail);
        }
      }
    }
    assert!(reachable.iter().all(|r| *r));

    // two attachments of the prepositional phrase
    let derivations = g.inside(&WeightsOne::<LogProb>::new());
    assert!((derivations.0 - 2f64.ln()).abs() < 1e-9);
    assert_eq!(g.inside(&WeightsOne::<Viterbi>::new()), Viterbi(1.0));
  }

  #[test]
  fn test_fresh_parsers_agree() {
    let grammar = grammar(AMBIGUOUS);
    let lattice: Lattice = "i saw man with telescope".parse().unwrap();
    let options = ParseOptions::default();

    let first = ComposeCky::new(grammar.clone(), options.clone()).parse(&lattice);
    let second = ComposeCky::new(grammar.clone(), options.clone()).parse(&lattice);
    assert_eq!(first, second);

    // and a parser reused across calls
    let mut parser = ComposeCky::new(grammar, options);
    let _ = parser.parse(&"i saw man".parse().unwrap());
    assert_eq!(parser.parse(&lattice), first);
  }

  #[test]
  fn test_coarse_matches_direct_compose() {
    let grammar = grammar(AMBIGUOUS);
    let lattice: Lattice = "i saw man with telescope".parse().unwrap();

    let direct = grammar.compose(&lattice, &ParseOptions::default());
    let coarse = ParseCoarse::new(
      vec![grammar.clone(), grammar],
      vec![0.0],
      WeightsOne::<Viterbi>::new(),
      ParseOptions::default(),
    )
    .unwrap()
    .parse_detailed(&lattice);

    assert!(coarse.graph.is_valid());
    assert_eq!(coarse.relaxations, 0);
    assert_eq!(edge_signatures(&coarse.graph), edge_signatures(&direct));
  }

  #[test]
  fn test_coarse_matches_direct_compose_over_terminal_runs() {
    let cases = [
      ("[S] ||| a b", "a b"),
      ("[S] ||| [A,1] c\n[A] ||| a b", "a b c"),
      ("[S] ||| x [A,1] z\n[A] ||| y", "x y z"),
    ];

    for (rules, sentence) in cases {
      let grammar = grammar(rules);
      let lattice: Lattice = sentence.parse().unwrap();

      let direct = grammar.compose(&lattice, &ParseOptions::default());
      let coarse = ParseCoarse::new(
        vec![grammar.clone(), grammar],
        vec![0.0],
        WeightsOne::<Viterbi>::new(),
        ParseOptions::default(),
      )
      .unwrap()
      .parse_detailed(&lattice);

      assert!(direct.is_valid(), "{}", rules);
      assert!(coarse.graph.is_valid(), "{}", rules);
      assert_eq!(coarse.relaxations, 0);
      assert_eq!(edge_signatures(&coarse.graph), edge_signatures(&direct));
    }
  }

  #[test]
  fn test_unreachable_threshold() {
    let grammar = grammar(AMBIGUOUS);
    let lattice: Lattice = "i saw man with telescope".parse().unwrap();

    // posteriors never exceed one
    let coarse = ParseCoarse::new(
      vec![grammar.clone(), grammar],
      vec![5.0],
      WeightsOne::<Viterbi>::new(),
      ParseOptions::default(),
    )
    .unwrap()
    .parse_detailed(&lattice);

    assert!(coarse.graph.is_valid());
    assert_eq!(coarse.relaxations, 1);
  }

  #[test]
  fn test_debinarized_parse() {
    let grammar = grammar(
      r#"
        [S] ||| [NP,1] [S^,2]
        [S^] ||| [V,1] [NP,2]
        [NP] ||| i
        [NP] ||| you
        [V] ||| see
      "#,
    );
    let g = grammar.compose(&"i see you".parse().unwrap(), &ParseOptions::default());
    let g = Debinarize.apply(&g);

    assert!(g.is_valid());
    let goal = g.goal.unwrap();
    let s = g.edges[g.nodes[goal].edges[0]].tails[0];
    assert_eq!(g.nodes[s].edges.len(), 1);
    assert_eq!(g.edges[g.nodes[s].edges[0]].tails.len(), 3);
  }
}
