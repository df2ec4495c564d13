use tracing::{debug, warn};

use crate::chart::Chart;
use crate::compose::ComposeCky;
use crate::config::ParseOptions;
use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::hypergraph::HyperGraph;
use crate::inside_outside::ParseCky;
use crate::lattice::Lattice;
use crate::prune::{CoarseSimple, CoarseSymbol, LabelScoreChart, PruneCoarse, PruneNone};
use crate::semiring::Semiring;
use crate::transducer::TransducerKind;
use crate::weight::WeightFunction;

/// Outcome of a coarse-to-fine parse
#[derive(Debug, Clone)]
pub struct CoarseParse {
  pub graph: HyperGraph,
  /// how many times the thresholds were relaxed
  pub relaxations: usize,
  /// the factor the thresholds were last scaled by
  pub factor: f64,
}

/// Coarse-to-fine parsing over grammars ordered from coarsest to finest.
///
/// Every grammar but the last is only scored; its posteriors prune the next
/// one. The finest grammar is composed into the forest. When any pass fails
/// every threshold is scaled down by the relaxation decay and the passes
/// restart from the scores of the coarsest grammar, at most
/// `max_relaxations` times.
#[derive(Debug)]
pub struct ParseCoarse<F> {
  grammars: Vec<Grammar>,
  thresholds: Vec<f64>,
  function: F,
  options: ParseOptions,
}

impl<F: WeightFunction> ParseCoarse<F> {
  /// `thresholds[i]` is the posterior cutoff applied to the scores of
  /// `grammars[i]`, so there must be one threshold less than grammars.
  pub fn new(
    mut grammars: Vec<Grammar>,
    thresholds: Vec<f64>,
    function: F,
    options: ParseOptions,
  ) -> Result<Self> {
    if grammars.is_empty() {
      return Err(Error::Config("no grammar to parse with".into()));
    }
    if thresholds.len() + 1 != grammars.len() {
      return Err(Error::Config(format!(
        "{} grammars need {} thresholds, got {}",
        grammars.len(),
        grammars.len() - 1,
        thresholds.len()
      )));
    }
    if let Some(t) = thresholds.iter().find(|t| t.is_nan() || **t < 0.0) {
      return Err(Error::Config(format!("invalid threshold {}", t)));
    }

    // coarse grammars cover unknown words and POS tags the way the finest does
    if let Some((fine, coarse)) = grammars.split_last_mut() {
      for kind in [TransducerKind::Unknown, TransducerKind::Pos] {
        if let Some(shared) = fine.find_kind(kind) {
          for grammar in coarse.iter_mut().filter(|g| !g.has_kind(kind)) {
            grammar.push(shared.clone());
          }
        }
      }
    }

    Ok(Self {
      grammars,
      thresholds,
      function,
      options,
    })
  }

  pub fn grammars(&self) -> &[Grammar] {
    &self.grammars
  }

  pub fn options(&self) -> &ParseOptions {
    &self.options
  }

  pub fn parse(&self, lattice: &Lattice) -> HyperGraph {
    self.parse_detailed(lattice).graph
  }

  pub fn parse_detailed(&self, lattice: &Lattice) -> CoarseParse {
    let mut result = CoarseParse {
      graph: HyperGraph::new(),
      relaxations: 0,
      factor: 1.0,
    };
    if lattice.is_empty() {
      return result;
    }

    let finest = self.grammars.len() - 1;
    let mut composer = ComposeCky::new(self.grammars[finest].clone(), self.options.clone());
    if finest == 0 {
      result.graph = composer.parse(lattice);
      return result;
    }

    // relaxing cannot help when the unpruned coarsest grammar fails
    let mut scores_init = LabelScoreChart::new(0);
    if !ParseCky::new(&self.grammars[0], &self.function, &self.options).parse(
      lattice,
      &mut scores_init,
      &PruneNone,
    ) {
      debug!(level = 0, "coarsest grammar has no parse");
      return result;
    }

    let relaxation = self.options.relaxation;
    loop {
      let mut scores = scores_init.clone();
      let mut succeed = true;

      for level in 1..finest {
        let prev = std::mem::replace(&mut scores, Chart::new(0));
        let cutoff = self.cutoff(level - 1, result.factor);
        let mut parser = ParseCky::new(&self.grammars[level], &self.function, &self.options);

        succeed = if level == 1 {
          parser.parse(lattice, &mut scores, &PruneCoarse::new(&prev, cutoff, CoarseSimple))
        } else {
          let coarser = CoarseSymbol::new((level - 2) as u32);
          parser.parse(lattice, &mut scores, &PruneCoarse::new(&prev, cutoff, coarser))
        };
        debug!(
          level,
          factor = result.factor,
          cutoff = cutoff.to_log(),
          succeed,
          "coarse pass"
        );
        if !succeed {
          break;
        }
      }

      if succeed {
        let cutoff = self.cutoff(finest - 1, result.factor);
        let graph = if finest == 1 {
          composer.parse_pruned(lattice, &PruneCoarse::new(&scores, cutoff, CoarseSimple))
        } else {
          let coarser = CoarseSymbol::new((finest - 1) as u32);
          composer.parse_pruned(lattice, &PruneCoarse::new(&scores, cutoff, coarser))
        };
        debug!(
          level = finest,
          factor = result.factor,
          cutoff = cutoff.to_log(),
          valid = graph.is_valid(),
          "fine pass"
        );

        if graph.is_valid() {
          result.graph = graph;
          return result;
        }
      }

      if result.relaxations >= relaxation.max_relaxations {
        warn!(
          relaxations = result.relaxations,
          factor = result.factor,
          "giving up after relaxing every threshold"
        );
        return result;
      }
      result.factor *= relaxation.decay;
      result.relaxations += 1;
      warn!(
        relaxations = result.relaxations,
        factor = result.factor,
        "no parse, relaxing thresholds"
      );
    }
  }

  fn cutoff(&self, level: usize, factor: f64) -> F::Score {
    F::Score::from_log((self.thresholds[level] * factor).ln())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::GrammarStatic;
  use crate::semiring::Viterbi;
  use crate::symbol::Symbol;
  use crate::transducer::Transducer;
  use crate::weight::WeightsOne;
  use std::sync::Arc;

  fn grammar(rules: &str) -> Grammar {
    rules.parse::<GrammarStatic>().unwrap().into()
  }

  fn coarse(grammars: Vec<Grammar>, thresholds: Vec<f64>) -> ParseCoarse<WeightsOne<Viterbi>> {
    ParseCoarse::new(grammars, thresholds, WeightsOne::new(), ParseOptions::default()).unwrap()
  }

  #[test]
  fn test_configuration_errors() {
    let function = WeightsOne::<Viterbi>::new();
    assert!(ParseCoarse::new(vec![], vec![], function, ParseOptions::default()).is_err());

    let g = grammar("[S] ||| a");
    let result = ParseCoarse::new(
      vec![g.clone(), g.clone()],
      vec![],
      WeightsOne::<Viterbi>::new(),
      ParseOptions::default(),
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let result = ParseCoarse::new(
      vec![g.clone(), g],
      vec![-1.0],
      WeightsOne::<Viterbi>::new(),
      ParseOptions::default(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_three_levels() {
    let parser = coarse(
      vec![
        grammar("[S] ||| [x,1] [x,2]\n[x] ||| a\n[x] ||| b"),
        grammar("[S] ||| [A@1,1] [B@0,2]\n[A@1] ||| a\n[B@0] ||| b"),
        grammar("[S] ||| [A@3,1] [B@2,2]\n[A@3] ||| a\n[B@2] ||| b"),
      ],
      vec![0.5, 0.5],
    );

    let result = parser.parse_detailed(&"a b".parse().unwrap());
    assert!(result.graph.is_valid());
    assert_eq!(result.relaxations, 0);
    assert_eq!(result.graph.edges.len(), 4);

    let s_edge = result
      .graph
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[S]"))
      .unwrap();
    assert_eq!(s_edge.rule.as_ref().unwrap().rhs[0], Symbol::new("[A@3,1]"));
  }

  #[test]
  fn test_unreachable_threshold_relaxes_once() {
    let g = grammar("[S] ||| [A,1] [B,2]\n[A] ||| a\n[B] ||| b");
    let parser = coarse(vec![g.clone(), g], vec![5.0]);

    let result = parser.parse_detailed(&"a b".parse().unwrap());
    assert!(result.graph.is_valid());
    assert_eq!(result.relaxations, 1);
    assert!((result.factor - 0.1).abs() < 1e-12);
  }

  #[test]
  fn test_relaxation_is_bounded() {
    let g = grammar("[S] ||| a b");
    let options = ParseOptions::default().max_relaxations(3);
    let parser = ParseCoarse::new(
      vec![g.clone(), g],
      vec![f64::INFINITY],
      WeightsOne::<Viterbi>::new(),
      options,
    )
    .unwrap();

    let result = parser.parse_detailed(&"a b".parse().unwrap());
    assert!(!result.graph.is_valid());
    assert_eq!(result.relaxations, 3);
  }

  #[test]
  fn test_coarsest_failure_does_not_relax() {
    let parser = coarse(vec![grammar("[S] ||| a"), grammar("[S] ||| b")], vec![0.0]);
    let result = parser.parse_detailed(&"b".parse().unwrap());
    assert!(!result.graph.is_valid());
    assert_eq!(result.relaxations, 0);
  }

  #[test]
  fn test_single_grammar() {
    let parser = coarse(vec![grammar("[S] ||| a")], vec![]);
    assert!(parser.parse(&"a".parse().unwrap()).is_valid());
    assert!(!parser.parse(&"b".parse().unwrap()).is_valid());
  }

  #[test]
  fn test_unknown_transducer_is_shared() {
    let rules = "[S] ||| [A,1] [UNK,2]\n[A] ||| a";
    let unknown = "[UNK] ||| zzz"
      .parse::<GrammarStatic>()
      .unwrap()
      .with_kind(TransducerKind::Unknown);
    let fine = Grammar::from(vec![
      Arc::new(rules.parse::<GrammarStatic>().unwrap()) as Arc<dyn Transducer>,
      Arc::new(unknown) as Arc<dyn Transducer>,
    ]);

    let parser = coarse(vec![grammar(rules), fine], vec![0.0]);
    assert!(parser.grammars()[0].has_kind(TransducerKind::Unknown));
    assert_eq!(parser.grammars()[0].len(), 2);

    let result = parser.parse_detailed(&"a zzz".parse().unwrap());
    assert!(result.graph.is_valid());
    assert_eq!(result.relaxations, 0);
  }
}
