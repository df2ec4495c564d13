use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use num_traits::{One, Zero};
use tracing::{debug, trace};

use crate::chart::Chart;
use crate::config::ParseOptions;
use crate::grammar::Grammar;
use crate::lattice::Lattice;
use crate::prune::{LabelScoreChart, Pruner};
use crate::semiring::Semiring;
use crate::symbol::Symbol;
use crate::transducer::{StateId, Transducer, TransducerKind};
use crate::weight::WeightFunction;

type LabelId = usize;

/// A label instance: label `id` over `[first, last)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tail {
  first: usize,
  last: usize,
  id: LabelId,
}

#[derive(Debug, Clone)]
struct ScoredEdge<S> {
  tails: Vec<Tail>,
  score: S,
}

/// Unary edges always stay within one span, so a label id is enough
#[derive(Debug, Clone, Copy)]
struct UnaryEdge<S> {
  tail: LabelId,
  score: S,
}

#[derive(Debug, Clone)]
struct ActiveItem<S> {
  state: StateId,
  edge: ScoredEdge<S>,
}

/// Per span, the incoming edges of every label id
type EdgeChart<E> = Chart<Vec<Vec<E>>>;

fn score<S: Semiring>(scores: &[S], id: LabelId) -> S {
  scores.get(id).copied().unwrap_or_else(S::zero)
}

fn score_mut<S: Semiring>(scores: &mut Vec<S>, id: LabelId) -> &mut S {
  if scores.len() <= id {
    scores.resize(id + 1, S::zero());
  }
  &mut scores[id]
}

fn edges_mut<E>(edges: &mut Vec<Vec<E>>, id: LabelId) -> &mut Vec<E> {
  if edges.len() <= id {
    edges.resize_with(id + 1, Vec::new);
  }
  &mut edges[id]
}

/// Scores every (span, label) of a lattice without building a forest, then
/// turns the scores into posteriors used to prune a finer pass.
///
/// Passives live in three tiers per span: labels built by rules, labels
/// reached from those by unary chains, and labels reached once more from
/// the second tier. Every cached closure contains the label itself, so each
/// tier includes the one below it.
pub struct ParseCky<'a, F: WeightFunction> {
  grammar: &'a Grammar,
  function: &'a F,
  options: &'a ParseOptions,

  symbols: Vec<Symbol>,
  symbol_ids: HashMap<Symbol, LabelId>,
  goal_id: LabelId,

  inside: Chart<Vec<F::Score>>,
  outside: Chart<Vec<F::Score>>,
  actives: Vec<Chart<Vec<ActiveItem<F::Score>>>>,
  passives: EdgeChart<ScoredEdge<F::Score>>,
  passives_unary: EdgeChart<UnaryEdge<F::Score>>,
  passives_final: EdgeChart<UnaryEdge<F::Score>>,
  /// unary closure of every label id, computed on first use
  unaries: Vec<Option<Rc<[(LabelId, F::Score)]>>>,
}

impl<'a, F: WeightFunction> ParseCky<'a, F> {
  pub fn new(grammar: &'a Grammar, function: &'a F, options: &'a ParseOptions) -> Self {
    Self {
      grammar,
      function,
      options,
      symbols: Vec::new(),
      symbol_ids: HashMap::new(),
      goal_id: 0,
      inside: Chart::new(0),
      outside: Chart::new(0),
      actives: Vec::new(),
      passives: Chart::new(0),
      passives_unary: Chart::new(0),
      passives_final: Chart::new(0),
      unaries: Vec::new(),
    }
  }

  /// Fills `scores` with the posterior of every label surviving at every
  /// span. Returns false, leaving `scores` empty, when the goal is not
  /// derivable over the whole lattice.
  pub fn parse<P: Pruner>(
    &mut self,
    lattice: &Lattice,
    scores: &mut LabelScoreChart<F::Score>,
    pruner: &P,
  ) -> bool {
    let size = lattice.size();
    *scores = Chart::new(size);
    if lattice.is_empty() {
      return false;
    }

    self.inside = Chart::new(size);
    self.outside = Chart::new(size);
    self.actives = (0..self.grammar.len()).map(|_| Chart::new(size)).collect();
    self.passives = Chart::new(size);
    self.passives_unary = Chart::new(size);
    self.passives_final = Chart::new(size);
    self.symbols.clear();
    self.symbol_ids.clear();
    self.unaries.clear();
    let options = self.options;
    self.goal_id = self.id_map(&options.goal);

    self.compute_inside(lattice, pruner);

    let goal_inside = score(self.inside.get(0, size), self.goal_id);
    if goal_inside.is_zero() {
      debug!(size, "goal not derivable");
      return false;
    }

    self.compute_outside(size);
    self.compute_posteriors(size, goal_inside, scores);
    debug!(size, labels = self.symbols.len(), "scored lattice");
    true
  }

  fn id_map(&mut self, symbol: &Symbol) -> LabelId {
    if let Some(&id) = self.symbol_ids.get(symbol) {
      return id;
    }
    let id = self.symbols.len();
    self.symbols.push(symbol.clone());
    self.symbol_ids.insert(symbol.clone(), id);
    id
  }

  fn compute_inside<P: Pruner>(&mut self, lattice: &Lattice, pruner: &P) {
    let grammar = self.grammar;
    let function = self.function;
    let size = lattice.size();

    for (table, transducer) in grammar.iter().enumerate() {
      let root = transducer.root();
      for pos in 0..size {
        if transducer.valid_span(pos, pos, 0) {
          self.actives[table].get_mut(pos, pos).push(ActiveItem {
            state: root,
            edge: ScoredEdge {
              tails: Vec::new(),
              score: F::Score::one(),
            },
          });
        }
      }
    }

    for length in 1..=size {
      for first in 0..=(size - length) {
        let last = first + length;
        let pruned = pruner.prune_span(first, last);
        let distance = lattice.shortest_distance(first, last);

        for (table, transducer) in grammar.iter().enumerate() {
          let mut cell = self.actives[table].take(first, last);

          if transducer.valid_span(first, last, distance) {
            for middle in (first + 1)..last {
              self.extend_actives(
                transducer.as_ref(),
                self.actives[table].get(first, middle),
                self.passives_final.get(middle, last),
                middle,
                last,
                &mut cell,
              );
            }

            if !self.options.treebank || length == 1 {
              self.extend_terminals(transducer.as_ref(), table, lattice, first, last, &mut cell);
            }
          }

          // pruned spans only carry items along
          if !pruned {
            for item in cell.iter() {
              let rules = transducer.rules(item.state);
              if rules.is_empty() {
                continue;
              }

              let score_tails = item.edge.tails.iter().fold(F::Score::one(), |acc, t| {
                acc * score(self.inside.get(t.first, t.last), t.id)
              });

              for pair in rules {
                let rule = pair.side(self.options.yield_source);
                if pruner.prune_label(first, last, &rule.lhs) {
                  continue;
                }
                let lhs = self.id_map(&rule.lhs);
                let score_edge = item.edge.score * function.apply(&pair.features);

                edges_mut(self.passives.get_mut(first, last), lhs).push(ScoredEdge {
                  tails: item.edge.tails.clone(),
                  score: score_edge,
                });
                let inside = score_mut(self.inside.get_mut(first, last), lhs);
                *inside = Semiring::max(*inside, score_tails * score_edge);
              }
            }
          }

          self.actives[table].put(first, last, cell);
        }

        if pruned {
          continue;
        }

        let rule_labels = non_empty(self.passives.get(first, last));
        self.close_unary(first, last, rule_labels, false, pruner);
        let unary_labels = non_empty(self.passives_unary.get(first, last));
        self.close_unary(first, last, unary_labels, true, pruner);

        for (table, transducer) in grammar.iter().enumerate() {
          if !transducer.valid_span(first, last, distance) {
            continue;
          }
          let mut cell = self.actives[table].take(first, last);
          self.extend_actives(
            transducer.as_ref(),
            self.actives[table].get(first, first),
            self.passives_final.get(first, last),
            first,
            last,
            &mut cell,
          );
          self.actives[table].put(first, last, cell);
        }

        trace!(
          first,
          last,
          labels = non_empty(self.passives_final.get(first, last)).len(),
          "span scored"
        );
      }
    }
  }

  fn extend_actives(
    &self,
    transducer: &dyn Transducer,
    actives: &[ActiveItem<F::Score>],
    passives: &[Vec<UnaryEdge<F::Score>>],
    first: usize,
    last: usize,
    cell: &mut Vec<ActiveItem<F::Score>>,
  ) {
    if passives.is_empty() {
      return;
    }

    for item in actives.iter() {
      if !transducer.has_next(item.state) {
        continue;
      }
      for (id, edges) in passives.iter().enumerate() {
        if edges.is_empty() {
          continue;
        }
        let state = transducer.next(item.state, &self.symbols[id]);
        if state == transducer.root() {
          continue;
        }

        let mut tails = Vec::with_capacity(item.edge.tails.len() + 1);
        tails.extend_from_slice(&item.edge.tails);
        tails.push(Tail { first, last, id });
        cell.push(ActiveItem {
          state,
          edge: ScoredEdge {
            tails,
            score: item.edge.score,
          },
        });
      }
    }
  }

  fn extend_terminals(
    &mut self,
    transducer: &dyn Transducer,
    table: usize,
    lattice: &Lattice,
    first: usize,
    last: usize,
    cell: &mut Vec<ActiveItem<F::Score>>,
  ) {
    let actives = self.actives[table].get(first, last - 1);
    if actives.is_empty() {
      return;
    }

    let mut extended = Vec::new();
    for arc in lattice.arcs(last - 1) {
      let terminal = if self.options.pos_mode && transducer.kind() != TransducerKind::Pos {
        arc.label.terminal()
      } else {
        arc.label.clone()
      };
      let score_arc = self.function.apply(&arc.features);

      for item in actives.iter() {
        let state = if terminal.is_epsilon() {
          item.state
        } else {
          let state = transducer.next(item.state, &terminal);
          if state == transducer.root() {
            continue;
          }
          state
        };
        extended.push((
          last - 1 + arc.distance,
          ActiveItem {
            state,
            edge: ScoredEdge {
              tails: item.edge.tails.clone(),
              score: item.edge.score * score_arc,
            },
          },
        ));
      }
    }

    for (end, item) in extended {
      if end == last {
        cell.push(item);
      } else {
        self.actives[table].get_mut(first, end).push(item);
      }
    }
  }

  /// Builds the next passive tier of `[first, last)` from the closures of
  /// `children`
  fn close_unary<P: Pruner>(
    &mut self,
    first: usize,
    last: usize,
    children: Vec<LabelId>,
    to_final: bool,
    pruner: &P,
  ) {
    for child in children {
      let closure = self.unary_closure(child);
      let score_tail = score(self.inside.get(first, last), child);

      for &(parent, score_unary) in closure.iter() {
        if pruner.prune_label(first, last, &self.symbols[parent]) {
          continue;
        }

        let tier = if to_final {
          &mut self.passives_final
        } else {
          &mut self.passives_unary
        };
        edges_mut(tier.get_mut(first, last), parent).push(UnaryEdge {
          tail: child,
          score: score_unary,
        });
        let inside = score_mut(self.inside.get_mut(first, last), parent);
        *inside = Semiring::max(*inside, score_tail * score_unary);
      }
    }
  }

  /// Labels reachable from `child` by unary rules, with the best score of
  /// reaching them. The child itself is included with score one.
  fn unary_closure(&mut self, child: LabelId) -> Rc<[(LabelId, F::Score)]> {
    if let Some(Some(closure)) = self.unaries.get(child) {
      return closure.clone();
    }

    let grammar = self.grammar;
    let function = self.function;
    let yield_source = self.options.yield_source;
    let mut closure = HashMap::new();
    closure.insert(child, F::Score::one());

    let mut stagnant = 0;
    loop {
      let mut closure_next = closure.clone();
      let mut equilibrate = true;

      for (&label, &score_label) in closure.iter() {
        for transducer in grammar.iter() {
          let state = transducer.next(transducer.root(), &self.symbols[label]);
          if state == transducer.root() {
            continue;
          }

          for pair in transducer.rules(state) {
            let lhs = self.id_map(&pair.side(yield_source).lhs);
            if lhs == child {
              continue;
            }
            let score_rule = function.apply(&pair.features) * score_label;
            match closure_next.entry(lhs) {
              Entry::Vacant(entry) => {
                entry.insert(score_rule);
                equilibrate = false;
              }
              Entry::Occupied(mut entry) => {
                if *entry.get() < score_rule {
                  entry.insert(score_rule);
                  equilibrate = false;
                }
              }
            }
          }
        }
      }

      let grew = closure_next.len() > closure.len();
      closure = closure_next;
      if equilibrate {
        break;
      }
      if !grew {
        stagnant += 1;
        if stagnant >= self.options.closure.inside_stagnation {
          break;
        }
      }
    }

    let mut closure = closure.into_iter().collect::<Vec<_>>();
    closure.sort_by_key(|(id, _)| *id);
    let closure: Rc<[(LabelId, F::Score)]> = closure.into();

    if self.unaries.len() <= child {
      self.unaries.resize_with(child + 1, || None);
    }
    self.unaries[child] = Some(closure.clone());
    closure
  }

  /// Outside scores flow from the goal down, longest spans first; within a
  /// span from the last tier to the first
  fn compute_outside(&mut self, size: usize) {
    *score_mut(self.outside.get_mut(0, size), self.goal_id) = F::Score::one();

    for length in (1..=size).rev() {
      for first in 0..=(size - length) {
        let last = first + length;
        let labels = self.inside.get(first, last).len();
        let outside = self.outside.get_mut(first, last);
        if outside.len() < labels {
          outside.resize(labels, F::Score::zero());
        }

        for tier in [&self.passives_final, &self.passives_unary] {
          for (id, edges) in tier.get(first, last).iter().enumerate() {
            let score_head = score(self.outside.get(first, last), id);
            if score_head.is_zero() {
              continue;
            }
            for edge in edges.iter() {
              let outside = score_mut(self.outside.get_mut(first, last), edge.tail);
              *outside = Semiring::max(*outside, score_head * edge.score);
            }
          }
        }

        for (id, edges) in self.passives.get(first, last).iter().enumerate() {
          let score_head = score(self.outside.get(first, last), id);
          if score_head.is_zero() {
            continue;
          }

          for edge in edges.iter() {
            let score_edge = score_head * edge.score;
            for (i, tail) in edge.tails.iter().enumerate() {
              let score_outside = edge
                .tails
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(score_edge, |acc, (_, sibling)| {
                  acc * score(self.inside.get(sibling.first, sibling.last), sibling.id)
                });

              let outside = score_mut(self.outside.get_mut(tail.first, tail.last), tail.id);
              *outside = Semiring::max(*outside, score_outside);
            }
          }
        }
      }
    }
  }

  fn compute_posteriors(
    &self,
    size: usize,
    goal_inside: F::Score,
    scores: &mut LabelScoreChart<F::Score>,
  ) {
    for length in 1..=size {
      for first in 0..=(size - length) {
        let last = first + length;
        let inside = self.inside.get(first, last);
        let outside = self.outside.get(first, last);
        let labels = scores.get_mut(first, last);

        for (id, (score_inside, score_outside)) in inside.iter().zip(outside.iter()).enumerate() {
          let posterior = *score_inside * *score_outside;
          if !posterior.is_zero() {
            labels.insert(self.symbols[id].clone(), posterior / goal_inside);
          }
        }
      }
    }
  }
}

fn non_empty<E>(edges: &[Vec<E>]) -> Vec<LabelId> {
  edges
    .iter()
    .enumerate()
    .filter(|(_, e)| !e.is_empty())
    .map(|(id, _)| id)
    .collect()
}
