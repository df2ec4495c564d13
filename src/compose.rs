use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::chart::Chart;
use crate::config::ParseOptions;
use crate::feature::{AttributeValue, AttributeVector, FeatureVector};
use crate::grammar::Grammar;
use crate::hypergraph::{HyperGraph, NodeId};
use crate::lattice::Lattice;
use crate::prune::{PruneNone, Pruner};
use crate::rules::{Rule, RulePair};
use crate::symbol::Symbol;
use crate::transducer::{StateId, Transducer, TransducerKind};

/// A dotted rule: a transducer state reached after matching some prefix of a
/// source side, with the nodes matched by its non-terminals so far.
#[derive(Debug, Clone)]
struct ActiveItem {
  state: StateId,
  tails: Vec<NodeId>,
  features: FeatureVector,
}

impl ActiveItem {
  fn new(state: StateId) -> Self {
    Self {
      state,
      tails: Vec::new(),
      features: FeatureVector::new(),
    }
  }
}

/// CKY-style composition of a lattice with a grammar, building the forest of
/// every derivation of the goal label over the whole lattice.
///
/// A parser keeps its charts between calls to reuse their storage; use one
/// instance per thread.
#[derive(Debug)]
pub struct ComposeCky {
  grammar: Grammar,
  options: ParseOptions,
  goal_rule: Arc<Rule>,

  actives: Vec<Chart<Vec<ActiveItem>>>,
  passives: Chart<Vec<NodeId>>,
  /// label of every node, indexed by node id
  non_terminals: Vec<Symbol>,
  /// unary depth at which every node was created
  node_levels: Vec<usize>,
  /// nodes of the current span by (label, level)
  node_map: HashMap<(Symbol, usize), NodeId>,
}

impl ComposeCky {
  pub fn new(grammar: Grammar, options: ParseOptions) -> Self {
    let goal_rule = Arc::new(Rule::new(
      Symbol::goal(),
      vec![options.goal.non_terminal_with_index(1)],
    ));

    Self {
      grammar,
      options,
      goal_rule,
      actives: Vec::new(),
      passives: Chart::new(0),
      non_terminals: Vec::new(),
      node_levels: Vec::new(),
      node_map: HashMap::new(),
    }
  }

  pub fn options(&self) -> &ParseOptions {
    &self.options
  }

  pub fn parse(&mut self, lattice: &Lattice) -> HyperGraph {
    self.parse_pruned(lattice, &PruneNone)
  }

  /// Composes while skipping every span and label `pruner` rejects
  pub fn parse_pruned<P: Pruner>(&mut self, lattice: &Lattice, pruner: &P) -> HyperGraph {
    let mut graph = HyperGraph::new();
    if lattice.is_empty() {
      debug!("empty lattice, nothing to compose");
      return graph;
    }

    let size = lattice.size();
    self.actives = (0..self.grammar.len()).map(|_| Chart::new(size)).collect();
    self.passives = Chart::new(size);
    self.non_terminals.clear();
    self.node_levels.clear();
    self.node_map.clear();

    for (table, transducer) in self.grammar.iter().enumerate() {
      let root = transducer.root();
      for pos in 0..size {
        if transducer.valid_span(pos, pos, 0) {
          self.actives[table].get_mut(pos, pos).push(ActiveItem::new(root));
        }
      }
    }

    for length in 1..=size {
      for first in 0..=(size - length) {
        let last = first + length;
        // a pruned span builds no labels, but dotted items still pass through
        // it on their way to longer spans
        let pruned = pruner.prune_span(first, last);
        self.node_map.clear();
        let distance = lattice.shortest_distance(first, last);

        for table in 0..self.grammar.len() {
          let transducer = self.grammar[table].clone();
          let mut cell = self.actives[table].take(first, last);

          if transducer.valid_span(first, last, distance) {
            for middle in (first + 1)..last {
              self.extend_actives(
                transducer.as_ref(),
                self.actives[table].get(first, middle),
                self.passives.get(middle, last),
                &mut cell,
              );
            }

            if !self.options.treebank || length == 1 {
              self.extend_terminals(transducer.as_ref(), table, lattice, first, last, &mut cell);
            }
          }

          // items may also arrive here from shorter spans over multi-position arcs
          if !pruned {
            for item in cell.iter() {
              for pair in transducer.rules(item.state) {
                self.apply_rule(&mut graph, pair, &item.tails, &item.features, first, last, 0, pruner);
              }
            }
          }

          self.actives[table].put(first, last, cell);
        }

        if pruned {
          trace!(first, last, "span pruned");
          continue;
        }

        self.unary_closure(&mut graph, distance, first, last, pruner);

        let non_terminals = &self.non_terminals;
        self
          .passives
          .get_mut(first, last)
          .sort_by(|a, b| non_terminals[*a].cmp(&non_terminals[*b]));

        for table in 0..self.grammar.len() {
          let transducer = self.grammar[table].clone();
          if !transducer.valid_span(first, last, distance) {
            continue;
          }
          let mut cell = self.actives[table].take(first, last);
          self.extend_actives(
            transducer.as_ref(),
            self.actives[table].get(first, first),
            self.passives.get(first, last),
            &mut cell,
          );
          self.actives[table].put(first, last, cell);
        }

        trace!(
          first,
          last,
          passives = self.passives.get(first, last).len(),
          "span composed"
        );
      }
    }

    self.attach_goal(&mut graph, size);
    graph.topologically_sort();

    debug!(
      size,
      nodes = graph.nodes.len(),
      edges = graph.edges.len(),
      valid = graph.is_valid(),
      "composed lattice"
    );
    graph
  }

  /// Advances every active item over every passive item of the adjacent span.
  /// Passives are sorted by label, so a transition is looked up once per run
  /// of equal labels.
  fn extend_actives(
    &self,
    transducer: &dyn Transducer,
    actives: &[ActiveItem],
    passives: &[NodeId],
    cell: &mut Vec<ActiveItem>,
  ) {
    if passives.is_empty() {
      return;
    }

    for item in actives.iter() {
      if !transducer.has_next(item.state) {
        continue;
      }

      let mut cached: Option<(&Symbol, StateId)> = None;
      for &passive in passives.iter() {
        let label = &self.non_terminals[passive];
        let state = match cached {
          Some((prev, state)) if prev == label => state,
          _ => {
            let state = transducer.next(item.state, label);
            cached = Some((label, state));
            state
          }
        };
        if state == transducer.root() {
          continue;
        }

        let mut tails = Vec::with_capacity(item.tails.len() + 1);
        tails.extend_from_slice(&item.tails);
        tails.push(passive);
        cell.push(ActiveItem {
          state,
          tails,
          features: item.features.clone(),
        });
      }
    }
  }

  /// Advances the items of `[first, last - 1)` over the lattice arcs leaving
  /// `last - 1`. Epsilon arcs carry items along without a transition.
  fn extend_terminals(
    &mut self,
    transducer: &dyn Transducer,
    table: usize,
    lattice: &Lattice,
    first: usize,
    last: usize,
    cell: &mut Vec<ActiveItem>,
  ) {
    let actives = self.actives[table].get(first, last - 1);
    if actives.is_empty() {
      return;
    }

    let mut extended = Vec::new();
    for arc in lattice.arcs(last - 1) {
      let terminal = self.terminal_label(transducer, &arc.label);
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
            tails: item.tails.clone(),
            features: &item.features + &arc.features,
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

  fn terminal_label(&self, transducer: &dyn Transducer, label: &Symbol) -> Symbol {
    if self.options.pos_mode && transducer.kind() != TransducerKind::Pos {
      label.terminal()
    } else {
      label.clone()
    }
  }

  /// Repeatedly applies unary rules to the passives of the span. Unary rules
  /// may form cycles, so every application builds a node one level deeper
  /// than its tail and the loop stops once the set of labels has not grown
  /// for `compose_stagnation` rounds. Zero rounds turns the closure off.
  fn unary_closure<P: Pruner>(
    &mut self,
    graph: &mut HyperGraph,
    distance: usize,
    first: usize,
    last: usize,
    pruner: &P,
  ) {
    if self.options.closure.compose_stagnation == 0 {
      return;
    }

    let mut labels = self
      .passives
      .get(first, last)
      .iter()
      .map(|id| self.non_terminals[*id].clone())
      .collect::<HashSet<_>>();

    let no_features = FeatureVector::new();
    let mut begin = 0;
    let mut stagnant = 0;
    let mut rounds = 0;
    loop {
      let end = self.passives.get(first, last).len();
      if begin == end {
        break;
      }
      let labels_before = labels.len();

      for table in 0..self.grammar.len() {
        let transducer = self.grammar[table].clone();
        if !transducer.valid_span(first, last, distance) {
          continue;
        }

        for p in begin..end {
          let tail = self.passives.get(first, last)[p];
          let state = transducer.next(transducer.root(), &self.non_terminals[tail]);
          if state == transducer.root() {
            continue;
          }

          let level = self.node_levels[tail] + 1;
          for pair in transducer.rules(state) {
            if let Some(head) =
              self.apply_rule(graph, pair, &[tail], &no_features, first, last, level, pruner)
            {
              labels.insert(self.non_terminals[head].clone());
            }
          }
        }
      }

      begin = end;
      rounds += 1;
      if labels.len() == labels_before {
        stagnant += 1;
        if stagnant >= self.options.closure.compose_stagnation {
          break;
        }
      }
    }

    trace!(first, last, rounds, labels = labels.len(), "unary closure");
  }

  /// Adds an edge for `pair` over `tails` and connects it to the node of its
  /// label at `level`, creating the node on first use. Returns the head, or
  /// `None` when the label is pruned.
  #[allow(clippy::too_many_arguments)]
  fn apply_rule<P: Pruner>(
    &mut self,
    graph: &mut HyperGraph,
    pair: &RulePair,
    tails: &[NodeId],
    features: &FeatureVector,
    first: usize,
    last: usize,
    level: usize,
    pruner: &P,
  ) -> Option<NodeId> {
    let rule = pair.side(self.options.yield_source);
    if pruner.prune_label(first, last, &rule.lhs) {
      return None;
    }

    let edge = graph.add_edge(order_tails(&pair.source, tails));
    edge.rule = Some(rule.clone());
    edge.features = &pair.features + features;
    edge.attributes = pair.attributes.clone();
    edge.attributes.merge(&span_attributes(first, last));
    let edge = edge.id;

    let head = self.node(graph, &rule.lhs, level, first, last);
    graph.connect_edge(edge, head);
    Some(head)
  }

  fn node(
    &mut self,
    graph: &mut HyperGraph,
    label: &Symbol,
    level: usize,
    first: usize,
    last: usize,
  ) -> NodeId {
    let key = (label.clone(), level);
    if let Some(&id) = self.node_map.get(&key) {
      return id;
    }

    let id = graph.add_node();
    self.non_terminals.push(label.clone());
    self.node_levels.push(level);
    self.passives.get_mut(first, last).push(id);
    self.node_map.insert(key, id);
    id
  }

  /// Connects every goal-labeled node over the whole lattice to a single
  /// goal node through `[goal] -> [S,1]`
  fn attach_goal(&mut self, graph: &mut HyperGraph, size: usize) {
    let tails = self
      .passives
      .get(0, size)
      .iter()
      .copied()
      .filter(|id| self.non_terminals[*id] == self.options.goal)
      .collect::<Vec<_>>();

    let mut goal = None;
    for tail in tails {
      let edge = graph.add_edge(vec![tail]);
      edge.rule = Some(self.goal_rule.clone());
      edge.attributes = span_attributes(0, size);
      let edge = edge.id;

      let head = match goal {
        Some(head) => head,
        None => {
          let head = graph.add_node();
          self.non_terminals.push(Symbol::goal());
          self.node_levels.push(0);
          goal = Some(head);
          head
        }
      };
      graph.connect_edge(edge, head);
    }

    graph.goal = goal;
  }
}

fn span_attributes(first: usize, last: usize) -> AttributeVector {
  let mut attributes = AttributeVector::new();
  attributes.insert("span-first", AttributeValue::Int(first as i64));
  attributes.insert("span-last", AttributeValue::Int(last as i64));
  attributes
}

/// Tails are matched in source order; reorder them so `tails[i]` is the node
/// of the non-terminal indexed `i + 1`
fn order_tails(source: &Rule, tails: &[NodeId]) -> Vec<NodeId> {
  if tails.len() < 2 {
    return tails.to_vec();
  }

  let mut indexed = source
    .rhs
    .iter()
    .filter(|s| s.is_non_terminal())
    .zip(tails.iter().copied())
    .collect::<Vec<_>>();
  indexed.sort_by_key(|(symbol, _)| symbol.non_terminal_index());
  indexed.into_iter().map(|(_, tail)| tail).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::GrammarStatic;
  use crate::lattice::LatticeArc;

  fn compose(grammar: &str, options: ParseOptions, lattice: &Lattice) -> HyperGraph {
    let grammar: GrammarStatic = grammar.parse().unwrap();
    ComposeCky::new(grammar.into(), options).parse(lattice)
  }

  fn label(graph: &HyperGraph, node: NodeId) -> Symbol {
    let edge = graph.nodes[node].edges[0];
    graph.edges[edge].rule.as_ref().unwrap().lhs.clone()
  }

  #[test]
  fn test_binary_sentence() {
    let g = compose(
      r#"
        [S] ||| [A,1] [B,2]
        [A] ||| a ||| a ||| lex=1
        [B] ||| b ||| b ||| lex=2
      "#,
      ParseOptions::default(),
      &"a b".parse().unwrap(),
    );

    assert!(g.is_valid());
    assert_eq!(g.nodes.len(), 4);
    assert_eq!(g.edges.len(), 4);

    let s_edge = g
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[S]"))
      .unwrap();
    assert_eq!(s_edge.tails.len(), 2);
    assert_eq!(label(&g, s_edge.tails[0]), Symbol::new("[A]"));
    assert_eq!(label(&g, s_edge.tails[1]), Symbol::new("[B]"));
    assert_eq!(s_edge.attributes.get("span-first"), Some(&AttributeValue::Int(0)));
    assert_eq!(s_edge.attributes.get("span-last"), Some(&AttributeValue::Int(2)));

    let b_edge = &g.edges[g.nodes[s_edge.tails[1]].edges[0]];
    assert_eq!(b_edge.features.get("lex"), 2.0);
    assert_eq!(b_edge.attributes.get("span-first"), Some(&AttributeValue::Int(1)));
  }

  #[test]
  fn test_tails_follow_indices() {
    let g = compose(
      r#"
        [S] ||| [A,2] [B,1] ||| [B,1] [A,2]
        [A] ||| a
        [B] ||| b
      "#,
      ParseOptions::default(),
      &"a b".parse().unwrap(),
    );

    let s_edge = g
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[S]"))
      .unwrap();
    assert_eq!(label(&g, s_edge.tails[0]), Symbol::new("[B]"));
    assert_eq!(label(&g, s_edge.tails[1]), Symbol::new("[A]"));
  }

  #[test]
  fn test_unary_cycle_terminates() {
    let g = compose(
      r#"
        [X] ||| a
        [Y] ||| [X,1]
        [X] ||| [Y,1]
        [S] ||| [X,1]
      "#,
      ParseOptions::default(),
      &"a".parse().unwrap(),
    );

    // [X] <- a, [S] <- [X], goal <- [S]; the leveled [Y]/[X] copies are
    // not reachable from the goal
    assert!(g.is_valid());
    assert_eq!(g.nodes.len(), 3);
    assert_eq!(g.edges.len(), 3);
  }

  #[test]
  fn test_unary_chain() {
    let g = compose(
      r#"
        [N] ||| dog
        [NP] ||| [N,1]
        [S] ||| [NP,1]
      "#,
      ParseOptions::default(),
      &"dog".parse().unwrap(),
    );

    assert!(g.is_valid());
    assert_eq!(g.nodes.len(), 4);
    assert_eq!(g.edges.len(), 4);
    for edge in g.edges.iter() {
      assert!(edge.tails.iter().all(|t| *t < edge.head));
    }
  }

  #[test]
  fn test_without_unary_rules() {
    let g = compose(
      r#"
        [S] ||| [A,1] [A,2]
        [A] ||| a
        [A] ||| [A,1] [A,2]
      "#,
      ParseOptions::default(),
      &"a a a".parse().unwrap(),
    );

    assert!(g.is_valid());
    let goal = g.goal.unwrap();
    for edge in g.edges.iter() {
      if edge.head != goal {
        assert_ne!(edge.tails.len(), 1);
      }
    }
    // [A] over the five proper sub-spans, [S] and the goal
    assert_eq!(g.nodes.len(), 7);
  }

  #[test]
  fn test_unary_closure_switched_off() {
    let without_closure: ParseOptions = "unary-stagnation=0".parse().unwrap();
    let lattice: Lattice = "a a a".parse().unwrap();

    let binary = "[S] ||| [A,1] [A,2]\n[A] ||| a\n[A] ||| [A,1] [A,2]";
    assert_eq!(
      compose(binary, without_closure.clone(), &lattice),
      compose(binary, ParseOptions::default(), &lattice)
    );

    let unary = "[S] ||| [B,1]\n[B] ||| [A,1]\n[A] ||| a a a";
    assert!(compose(unary, ParseOptions::default(), &lattice).is_valid());
    assert!(!compose(unary, without_closure, &lattice).is_valid());
  }

  #[test]
  fn test_treebank_mode() {
    let grammar = "[S] ||| a b";
    let lattice: Lattice = "a b".parse().unwrap();
    assert!(compose(grammar, ParseOptions::default(), &lattice).is_valid());
    assert!(!compose(grammar, ParseOptions::default().treebank(true), &lattice).is_valid());

    let grammar = "[S] ||| [A,1] [B,2]\n[A] ||| a\n[B] ||| b";
    assert!(compose(grammar, ParseOptions::default().treebank(true), &lattice).is_valid());
  }

  #[test]
  fn test_epsilon_arcs() {
    let lattice = Lattice::new(vec![
      vec![LatticeArc::new("a", 1)],
      vec![LatticeArc::new(Symbol::epsilon(), 1)],
      vec![LatticeArc::new("b", 1)],
    ])
    .unwrap();

    let g = compose("[S] ||| a b", ParseOptions::default(), &lattice);
    assert!(g.is_valid());
    assert_eq!(g.edges.len(), 2);
  }

  fn arc(label: impl Into<Symbol>, x: f64) -> LatticeArc {
    LatticeArc::new(label, 1).with_features([("x", x)].into_iter().collect())
  }

  #[test]
  fn test_arc_features() {
    let lattice = Lattice::new(vec![
      vec![arc("a", 1.0)],
      vec![arc(Symbol::epsilon(), 2.0)],
      vec![arc("b", 0.5), arc("c", 3.0)],
    ])
    .unwrap();

    let g = compose(
      r#"
        [S] ||| [X,1]
        [S] ||| [Y,1]
        [X] ||| a b ||| a b ||| r=1
        [Y] ||| a c
      "#,
      ParseOptions::default(),
      &lattice,
    );
    assert!(g.is_valid());

    let x = g
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[X]"))
      .unwrap();
    assert_eq!(x.features.get("x"), 3.5);
    assert_eq!(x.features.get("r"), 1.0);
    assert_eq!(x.attributes.get("span-last"), Some(&AttributeValue::Int(3)));

    let y = g
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[Y]"))
      .unwrap();
    assert_eq!(y.features.get("x"), 6.0);

    // unary edges carry only their rule's features
    for edge in g.edges.iter().filter(|e| e.tails.len() == 1) {
      assert_eq!(edge.features.get("x"), 0.0);
    }
  }

  #[test]
  fn test_rule_attributes_under_span() {
    let g = compose(
      r#"
        [S] ||| a ||| a ||| ||| origin="lexicon" span-last=7 p=0.25
      "#,
      ParseOptions::default(),
      &"a".parse().unwrap(),
    );

    let s = g
      .edges
      .iter()
      .find(|e| e.rule.as_ref().unwrap().lhs == Symbol::new("[S]"))
      .unwrap();
    assert_eq!(s.attributes.get("origin"), Some(&AttributeValue::Text("lexicon".into())));
    assert_eq!(s.attributes.get("p"), Some(&AttributeValue::Real(0.25)));
    assert_eq!(s.attributes.get("span-last"), Some(&AttributeValue::Int(1)));
  }

  #[test]
  fn test_multi_position_arc() {
    let lattice = Lattice::new(vec![
      vec![LatticeArc::new("new_york", 2), LatticeArc::new("new", 1)],
      vec![LatticeArc::new("york", 1)],
    ])
    .unwrap();

    let g = compose("[S] ||| new_york\n[S] ||| new york", ParseOptions::default(), &lattice);
    assert!(g.is_valid());
    // both readings end up at the same [S] node
    assert_eq!(g.nodes.len(), 2);
    assert_eq!(g.edges.len(), 3);
  }

  #[test]
  fn test_pos_mode() {
    let words: GrammarStatic = "[S] ||| the [NN,1]".parse().unwrap();
    let tags = "[NN] ||| dog|NN"
      .parse::<GrammarStatic>()
      .unwrap()
      .with_kind(TransducerKind::Pos);
    let grammar = Grammar::from(vec![
      Arc::new(words) as Arc<dyn Transducer>,
      Arc::new(tags) as Arc<dyn Transducer>,
    ]);
    let lattice: Lattice = "the|DT dog|NN".parse().unwrap();

    let g = ComposeCky::new(grammar.clone(), ParseOptions::default().pos_mode(true)).parse(&lattice);
    assert!(g.is_valid());

    let g = ComposeCky::new(grammar, ParseOptions::default()).parse(&lattice);
    assert!(!g.is_valid());
  }

  #[test]
  fn test_no_parse() {
    let g = compose("[S] ||| a b", ParseOptions::default(), &"a".parse().unwrap());
    assert!(!g.is_valid());
    assert!(g.nodes.is_empty());

    let g = compose("[S] ||| a", ParseOptions::default(), &Lattice::default());
    assert!(!g.is_valid());
  }

  struct PruneLabel(Symbol);

  impl Pruner for PruneLabel {
    fn prune_span(&self, _first: usize, _last: usize) -> bool {
      false
    }

    fn prune_label(&self, _first: usize, _last: usize, label: &Symbol) -> bool {
      *label == self.0
    }
  }

  #[test]
  fn test_pruned_label() {
    let grammar: GrammarStatic = "[S] ||| [A,1] b\n[A] ||| a".parse().unwrap();
    let mut parser = ComposeCky::new(grammar.into(), ParseOptions::default());
    let lattice: Lattice = "a b".parse().unwrap();

    assert!(parser.parse_pruned(&lattice, &PruneLabel("[B]".into())).is_valid());
    assert!(!parser.parse_pruned(&lattice, &PruneLabel("[A]".into())).is_valid());
    assert!(parser.parse(&lattice).is_valid());
  }
}
