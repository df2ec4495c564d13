use std::sync::Arc;

use crate::feature::FeatureVector;
use crate::hypergraph::{Edge, EdgeId, HyperGraph, NodeId};
use crate::rules::Rule;
use crate::symbol::Symbol;
use crate::utils::combinations;

/// Merges the nodes a binarized grammar introduced (`[X^]` labels) back into
/// their parents.
///
/// Every edge with binarized tails is replaced by one edge per combination
/// of the binarized tails' incoming edges, each inlining those edges' right
/// hand sides, tails and features. Nodes are visited bottom-up, so nested
/// binarizations collapse in one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Debinarize;

impl Debinarize {
  pub fn apply(&self, source: &HyperGraph) -> HyperGraph {
    if !source.is_valid() {
      return HyperGraph::new();
    }

    let mut target = source.clone();
    let mut removed = vec![false; target.edges.len()];
    let binarized = target
      .nodes
      .iter()
      .map(|node| {
        node
          .edges
          .first()
          .and_then(|e| target.edges[*e].rule.as_ref())
          .is_some_and(|rule| rule.lhs.binarized())
      })
      .collect::<Vec<_>>();

    for node in 0..target.nodes.len() {
      let incoming = target.nodes[node].edges.clone();
      for edge_id in incoming {
        if !target.edges[edge_id].tails.iter().any(|t| binarized[*t]) {
          continue;
        }
        let edge = target.edges[edge_id].clone();
        let Some(rule) = edge.rule.as_ref() else {
          continue;
        };
        removed[edge_id] = true;

        let choices = edge
          .tails
          .iter()
          .map(|tail| {
            if binarized[*tail] {
              target.nodes[*tail].edges.iter().copied().map(Some).collect()
            } else {
              vec![None]
            }
          })
          .collect::<Vec<Vec<Option<EdgeId>>>>();

        for choice in combinations(&choices) {
          if choice.iter().flatten().any(|e| removed[*e]) {
            continue;
          }
          let Some((rhs, tails, features)) = merge(&target, &edge, rule, &choice) else {
            continue;
          };

          let merged = target.add_edge(tails);
          merged.rule = Some(Arc::new(Rule::new(rule.lhs.clone(), rhs)));
          merged.features = features;
          merged.attributes = edge.attributes.clone();
          let merged = merged.id;
          removed.push(false);
          target.connect_edge(merged, node);
        }
      }
    }

    for node in target.nodes.iter_mut() {
      node.edges.retain(|e| !removed[*e]);
    }
    target.topologically_sort();
    target
  }
}

type Merged = (Vec<Symbol>, Vec<NodeId>, FeatureVector);

/// Right hand side, tails and features of `edge` with the antecedent edges
/// picked by `choice` inlined. Indices are dropped from the merged rule, its
/// tails follow the order of its non-terminals.
fn merge(graph: &HyperGraph, edge: &Edge, rule: &Rule, choice: &[Option<EdgeId>]) -> Option<Merged> {
  let mut rhs = Vec::with_capacity(rule.rhs.len());
  let mut tails = Vec::with_capacity(edge.tails.len());
  let mut features = edge.features.clone();

  let positions = rule.tail_positions();
  let mut non_terminals = positions.iter();
  for symbol in rule.rhs.iter() {
    if !symbol.is_non_terminal() {
      rhs.push(symbol.clone());
      continue;
    }

    let position = *non_terminals.next()?;
    match choice.get(position)? {
      Some(antecedent) => {
        let antecedent = &graph.edges[*antecedent];
        let inner = antecedent.rule.as_ref()?;
        let inner_positions = inner.tail_positions();
        let mut inner_non_terminals = inner_positions.iter();
        for symbol in inner.rhs.iter() {
          if symbol.is_non_terminal() {
            rhs.push(symbol.non_terminal());
            tails.push(*antecedent.tails.get(*inner_non_terminals.next()?)?);
          } else {
            rhs.push(symbol.clone());
          }
        }
        features += &antecedent.features;
      }
      None => {
        rhs.push(symbol.non_terminal());
        tails.push(*edge.tails.get(position)?);
      }
    }
  }

  Some((rhs, tails, features))
}
