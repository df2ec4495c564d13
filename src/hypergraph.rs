use std::fmt;
use std::sync::Arc;

use num_traits::{One, Zero};

use crate::feature::{AttributeVector, FeatureVector};
use crate::rules::Rule;
use crate::weight::WeightFunction;

pub type NodeId = usize;
pub type EdgeId = usize;

/// Head of an edge that was never connected
pub const NO_NODE: NodeId = NodeId::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub id: NodeId,
  /// incoming edges
  pub edges: Vec<EdgeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
  pub id: EdgeId,
  pub head: NodeId,
  pub tails: Vec<NodeId>,
  pub rule: Option<Arc<Rule>>,
  pub features: FeatureVector,
  pub attributes: AttributeVector,
}

/// A derivation forest. Valid when it has a goal node; after
/// `topologically_sort` tails always precede their heads and every node is
/// reachable from the goal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HyperGraph {
  pub nodes: Vec<Node>,
  pub edges: Vec<Edge>,
  pub goal: Option<NodeId>,
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
  Unvisited,
  Visiting,
  Done,
}

impl HyperGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.edges.clear();
    self.goal = None;
  }

  pub fn is_valid(&self) -> bool {
    self.goal.is_some()
  }

  pub fn add_node(&mut self) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(Node {
      id,
      edges: Vec::new(),
    });
    id
  }

  pub fn add_edge(&mut self, tails: Vec<NodeId>) -> &mut Edge {
    let id = self.edges.len();
    self.edges.push(Edge {
      id,
      head: NO_NODE,
      tails,
      rule: None,
      features: FeatureVector::new(),
      attributes: AttributeVector::new(),
    });
    &mut self.edges[id]
  }

  pub fn connect_edge(&mut self, edge: EdgeId, head: NodeId) {
    self.edges[edge].head = head;
    self.nodes[head].edges.push(edge);
  }

  /// Renumbers nodes and edges so tails come before heads and the goal is
  /// last, dropping everything that does not contribute to a derivation of
  /// the goal. Edges closing a cycle are dropped too.
  pub fn topologically_sort(&mut self) {
    let Some(goal) = self.goal else {
      self.clear();
      return;
    };

    let mut visit = vec![Visit::Unvisited; self.nodes.len()];
    let mut cyclic = vec![false; self.edges.len()];
    let mut order = Vec::with_capacity(self.nodes.len());

    // (node, incoming edge position, tail position)
    let mut stack = vec![(goal, 0, 0)];
    visit[goal] = Visit::Visiting;
    while let Some(frame) = stack.last_mut() {
      let (node, edge_pos, tail_pos) = *frame;
      if edge_pos == self.nodes[node].edges.len() {
        visit[node] = Visit::Done;
        order.push(node);
        stack.pop();
        continue;
      }

      let edge = self.nodes[node].edges[edge_pos];
      if tail_pos == self.edges[edge].tails.len() {
        frame.1 += 1;
        frame.2 = 0;
        continue;
      }
      frame.2 += 1;

      let tail = self.edges[edge].tails[tail_pos];
      match visit[tail] {
        Visit::Unvisited => {
          visit[tail] = Visit::Visiting;
          stack.push((tail, 0, 0));
        }
        Visit::Visiting => cyclic[edge] = true,
        Visit::Done => {}
      }
    }

    // bottom-up: a node survives when one of its edges has surviving tails
    let mut derivable = vec![false; self.nodes.len()];
    let mut keep_edge = vec![false; self.edges.len()];
    for &node in order.iter() {
      for &edge in self.nodes[node].edges.iter() {
        if !cyclic[edge] && self.edges[edge].tails.iter().all(|t| derivable[*t]) {
          keep_edge[edge] = true;
          derivable[node] = true;
        }
      }
    }

    if !derivable[goal] {
      self.clear();
      return;
    }

    // top-down: keep only what the goal still reaches
    let mut reachable = vec![false; self.nodes.len()];
    reachable[goal] = true;
    for &node in order.iter().rev() {
      if !reachable[node] {
        continue;
      }
      for &edge in self.nodes[node].edges.iter() {
        if keep_edge[edge] {
          for &tail in self.edges[edge].tails.iter() {
            reachable[tail] = true;
          }
        }
      }
    }

    let mut node_map = vec![NO_NODE; self.nodes.len()];
    let mut nodes = Vec::new();
    for &node in order.iter() {
      if reachable[node] {
        node_map[node] = nodes.len();
        nodes.push(Node {
          id: nodes.len(),
          edges: Vec::new(),
        });
      }
    }

    let mut old_edges = std::mem::take(&mut self.edges)
      .into_iter()
      .map(Some)
      .collect::<Vec<_>>();
    let mut edges = Vec::new();
    for &node in order.iter() {
      if !reachable[node] {
        continue;
      }
      for &edge in self.nodes[node].edges.iter() {
        if !keep_edge[edge] {
          continue;
        }
        if let Some(mut e) = old_edges[edge].take() {
          e.id = edges.len();
          e.head = node_map[node];
          e.tails.iter_mut().for_each(|t| *t = node_map[*t]);
          nodes[e.head].edges.push(e.id);
          edges.push(e);
        }
      }
    }

    self.goal = Some(node_map[goal]);
    self.nodes = nodes;
    self.edges = edges;
  }

  /// Combined score of all derivations of the goal. Expects a sorted graph.
  pub fn inside<F: WeightFunction>(&self, function: &F) -> F::Score {
    let Some(goal) = self.goal else {
      return F::Score::zero();
    };

    let mut inside = vec![F::Score::zero(); self.nodes.len()];
    for node in self.nodes.iter() {
      let mut score = F::Score::zero();
      for &edge in node.edges.iter() {
        let edge = &self.edges[edge];
        let tails = edge
          .tails
          .iter()
          .fold(F::Score::one(), |acc, t| acc * inside[*t]);
        score = score + function.apply(&edge.features) * tails;
      }
      inside[node.id] = score;
    }

    inside[goal]
  }
}

impl fmt::Display for HyperGraph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.goal {
      Some(goal) => writeln!(f, "goal: {}", goal)?,
      None => return writeln!(f, "goal: none"),
    }
    for edge in self.edges.iter() {
      write!(f, "  {} <-", edge.head)?;
      for tail in edge.tails.iter() {
        write!(f, " {}", tail)?;
      }
      if let Some(rule) = &edge.rule {
        write!(f, " ||| {}", rule)?;
      }
      if !edge.features.is_empty() {
        write!(f, " ||| {}", edge.features)?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}
