//! Dependency graph over the assembled resources.
//!
//! Every `dependsOn` entry is an expression naming another resource. This
//! module resolves those expressions back to nodes so the resource list can
//! be checked for cycles and ordered. Three shapes resolve:
//!
//! - `[concat('<type>/', name args...)]` and `[resourceId('<type>', name args...)]`
//!   match a node of that type whose name has the same arguments;
//! - `[variables('X')]` matches a node named `[variables('X')]`, or else
//!   whatever the value of `X` resolves to;
//! - a plain string matches a node with that literal name.
//!
//! Arguments containing `copyIndex` are loop-relative, so any two of them
//! match each other. Whatever does not resolve is an external dependency:
//! something the deployment expects to exist already.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::graph::ResourceGraph;
//! use kubearm_lib::resources::{ResourceKind, ResourceNode};
//! use kubearm_lib::variables::VariableMap;
//!
//! let nsg = ResourceNode::new(ResourceKind::NetworkSecurityGroup, "[variables('nsgName')]");
//! let vnet = ResourceNode::new(ResourceKind::VirtualNetwork, "[variables('virtualNetworkName')]")
//!   .depends_on("[concat('Microsoft.Network/networkSecurityGroups/', variables('nsgName'))]");
//!
//! let nodes = vec![vnet, nsg];
//! let graph = ResourceGraph::build(&nodes, &VariableMap::new()).unwrap();
//! assert_eq!(graph.topological_order().unwrap(), vec![1, 0]);
//! assert!(graph.external().is_empty());
//! ```

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::expr::{self, parse_call, strip_brackets, unquote};
use crate::resources::ResourceNode;
use crate::variables::VariableMap;

/// How deep `variables('X')` indirections are followed.
const MAX_INDIRECTION: usize = 8;

/// Errors that can occur while building the resource graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// Resources depend on each other in a loop.
  #[error("dependency cycle through {resource_type} '{name}'")]
  CycleDetected { resource_type: String, name: String },

  /// Two resources share a type and name.
  #[error("duplicate resource {resource_type} '{name}'")]
  DuplicateResource { resource_type: String, name: String },
}

/// A `dependsOn` entry that names nothing in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDependency {
  /// Index of the depending resource.
  pub resource: usize,
  pub dependency: String,
}

/// Identity of a resource for matching: lowercased type plus canonical
/// name arguments.
#[derive(Debug, Clone)]
struct ResourceKey {
  resource_type: String,
  args: Vec<String>,
}

impl ResourceKey {
  fn matches(&self, resource_type: &str, args: &[String]) -> bool {
    self.resource_type == resource_type
      && self.args.len() == args.len()
      && self.args.iter().zip(args).all(|(a, b)| args_match(a, b))
  }
}

fn args_match(a: &str, b: &str) -> bool {
  a == b || (a.contains("copyIndex(") && b.contains("copyIndex("))
}

/// Merge adjacent quoted literals so `'a', 'b'` and `'ab'` compare equal.
fn merge_literals(args: Vec<String>) -> Vec<String> {
  let mut merged: Vec<String> = Vec::with_capacity(args.len());
  for arg in args {
    if let Some(text) = unquote(&arg)
      && let Some(previous) = merged.last_mut()
      && let Some(previous_text) = unquote(previous)
    {
      *previous = expr::literal(&format!("{previous_text}{text}"));
      continue;
    }
    if unquote(&arg).is_some_and(|text| text.is_empty()) {
      continue;
    }
    merged.push(arg);
  }
  merged
}

/// Canonical name arguments of a resource name.
fn name_args(name: &str) -> Vec<String> {
  match strip_brackets(name) {
    Some(inner) => match parse_call(inner) {
      Some(call) if call.name == "concat" => merge_literals(call.args),
      _ => vec![expr::normalize(inner)],
    },
    None => vec![expr::literal(name)],
  }
}

/// The dependency graph. Node indices are positions in the slice it was
/// built from.
pub struct ResourceGraph {
  graph: DiGraph<usize, ()>,
  labels: Vec<(String, String)>,
  external: Vec<ExternalDependency>,
}

impl ResourceGraph {
  /// Resolve every dependency of `nodes` and check the result is acyclic.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateResource` when two nodes share a type and name, and
  /// `CycleDetected` when the dependencies loop.
  pub fn build(nodes: &[ResourceNode], vars: &VariableMap) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    let keys: Vec<ResourceKey> = nodes
      .iter()
      .map(|node| ResourceKey {
        resource_type: node.resource_type().to_ascii_lowercase(),
        args: name_args(&node.name),
      })
      .collect();

    let mut seen = HashSet::new();
    for node in nodes {
      let identity = (node.resource_type().to_ascii_lowercase(), expr::normalize(&node.name));
      if !seen.insert(identity) {
        return Err(GraphError::DuplicateResource {
          resource_type: node.resource_type().to_string(),
          name: node.name.clone(),
        });
      }
    }

    let resolver = Resolver { nodes, keys: &keys, vars };
    let mut external = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
      for dependency in &node.depends_on {
        let targets = resolver.resolve(dependency, 0);
        if targets.is_empty() {
          warn!(resource = %node.name, dependency = %dependency, "dependency not declared in template");
          external.push(ExternalDependency {
            resource: i,
            dependency: dependency.clone(),
          });
        }
        for target in targets {
          if !graph.contains_edge(indices[target], indices[i]) {
            graph.add_edge(indices[target], indices[i], ());
          }
        }
      }
    }

    let labels = nodes
      .iter()
      .map(|node| (node.resource_type().to_string(), node.name.clone()))
      .collect();
    let resource_graph = Self {
      graph,
      labels,
      external,
    };
    resource_graph.topological_order()?;
    Ok(resource_graph)
  }

  /// Resource indices with every dependency before its dependents.
  pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| {
      let (resource_type, name) = self.labels[self.graph[cycle.node_id()]].clone();
      GraphError::CycleDetected { resource_type, name }
    })?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
  }

  /// Resolved dependencies of the resource at `index`, in index order.
  pub fn dependencies(&self, index: usize) -> Vec<usize> {
    if index >= self.graph.node_count() {
      return Vec::new();
    }
    let idx = NodeIndex::new(index);
    let mut deps: Vec<usize> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep])
      .collect();
    deps.sort_unstable();
    deps
  }

  /// Dependencies that resolve to nothing in the template.
  pub fn external(&self) -> &[ExternalDependency] {
    &self.external
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }
}

struct Resolver<'a> {
  nodes: &'a [ResourceNode],
  keys: &'a [ResourceKey],
  vars: &'a VariableMap,
}

impl Resolver<'_> {
  /// Indices of the nodes a dependency expression names.
  fn resolve(&self, dependency: &str, depth: usize) -> Vec<usize> {
    let Some(inner) = strip_brackets(dependency) else {
      return self.by_name(dependency);
    };
    let Some(call) = parse_call(inner) else {
      return Vec::new();
    };
    match call.name.as_str() {
      "concat" | "resourceId" => self.by_type(call.args),
      "variables" => {
        let by_name = self.by_name(dependency);
        if !by_name.is_empty() || depth >= MAX_INDIRECTION {
          return by_name;
        }
        let target = call
          .args
          .first()
          .and_then(|arg| unquote(arg))
          .and_then(|name| self.vars.get(&name))
          .and_then(Value::as_str);
        match target {
          Some(value) if expr::is_expression(value) => self.resolve(value, depth + 1),
          _ => Vec::new(),
        }
      }
      _ => Vec::new(),
    }
  }

  /// Match `'<type>/...', args...`, preferring the longest known type.
  fn by_type(&self, args: Vec<String>) -> Vec<usize> {
    let Some(first) = args.first().and_then(|arg| unquote(arg)) else {
      return Vec::new();
    };
    let lowered = first.to_ascii_lowercase();
    let resource_type = self
      .keys
      .iter()
      .map(|key| key.resource_type.as_str())
      .filter(|t| lowered == *t || lowered.strip_prefix(*t).is_some_and(|rest| rest.starts_with('/')))
      .max_by_key(|t| t.len());
    let Some(resource_type) = resource_type else {
      return Vec::new();
    };

    let remainder = first.get(resource_type.len()..).unwrap_or("").trim_start_matches('/');
    let mut name = vec![expr::literal(remainder)];
    name.extend(args.into_iter().skip(1));
    let name = merge_literals(name);

    (0..self.keys.len())
      .filter(|&i| self.keys[i].matches(resource_type, &name))
      .collect()
  }

  fn by_name(&self, name: &str) -> Vec<usize> {
    let name = expr::normalize(name);
    (0..self.nodes.len())
      .filter(|&i| expr::normalize(&self.nodes[i].name) == name)
      .collect()
  }
}
