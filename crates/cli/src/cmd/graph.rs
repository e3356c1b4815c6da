//! Implementation of the `kubearm graph` command.
//!
//! Lists the generated resources in deployment order, each with the
//! resources it waits on, followed by dependencies that point outside the
//! template.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use kubearm_lib::generate;
use kubearm_lib::graph::ResourceGraph;
use kubearm_lib::scripts::BuiltinScripts;

use crate::input::load_model;
use crate::output::{OutputFormat, print_json, print_stat, print_warning, symbols};

pub fn cmd_graph(model_path: &Path, format: OutputFormat) -> Result<()> {
  let model = load_model(model_path)?;

  // Script bodies never influence dependencies.
  let template =
    generate(&model, &BuiltinScripts).with_context(|| format!("Failed to generate template for {}", model_path.display()))?;
  let graph = ResourceGraph::build(&template.resources, &template.variables).context("Failed to build resource graph")?;
  let order = graph.topological_order().context("Failed to order resources")?;

  let label = |index: usize| {
    let resource = &template.resources[index];
    (resource.resource_type().to_string(), resource.name.clone())
  };

  if format.is_json() {
    let ordered: Vec<_> = order
      .iter()
      .map(|&index| {
        let (resource_type, name) = label(index);
        let depends_on: Vec<_> = graph
          .dependencies(index)
          .into_iter()
          .map(|dep| {
            let (dep_type, dep_name) = label(dep);
            json!({ "type": dep_type, "name": dep_name })
          })
          .collect();
        json!({ "type": resource_type, "name": name, "dependsOn": depends_on })
      })
      .collect();
    let external: Vec<_> = graph
      .external()
      .iter()
      .map(|ext| json!({ "resource": label(ext.resource).1, "dependency": ext.dependency }))
      .collect();
    return print_json(&json!({ "order": ordered, "external": external }));
  }

  print_stat("Resources", &graph.len().to_string());
  print_stat("Edges", &graph.edge_count().to_string());
  println!();
  for (position, &index) in order.iter().enumerate() {
    let (resource_type, name) = label(index);
    println!("{:>3}. {} {}", position + 1, resource_type, name);
    for dep in graph.dependencies(index) {
      let (dep_type, dep_name) = label(dep);
      println!("       {} {} {}", symbols::ARROW, dep_type, dep_name);
    }
  }

  if !graph.external().is_empty() {
    println!();
    for ext in graph.external() {
      print_warning(&format!("{} depends on external {}", label(ext.resource).1, ext.dependency));
    }
  }

  Ok(())
}
