//! Implementation of the `kubearm generate` command.
//!
//! Reads a cluster model, generates its deployment template and writes the
//! rendered document to a file or stdout.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use kubearm_lib::generate;

use crate::input::{load_model, load_scripts};
use crate::output::{OutputFormat, print_stat, print_success, to_pretty_json};

/// Execute the generate command.
///
/// With `--output` the template always goes to the file; stdout then gets
/// a summary in text format, or nothing in JSON format. Without it, JSON
/// format prints the template and text format prints the summary.
pub fn cmd_generate(model_path: &Path, output: Option<&Path>, format: OutputFormat, scripts_dir: Option<&Path>) -> Result<()> {
  let model = load_model(model_path)?;
  let scripts = load_scripts(scripts_dir)?;

  let template = generate(&model, &scripts).with_context(|| format!("Failed to generate template for {}", model_path.display()))?;
  let rendered = to_pretty_json(&template.to_arm_json())?;

  if let Some(path) = output {
    fs::write(path, format!("{}\n", rendered)).with_context(|| format!("Failed to write template: {}", path.display()))?;
    info!(path = %path.display(), bytes = rendered.len(), "template written");
  } else if format.is_json() {
    println!("{}", rendered);
  }

  if !format.is_json() {
    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for resource in &template.resources {
      *kinds.entry(resource.kind.label()).or_default() += 1;
    }

    match output {
      Some(path) => print_success(&format!("Template written to {}", path.display())),
      None => print_success("Template generated"),
    }
    print_stat("Variables", &template.variables.len().to_string());
    print_stat("Resources", &template.resources.len().to_string());
    for (kind, count) in kinds {
      println!("    {}: {}", kind, count);
    }
  }

  Ok(())
}
