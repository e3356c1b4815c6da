//! Implementation of the `kubearm variables` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use kubearm_lib::derive_variables;

use crate::input::{load_model, load_scripts};
use crate::output::print_json;

/// Print the derived variable map, or the value of a single key.
///
/// String values asked for by key are printed bare so they can be used in
/// shell pipelines; anything else is printed as JSON.
pub fn cmd_variables(model_path: &Path, key: Option<&str>, scripts_dir: Option<&Path>) -> Result<()> {
  let model = load_model(model_path)?;
  let scripts = load_scripts(scripts_dir)?;

  let vars =
    derive_variables(&model, &scripts).with_context(|| format!("Failed to derive variables for {}", model_path.display()))?;

  let Some(key) = key else {
    return print_json(&vars);
  };

  match vars.get(key) {
    Some(serde_json::Value::String(value)) => {
      println!("{}", value);
      Ok(())
    }
    Some(value) => print_json(value),
    None => bail!("Variable not found: {}", key),
  }
}
