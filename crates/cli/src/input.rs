//! Loading of command inputs: the cluster model and script bodies.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use kubearm_lib::ClusterModel;
use kubearm_lib::scripts::{Script, StaticScripts};

/// Read a cluster model, choosing the parser from the file extension.
pub fn load_model(path: &Path) -> Result<ClusterModel> {
  let content = fs::read_to_string(path).with_context(|| format!("Failed to read model: {}", path.display()))?;

  let is_yaml = path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

  let model = if is_yaml {
    ClusterModel::from_yaml(&content)
  } else {
    ClusterModel::from_json(&content)
  };
  model.with_context(|| format!("Failed to parse model: {}", path.display()))
}

/// Collect script bodies from `dir`.
///
/// Files are looked up by their well-known names; missing ones fall back to
/// the built-in placeholders.
pub fn load_scripts(dir: Option<&Path>) -> Result<StaticScripts> {
  let mut scripts = StaticScripts::new();
  let Some(dir) = dir else {
    return Ok(scripts);
  };

  if !dir.is_dir() {
    anyhow::bail!("Scripts directory not found: {}", dir.display());
  }

  for script in Script::ALL {
    let path = dir.join(script.file_name());
    if !path.is_file() {
      continue;
    }
    let body = fs::read_to_string(&path).with_context(|| format!("Failed to read script: {}", path.display()))?;
    debug!(file = script.file_name(), bytes = body.len(), "loaded script");
    scripts.insert(script, body);
  }

  debug!(dir = %dir.display(), count = scripts.len(), "scripts loaded");
  Ok(scripts)
}

#[cfg(test)]
mod tests {
  use super::*;
  use kubearm_lib::scripts::ScriptProvider;
  use tempfile::TempDir;

  const MODEL_JSON: &str = r#"{
    "clusterId": "12345678",
    "orchestrator": { "version": "1.18.8" },
    "master": { "count": 1, "dnsPrefix": "mycluster" },
    "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }]
  }"#;

  const MODEL_YAML: &str = r#"
clusterId: "12345678"
orchestrator:
  version: "1.18.8"
master:
  count: 1
  dnsPrefix: mycluster
agentPools:
  - name: agentpool1
    vmSize: Standard_D2_v3
"#;

  #[test]
  fn loads_json_and_yaml_models() {
    let temp = TempDir::new().unwrap();
    let json_path = temp.path().join("cluster.json");
    let yaml_path = temp.path().join("cluster.yaml");
    fs::write(&json_path, MODEL_JSON).unwrap();
    fs::write(&yaml_path, MODEL_YAML).unwrap();

    let from_json = load_model(&json_path).unwrap();
    let from_yaml = load_model(&yaml_path).unwrap();
    assert_eq!(from_json.dns_prefix(), "mycluster");
    assert_eq!(from_yaml.dns_prefix(), "mycluster");
  }

  #[test]
  fn missing_model_names_the_path() {
    let err = load_model(Path::new("/nonexistent/cluster.json")).unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/cluster.json"));
  }

  #[test]
  fn scripts_dir_overrides_known_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("cse_main.sh"), "#!/bin/bash\necho provision\n").unwrap();
    fs::write(temp.path().join("unrelated.txt"), "ignored").unwrap();

    let scripts = load_scripts(Some(temp.path())).unwrap();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts.script(Script::ProvisionScript), "#!/bin/bash\necho provision\n");
    assert!(scripts.script(Script::MountEtcd).contains("mountetcd.sh"));
  }

  #[test]
  fn missing_scripts_dir_is_an_error() {
    assert!(load_scripts(Some(Path::new("/nonexistent/scripts"))).is_err());
    assert!(load_scripts(None).unwrap().is_empty());
  }
}
