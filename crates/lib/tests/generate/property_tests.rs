//! Properties every generated template holds.

use std::collections::HashSet;

use kubearm_lib::assembler::check_resource_references;
use kubearm_lib::expr::value_variable_references;
use kubearm_lib::graph::ResourceGraph;
use kubearm_lib::scripts::{BuiltinScripts, Script, StaticScripts};
use kubearm_lib::{GenerateError, derive_variables, generate};

use super::common::*;

// =============================================================================
// References
// =============================================================================

#[test]
fn no_dangling_variable_references() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    let dangling = t.variables.dangling_references().unwrap();
    assert!(dangling.is_empty(), "{}: {:?}", name, dangling);
  }
}

#[test]
fn resources_only_read_derived_variables() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    check_resource_references(&t.resources, &t.variables).unwrap_or_else(|e| panic!("{}: {}", name, e));

    for resource in &t.resources {
      for var in value_variable_references(&resource.to_json()).unwrap() {
        assert!(t.variables.contains(&var), "{}: {} reads missing {}", name, resource.name, var);
      }
    }
  }
}

#[test]
fn api_versions_come_from_variables() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    for resource in &t.resources {
      assert!(
        resource.api_version.starts_with("[variables('apiVersion"),
        "{}: {} has literal api version {}",
        name,
        resource.name,
        resource.api_version
      );
    }
  }
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn generation_is_deterministic() {
  for name in FIXTURES {
    let first = serde_json::to_string(&generate_fixture(name).to_arm_json()).unwrap();
    let second = serde_json::to_string(&generate_fixture(name).to_arm_json()).unwrap();
    assert_eq!(first, second, "{} differs between runs", name);
  }
}

#[test]
fn script_bodies_flow_into_cloud_init_files() {
  let model = fixture_model("single_master.json");
  let mut scripts = StaticScripts::new();
  scripts.insert(Script::ProvisionScript, "#!/bin/bash\necho custom\n");

  let custom = derive_variables(&model, &scripts).unwrap();
  let builtin = derive_variables(&model, &BuiltinScripts).unwrap();
  assert_ne!(
    custom.get("cloudInitFiles").unwrap()["provisionScript"],
    builtin.get("cloudInitFiles").unwrap()["provisionScript"]
  );
  assert_eq!(
    custom.get("cloudInitFiles").unwrap()["mountEtcdScript"],
    builtin.get("cloudInitFiles").unwrap()["mountEtcdScript"]
  );
}

// =============================================================================
// Etcd sizing
// =============================================================================

#[test]
fn etcd_arrays_have_five_slots_for_every_supported_count() {
  for name in ["single_master.json", "three_masters.json", "five_masters_storage_account.json"] {
    let t = generate_fixture(name);
    for key in [
      "masterVMNames",
      "masterPrivateIpAddrs",
      "masterEtcdPeerURLs",
      "masterEtcdClientURLs",
      "masterEtcdMetricURLs",
    ] {
      let slots = t.variables.get(key).unwrap().as_array().unwrap();
      assert_eq!(slots.len(), 5, "{}: {}", name, key);
    }
  }
}

#[test]
fn etcd_peer_credentials_match_master_count() {
  for (name, count) in [
    ("single_master.json", 1),
    ("three_masters.json", 3),
    ("five_masters_storage_account.json", 5),
  ] {
    let t = generate_fixture(name);
    let certs = t.variables.get("etcdPeerCertificates").unwrap().as_array().unwrap();
    let keys = t.variables.get("etcdPeerPrivateKeys").unwrap().as_array().unwrap();
    assert_eq!(certs.len(), count, "{}", name);
    assert_eq!(keys.len(), count, "{}", name);
    for (i, cert) in certs.iter().enumerate() {
      assert_eq!(cert, &serde_json::json!(format!("[parameters('etcdPeerCertificate{i}')]")));
    }
  }
}

#[test]
fn etcd_cluster_states_cover_one_three_five() {
  let t = generate_fixture("three_masters.json");
  let states = t.variables.get("masterEtcdClusterStates").unwrap().as_array().unwrap();
  assert_eq!(states.len(), 3);

  let members = |state: &serde_json::Value| state.as_str().unwrap().matches("masterEtcdPeerURLs").count();
  assert_eq!(members(&states[0]), 1);
  assert_eq!(members(&states[1]), 3);
  assert_eq!(members(&states[2]), 5);
}

#[test]
fn unsupported_master_counts_are_rejected() {
  for count in [0, 2, 4, 6] {
    let mut model = fixture_model("single_master.json");
    model.master.as_mut().unwrap().count = count;
    assert!(matches!(
      generate(&model, &BuiltinScripts),
      Err(GenerateError::UnsupportedMasterCount(c)) if c == count
    ));
  }
}

// =============================================================================
// Conditional variables
// =============================================================================

#[test]
fn exactly_one_primary_set_when_pools_exist() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    let availability = var_str(&t, "primaryAvailabilitySetName");
    let scale_set = var_str(&t, "primaryScaleSetName");
    assert!(
      availability.is_empty() != scale_set.is_empty(),
      "{}: availability set '{}' scale set '{}'",
      name,
      availability,
      scale_set
    );
  }
}

#[test]
fn no_primary_set_without_pools() {
  let mut model = fixture_model("single_master.json");
  model.agent_pools.clear();
  let t = generate(&model, &BuiltinScripts).unwrap();
  assert_eq!(var_str(&t, "primaryAvailabilitySetName"), "");
  assert_eq!(var_str(&t, "primaryScaleSetName"), "");
}

#[test]
fn key_vault_name_follows_kms() {
  let kms = generate_fixture("five_masters_storage_account.json");
  assert!(var_str(&kms, "clusterKeyVaultName").starts_with("[take(concat('kv'"));

  let plain = generate_fixture("single_master.json");
  assert_eq!(var_str(&plain, "clusterKeyVaultName"), "");
  assert!(of_type(&plain, KEY_VAULT).is_empty());
}

#[test]
fn storage_prefixes_follow_storage_account_disks() {
  let with_accounts = generate_fixture("five_masters_storage_account.json");
  let prefixes = with_accounts.variables.get("storageAccountPrefixes").unwrap().as_array().unwrap();
  assert!(!prefixes.is_empty());
  assert!(with_accounts.variables.contains("storageAccountPrefixesCount"));

  let managed = generate_fixture("single_master.json");
  let prefixes = managed.variables.get("storageAccountPrefixes").unwrap().as_array().unwrap();
  assert!(prefixes.is_empty());
  assert!(!managed.variables.contains("storageAccountPrefixesCount"));
}

// =============================================================================
// Dependency graph
// =============================================================================

#[test]
fn dependency_graph_is_acyclic_and_complete() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    let graph = ResourceGraph::build(&t.resources, &t.variables).unwrap_or_else(|e| panic!("{}: {}", name, e));
    let order = graph.topological_order().unwrap();
    assert_eq!(order.len(), t.resources.len(), "{}", name);

    let mut placed = HashSet::new();
    for index in order {
      for dep in graph.dependencies(index) {
        assert!(placed.contains(&dep), "{}: {} ordered before its dependency", name, t.resources[index].name);
      }
      placed.insert(index);
    }
  }
}

#[test]
fn generated_clusters_have_no_external_dependencies() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    let graph = ResourceGraph::build(&t.resources, &t.variables).unwrap();
    assert!(graph.external().is_empty(), "{}: {:?}", name, graph.external());
  }
}

#[test]
fn resource_identities_are_unique() {
  for name in FIXTURES {
    let t = generate_fixture(name);
    let mut seen = HashSet::new();
    for resource in &t.resources {
      assert!(
        seen.insert((resource.resource_type().to_string(), resource.name.clone())),
        "{}: duplicate {} {}",
        name,
        resource.resource_type(),
        resource.name
      );
    }
  }
}
