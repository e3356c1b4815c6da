//! Script content collaborator.
//!
//! Provisioning script bodies and custom data payloads are produced outside
//! the generator. The generator only asks for them by name and embeds what
//! comes back, base64-encoding where the consuming field requires it.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::scripts::{BuiltinScripts, Script, ScriptProvider};
//!
//! let body = BuiltinScripts.script(Script::ProvisionScript);
//! assert!(body.starts_with("#!/bin/bash"));
//! ```

use std::collections::BTreeMap;

/// A named script the generator embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Script {
  // Cloud-init files carried in the `cloudInitFiles` variable.
  ProvisionScript,
  ProvisionSource,
  ProvisionInstalls,
  ProvisionConfigs,
  CustomSearchDomains,
  GenerateProxyCerts,
  MountEtcd,
  EtcdSystemdService,
  Dhcpv6SystemdService,
  Dhcpv6Configuration,
  KubeletSystemdService,
  /// Provisioning overrides for custom clouds.
  CustomCloudConfigs,
  // Custom data payloads.
  MasterCustomData,
  AgentCustomData,
  WindowsAgentCustomData,
  JumpboxCustomData,
}

impl Script {
  pub const ALL: [Script; 16] = [
    Script::ProvisionScript,
    Script::ProvisionSource,
    Script::ProvisionInstalls,
    Script::ProvisionConfigs,
    Script::CustomSearchDomains,
    Script::GenerateProxyCerts,
    Script::MountEtcd,
    Script::EtcdSystemdService,
    Script::Dhcpv6SystemdService,
    Script::Dhcpv6Configuration,
    Script::KubeletSystemdService,
    Script::CustomCloudConfigs,
    Script::MasterCustomData,
    Script::AgentCustomData,
    Script::WindowsAgentCustomData,
    Script::JumpboxCustomData,
  ];

  /// File name used when scripts are loaded from a directory.
  pub fn file_name(self) -> &'static str {
    match self {
      Script::ProvisionScript => "cse_main.sh",
      Script::ProvisionSource => "cse_helpers.sh",
      Script::ProvisionInstalls => "cse_install.sh",
      Script::ProvisionConfigs => "cse_config.sh",
      Script::CustomSearchDomains => "setup-custom-search-domains.sh",
      Script::GenerateProxyCerts => "generateproxycerts.sh",
      Script::MountEtcd => "mountetcd.sh",
      Script::EtcdSystemdService => "etcd.service",
      Script::Dhcpv6SystemdService => "dhcpv6.service",
      Script::Dhcpv6Configuration => "enable-dhcpv6.sh",
      Script::KubeletSystemdService => "kubelet.service",
      Script::CustomCloudConfigs => "cse_customcloud.sh",
      Script::MasterCustomData => "master-customdata.yml",
      Script::AgentCustomData => "node-customdata.yml",
      Script::WindowsAgentCustomData => "windows-customdata.ps1",
      Script::JumpboxCustomData => "jumpbox-customdata.yml",
    }
  }

  /// Key of this script inside the `cloudInitFiles` variable, if it lives there.
  pub fn cloud_init_key(self) -> Option<&'static str> {
    match self {
      Script::ProvisionScript => Some("provisionScript"),
      Script::ProvisionSource => Some("provisionSource"),
      Script::ProvisionInstalls => Some("provisionInstalls"),
      Script::ProvisionConfigs => Some("provisionConfigs"),
      Script::CustomSearchDomains => Some("customSearchDomainsScript"),
      Script::GenerateProxyCerts => Some("generateProxyCertsScript"),
      Script::MountEtcd => Some("mountEtcdScript"),
      Script::EtcdSystemdService => Some("etcdSystemdService"),
      Script::Dhcpv6SystemdService => Some("dhcpv6SystemdService"),
      Script::Dhcpv6Configuration => Some("dhcpv6ConfigurationScript"),
      Script::KubeletSystemdService => Some("kubeletSystemdService"),
      _ => None,
    }
  }
}

/// Source of script bodies.
///
/// Implementations must be deterministic: the same script always yields
/// the same content within one generation.
pub trait ScriptProvider {
  fn script(&self, script: Script) -> String;
}

impl<F> ScriptProvider for F
where
  F: Fn(Script) -> String,
{
  fn script(&self, script: Script) -> String {
    self(script)
  }
}

/// Placeholder bodies naming the file they stand in for.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinScripts;

impl ScriptProvider for BuiltinScripts {
  fn script(&self, script: Script) -> String {
    let name = script.file_name();
    if name.ends_with(".yml") {
      format!("#cloud-config\n# {name}\n")
    } else if name.ends_with(".ps1") {
      format!("# {name}\n")
    } else if name.ends_with(".service") {
      format!("[Unit]\nDescription={name}\n")
    } else {
      format!("#!/bin/bash\n# {name}\n")
    }
  }
}

/// Scripts supplied up front, falling back to the built-in placeholders.
#[derive(Debug, Clone, Default)]
pub struct StaticScripts {
  bodies: BTreeMap<Script, String>,
}

impl StaticScripts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, script: Script, body: impl Into<String>) {
    self.bodies.insert(script, body.into());
  }

  pub fn len(&self) -> usize {
    self.bodies.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bodies.is_empty()
  }
}

impl ScriptProvider for StaticScripts {
  fn script(&self, script: Script) -> String {
    self
      .bodies
      .get(&script)
      .cloned()
      .unwrap_or_else(|| BuiltinScripts.script(script))
  }
}
