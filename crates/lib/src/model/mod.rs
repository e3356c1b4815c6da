//! The cluster model consumed by the generator.
//!
//! The model is owned and validated upstream; this module only describes its
//! shape and exposes the small predicates the deriver and builders branch on.

mod types;

pub use types::*;

use thiserror::Error;

/// Appended to the hyperkube image on Azure Stack.
pub const AZURE_STACK_SUFFIX: &str = "-azs";

/// Errors that can occur while parsing a cluster model document.
#[derive(Debug, Error)]
pub enum ModelError {
  #[error("invalid JSON cluster model: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid YAML cluster model: {0}")]
  Yaml(#[from] serde_yaml::Error),
}

impl ClusterModel {
  /// Parse a model from a JSON document.
  pub fn from_json(input: &str) -> Result<Self, ModelError> {
    Ok(serde_json::from_str(input)?)
  }

  /// Parse a model from a YAML document.
  pub fn from_yaml(input: &str) -> Result<Self, ModelError> {
    Ok(serde_yaml::from_str(input)?)
  }

  pub fn is_hosted_master(&self) -> bool {
    self.hosted_master.is_some()
  }

  /// DNS prefix of whichever control plane is configured.
  pub fn dns_prefix(&self) -> &str {
    match (&self.master, &self.hosted_master) {
      (Some(master), _) => &master.dns_prefix,
      (None, Some(hosted)) => &hosted.dns_prefix,
      (None, None) => "",
    }
  }

  pub fn has_windows(&self) -> bool {
    self.agent_pools.iter().any(AgentPoolProfile::is_windows)
  }

  pub fn has_windows_custom_image(&self) -> bool {
    self
      .windows
      .as_ref()
      .is_some_and(|w| w.image_source_url.as_deref().is_some_and(|url| !url.is_empty()))
  }

  pub fn any_pool_is_scale_set(&self) -> bool {
    self.agent_pools.iter().any(AgentPoolProfile::is_scale_set)
  }

  pub fn is_custom_cloud(&self) -> bool {
    self.custom_cloud.is_some()
  }

  /// A custom cloud with no environment name (or the Azure Stack name) is Azure Stack.
  pub fn is_azure_stack(&self) -> bool {
    self.custom_cloud.as_ref().is_some_and(|cloud| {
      let name = cloud
        .environment
        .as_ref()
        .and_then(|env| env.get("name"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
      name.is_empty() || name.eq_ignore_ascii_case("AzureStackCloud")
    })
  }

  /// Hyperkube image the nodes pull; Azure Stack uses its own build.
  pub fn hyperkube_spec(&self) -> String {
    let orchestrator = &self.orchestrator;
    if let Some(custom) = orchestrator.custom_hyperkube_image.as_deref()
      && !custom.is_empty()
    {
      return custom.to_string();
    }
    if self.is_azure_stack() {
      format!("{}{}", orchestrator.hyperkube_image, AZURE_STACK_SUFFIX)
    } else {
      orchestrator.hyperkube_image.clone()
    }
  }

  pub fn is_ipv6_enabled(&self) -> bool {
    self.feature_flags.enable_ipv6_only || self.feature_flags.enable_ipv6_dual_stack
  }

  /// Billing extensions are only installed in the public sovereign clouds.
  pub fn is_billing_enabled(&self) -> bool {
    !self.is_custom_cloud()
  }

  pub fn is_private_cluster(&self) -> bool {
    self
      .master
      .as_ref()
      .and_then(|m| m.private_cluster.as_ref())
      .is_some_and(|p| p.enabled)
  }

  /// The jumpbox profile, when a private cluster asks for one.
  pub fn jumpbox(&self) -> Option<&JumpboxProfile> {
    self
      .master
      .as_ref()
      .and_then(|m| m.private_cluster.as_ref())
      .filter(|p| p.enabled)
      .and_then(|p| p.jumpbox.as_ref())
  }

  /// Whether the VNet comes from the user rather than the template.
  ///
  /// Self-hosted clusters follow the master profile; hosted clusters follow
  /// the first agent pool.
  pub fn is_custom_vnet(&self) -> bool {
    match &self.master {
      Some(master) => master.is_custom_vnet(),
      None => self.agent_pools.first().is_some_and(AgentPoolProfile::is_custom_vnet),
    }
  }

  pub fn is_azure_cni(&self) -> bool {
    self.orchestrator.network_plugin == NetworkPlugin::Azure
  }

  pub fn is_standard_load_balancer(&self) -> bool {
    self.orchestrator.load_balancer_sku == LoadBalancerSku::Standard
  }

  /// Whether node routes need a route table.
  ///
  /// Azure CNI without dual stack, Cilium policy, and the Cilium, Flannel
  /// and Antrea plugins all route without one.
  pub fn require_route_table(&self) -> bool {
    let plugin = self.orchestrator.network_plugin;
    let cilium_policy = self.orchestrator.network_policy.as_deref() == Some("cilium");
    match plugin {
      NetworkPlugin::Azure => self.feature_flags.enable_ipv6_dual_stack,
      NetworkPlugin::Cilium | NetworkPlugin::Flannel | NetworkPlugin::Antrea => false,
      NetworkPlugin::Kubenet => !cilium_policy,
    }
  }
}

impl MasterProfile {
  pub fn is_scale_set(&self) -> bool {
    self.vm_set_type == VmSetType::ScaleSet
  }

  pub fn is_storage_account(&self) -> bool {
    self.storage_backend == StorageBackend::StorageAccount
  }

  pub fn is_managed_disks(&self) -> bool {
    self.storage_backend == StorageBackend::ManagedDisks
  }

  pub fn is_custom_vnet(&self) -> bool {
    self.vnet_subnet_id.as_deref().is_some_and(|id| !id.is_empty())
  }

  pub fn has_multiple_nodes(&self) -> bool {
    self.count > 1
  }

  pub fn has_availability_zones(&self) -> bool {
    !self.availability_zones.is_empty()
  }

  pub fn has_custom_image(&self) -> bool {
    self
      .image_ref
      .as_ref()
      .is_some_and(|r| !r.name.is_empty() && !r.resource_group.is_empty())
  }
}

impl AgentPoolProfile {
  pub fn is_scale_set(&self) -> bool {
    self.vm_set_type == VmSetType::ScaleSet
  }

  pub fn is_availability_set(&self) -> bool {
    self.vm_set_type == VmSetType::AvailabilitySet
  }

  pub fn is_storage_account(&self) -> bool {
    self.storage_backend == StorageBackend::StorageAccount
  }

  pub fn is_managed_disks(&self) -> bool {
    self.storage_backend == StorageBackend::ManagedDisks
  }

  pub fn is_windows(&self) -> bool {
    self.os_type == OsType::Windows
  }

  pub fn is_custom_vnet(&self) -> bool {
    self.vnet_subnet_id.as_deref().is_some_and(|id| !id.is_empty())
  }

  pub fn has_disks(&self) -> bool {
    !self.disk_sizes_gb.is_empty()
  }

  pub fn is_low_priority_or_spot(&self) -> bool {
    matches!(self.priority, ScaleSetPriority::Low | ScaleSetPriority::Spot)
  }

  /// GPU node sizes get the NVIDIA driver path during provisioning.
  pub fn is_nvidia_enabled(&self) -> bool {
    let size = self.vm_size.to_ascii_lowercase();
    size.starts_with("standard_n")
  }

  /// Confidential compute sizes get the SGX driver path during provisioning.
  pub fn is_sgx_enabled(&self) -> bool {
    let size = self.vm_size.to_ascii_lowercase();
    size.starts_with("standard_dc")
  }

  pub fn has_custom_image(&self) -> bool {
    self
      .image_ref
      .as_ref()
      .is_some_and(|r| !r.name.is_empty() && !r.resource_group.is_empty())
  }
}

impl IdentityMode {
  /// User-assigned identity is in play only alongside managed identity.
  pub fn user_assigned_enabled(&self) -> bool {
    self.use_managed_identity && self.user_assigned_id.as_deref().is_some_and(|id| !id.is_empty())
  }

  /// A bare name means the template creates the identity; a resource ID means it exists.
  pub fn creates_user_assigned_identity(&self) -> bool {
    self.user_assigned_enabled() && !self.user_assigned_id.as_deref().unwrap_or("").contains('/')
  }
}
