//! Cluster model types.
//!
//! The model arrives already defaulted and validated. Field names follow the
//! camelCase convention of the API model files it is usually read from.
//!
//! # Example
//!
//! ```json
//! {
//!   "clusterId": "12345678",
//!   "orchestrator": { "version": "1.18.8" },
//!   "master": { "count": 1, "dnsPrefix": "mycluster" },
//!   "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }]
//! }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The desired cluster, as consumed by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
  /// Short stable identifier used in literal VM name prefixes.
  pub cluster_id: String,
  pub orchestrator: OrchestratorProfile,
  /// Self-hosted control plane. Absent when `hosted_master` is set.
  #[serde(default)]
  pub master: Option<MasterProfile>,
  /// Externally managed control plane.
  #[serde(default)]
  pub hosted_master: Option<HostedMasterProfile>,
  /// Agent pools in emission order.
  #[serde(default)]
  pub agent_pools: Vec<AgentPoolProfile>,
  #[serde(default)]
  pub identity: IdentityMode,
  #[serde(default)]
  pub linux: LinuxProfile,
  #[serde(default)]
  pub windows: Option<WindowsProfile>,
  #[serde(default)]
  pub custom_cloud: Option<CustomCloudProfile>,
  #[serde(default)]
  pub feature_flags: FeatureFlags,
}

/// Orchestrator type, version and cluster-wide networking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProfile {
  #[serde(rename = "type", default = "default_orchestrator_type")]
  pub orchestrator_type: String,
  pub version: String,
  #[serde(default)]
  pub network_plugin: NetworkPlugin,
  #[serde(default)]
  pub network_policy: Option<String>,
  #[serde(default)]
  pub network_mode: Option<String>,
  #[serde(default)]
  pub load_balancer_sku: LoadBalancerSku,
  #[serde(default)]
  pub exclude_master_from_standard_lb: bool,
  /// Number of outbound public IPs on the agent standard load balancer.
  #[serde(default = "default_outbound_ips")]
  pub load_balancer_outbound_ips: u32,
  #[serde(default = "default_max_lb_rules")]
  pub maximum_load_balancer_rule_count: u32,
  #[serde(default = "default_outbound_idle_timeout")]
  pub outbound_rule_idle_timeout_in_minutes: u32,
  #[serde(default)]
  pub use_instance_metadata: bool,
  #[serde(default)]
  pub enable_encryption_with_external_kms: bool,
  #[serde(default = "default_container_runtime")]
  pub container_runtime: String,
  #[serde(default)]
  pub etcd_version: String,
  #[serde(default = "default_etcd_disk_size")]
  pub etcd_disk_size_gb: u32,
  #[serde(default)]
  pub containerd_version: String,
  #[serde(default)]
  pub moby_version: String,
  #[serde(default)]
  pub cloud_provider: CloudProviderConfig,
  /// Resolved hyperkube image reference.
  #[serde(default)]
  pub hyperkube_image: String,
  /// Overrides the hyperkube image, including on Azure Stack.
  #[serde(default)]
  pub custom_hyperkube_image: Option<String>,
  #[serde(default)]
  pub custom_kube_binary_url: Option<String>,
  #[serde(default)]
  pub downloads: DownloadUrls,
}

fn default_orchestrator_type() -> String {
  "Kubernetes".to_string()
}

fn default_outbound_ips() -> u32 {
  1
}

fn default_max_lb_rules() -> u32 {
  250
}

fn default_outbound_idle_timeout() -> u32 {
  30
}

fn default_container_runtime() -> String {
  "docker".to_string()
}

fn default_etcd_disk_size() -> u32 {
  256
}

/// Cloud provider backoff and rate limit knobs passed to node provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderConfig {
  #[serde(default)]
  pub backoff: bool,
  #[serde(default)]
  pub backoff_retries: u32,
  #[serde(default)]
  pub rate_limit: bool,
  #[serde(default)]
  pub rate_limit_qps: f64,
  #[serde(default)]
  pub rate_limit_qps_write: f64,
  #[serde(default)]
  pub rate_limit_bucket: u32,
  #[serde(default)]
  pub rate_limit_bucket_write: u32,
  #[serde(default = "default_backoff_mode")]
  pub backoff_mode: String,
  #[serde(default)]
  pub backoff_exponent: f64,
  #[serde(default)]
  pub backoff_duration: u32,
  #[serde(default)]
  pub backoff_jitter: f64,
  #[serde(default, rename = "disableOutboundSNAT")]
  pub disable_outbound_snat: bool,
}

impl Default for CloudProviderConfig {
  fn default() -> Self {
    Self {
      backoff: false,
      backoff_retries: 0,
      rate_limit: false,
      rate_limit_qps: 0.0,
      rate_limit_qps_write: 0.0,
      rate_limit_bucket: 0,
      rate_limit_bucket_write: 0,
      backoff_mode: default_backoff_mode(),
      backoff_exponent: 0.0,
      backoff_duration: 0,
      backoff_jitter: 0.0,
      disable_outbound_snat: false,
    }
  }
}

fn default_backoff_mode() -> String {
  "v1".to_string()
}

/// Where nodes download etcd, CNI and containerd binaries from.
///
/// Defaults point at the public cloud mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrls {
  #[serde(default = "default_etcd_download_url")]
  pub etcd_download_url_base: String,
  #[serde(default = "default_cni_plugins_url")]
  pub cni_plugins_url: String,
  #[serde(default = "default_vnet_cni_plugins_url")]
  pub vnet_cni_plugins_url: String,
  #[serde(default = "default_containerd_download_url")]
  pub containerd_download_url_base: String,
}

impl Default for DownloadUrls {
  fn default() -> Self {
    Self {
      etcd_download_url_base: default_etcd_download_url(),
      cni_plugins_url: default_cni_plugins_url(),
      vnet_cni_plugins_url: default_vnet_cni_plugins_url(),
      containerd_download_url_base: default_containerd_download_url(),
    }
  }
}

fn default_etcd_download_url() -> String {
  "https://acs-mirror.azureedge.net/github-coreos".to_string()
}

fn default_cni_plugins_url() -> String {
  "https://acs-mirror.azureedge.net/cni/cni-plugins-amd64-v0.8.5.tgz".to_string()
}

fn default_vnet_cni_plugins_url() -> String {
  "https://acs-mirror.azureedge.net/cni/azure-vnet-cni-linux-amd64-v1.1.2.tgz".to_string()
}

fn default_containerd_download_url() -> String {
  "https://storage.googleapis.com/cri-containerd-release/".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPlugin {
  #[default]
  Kubenet,
  Azure,
  Cilium,
  Flannel,
  Antrea,
}

impl NetworkPlugin {
  pub fn as_str(self) -> &'static str {
    match self {
      NetworkPlugin::Kubenet => "kubenet",
      NetworkPlugin::Azure => "azure",
      NetworkPlugin::Cilium => "cilium",
      NetworkPlugin::Flannel => "flannel",
      NetworkPlugin::Antrea => "antrea",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadBalancerSku {
  #[default]
  Basic,
  Standard,
}

impl LoadBalancerSku {
  pub fn as_str(self) -> &'static str {
    match self {
      LoadBalancerSku::Basic => "Basic",
      LoadBalancerSku::Standard => "Standard",
    }
  }
}

/// How a group of machines is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VmSetType {
  #[default]
  AvailabilitySet,
  ScaleSet,
}

/// Where OS and data disks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageBackend {
  #[default]
  ManagedDisks,
  StorageAccount,
}

/// Self-hosted control plane topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterProfile {
  pub count: u32,
  pub dns_prefix: String,
  #[serde(default)]
  pub vm_set_type: VmSetType,
  #[serde(default)]
  pub storage_backend: StorageBackend,
  /// Existing subnet to deploy into. Presence means a custom VNet.
  #[serde(default)]
  pub vnet_subnet_id: Option<String>,
  #[serde(default)]
  pub cosmos_etcd: bool,
  #[serde(default)]
  pub private_cluster: Option<PrivateCluster>,
  #[serde(default = "default_ip_address_count")]
  pub ip_address_count: u32,
  #[serde(default)]
  pub availability_zones: Vec<String>,
  #[serde(default)]
  pub os_disk_size_gb: Option<u32>,
  /// Custom master image (name, resource group).
  #[serde(default)]
  pub image_ref: Option<ImageRef>,
}

fn default_ip_address_count() -> u32 {
  1
}

/// Private cluster settings; the API server has no public endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateCluster {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default)]
  pub jumpbox: Option<JumpboxProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpboxProfile {
  pub name: String,
  pub vm_size: String,
  #[serde(default)]
  pub storage_backend: StorageBackend,
  #[serde(default)]
  pub os_disk_size_gb: Option<u32>,
}

/// Externally managed control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedMasterProfile {
  pub dns_prefix: String,
  #[serde(default)]
  pub fqdn: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OsType {
  #[default]
  Linux,
  Windows,
}

/// Scale set priority for agent pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleSetPriority {
  #[default]
  Regular,
  Low,
  Spot,
}

impl ScaleSetPriority {
  pub fn as_str(self) -> &'static str {
    match self {
      ScaleSetPriority::Regular => "Regular",
      ScaleSetPriority::Low => "Low",
      ScaleSetPriority::Spot => "Spot",
    }
  }
}

/// One homogeneous group of worker machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
  /// Unique pool name; prefixes every pool-scoped variable.
  pub name: String,
  #[serde(default = "default_pool_count")]
  pub count: u32,
  pub vm_size: String,
  #[serde(default)]
  pub vm_set_type: VmSetType,
  #[serde(default)]
  pub storage_backend: StorageBackend,
  #[serde(default)]
  pub os_type: OsType,
  /// Existing subnet to deploy into. Presence means a custom VNet.
  #[serde(default)]
  pub vnet_subnet_id: Option<String>,
  #[serde(default)]
  pub priority: ScaleSetPriority,
  #[serde(default = "default_eviction_policy")]
  pub eviction_policy: String,
  #[serde(default, rename = "diskSizesGB")]
  pub disk_sizes_gb: Vec<u32>,
  #[serde(default = "default_ip_address_count")]
  pub ip_address_count: u32,
  #[serde(default)]
  pub accelerated_networking: bool,
  #[serde(default)]
  pub os_disk_size_gb: Option<u32>,
  #[serde(default)]
  pub image_ref: Option<ImageRef>,
}

fn default_pool_count() -> u32 {
  1
}

fn default_eviction_policy() -> String {
  "Delete".to_string()
}

/// Reference to a pre-built OS image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
  pub name: String,
  pub resource_group: String,
}

/// Managed identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMode {
  #[serde(default)]
  pub use_managed_identity: bool,
  /// Name of an identity to create, or full resource ID of an existing one.
  #[serde(default)]
  pub user_assigned_id: Option<String>,
  #[serde(default)]
  pub user_assigned_client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxProfile {
  #[serde(default = "default_admin_username")]
  pub admin_username: String,
  /// Public keys; more than one is embedded literally, one goes through a parameter.
  #[serde(default)]
  pub ssh_public_keys: Vec<String>,
  #[serde(default)]
  pub custom_nodes_dns: Option<String>,
}

impl Default for LinuxProfile {
  fn default() -> Self {
    Self {
      admin_username: default_admin_username(),
      ssh_public_keys: Vec::new(),
      custom_nodes_dns: None,
    }
  }
}

fn default_admin_username() -> String {
  "azureuser".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsProfile {
  /// VHD to build a custom image from.
  #[serde(default)]
  pub image_source_url: Option<String>,
  #[serde(default)]
  pub enable_automatic_updates: bool,
  #[serde(default)]
  pub enable_csi_proxy: bool,
  #[serde(default)]
  pub csi_proxy_url: Option<String>,
}

/// Non-public cloud target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCloudProfile {
  /// Endpoint descriptor, embedded verbatim as `environmentJSON`.
  #[serde(default)]
  pub environment: Option<serde_json::Value>,
  #[serde(default)]
  pub authentication_method: Option<String>,
  #[serde(default)]
  pub identity_system: Option<String>,
  #[serde(default)]
  pub telemetry_pid: Option<String>,
}

/// Named feature switches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
  #[serde(default)]
  pub block_outbound_internet: bool,
  #[serde(default, rename = "enableIPv6DualStack")]
  pub enable_ipv6_dual_stack: bool,
  #[serde(default, rename = "enableIPv6Only")]
  pub enable_ipv6_only: bool,
  #[serde(default)]
  pub enable_telemetry: bool,
  /// Anything else, carried through for forward compatibility.
  #[serde(default)]
  pub other: BTreeSet<String>,
}
