//! Provisioning parameter strings handed to the node bootstrap script.
//!
//! Each string is one `concat(...)` whose pieces are `KEY=value ` pairs.
//! Values are either literal text known now, or a variable/parameter
//! reference spliced in by closing the current quoted literal, emitting the
//! reference, and reopening the literal (`',variables('x'),'`). The common
//! string's keys are sorted; the bootstrap script parses it positionally
//! by key, so the order is part of the contract.

use std::collections::BTreeMap;

use super::common::{AZURE_AD_IDENTITY_SYSTEM, CLIENT_SECRET_AUTH_METHOD, PUBLIC_CLOUD_API_VERSIONS};
use super::{ClusterMetadata, VariableMap};
use crate::context::Context;
use crate::error::GenerateError;
use crate::helpers::escape_single_quotes;

/// One value inside a provisioning string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
  Literal(String),
  Variable(&'static str),
  Parameter(&'static str),
  /// A variable wrapped in single quotes at deploy time.
  QuotedVariable(&'static str),
}

impl Fragment {
  fn literal(text: impl Into<String>) -> Self {
    Fragment::Literal(text.into())
  }

  fn render(&self) -> String {
    match self {
      Fragment::Literal(text) => escape_single_quotes(text),
      Fragment::Variable(name) => format!("',variables('{name}'),'"),
      Fragment::Parameter(name) => format!("',parameters('{name}'),'"),
      Fragment::QuotedVariable(name) => {
        format!("',variables('singleQuote'),'',variables('{name}'),'',variables('singleQuote'),'")
      }
    }
  }
}

fn render_pairs(pairs: &BTreeMap<&'static str, Fragment>) -> String {
  let mut body = String::new();
  for (key, value) in pairs {
    body.push_str(key);
    body.push('=');
    body.push_str(&value.render());
    body.push(' ');
  }
  format!("[concat('{body}')]")
}

fn common_parameters(ctx: &Context<'_>, metadata: &ClusterMetadata) -> BTreeMap<&'static str, Fragment> {
  let model = ctx.model;
  let orchestrator = &model.orchestrator;
  let cloud_provider = &orchestrator.cloud_provider;
  let downloads = &orchestrator.downloads;
  let (auth_method, identity_system) = match &model.custom_cloud {
    Some(cloud) => (
      cloud.authentication_method.clone().unwrap_or_default(),
      cloud.identity_system.clone().unwrap_or_default(),
    ),
    None => (CLIENT_SECRET_AUTH_METHOD.to_string(), AZURE_AD_IDENTITY_SYSTEM.to_string()),
  };

  let mut params = BTreeMap::from([
    ("ADMINUSER", Fragment::literal(&model.linux.admin_username)),
    ("APISERVER_PUBLIC_KEY", Fragment::Parameter("apiServerCertificate")),
    ("AUTHENTICATION_METHOD", Fragment::literal(auth_method)),
    ("CLOUDPROVIDER_BACKOFF", Fragment::literal(cloud_provider.backoff.to_string())),
    (
      "CLOUDPROVIDER_BACKOFF_DURATION",
      Fragment::literal(cloud_provider.backoff_duration.to_string()),
    ),
    (
      "CLOUDPROVIDER_BACKOFF_EXPONENT",
      Fragment::literal(cloud_provider.backoff_exponent.to_string()),
    ),
    (
      "CLOUDPROVIDER_BACKOFF_JITTER",
      Fragment::literal(cloud_provider.backoff_jitter.to_string()),
    ),
    ("CLOUDPROVIDER_BACKOFF_MODE", Fragment::literal(&cloud_provider.backoff_mode)),
    (
      "CLOUDPROVIDER_BACKOFF_RETRIES",
      Fragment::literal(cloud_provider.backoff_retries.to_string()),
    ),
    ("CLOUDPROVIDER_RATELIMIT", Fragment::literal(cloud_provider.rate_limit.to_string())),
    (
      "CLOUDPROVIDER_RATELIMIT_BUCKET",
      Fragment::literal(cloud_provider.rate_limit_bucket.to_string()),
    ),
    (
      "CLOUDPROVIDER_RATELIMIT_BUCKET_WRITE",
      Fragment::literal(cloud_provider.rate_limit_bucket_write.to_string()),
    ),
    (
      "CLOUDPROVIDER_RATELIMIT_QPS",
      Fragment::literal(cloud_provider.rate_limit_qps.to_string()),
    ),
    (
      "CLOUDPROVIDER_RATELIMIT_QPS_WRITE",
      Fragment::literal(cloud_provider.rate_limit_qps_write.to_string()),
    ),
    ("CNI_PLUGINS_URL", Fragment::literal(&downloads.cni_plugins_url)),
    (
      "CONTAINERD_DOWNLOAD_URL_BASE",
      Fragment::literal(&downloads.containerd_download_url_base),
    ),
    ("CONTAINERD_VERSION", Fragment::literal(&orchestrator.containerd_version)),
    ("CONTAINER_RUNTIME", Fragment::literal(&orchestrator.container_runtime)),
    ("ETCD_DOWNLOAD_URL", Fragment::literal(&downloads.etcd_download_url_base)),
    ("ETCD_VERSION", Fragment::literal(&orchestrator.etcd_version)),
    (
      "EXCLUDE_MASTER_FROM_STANDARD_LB",
      Fragment::literal(orchestrator.exclude_master_from_standard_lb.to_string()),
    ),
    ("HYPERKUBE_URL", Fragment::literal(model.hyperkube_spec())),
    ("IDENTITY_SYSTEM", Fragment::literal(identity_system)),
    ("IS_HOSTED_MASTER", Fragment::literal(ctx.is_hosted_master.to_string())),
    (
      "IS_IPV6_DUALSTACK_FEATURE_ENABLED",
      Fragment::literal(ctx.is_ipv6_dual_stack.to_string()),
    ),
    ("IS_IPV6_ENABLED", Fragment::literal(model.is_ipv6_enabled().to_string())),
    ("KMS_PROVIDER_VAULT_NAME", Fragment::Variable("clusterKeyVaultName")),
    ("KUBELET_PRIVATE_KEY", Fragment::Parameter("clientPrivateKey")),
    ("KUBERNETES_VERSION", Fragment::literal(&orchestrator.version)),
    (
      "KUBE_BINARY_URL",
      Fragment::literal(orchestrator.custom_kube_binary_url.clone().unwrap_or_default()),
    ),
    (
      "LOAD_BALANCER_DISABLE_OUTBOUND_SNAT",
      Fragment::literal(cloud_provider.disable_outbound_snat.to_string()),
    ),
    ("LOAD_BALANCER_SKU", Fragment::literal(orchestrator.load_balancer_sku.as_str())),
    ("LOCATION", Fragment::Variable("location")),
    (
      "MAXIMUM_LOADBALANCER_RULE_COUNT",
      Fragment::literal(orchestrator.maximum_load_balancer_rule_count.to_string()),
    ),
    ("MOBY_VERSION", Fragment::literal(&orchestrator.moby_version)),
    ("NETWORK_API_VERSION", Fragment::literal(PUBLIC_CLOUD_API_VERSIONS.network)),
    (
      "NETWORK_MODE",
      Fragment::literal(orchestrator.network_mode.clone().unwrap_or_default()),
    ),
    ("NETWORK_PLUGIN", Fragment::literal(orchestrator.network_plugin.as_str())),
    (
      "NETWORK_POLICY",
      Fragment::literal(orchestrator.network_policy.clone().unwrap_or_default()),
    ),
    ("NETWORK_SECURITY_GROUP", Fragment::literal(&metadata.nsg_name)),
    (
      "PRIMARY_AVAILABILITY_SET",
      Fragment::literal(&metadata.primary_availability_set_name),
    ),
    ("PRIMARY_SCALE_SET", Fragment::literal(&metadata.primary_scale_set_name)),
    ("RESOURCE_GROUP", Fragment::Variable("resourceGroup")),
    ("ROUTE_TABLE", Fragment::literal(&metadata.route_table_name)),
    ("SERVICE_PRINCIPAL_CLIENT_ID", Fragment::Variable("servicePrincipalClientId")),
    (
      "SERVICE_PRINCIPAL_CLIENT_SECRET",
      Fragment::QuotedVariable("servicePrincipalClientSecret"),
    ),
    ("SUBNET", Fragment::literal(&metadata.subnet_name)),
    ("SUBSCRIPTION_ID", Fragment::Variable("subscriptionId")),
    ("TENANT_ID", Fragment::Variable("tenantId")),
    (
      "USE_INSTANCE_METADATA",
      Fragment::literal(orchestrator.use_instance_metadata.to_string()),
    ),
    (
      "USE_MANAGED_IDENTITY_EXTENSION",
      Fragment::literal(ctx.use_managed_identity.to_string()),
    ),
    ("VIRTUAL_NETWORK", Fragment::literal(&metadata.virtual_network_name)),
    (
      "VIRTUAL_NETWORK_RESOURCE_GROUP",
      Fragment::literal(&metadata.virtual_network_resource_group),
    ),
    ("VM_TYPE", Fragment::literal(metadata.vm_type)),
    ("VNET_CNI_PLUGINS_URL", Fragment::literal(&downloads.vnet_cni_plugins_url)),
  ]);

  if let Some(fqdn) = model.hosted_master.as_ref().and_then(|h| h.fqdn.as_deref())
    && !fqdn.is_empty()
  {
    params.insert("API_SERVER_NAME", Fragment::literal(fqdn));
  }
  params
}

/// Master-only parameters, in bootstrap order.
fn master_parameters(ctx: &Context<'_>) -> Result<String, GenerateError> {
  let master = ctx.self_hosted_master()?;
  let cosmos_uri = if ctx.has_cosmos_etcd {
    format!("{}k8s.etcd.cosmosdb.azure.com", master.dns_prefix)
  } else {
    String::new()
  };

  let member = if ctx.is_master_scale_set {
    String::new()
  } else {
    concat!(
      " MASTER_VM_NAME=',variables('masterVMNames')[variables('masterOffset')],'",
      " ETCD_PEER_URL=',variables('masterEtcdPeerURLs')[variables('masterOffset')],'",
      " ETCD_CLIENT_URL=',variables('masterEtcdClientURLs')[variables('masterOffset')],'"
    )
    .to_string()
  };

  Ok(format!(
    concat!(
      "[concat('COSMOS_URI={cosmos}{member} MASTER_NODE=true NO_OUTBOUND={no_outbound}",
      " AUDITD_ENABLED=false CLUSTER_AUTOSCALER_ADDON=false",
      " ACI_CONNECTOR_ADDON=',parameters('kubernetesACIConnectorEnabled'),'",
      " APISERVER_PRIVATE_KEY=',parameters('apiServerPrivateKey'),'",
      " CA_CERTIFICATE=',parameters('caCertificate'),'",
      " CA_PRIVATE_KEY=',parameters('caPrivateKey'),'",
      " MASTER_FQDN=',variables('masterFqdnPrefix'),'",
      " KUBECONFIG_CERTIFICATE=',parameters('kubeConfigCertificate'),'",
      " KUBECONFIG_KEY=',parameters('kubeConfigPrivateKey'),'",
      " ETCD_SERVER_CERTIFICATE=',parameters('etcdServerCertificate'),'",
      " ETCD_CLIENT_CERTIFICATE=',parameters('etcdClientCertificate'),'",
      " ETCD_SERVER_PRIVATE_KEY=',parameters('etcdServerPrivateKey'),'",
      " ETCD_CLIENT_PRIVATE_KEY=',parameters('etcdClientPrivateKey'),'",
      " ETCD_PEER_CERTIFICATES=',string(variables('etcdPeerCertificates')),'",
      " ETCD_PEER_PRIVATE_KEYS=',string(variables('etcdPeerPrivateKeys')),'",
      " ENABLE_AGGREGATED_APIS=',string(parameters('enableAggregatedAPIs')),'",
      " KUBECONFIG_SERVER=',variables('kubeconfigServer'))]"
    ),
    cosmos = escape_single_quotes(&cosmos_uri),
    member = member,
    no_outbound = ctx.block_outbound_internet,
  ))
}

pub(super) fn derive(ctx: &Context<'_>, metadata: &ClusterMetadata) -> Result<VariableMap, GenerateError> {
  let mut vars = VariableMap::new();
  vars.insert(
    "provisionScriptParametersCommon",
    render_pairs(&common_parameters(ctx, metadata)),
  );
  if !ctx.is_hosted_master {
    vars.insert("provisionScriptParametersMaster", master_parameters(ctx)?);
  }
  Ok(vars)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::variable_references;
  use crate::model::{ClusterModel, VmSetType};
  use crate::scripts::BuiltinScripts;

  fn model() -> ClusterModel {
    ClusterModel::from_json(
      r#"{ "clusterId": "12345678", "orchestrator": { "version": "1.18.8", "networkPolicy": "calico" },
           "master": { "count": 3, "dnsPrefix": "c" },
           "linux": { "adminUsername": "o'brien" },
           "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }] }"#,
    )
    .unwrap()
  }

  fn derived(m: &ClusterModel) -> VariableMap {
    let ctx = Context::new(m, &BuiltinScripts).unwrap();
    derive(&ctx, &ClusterMetadata::new(&ctx)).unwrap()
  }

  #[test]
  fn common_string_is_sorted_and_escaped() {
    let vars = derived(&model());
    let common = vars.get_str("provisionScriptParametersCommon").unwrap();
    assert!(common.starts_with("[concat('ADMINUSER=o''brien APISERVER_PUBLIC_KEY=',parameters('apiServerCertificate'),' "));
    assert!(common.ends_with(
      "VM_TYPE=standard VNET_CNI_PLUGINS_URL=https://acs-mirror.azureedge.net/cni/azure-vnet-cni-linux-amd64-v1.1.2.tgz ')]"
    ));
    assert!(common.contains(" NETWORK_POLICY=calico "));
    assert!(common.contains(" SUBNET=k8s-subnet "));
    assert!(common.contains(" PRIMARY_AVAILABILITY_SET=agentpool1-availabilitySet-12345678 "));

    let admin = common.find("ADMINUSER").unwrap();
    let tenant = common.find("TENANT_ID").unwrap();
    let vm_type = common.find("VM_TYPE").unwrap();
    assert!(admin < tenant && tenant < vm_type);
  }

  #[test]
  fn common_string_carries_every_bootstrap_key() {
    let m = model();
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let params = common_parameters(&ctx, &ClusterMetadata::new(&ctx));
    let keys: Vec<&str> = params.keys().copied().collect();
    assert_eq!(
      keys,
      [
        "ADMINUSER",
        "APISERVER_PUBLIC_KEY",
        "AUTHENTICATION_METHOD",
        "CLOUDPROVIDER_BACKOFF",
        "CLOUDPROVIDER_BACKOFF_DURATION",
        "CLOUDPROVIDER_BACKOFF_EXPONENT",
        "CLOUDPROVIDER_BACKOFF_JITTER",
        "CLOUDPROVIDER_BACKOFF_MODE",
        "CLOUDPROVIDER_BACKOFF_RETRIES",
        "CLOUDPROVIDER_RATELIMIT",
        "CLOUDPROVIDER_RATELIMIT_BUCKET",
        "CLOUDPROVIDER_RATELIMIT_BUCKET_WRITE",
        "CLOUDPROVIDER_RATELIMIT_QPS",
        "CLOUDPROVIDER_RATELIMIT_QPS_WRITE",
        "CNI_PLUGINS_URL",
        "CONTAINERD_DOWNLOAD_URL_BASE",
        "CONTAINERD_VERSION",
        "CONTAINER_RUNTIME",
        "ETCD_DOWNLOAD_URL",
        "ETCD_VERSION",
        "EXCLUDE_MASTER_FROM_STANDARD_LB",
        "HYPERKUBE_URL",
        "IDENTITY_SYSTEM",
        "IS_HOSTED_MASTER",
        "IS_IPV6_DUALSTACK_FEATURE_ENABLED",
        "IS_IPV6_ENABLED",
        "KMS_PROVIDER_VAULT_NAME",
        "KUBELET_PRIVATE_KEY",
        "KUBERNETES_VERSION",
        "KUBE_BINARY_URL",
        "LOAD_BALANCER_DISABLE_OUTBOUND_SNAT",
        "LOAD_BALANCER_SKU",
        "LOCATION",
        "MAXIMUM_LOADBALANCER_RULE_COUNT",
        "MOBY_VERSION",
        "NETWORK_API_VERSION",
        "NETWORK_MODE",
        "NETWORK_PLUGIN",
        "NETWORK_POLICY",
        "NETWORK_SECURITY_GROUP",
        "PRIMARY_AVAILABILITY_SET",
        "PRIMARY_SCALE_SET",
        "RESOURCE_GROUP",
        "ROUTE_TABLE",
        "SERVICE_PRINCIPAL_CLIENT_ID",
        "SERVICE_PRINCIPAL_CLIENT_SECRET",
        "SUBNET",
        "SUBSCRIPTION_ID",
        "TENANT_ID",
        "USE_INSTANCE_METADATA",
        "USE_MANAGED_IDENTITY_EXTENSION",
        "VIRTUAL_NETWORK",
        "VIRTUAL_NETWORK_RESOURCE_GROUP",
        "VM_TYPE",
        "VNET_CNI_PLUGINS_URL",
      ]
    );
  }

  #[test]
  fn download_and_cloud_provider_values_render() {
    let mut m = model();
    m.orchestrator.hyperkube_image = "mcr.microsoft.com/hyperkube-amd64:v1.18.8".to_string();
    m.orchestrator.cloud_provider.backoff_exponent = 1.5;
    m.orchestrator.cloud_provider.rate_limit_bucket_write = 10;
    m.feature_flags.enable_ipv6_only = true;
    let vars = derived(&m);
    let common = vars.get_str("provisionScriptParametersCommon").unwrap();
    assert!(common.contains(" HYPERKUBE_URL=mcr.microsoft.com/hyperkube-amd64:v1.18.8 "));
    assert!(common.contains(" ETCD_DOWNLOAD_URL=https://acs-mirror.azureedge.net/github-coreos "));
    assert!(common.contains(" CLOUDPROVIDER_BACKOFF_EXPONENT=1.5 "));
    assert!(common.contains(" CLOUDPROVIDER_BACKOFF_MODE=v1 "));
    assert!(common.contains(" CLOUDPROVIDER_RATELIMIT_BUCKET_WRITE=10 "));
    assert!(common.contains(" KUBE_BINARY_URL= "));
    assert!(common.contains(" IS_IPV6_DUALSTACK_FEATURE_ENABLED=false IS_IPV6_ENABLED=true "));
  }

  #[test]
  fn common_string_references_known_variables() {
    let vars = derived(&model());
    let common = vars.get_str("provisionScriptParametersCommon").unwrap();
    let refs = variable_references(common).unwrap();
    assert!(refs.contains(&"tenantId".to_string()));
    assert!(refs.contains(&"clusterKeyVaultName".to_string()));
    assert!(refs.contains(&"singleQuote".to_string()));
    assert!(!refs.contains(&"tenantID".to_string()));
  }

  #[test]
  fn master_string_by_topology() {
    let vars = derived(&model());
    let master = vars.get_str("provisionScriptParametersMaster").unwrap();
    assert!(master.starts_with("[concat('COSMOS_URI= MASTER_VM_NAME="));
    assert!(master.contains("NO_OUTBOUND=false"));
    assert!(master.contains(
      " CLUSTER_AUTOSCALER_ADDON=false ACI_CONNECTOR_ADDON=',parameters('kubernetesACIConnectorEnabled'),' APISERVER_PRIVATE_KEY="
    ));

    let mut m = model();
    m.master.as_mut().unwrap().vm_set_type = VmSetType::ScaleSet;
    m.master.as_mut().unwrap().cosmos_etcd = true;
    m.feature_flags.block_outbound_internet = true;
    let vars = derived(&m);
    let master = vars.get_str("provisionScriptParametersMaster").unwrap();
    assert!(master.starts_with("[concat('COSMOS_URI=ck8s.etcd.cosmosdb.azure.com MASTER_NODE=true NO_OUTBOUND=true"));
    assert!(!master.contains("MASTER_VM_NAME"));
  }

  #[test]
  fn hosted_fqdn_becomes_api_server_name() {
    let m = ClusterModel::from_json(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "hostedMaster": { "dnsPrefix": "h", "fqdn": "h.hcp.eastus.azmk8s.io" },
           "agentPools": [{ "name": "p", "vmSize": "Standard_D2_v3" }] }"#,
    )
    .unwrap();
    let vars = derived(&m);
    let common = vars.get_str("provisionScriptParametersCommon").unwrap();
    assert!(common.starts_with(concat!(
      "[concat('ADMINUSER=azureuser APISERVER_PUBLIC_KEY=',parameters('apiServerCertificate'),' ",
      "API_SERVER_NAME=h.hcp.eastus.azmk8s.io AUTHENTICATION_METHOD="
    )));
    assert!(!vars.contains("provisionScriptParametersMaster"));
  }
}
