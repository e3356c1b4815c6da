//! Cluster-wide variables: API versions, identity, location and
//! subscription plumbing, cloud-init payloads, telemetry.

use serde_json::{Value, json};

use super::VariableMap;
use crate::context::Context;
use crate::error::GenerateError;
use crate::helpers::encode_script;
use crate::scripts::Script;

/// API version per resource provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ApiVersions {
  pub compute: &'static str,
  pub deployments: &'static str,
  pub storage: &'static str,
  pub key_vault: &'static str,
  pub network: &'static str,
  pub managed_identity: &'static str,
  pub authorization_user: &'static str,
  pub authorization_system: &'static str,
}

pub(super) const PUBLIC_CLOUD_API_VERSIONS: ApiVersions = ApiVersions {
  compute: "2019-07-01",
  deployments: "2018-06-01",
  storage: "2018-07-01",
  key_vault: "2018-02-14",
  network: "2018-08-01",
  managed_identity: "2018-11-30",
  authorization_user: "2018-09-01-preview",
  authorization_system: "2018-01-01-preview",
};

/// Azure Stack lags the public cloud on four providers.
const AZURE_STACK_API_VERSIONS: ApiVersions = ApiVersions {
  compute: "2017-03-30",
  storage: "2017-10-01",
  network: "2017-10-01",
  key_vault: "2016-10-01",
  ..PUBLIC_CLOUD_API_VERSIONS
};

pub(super) const CLIENT_SECRET_AUTH_METHOD: &str = "client_secret";
pub(super) const AZURE_AD_IDENTITY_SYSTEM: &str = "azure_ad";

const CONTRIBUTOR_ROLE: &str = "b24988ac-6180-42a0-ab88-20f7382dd24c";
const READER_ROLE: &str = "acdd72a7-3385-48ef-bd42-f606fba81ae7";
const NETWORK_CONTRIBUTOR_ROLE: &str = "4d97b98b-1d4f-4787-a291-c67834d212e7";

const WINDOWS_CUSTOM_SCRIPT_SUFFIX: &str = " $inputFile = '%SYSTEMDRIVE%\\AzureData\\CustomData.bin' ; $outputFile = '%SYSTEMDRIVE%\\AzureData\\CustomDataSetupScript.ps1' ; Copy-Item $inputFile $outputFile ; Invoke-Expression('{0} {1}' -f $outputFile, $arguments) ; ";

fn api_versions(ctx: &Context<'_>) -> ApiVersions {
  if ctx.is_azure_stack {
    AZURE_STACK_API_VERSIONS
  } else {
    PUBLIC_CLOUD_API_VERSIONS
  }
}

fn role_definition(guid: &str) -> String {
  format!(
    "[concat('/subscriptions/', subscription().subscriptionId, '/providers/Microsoft.Authorization/roleDefinitions/', '{guid}')]"
  )
}

pub(super) fn derive(ctx: &Context<'_>) -> Result<VariableMap, GenerateError> {
  let model = ctx.model;
  let orchestrator = &model.orchestrator;
  let mut vars = VariableMap::new();

  // ==========================================================================
  // API versions
  // ==========================================================================

  let api = api_versions(ctx);
  vars.insert("apiVersionCompute", api.compute);
  vars.insert("apiVersionDeployments", api.deployments);
  vars.insert("apiVersionStorage", api.storage);
  vars.insert("apiVersionKeyVault", api.key_vault);
  vars.insert("apiVersionNetwork", api.network);
  vars.insert("apiVersionManagedIdentity", api.managed_identity);
  vars.insert("apiVersionAuthorizationUser", api.authorization_user);
  vars.insert("apiVersionAuthorizationSystem", api.authorization_system);

  // ==========================================================================
  // Custom cloud
  // ==========================================================================

  if let Some(cloud) = &model.custom_cloud {
    // An absent environment marshals as `null`.
    vars.insert("environmentJSON", serde_json::to_string(&cloud.environment)?);
    vars.insert(
      "provisionConfigsCustomCloud",
      encode_script(&ctx.script(Script::CustomCloudConfigs)),
    );
    vars.insert(
      "customCloudAuthenticationMethod",
      cloud.authentication_method.clone().unwrap_or_default(),
    );
    vars.insert("customCloudIdentifySystem", cloud.identity_system.clone().unwrap_or_default());
  } else {
    vars.insert("customCloudAuthenticationMethod", CLIENT_SECRET_AUTH_METHOD);
    vars.insert("customCloudIdentifySystem", AZURE_AD_IDENTITY_SYSTEM);
  }

  // ==========================================================================
  // Identity
  // ==========================================================================

  let identity = &model.identity;
  vars.insert("useManagedIdentityExtension", ctx.use_managed_identity.to_string());
  let user_assigned_id = if ctx.user_assigned_identity_enabled {
    identity.user_assigned_id.clone().unwrap_or_default()
  } else {
    String::new()
  };
  vars.insert("userAssignedID", user_assigned_id);
  let client_id = match &identity.user_assigned_client_id {
    Some(id) if ctx.use_managed_identity && !id.is_empty() => id.clone(),
    _ => String::new(),
  };
  vars.insert("userAssignedClientID", client_id);
  let reference = if identity.creates_user_assigned_identity() {
    "[resourceId('Microsoft.ManagedIdentity/userAssignedIdentities/', variables('userAssignedID'))]"
  } else {
    "[variables('userAssignedID')]"
  };
  vars.insert("userAssignedIDReference", reference);

  if ctx.use_managed_identity && !ctx.is_hosted_master {
    vars.insert("servicePrincipalClientId", "msi");
    vars.insert("servicePrincipalClientSecret", "msi");
  } else {
    vars.insert("servicePrincipalClientId", "[parameters('servicePrincipalClientId')]");
    vars.insert("servicePrincipalClientSecret", "[parameters('servicePrincipalClientSecret')]");
  }

  vars.insert("contributorRoleDefinitionId", role_definition(CONTRIBUTOR_ROLE));
  vars.insert("readerRoleDefinitionId", role_definition(READER_ROLE));
  vars.insert("networkContributorRoleDefinitionId", role_definition(NETWORK_CONTRIBUTOR_ROLE));
  vars.insert("scope", "[resourceGroup().id]");
  vars.insert("tenantId", "[subscription().tenantId]");
  vars.insert("subscriptionId", "[subscription().subscriptionId]");
  vars.insert("singleQuote", "'");

  // ==========================================================================
  // Location and resource group
  // ==========================================================================

  vars.insert("locations", json!(["[resourceGroup().location]", "[parameters('location')]"]));
  vars.insert(
    "location",
    "[variables('locations')[mod(add(2,length(parameters('location'))),add(1,length(parameters('location'))))]]",
  );
  vars.insert("resourceGroup", "[resourceGroup().name]");
  vars.insert(
    "truncatedResourceGroup",
    "[take(replace(replace(resourceGroup().name, '(', '-'), ')', '-'), 63)]",
  );
  vars.insert(
    "labelResourceGroup",
    "[if(or(or(endsWith(variables('truncatedResourceGroup'), '-'), endsWith(variables('truncatedResourceGroup'), '_')), endsWith(variables('truncatedResourceGroup'), '.')), concat(take(variables('truncatedResourceGroup'), 62), 'z'), variables('truncatedResourceGroup'))]",
  );
  vars.insert("masterFqdnPrefix", ctx.dns_prefix());

  // ==========================================================================
  // Orchestrator settings
  // ==========================================================================

  vars.insert("maxVMsPerPool", 100);
  vars.insert("useInstanceMetadata", orchestrator.use_instance_metadata.to_string());
  vars.insert("loadBalancerSku", orchestrator.load_balancer_sku.as_str());
  vars.insert(
    "excludeMasterFromStandardLB",
    orchestrator.exclude_master_from_standard_lb.to_string(),
  );
  vars.insert("maximumLoadBalancerRuleCount", orchestrator.maximum_load_balancer_rule_count);
  vars.insert(
    "orchestratorNameVersionTag",
    format!("{}:{}", orchestrator.orchestrator_type, orchestrator.version),
  );
  vars.insert("sshNatPorts", json!([22, 2201, 2202, 2203, 2204]));
  vars.insert(
    "sshKeyPath",
    "[concat('/home/',parameters('linuxAdminUsername'),'/.ssh/authorized_keys')]",
  );

  let key_vault = if ctx.kms_enabled {
    "[take(concat('kv', tolower(uniqueString(concat(variables('masterFqdnPrefix'),variables('location'),parameters('nameSuffix'))))), 22)]"
  } else {
    ""
  };
  vars.insert("clusterKeyVaultName", key_vault);

  if ctx.has_cosmos_etcd {
    vars.insert("cosmosAccountName", format!("{}k8s", ctx.self_hosted_master()?.dns_prefix));
    vars.insert("cosmosDBCertb64", "[base64(parameters('etcdClientCertificate'))]");
    vars.insert("apiVersionCosmos", "2015-04-08");
  }

  // ==========================================================================
  // Cloud-init payloads and telemetry
  // ==========================================================================

  let files: serde_json::Map<String, Value> = Script::ALL
    .iter()
    .filter_map(|script| {
      script
        .cloud_init_key()
        .map(|key| (key.to_string(), Value::from(encode_script(&ctx.script(*script)))))
    })
    .collect();
  vars.insert("cloudInitFiles", Value::Object(files));

  vars.insert("enableTelemetry", model.feature_flags.enable_telemetry);
  vars.insert("applicationInsightsKey", "");

  Ok(vars)
}

/// Windows node variables. The CSI proxy pair is always present so Windows
/// custom data can read it unconditionally.
pub(super) fn derive_windows(ctx: &Context<'_>) -> VariableMap {
  let mut vars = VariableMap::new();
  let profile = ctx.model.windows.as_ref();
  vars.insert("windowsEnableCSIProxy", profile.is_some_and(|w| w.enable_csi_proxy));
  vars.insert(
    "windowsCSIProxyURL",
    profile.and_then(|w| w.csi_proxy_url.clone()).unwrap_or_default(),
  );

  if ctx.has_windows_pool {
    vars.insert("windowsCustomScriptSuffix", WINDOWS_CUSTOM_SCRIPT_SUFFIX);
    vars.insert("winResourceNamePrefix", "[substring(parameters('nameSuffix'), 0, 5)]");
  }
  vars
}
