//! Resource bundles of representative cluster shapes.

use serde_json::json;

use super::common::*;

// =============================================================================
// Single master, availability-set pool
// =============================================================================

mod single_master {
  use super::*;

  #[test]
  fn emits_master_bundle() {
    let t = generate_fixture("single_master.json");

    assert_eq!(of_type(&t, VM).len(), 2, "one master VM loop and one agent VM loop");
    assert_eq!(of_type(&t, NIC).len(), 2);
    assert_eq!(of_type(&t, VNET).len(), 1);
    assert_eq!(of_type(&t, NSG).len(), 1);
    assert!(has_resource(&t, AVSET, "[variables('masterAvailabilitySet')]"));
    assert!(has_resource(&t, PUBLIC_IP, "[variables('masterPublicIPAddressName')]"));
    assert!(has_resource(&t, LB, "[variables('masterLbName')]"));
    assert!(has_resource(&t, ROUTE_TABLE, "[variables('routeTableName')]"));
    assert!(of_type(&t, VMSS).is_empty());
  }

  #[test]
  fn billing_and_provisioning_extensions_per_vm_loop() {
    let t = generate_fixture("single_master.json");
    let extensions = of_type(&t, EXTENSION);
    assert_eq!(extensions.len(), 4);

    let billing = extensions.iter().filter(|e| e.name.contains("computeAksLinuxBilling")).count();
    let cse = extensions.iter().filter(|e| e.name.contains("'/cse'")).count();
    assert_eq!(billing, 2);
    assert_eq!(cse, 2);
  }

  #[test]
  fn agents_come_before_control_plane() {
    let t = generate_fixture("single_master.json");
    let agent_avset = position(&t, AVSET, "[variables('agentpool1AvailabilitySet')]").unwrap();
    let master_avset = position(&t, AVSET, "[variables('masterAvailabilitySet')]").unwrap();
    assert!(agent_avset < master_avset);
  }

  #[test]
  fn primary_set_is_the_pool_availability_set() {
    let t = generate_fixture("single_master.json");
    assert_eq!(
      var_str(&t, "primaryAvailabilitySetName"),
      "[concat('agentpool1-availabilitySet-',parameters('nameSuffix'))]"
    );
    assert_eq!(var_str(&t, "primaryScaleSetName"), "");
  }
}

// =============================================================================
// Master scale set
// =============================================================================

mod master_scale_set {
  use super::*;

  #[test]
  fn emits_scale_sets_and_no_per_vm_resources() {
    let t = generate_fixture("master_scale_set.json");

    assert_eq!(of_type(&t, VMSS).len(), 2);
    assert!(has_resource(&t, VMSS, "[concat(variables('masterVMNamePrefix'), 'vmss')]"));
    assert!(of_type(&t, VM).is_empty());
    assert!(of_type(&t, NIC).is_empty());
    assert!(of_type(&t, AVSET).is_empty());
    assert!(has_resource(&t, LB, "[variables('masterLbName')]"));
    assert!(has_resource(&t, PUBLIC_IP, "[variables('masterPublicIPAddressName')]"));
    assert_eq!(of_type(&t, NSG).len(), 1);
  }

  #[test]
  fn vnet_has_master_and_agent_subnets() {
    let t = generate_fixture("master_scale_set.json");
    let vnets = of_type(&t, VNET);
    assert_eq!(vnets.len(), 1);

    let subnets = vnets[0].to_json()["properties"]["subnets"].clone();
    let names: Vec<_> = subnets
      .as_array()
      .unwrap()
      .iter()
      .map(|s| s["name"].as_str().unwrap().to_string())
      .collect();
    assert_eq!(names, vec!["subnetmaster", "subnetagent"]);
  }

  #[test]
  fn primary_set_is_the_pool_scale_set() {
    let t = generate_fixture("master_scale_set.json");
    assert_eq!(var_str(&t, "primaryAvailabilitySetName"), "");
    assert!(!var_str(&t, "primaryScaleSetName").is_empty());
  }
}

// =============================================================================
// Private cluster with jumpbox
// =============================================================================

mod private_jumpbox {
  use super::*;

  #[test]
  fn emits_jumpbox_bundle() {
    let t = generate_fixture("private_jumpbox.json");

    assert!(has_resource(&t, VM, "[parameters('jumpboxVMName')]"));
    assert!(has_resource(&t, NIC, "[variables('jumpboxNetworkInterfaceName')]"));
    assert!(has_resource(&t, NSG, "[variables('jumpboxNetworkSecurityGroupName')]"));
    assert!(has_resource(&t, PUBLIC_IP, "[variables('jumpboxPublicIpAddressName')]"));
    assert!(has_resource(&t, STORAGE, "[variables('jumpboxStorageAccountName')]"));
  }

  #[test]
  fn basic_private_master_has_no_public_endpoint() {
    let t = generate_fixture("private_jumpbox.json");
    assert!(!has_resource(&t, LB, "[variables('masterLbName')]"));
    assert_eq!(of_type(&t, PUBLIC_IP).len(), 1, "only the jumpbox is public");
    assert_eq!(
      var_str(&t, "kubeconfigServer"),
      "[concat('https://', variables('kubernetesAPIServerIP'), ':443')]"
    );
  }

  #[test]
  fn jumpbox_storage_enables_storage_variables() {
    let t = generate_fixture("private_jumpbox.json");
    assert!(t.variables.contains("vmSizesMap"));
    assert!(
      !t.variables.get("storageAccountPrefixes").unwrap().as_array().unwrap().is_empty(),
      "jumpbox on a storage account needs the prefix table"
    );
  }
}

// =============================================================================
// Three masters
// =============================================================================

mod three_masters {
  use super::*;

  #[test]
  fn internal_load_balancer_variables_present() {
    let t = generate_fixture("three_masters.json");
    for key in [
      "masterInternalLbName",
      "masterInternalLbID",
      "masterInternalLbIPConfigName",
      "masterInternalLbIPConfigID",
      "masterInternalLbIPOffset",
    ] {
      assert!(t.variables.contains(key), "missing {}", key);
    }
    assert!(has_resource(&t, LB, "[variables('masterInternalLbName')]"));
  }

  #[test]
  fn api_server_ip_is_internal_lb_offset() {
    let t = generate_fixture("three_masters.json");
    assert_eq!(
      var_str(&t, "kubernetesAPIServerIP"),
      "[concat(variables('masterFirstAddrPrefix'), add(variables('masterInternalLbIPOffset'), int(variables('masterFirstAddrOctet4'))))]"
    );
  }

  #[test]
  fn single_master_uses_static_ip_parameter() {
    let t = generate_fixture("single_master.json");
    assert_eq!(var_str(&t, "kubernetesAPIServerIP"), "[parameters('firstConsecutiveStaticIP')]");
    assert!(!t.variables.contains("masterInternalLbName"));
  }
}

// =============================================================================
// Storage account disks and external KMS
// =============================================================================

mod storage_and_kms {
  use super::*;

  #[test]
  fn key_vault_precedes_master_vm() {
    let t = generate_fixture("five_masters_storage_account.json");
    let vault = position(&t, KEY_VAULT, "[variables('clusterKeyVaultName')]").unwrap();
    let vault_account = position(&t, STORAGE, "[variables('clusterKeyVaultName')]").unwrap();
    let master_vm = t
      .resources
      .iter()
      .position(|r| r.resource_type() == VM && r.name.contains("masterVMNamePrefix"))
      .unwrap();
    assert!(vault_account < vault);
    assert!(vault < master_vm);
  }

  #[test]
  fn master_storage_account_emitted() {
    let t = generate_fixture("five_masters_storage_account.json");
    assert!(has_resource(&t, STORAGE, "[variables('masterStorageAccountName')]"));
    assert!(t.variables.contains("masterStorageAccountName"));
    assert!(of_type(&t, STORAGE).len() >= 3);
  }
}

// =============================================================================
// Custom cloud
// =============================================================================

mod custom_cloud {
  use super::*;

  #[test]
  fn legacy_api_versions() {
    let t = generate_fixture("custom_cloud.json");
    assert_eq!(var_str(&t, "apiVersionCompute"), "2017-03-30");
    assert_eq!(var_str(&t, "apiVersionStorage"), "2017-10-01");
    assert_eq!(var_str(&t, "apiVersionNetwork"), "2017-10-01");
    assert_eq!(var_str(&t, "apiVersionKeyVault"), "2016-10-01");
  }

  #[test]
  fn environment_and_auth_settings() {
    let t = generate_fixture("custom_cloud.json");
    let environment: serde_json::Value = serde_json::from_str(var_str(&t, "environmentJSON")).unwrap();
    assert_eq!(environment["name"], "AzureStackCloud");
    assert!(!var_str(&t, "provisionConfigsCustomCloud").is_empty());
    assert_eq!(var_str(&t, "customCloudAuthenticationMethod"), "client_certificate");
    assert_eq!(var_str(&t, "customCloudIdentifySystem"), "adfs");
  }

  #[test]
  fn telemetry_deployment_comes_first() {
    let t = generate_fixture("custom_cloud.json");
    let first = t.resources[0].to_json();
    assert_eq!(first["type"], DEPLOYMENT);
    assert_eq!(first["name"], "pid-3f1c");
    assert_eq!(first["properties"]["template"]["resources"], json!([]));
  }

  #[test]
  fn no_billing_extensions() {
    let t = generate_fixture("custom_cloud.json");
    assert!(
      of_type(&t, EXTENSION)
        .iter()
        .all(|e| !e.name.contains("computeAksLinuxBilling"))
    );
  }

  #[test]
  fn public_cloud_defaults() {
    let t = generate_fixture("single_master.json");
    assert_eq!(var_str(&t, "apiVersionCompute"), "2019-07-01");
    assert_eq!(var_str(&t, "customCloudAuthenticationMethod"), "client_secret");
    assert_eq!(var_str(&t, "customCloudIdentifySystem"), "azure_ad");
    assert!(!t.variables.contains("environmentJSON"));
    assert!(of_type(&t, DEPLOYMENT).is_empty());
  }
}

// =============================================================================
// Windows custom image
// =============================================================================

mod windows_image {
  use super::*;

  #[test]
  fn image_precedes_pool_compute() {
    let t = generate_fixture("windows_image.json");
    let image = position(&t, IMAGE, "winpoolCustomWindowsImage").unwrap();
    let vm = t
      .resources
      .iter()
      .position(|r| r.resource_type() == VM && r.name.contains("winpoolVMNamePrefix"))
      .unwrap();
    assert!(image < vm);
    assert_eq!(of_type(&t, IMAGE).len(), 1);
  }

  #[test]
  fn pool_references_image_by_resource_id() {
    let t = generate_fixture("windows_image.json");
    let vm = t
      .resources
      .iter()
      .find(|r| r.resource_type() == VM && r.name.contains("winpoolVMNamePrefix"))
      .unwrap()
      .to_json();
    assert_eq!(
      vm["properties"]["storageProfile"]["imageReference"]["id"],
      "[resourceId('Microsoft.Compute/images', 'winpoolCustomWindowsImage')]"
    );
  }

  #[test]
  fn windows_extensions_use_custom_script_extension() {
    let t = generate_fixture("windows_image.json");
    let cse = of_type(&t, EXTENSION)
      .into_iter()
      .find(|e| e.name.contains("winpoolVMNamePrefix") && e.name.contains("'/cse'"))
      .unwrap()
      .to_json();
    assert_eq!(cse["properties"]["type"], "CustomScriptExtension");
  }
}

// =============================================================================
// Hosted control plane
// =============================================================================

mod hosted {
  use super::*;

  #[test]
  fn identity_resources_come_first() {
    let t = generate_fixture("hosted.json");
    assert_eq!(t.resources[0].resource_type(), IDENTITY);
    assert_eq!(t.resources[0].name, "[variables('userAssignedID')]");
    assert_eq!(t.resources[1].resource_type(), "Microsoft.Authorization/roleAssignments");
  }

  #[test]
  fn no_control_plane_compute() {
    let t = generate_fixture("hosted.json");
    assert!(of_type(&t, VM).is_empty());
    assert!(of_type(&t, LB).is_empty());
    assert_eq!(of_type(&t, VMSS).len(), 1);
    assert!(has_resource(&t, NSG, "[variables('nsgName')]"));
    assert!(has_resource(&t, VNET, "[variables('virtualNetworkName')]"));
  }

  #[test]
  fn api_server_comes_from_parameter() {
    let t = generate_fixture("hosted.json");
    assert_eq!(var_str(&t, "kubernetesAPIServerIP"), "[parameters('kubernetesEndpoint')]");
    assert!(!t.variables.contains("masterVMNamePrefix"));
  }
}

// =============================================================================
// Custom VNet
// =============================================================================

mod custom_vnet {
  use super::*;

  #[test]
  fn master_subnet_passes_through() {
    let t = generate_fixture("custom_vnet.json");
    assert_eq!(var_str(&t, "vnetSubnetID"), "[parameters('masterVnetSubnetID')]");
    assert!(!t.variables.contains("vnetSubnetIDMaster"));
    assert!(!t.variables.contains("vnetID"));
    assert_eq!(
      var_str(&t, "virtualNetworkName"),
      "[split(parameters('masterVnetSubnetID'), '/')[variables('vnetNameResourceSegmentIndex')]]"
    );
    assert_eq!(
      var_str(&t, "virtualNetworkResourceGroupName"),
      "[split(parameters('masterVnetSubnetID'), '/')[variables('vnetResourceGroupNameResourceSegmentIndex')]]"
    );
    assert_eq!(var_str(&t, "subnetName"), "mastersubnet");
  }

  #[test]
  fn pools_read_their_own_subnet() {
    let t = generate_fixture("custom_vnet.json");
    assert_eq!(
      var_str(&t, "agentpool1VnetSubnetID"),
      "[parameters('agentpool1VnetSubnetID')]"
    );
  }

  #[test]
  fn vnet_is_not_emitted() {
    let t = generate_fixture("custom_vnet.json");
    assert!(of_type(&t, VNET).is_empty());
    assert!(has_resource(&t, NSG, "[variables('nsgName')]"));
    assert!(has_resource(&t, ROUTE_TABLE, "[variables('routeTableName')]"));
  }

  #[test]
  fn nics_attach_the_security_group_and_wait_on_it() {
    let t = generate_fixture("custom_vnet.json");
    for nic in of_type(&t, NIC) {
      assert_eq!(nic.depends_on[0], "[variables('nsgID')]", "{}", nic.name);
      assert_eq!(nic.to_json()["properties"]["networkSecurityGroup"]["id"], "[variables('nsgID')]");
    }
  }

  #[test]
  fn provisioning_names_the_existing_network() {
    let t = generate_fixture("custom_vnet.json");
    let common = var_str(&t, "provisionScriptParametersCommon");
    assert!(common.contains(" SUBNET=mastersubnet "));
    assert!(common.contains(" VIRTUAL_NETWORK=customvnet "));
    assert!(common.contains(" VIRTUAL_NETWORK_RESOURCE_GROUP=netrg "));
  }

  #[test]
  fn scale_set_masters_split_master_and_agent_subnets() {
    let t = generate_fixture("custom_vnet_scale_set.json");
    assert_eq!(var_str(&t, "vnetSubnetID"), "[parameters('agentVnetSubnetID')]");
    assert_eq!(var_str(&t, "vnetSubnetIDMaster"), "[parameters('masterVnetSubnetID')]");
    assert!(!t.variables.contains("vnetID"));
    assert!(of_type(&t, VNET).is_empty());
    assert!(has_resource(&t, NSG, "[variables('nsgName')]"));

    let master = t
      .resources
      .iter()
      .find(|r| r.resource_type() == VMSS && r.name.contains("masterVMNamePrefix"))
      .unwrap();
    assert_eq!(master.depends_on[0], "[variables('nsgID')]");
    let serialized = serde_json::to_string(&master.to_json()).unwrap();
    assert!(serialized.contains("[variables('vnetSubnetIDMaster')]"));
  }
}
