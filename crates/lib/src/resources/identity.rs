//! Managed identities, role assignments and the KMS key vault.

use serde_json::json;

use super::{ResourceKind, ResourceNode, copy_index, dependency};
use crate::expr;
use crate::model::AgentPoolProfile;
use crate::names::{PoolVar, pool_var};

/// Role granted to an identity over the resource group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRole {
  Contributor,
  Reader,
}

impl IdentityRole {
  fn definition(self) -> String {
    match self {
      IdentityRole::Contributor => expr::var_expr("contributorRoleDefinitionId"),
      IdentityRole::Reader => expr::var_expr("readerRoleDefinitionId"),
    }
  }
}

const USER_ASSIGNED_ID: &str = "[concat('Microsoft.ManagedIdentity/userAssignedIdentities/', variables('userAssignedID'))]";

/// The user-assigned identity the template creates.
pub fn user_assigned_identity() -> ResourceNode {
  ResourceNode::new(ResourceKind::UserAssignedIdentity, expr::var_expr("userAssignedID")).located()
}

/// Grant the user-assigned identity `role` over the resource group.
pub fn user_assigned_role_assignment(role: IdentityRole) -> ResourceNode {
  ResourceNode::new(
    ResourceKind::RoleAssignment,
    "[guid(concat(variables('userAssignedID'), 'roleAssignment', resourceGroup().id))]",
  )
  .api_version("apiVersionAuthorizationUser")
  .depends_on(USER_ASSIGNED_ID)
  .properties(json!({
    "principalId": "[reference(concat('Microsoft.ManagedIdentity/userAssignedIdentities/', variables('userAssignedID'))).principalId]",
    "principalType": "ServicePrincipal",
    "roleDefinitionId": role.definition(),
    "scope": "[resourceGroup().id]",
  }))
}

/// `principalId` of a resource's system-assigned identity.
fn system_principal(resource_args: &str) -> String {
  format!("[reference(concat({resource_args}), '2017-03-30', 'Full').identity.principalId]")
}

fn system_role(name: String, target: String, role: IdentityRole, principal_args: String) -> ResourceNode {
  ResourceNode::new(ResourceKind::RoleAssignment, name)
    .depends_on(target)
    .properties(json!({
      "principalId": system_principal(&principal_args),
      "principalType": "ServicePrincipal",
      "roleDefinitionId": role.definition(),
    }))
}

/// Contributor grant for each availability-set master's own identity.
pub fn master_system_role_assignment() -> ResourceNode {
  let prefix = expr::variable("masterVMNamePrefix");
  let offset = copy_index("masterOffset");
  let vm_type = expr::literal(&format!("{}/", ResourceKind::VirtualMachine.arm_type()));
  system_role(
    format!("[guid(concat({vm_type}, {prefix}, {offset}, 'vmidentity'))]"),
    dependency(ResourceKind::VirtualMachine, &[&prefix, &offset]),
    IdentityRole::Contributor,
    format!("{vm_type}, {prefix}, {offset}"),
  )
  .copy("vmLoopNode", "[sub(variables('masterCount'), variables('masterOffset'))]")
}

/// Reader grant for each VM of an availability-set agent pool.
pub fn agent_system_role_assignment(pool: &AgentPoolProfile) -> ResourceNode {
  let name = pool.name.as_str();
  let prefix = pool_var(name, PoolVar::VmNamePrefix).reference();
  let offset = copy_index(&pool_var(name, PoolVar::Offset).to_string());
  let vm_type = expr::literal(&format!("{}/", ResourceKind::VirtualMachine.arm_type()));
  system_role(
    format!("[guid(concat({vm_type}, {prefix}, {offset}, 'vmidentity'))]"),
    dependency(ResourceKind::VirtualMachine, &[&prefix, &offset]),
    IdentityRole::Reader,
    format!("{vm_type}, {prefix}, {offset}"),
  )
  .copy(
    "vmLoopNode",
    format!(
      "[sub({}, {})]",
      pool_var(name, PoolVar::Count).reference(),
      pool_var(name, PoolVar::Offset).reference()
    ),
  )
}

/// Reader grant for the identity of an agent scale set.
pub fn scale_set_system_role_assignment(pool: &AgentPoolProfile) -> ResourceNode {
  let prefix = pool_var(&pool.name, PoolVar::VmNamePrefix).reference();
  let vmss_type = expr::literal(&format!("{}/", ResourceKind::ScaleSet.arm_type()));
  system_role(
    format!("[guid(concat({vmss_type}, {prefix}, 'vmidentity'))]"),
    dependency(ResourceKind::ScaleSet, &[&prefix]),
    IdentityRole::Reader,
    format!("{vmss_type}, {prefix}"),
  )
}

// ============================================================================
// KMS
// ============================================================================

/// Key vault holding the cluster's KMS key.
///
/// The service principal gets key and secret management rights; the vault
/// is enabled for disk encryption and template deployment.
pub fn cluster_key_vault() -> ResourceNode {
  ResourceNode::new(ResourceKind::KeyVault, expr::var_expr("clusterKeyVaultName"))
    .located()
    .depends_on(dependency(
      ResourceKind::StorageAccount,
      &[&expr::variable("clusterKeyVaultName")],
    ))
    .properties(json!({
      "accessPolicies": [{
        "objectId": "[parameters('servicePrincipalObjectId')]",
        "permissions": {
          "keys": ["create", "decrypt", "encrypt", "get", "list"],
          "secrets": ["get", "list"],
        },
        "tenantId": "[variables('tenantId')]",
      }],
      "enabledForDeployment": false,
      "enabledForDiskEncryption": true,
      "enabledForTemplateDeployment": true,
      "sku": { "family": "A", "name": "[parameters('clusterKeyVaultSku')]" },
      "tenantId": "[variables('tenantId')]",
    }))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pool(name: &str) -> AgentPoolProfile {
    serde_json::from_str(&format!(r#"{{ "name": "{name}", "vmSize": "Standard_D2_v3" }}"#)).unwrap()
  }

  #[test]
  fn user_assigned_role_waits_on_identity() {
    let role = user_assigned_role_assignment(IdentityRole::Reader);
    assert_eq!(role.depends_on, vec![USER_ASSIGNED_ID]);
    assert_eq!(role.api_version, "[variables('apiVersionAuthorizationUser')]");
    assert_eq!(role.fields["properties"]["roleDefinitionId"], "[variables('readerRoleDefinitionId')]");
    assert_eq!(role.fields["properties"]["scope"], "[resourceGroup().id]");

    let identity = user_assigned_identity().to_json();
    assert_eq!(identity["type"], "Microsoft.ManagedIdentity/userAssignedIdentities");
    assert_eq!(identity["apiVersion"], "[variables('apiVersionManagedIdentity')]");
  }

  #[test]
  fn master_system_role_is_contributor_per_vm() {
    let role = master_system_role_assignment();
    assert_eq!(
      role.name,
      "[guid(concat('Microsoft.Compute/virtualMachines/', variables('masterVMNamePrefix'), copyIndex(variables('masterOffset')), 'vmidentity'))]"
    );
    assert_eq!(role.copy.as_ref().unwrap().name, "vmLoopNode");
    assert!(role.location.is_none());
    assert_eq!(
      role.fields["properties"]["principalId"],
      "[reference(concat('Microsoft.Compute/virtualMachines/', variables('masterVMNamePrefix'), copyIndex(variables('masterOffset'))), '2017-03-30', 'Full').identity.principalId]"
    );
    assert_eq!(role.api_version, "[variables('apiVersionAuthorizationSystem')]");
  }

  #[test]
  fn agent_system_roles_are_readers() {
    let vmas = agent_system_role_assignment(&pool("p"));
    assert_eq!(vmas.fields["properties"]["roleDefinitionId"], "[variables('readerRoleDefinitionId')]");
    assert_eq!(vmas.copy.as_ref().unwrap().count, "[sub(variables('pCount'), variables('pOffset'))]");

    let vmss = scale_set_system_role_assignment(&pool("p"));
    assert!(vmss.copy.is_none());
    assert_eq!(
      vmss.depends_on,
      vec!["[concat('Microsoft.Compute/virtualMachineScaleSets/', variables('pVMNamePrefix'))]"]
    );
  }

  #[test]
  fn key_vault_references_tenant_variable() {
    let vault = cluster_key_vault().to_json();
    assert_eq!(vault["type"], "Microsoft.KeyVault/vaults");
    assert_eq!(vault["properties"]["tenantId"], "[variables('tenantId')]");
    assert_eq!(vault["properties"]["sku"]["family"], "A");
    assert_eq!(vault["apiVersion"], "[variables('apiVersionKeyVault')]");
  }
}
