//! Scalar and string helpers shared by the deriver and the builders.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

pub const STANDARD_LRS: &str = "Standard_LRS";
pub const PREMIUM_LRS: &str = "Premium_LRS";

/// Base64-encode an assembled script body.
pub fn encode_script(raw: &str) -> String {
  STANDARD.encode(raw.as_bytes())
}

/// Storage class for a VM size from an externally supplied table.
///
/// Sizes missing from the table are resolved at deploy time through the
/// `vmSizesMap` variable instead of failing here.
pub fn lookup_storage_account_type(vm_size: &str, table: &BTreeMap<String, String>) -> String {
  match table.get(vm_size) {
    Some(class) => class.clone(),
    None => format!(
      "[variables('vmSizesMap')['{}'].storageAccountType]",
      escape_single_quotes(vm_size)
    ),
  }
}

/// Storage class implied by a size name.
///
/// Premium-capable sizes carry an `s` in the family segment after the first
/// underscore (`Standard_DS2_v2`, `Standard_D4s_v3`).
pub fn storage_account_type_for_size(vm_size: &str) -> &'static str {
  let family = vm_size.split('_').nth(1).unwrap_or("");
  if family.to_ascii_lowercase().contains('s') {
    PREMIUM_LRS
  } else {
    STANDARD_LRS
  }
}

/// Sizes the generator knows ahead of time.
const KNOWN_VM_SIZES: &[&str] = &[
  "Standard_A0",
  "Standard_A1",
  "Standard_A1_v2",
  "Standard_A2",
  "Standard_A2_v2",
  "Standard_A2m_v2",
  "Standard_A4",
  "Standard_A4_v2",
  "Standard_A4m_v2",
  "Standard_A8_v2",
  "Standard_A8m_v2",
  "Standard_B1ms",
  "Standard_B1s",
  "Standard_B2ms",
  "Standard_B2s",
  "Standard_B4ms",
  "Standard_B8ms",
  "Standard_D1_v2",
  "Standard_D2_v2",
  "Standard_D2_v3",
  "Standard_D2s_v3",
  "Standard_D3_v2",
  "Standard_D4_v2",
  "Standard_D4_v3",
  "Standard_D4s_v3",
  "Standard_D8_v3",
  "Standard_D8s_v3",
  "Standard_D16_v3",
  "Standard_D16s_v3",
  "Standard_D32_v3",
  "Standard_D32s_v3",
  "Standard_D64_v3",
  "Standard_D64s_v3",
  "Standard_DC2s",
  "Standard_DC4s",
  "Standard_DS1_v2",
  "Standard_DS2_v2",
  "Standard_DS3_v2",
  "Standard_DS4_v2",
  "Standard_DS5_v2",
  "Standard_E2_v3",
  "Standard_E2s_v3",
  "Standard_E4_v3",
  "Standard_E4s_v3",
  "Standard_E8_v3",
  "Standard_E8s_v3",
  "Standard_E16_v3",
  "Standard_E16s_v3",
  "Standard_F2",
  "Standard_F2s",
  "Standard_F2s_v2",
  "Standard_F4",
  "Standard_F4s",
  "Standard_F4s_v2",
  "Standard_F8s_v2",
  "Standard_F16s_v2",
  "Standard_GS1",
  "Standard_GS2",
  "Standard_L4s",
  "Standard_L8s",
  "Standard_L8s_v2",
  "Standard_M64s",
  "Standard_M128s",
  "Standard_NC6",
  "Standard_NC6s_v2",
  "Standard_NC6s_v3",
  "Standard_NC12",
  "Standard_NC24",
  "Standard_ND6s",
  "Standard_NV6",
  "Standard_NV12s_v3",
];

/// The static size registry as a size to storage class table.
pub fn vm_size_table() -> BTreeMap<String, String> {
  KNOWN_VM_SIZES
    .iter()
    .map(|size| (size.to_string(), storage_account_type_for_size(size).to_string()))
    .collect()
}

/// The `vmSizesMap` variable value: `{ size: { "storageAccountType": class } }`.
pub fn vm_sizes_map() -> Value {
  let map: Map<String, Value> = vm_size_table()
    .into_iter()
    .map(|(size, class)| (size, json!({ "storageAccountType": class })))
    .collect();
  Value::Object(map)
}

/// Trim surrounding whitespace from each SSH public key.
pub fn trim_ssh_keys(keys: &[String]) -> Vec<String> {
  keys.iter().map(|key| key.trim().to_string()).collect()
}

/// Double single quotes so text can sit inside a quoted expression literal.
pub fn escape_single_quotes(text: &str) -> String {
  text.replace('\'', "''")
}
