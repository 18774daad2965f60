//! Parsing of `iscsi-ls` JSON output.
//!
//! The tool prints an array of target records:
//!
//! ```json
//! [{"Target": "iqn.2023-01.com.example",
//!   "Portals": ["10.0.0.5"],
//!   "LUNs": [{"LunID": 0, "Size": "10GB", "Vendor": "ACME",
//!             "Product": "DISK", "Serial": "XYZ"}]}]
//! ```
//!
//! Missing fields and `null` lists take their zero value.

use serde::Deserialize;

use crate::ipc::types::LunInfo;

/// One target record as printed by the tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolTarget {
    #[serde(rename = "Target", alias = "target")]
    pub target: String,
    #[serde(rename = "Portals", alias = "portals")]
    pub portals: Option<Vec<String>>,
    #[serde(rename = "LUNs", alias = "luns")]
    pub luns: Option<Vec<ToolLun>>,
}

/// One LUN record in the tool's native field names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolLun {
    #[serde(rename = "LunID", alias = "lunId")]
    pub lun_id: u32,
    #[serde(rename = "Size", alias = "size")]
    pub size: String,
    #[serde(rename = "Vendor", alias = "vendor")]
    pub vendor: String,
    #[serde(rename = "Product", alias = "product")]
    pub product: String,
    #[serde(rename = "Serial", alias = "serial")]
    pub serial: String,
}

impl From<ToolLun> for LunInfo {
    fn from(lun: ToolLun) -> Self {
        LunInfo {
            lun_id: lun.lun_id,
            size: lun.size,
            vendor: lun.vendor,
            product: lun.product,
            serial: lun.serial,
        }
    }
}

/// Parse captured tool output. A top-level `null` is an empty list.
pub fn parse_targets(output: &[u8]) -> Result<Vec<ToolTarget>, serde_json::Error> {
    let targets: Option<Vec<ToolTarget>> = serde_json::from_slice(output)?;
    Ok(targets.unwrap_or_default())
}

/// LUNs of the first target whose identifier equals `target_iqn` exactly.
/// `None` when no target matches.
pub fn luns_for_target(targets: Vec<ToolTarget>, target_iqn: &str) -> Option<Vec<LunInfo>> {
    targets
        .into_iter()
        .find(|t| t.target == target_iqn)
        .map(|t| t.luns.unwrap_or_default().into_iter().map(LunInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_TARGETS: &str = r#"[
        {"Target": "iqn.2023-01.com.example:a", "Portals": ["10.0.0.5:3260"],
         "LUNs": [{"LunID": 0, "Size": "10GB", "Vendor": "ACME", "Product": "DISK", "Serial": "A0"}]},
        {"Target": "iqn.2023-01.com.example:b", "Portals": ["10.0.0.5:3260", "10.0.0.6:3260"],
         "LUNs": [
            {"LunID": 0, "Size": "1GB", "Vendor": "ACME", "Product": "DISK", "Serial": "B0"},
            {"LunID": 1, "Size": "2GB", "Vendor": "ACME", "Product": "DISK", "Serial": "B1"}
         ]}
    ]"#;

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets(TWO_TARGETS.as_bytes()).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].target, "iqn.2023-01.com.example:b");
        assert_eq!(targets[1].portals.as_ref().unwrap().len(), 2);
        assert_eq!(targets[1].luns.as_ref().unwrap()[1].serial, "B1");
    }

    #[test]
    fn test_select_matching_target() {
        let targets = parse_targets(TWO_TARGETS.as_bytes()).unwrap();
        let luns = luns_for_target(targets, "iqn.2023-01.com.example:b").unwrap();
        assert_eq!(luns.len(), 2);
        assert_eq!(
            luns[1],
            LunInfo {
                lun_id: 1,
                size: "2GB".to_string(),
                vendor: "ACME".to_string(),
                product: "DISK".to_string(),
                serial: "B1".to_string(),
            }
        );
    }

    #[test]
    fn test_match_is_exact() {
        let targets = parse_targets(TWO_TARGETS.as_bytes()).unwrap();
        assert!(luns_for_target(targets.clone(), "iqn.2023-01.com.example").is_none());
        assert!(luns_for_target(targets, "IQN.2023-01.COM.EXAMPLE:A").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let output = r#"[
            {"Target": "iqn.dup", "LUNs": [{"LunID": 1}]},
            {"Target": "iqn.dup", "LUNs": [{"LunID": 2}, {"LunID": 3}]}
        ]"#;
        let luns = luns_for_target(parse_targets(output.as_bytes()).unwrap(), "iqn.dup").unwrap();
        assert_eq!(luns.len(), 1);
        assert_eq!(luns[0].lun_id, 1);
    }

    #[test]
    fn test_null_and_missing_fields() {
        let output = r#"[{"Target": "iqn.t", "Portals": null, "LUNs": null}, {"Target": "iqn.u"}]"#;
        let targets = parse_targets(output.as_bytes()).unwrap();
        assert_eq!(luns_for_target(targets.clone(), "iqn.t").unwrap(), Vec::new());
        assert_eq!(luns_for_target(targets, "iqn.u").unwrap(), Vec::new());
    }

    #[test]
    fn test_top_level_null_is_empty() {
        assert!(parse_targets(b"null").unwrap().is_empty());
        assert!(parse_targets(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_output_is_error() {
        assert!(parse_targets(b"iscsi_connect: connection refused\n").is_err());
        assert!(parse_targets(b"").is_err());
        assert!(parse_targets(br#"{"Target": "iqn.t"}"#).is_err());
        assert!(parse_targets(br#"[{"Target": "iqn.t", "LUNs": [{"LunID": "zero"}]}]"#).is_err());
    }
}
