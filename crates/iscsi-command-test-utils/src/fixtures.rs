//! Canned requests, tool output, and fake `iscsi-ls` executables.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use iscsi_command_core::CommandRequest;

pub const PORTAL: &str = "192.168.1.100:3260";
pub const INITIATOR: &str = "iqn.1993-08.org.debian:01:abcdef";
pub const TARGET_IQN: &str = "iqn.2023-01.com.example";

/// Tool output listing [`TARGET_IQN`] with a single 10GB LUN.
pub const SINGLE_LUN_OUTPUT: &str = r#"[{"Target":"iqn.2023-01.com.example","Portals":["192.168.1.100:3260"],"LUNs":[{"LunID":0,"Size":"10GB","Vendor":"ACME","Product":"DISK","Serial":"XYZ"}]}]"#;

/// Tool output listing a target that is not [`TARGET_IQN`].
pub const OTHER_TARGET_OUTPUT: &str =
    r#"[{"Target":"other.iqn","Portals":["192.168.1.100:3260"],"LUNs":[]}]"#;

/// An `iscsi-ls` request for [`TARGET_IQN`] without credentials.
pub fn discovery_request() -> CommandRequest {
    CommandRequest::iscsi_ls(PORTAL, INITIATOR, TARGET_IQN)
}

/// Write an executable shell script named `iscsi-ls` into `dir` and return
/// its path. The script receives the same argv the real tool would.
pub fn fake_iscsi_ls(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("iscsi-ls");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write fake iscsi-ls");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to make fake iscsi-ls executable");
    path
}

/// A fake tool that prints `output` and exits 0.
pub fn fake_iscsi_ls_printing(dir: &Path, output: &str) -> PathBuf {
    fake_iscsi_ls(dir, &format!("cat <<'JSON'\n{output}\nJSON"))
}
