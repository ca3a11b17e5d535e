//! Kubelet paths for node-scoped health queries.
//!
//! Mirrors the kubelet's CSI layout:
//! - staging (global mount): `<root>/plugins/kubernetes.io/csi/pv/<pv>/globalmount`
//! - per-pod publish path:   `<root>/pods/<pod uid>/volumes/kubernetes.io~csi/<pv>/mount`

use super::BackendError;
use std::path::{Path, PathBuf};

pub const CSI_PLUGIN_NAME: &str = "kubernetes.io/csi";

const PLUGINS_DIR: &str = "plugins";
const PODS_DIR: &str = "pods";
const VOLUMES_DIR: &str = "volumes";
const PERSISTENT_VOLUME_IN_GLOBAL_PATH: &str = "pv";
const GLOBAL_MOUNT_IN_GLOBAL_PATH: &str = "globalmount";

/// Escape a qualified name for use as a single path component
#[must_use]
pub fn escape_qualified_name(name: &str) -> String {
    name.replace('/', "~")
}

/// Staging path the kubelet uses for a volume
///
/// # Errors
///
/// Returns [`BackendError::InvalidArgument`] if `pv_name` is empty.
pub fn device_mount_path(kubelet_root: &Path, pv_name: &str) -> Result<PathBuf, BackendError> {
    if pv_name.is_empty() {
        return Err(BackendError::InvalidArgument(
            "device mount path requires a volume name".into(),
        ));
    }
    Ok(kubelet_root
        .join(PLUGINS_DIR)
        .join(CSI_PLUGIN_NAME)
        .join(PERSISTENT_VOLUME_IN_GLOBAL_PATH)
        .join(pv_name)
        .join(GLOBAL_MOUNT_IN_GLOBAL_PATH))
}

/// Path at which a volume is published into a pod
#[must_use]
pub fn pod_volume_path(kubelet_root: &Path, pv_name: &str, pod_uid: &str) -> PathBuf {
    kubelet_root
        .join(PODS_DIR)
        .join(pod_uid)
        .join(VOLUMES_DIR)
        .join(escape_qualified_name(CSI_PLUGIN_NAME))
        .join(escape_qualified_name(pv_name))
        .join("mount")
}
