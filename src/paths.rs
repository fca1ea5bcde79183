use std::path::{Path, PathBuf};

/// Default per-VM work directory: `~/.local/share/minivirt/<name>/`
pub fn default_workdir(name: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("minivirt")
        .join(name)
}

/// Rendered cloud-init network metadata.
pub fn meta_data_path(workdir: &Path) -> PathBuf {
    workdir.join("meta_data.txt")
}

/// Rendered cloud-init user data.
pub fn user_data_path(workdir: &Path) -> PathBuf {
    workdir.join("user_data.txt")
}

/// Mastered cloud-init seed volume.
pub fn seed_path(workdir: &Path) -> PathBuf {
    workdir.join("seed.iso")
}

/// Per-VM clone of the base disk image.
pub fn disk_path(workdir: &Path) -> PathBuf {
    workdir.join("os.img")
}

/// Persisted provisioning log (the VM's accumulated `stdout`).
pub fn log_path(workdir: &Path) -> PathBuf {
    workdir.join("provision.log")
}

/// Persisted lifecycle status marker.
pub fn status_path(workdir: &Path) -> PathBuf {
    workdir.join("status")
}
