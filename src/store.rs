//! Record store collaborator.
//!
//! The provisioning workflow needs exactly two things from persistence:
//! look up a cluster-wide config override by key, and save a VM record's
//! status + accumulated log. The workflow always saves before an error
//! propagates, so operators can inspect partial progress after a failure.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::MinivirtError;
use crate::model::{ConfigKey, Vm, VmStatus};
use crate::paths;

pub trait Store: Send + Sync {
    /// Cluster-wide override record for `key`, if one exists.
    fn config_value(&self, key: ConfigKey) -> Option<String>;

    /// Persist the VM's status and log.
    fn save_vm(&self, vm: &Vm) -> Result<(), MinivirtError>;
}

// ── Filesystem store ─────────────────────────────────────

/// Artifact-backed store: override records come from the loaded config
/// file, VM state is persisted as `status` and `provision.log` files in
/// the VM's own working directory.
pub struct FsStore {
    overrides: BTreeMap<String, String>,
}

impl FsStore {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        FsStore { overrides }
    }
}

impl Store for FsStore {
    fn config_value(&self, key: ConfigKey) -> Option<String> {
        self.overrides.get(key.as_str()).cloned()
    }

    fn save_vm(&self, vm: &Vm) -> Result<(), MinivirtError> {
        std::fs::create_dir_all(&vm.workdir).map_err(|e| MinivirtError::Io {
            context: format!("creating workdir {}", vm.workdir.display()),
            source: e,
        })?;
        let status_path = paths::status_path(&vm.workdir);
        std::fs::write(&status_path, vm.status.as_str()).map_err(|e| MinivirtError::Io {
            context: format!("writing {}", status_path.display()),
            source: e,
        })?;
        let log_path = paths::log_path(&vm.workdir);
        std::fs::write(&log_path, &vm.stdout).map_err(|e| MinivirtError::Io {
            context: format!("writing {}", log_path.display()),
            source: e,
        })?;
        Ok(())
    }
}

/// Read back a persisted status marker, if the VM has ever been saved.
pub fn load_status(vm: &Vm) -> Option<VmStatus> {
    let text = std::fs::read_to_string(paths::status_path(&vm.workdir)).ok()?;
    VmStatus::parse(text.trim())
}

// ── In-memory store ──────────────────────────────────────

/// In-memory store for embedding and tests. Records every `save_vm` call
/// so the save-before-error contract is observable.
#[derive(Default)]
pub struct MemoryStore {
    overrides: BTreeMap<String, String>,
    saves: Mutex<Vec<(VmStatus, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, key: ConfigKey, value: &str) -> Self {
        self.overrides.insert(key.as_str().into(), value.into());
        self
    }

    /// Snapshots of (status, stdout) at each save, oldest first.
    pub fn saves(&self) -> Vec<(VmStatus, String)> {
        self.saves.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Store for MemoryStore {
    fn config_value(&self, key: ConfigKey) -> Option<String> {
        self.overrides.get(key.as_str()).cloned()
    }

    fn save_vm(&self, vm: &Vm) -> Result<(), MinivirtError> {
        self.saves
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((vm.status, vm.stdout.clone()));
        Ok(())
    }
}
