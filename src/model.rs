//! Records the provisioning workflow operates on.
//!
//! `BaseImage` and the cluster-wide config overrides are read-only to the
//! workflow; `Vm` is the mutable provisioning target. Editing these records
//! is an operator concern (the TOML config file) — the workflow only ever
//! reads images and writes back VM status + log.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ── Config keys ──────────────────────────────────────────

/// The fixed set of cluster-wide config keys substituted into cloud-init
/// templates. Declaration order is resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigKey {
    Network,
    Gateway,
    Broadcast,
    Dns1,
    Dns2,
    AllowPasswordAuth,
    PasswordExpire,
}

pub const CONFIG_KEYS: [ConfigKey; 7] = [
    ConfigKey::Network,
    ConfigKey::Gateway,
    ConfigKey::Broadcast,
    ConfigKey::Dns1,
    ConfigKey::Dns2,
    ConfigKey::AllowPasswordAuth,
    ConfigKey::PasswordExpire,
];

impl ConfigKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Network => "network",
            ConfigKey::Gateway => "gateway",
            ConfigKey::Broadcast => "broadcast",
            ConfigKey::Dns1 => "dns1",
            ConfigKey::Dns2 => "dns2",
            ConfigKey::AllowPasswordAuth => "allow_password_auth",
            ConfigKey::PasswordExpire => "password_expire",
        }
    }

    /// Parse the lowercase record name used in the `[overrides]` table.
    pub fn parse(s: &str) -> Option<Self> {
        CONFIG_KEYS.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Base images ──────────────────────────────────────────

/// Default network metadata template. Single-braced placeholders (`{iface}`,
/// `{hostname}` and the config keys) are resolved at seed-build time;
/// double-braced ones render to literal `{...}` and are left for cloud-init
/// to substitute at first boot.
pub const DEFAULT_META_DATA_TEMPLATE: &str = "\
instance-id: iid-local01
network-interfaces: |
  auto {iface}
  iface {iface} inet static
  address {{ip}}
  network {network}
  netmask 255.255.255.0
  gateway {gateway}
  broadcast {broadcast}
  dns-nameservers {dns1},{dns2}
hostname: {hostname}
";

/// Default user-data template, same two namespaces as the metadata one.
pub const DEFAULT_USER_DATA_TEMPLATE: &str = "\
#cloud-config
password: {{password}}
chpasswd: {{expire: {password_expire} }}
ssh_pwauth: {allow_password_auth}
ssh_authorized_keys:
  - {{ssh_keys}}
";

/// An immutable template for bootable disks. Shared read-only by any number
/// of VMs; a VM always references exactly one image.
#[derive(Debug, Clone)]
pub struct BaseImage {
    pub name: String,
    /// Path to the backing disk image file on the host.
    pub path: PathBuf,
    /// Disk image format, e.g. "qcow2".
    pub format: String,
    /// Guest network interface name substituted for `{iface}`.
    pub ifname: String,
    /// Guest hostname substituted for `{hostname}`.
    pub hostname: String,
    /// OS variant hint passed to the hypervisor import (`--osinfo name=`).
    pub osvar: String,
    /// Image-level config overrides (currently informational; per-VM
    /// overrides take the same shape and win).
    pub config: BTreeMap<String, String>,
    pub meta_data_template: String,
    pub user_data_template: String,
}

// ── VMs ──────────────────────────────────────────────────

/// Outward-visible lifecycle state. `Error` is reachable from any state
/// when a provisioning step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Created,
    Running,
    Shutdown,
    Error,
}

impl VmStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VmStatus::Created => "created",
            VmStatus::Running => "running",
            VmStatus::Shutdown => "shutdown",
            VmStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(VmStatus::Created),
            "running" => Some(VmStatus::Running),
            "shutdown" => Some(VmStatus::Shutdown),
            "error" => Some(VmStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioning target. Owns its working directory's seed/disk files.
///
/// Not reentrant: concurrent `provision()` runs on the same VM would race
/// on the workdir files and the `stdout` log, so callers must serialize
/// per VM identity.
#[derive(Debug, Clone)]
pub struct Vm {
    pub name: String,
    /// Name of the `BaseImage` this VM boots from.
    pub image: String,
    /// Per-VM scratch directory, created lazily on the first provisioning
    /// attempt. Unique per VM.
    pub workdir: PathBuf,
    pub ip: String,
    /// Extra disk capacity in GB, grown on top of the base image's native size.
    pub disk_size_gb: u32,
    pub cpus: u32,
    pub mem_gb: u32,
    /// Per-VM config overrides — always win over override records and
    /// static defaults.
    pub config: BTreeMap<String, String>,
    pub status: VmStatus,
    /// Combined output accumulated from provisioning commands. Reset at the
    /// start of each provisioning attempt.
    pub stdout: String,
}

impl Vm {
    /// Path to the per-VM disk clone.
    pub fn img(&self) -> PathBuf {
        crate::paths::disk_path(&self.workdir)
    }

    /// Path to the cloud-init seed ISO.
    pub fn seed(&self) -> PathBuf {
        crate::paths::seed_path(&self.workdir)
    }
}
