//! On-disk configuration: one TOML file holding the static defaults, the
//! operator override records, and the BaseImage/VM inventory.
//!
//! ```toml
//! [defaults]                # static settings, uppercase key names
//! NETWORK = "192.168.122.0"
//!
//! [overrides]               # cluster-wide Config records, lowercase keys
//! dns1 = "9.9.9.9"
//!
//! [images.noble]
//! path = "/var/lib/libvirt/images/noble.qcow2"
//! ifname = "enp1s0"
//! hostname = "noble"
//! osvar = "ubuntu24.04"
//!
//! [vms.web1]
//! image = "noble"
//! ip = "192.168.122.10"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::MinivirtError;
use crate::model::{
    BaseImage, ConfigKey, DEFAULT_META_DATA_TEMPLATE, DEFAULT_USER_DATA_TEMPLATE, Vm, VmStatus,
};
use crate::paths;
use crate::resolve::Settings;

// ── File schema ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct FileConfig {
    #[facet(default)]
    pub defaults: BTreeMap<String, String>,
    #[facet(default)]
    pub overrides: BTreeMap<String, String>,
    #[facet(default)]
    pub images: BTreeMap<String, ImageEntry>,
    #[facet(default)]
    pub vms: BTreeMap<String, VmEntry>,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ImageEntry {
    #[facet(default)]
    pub path: String,
    #[facet(default = "qcow2")]
    pub format: String,
    #[facet(default)]
    pub ifname: String,
    #[facet(default)]
    pub hostname: String,
    #[facet(default)]
    pub osvar: String,
    #[facet(default)]
    pub config: BTreeMap<String, String>,
    /// Empty means: use the built-in template.
    #[facet(default)]
    pub meta_data_template: String,
    #[facet(default)]
    pub user_data_template: String,
}

impl Default for ImageEntry {
    fn default() -> Self {
        Self {
            path: String::new(),
            format: "qcow2".into(),
            ifname: String::new(),
            hostname: String::new(),
            osvar: String::new(),
            config: BTreeMap::new(),
            meta_data_template: String::new(),
            user_data_template: String::new(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct VmEntry {
    #[facet(default)]
    pub image: String,
    #[facet(default)]
    pub ip: String,
    #[facet(default = 100)]
    pub disk_size_gb: u32,
    #[facet(default = 1)]
    pub cpu: u32,
    #[facet(default = 1)]
    pub mem_gb: u32,
    /// Empty means: the default per-VM data directory.
    #[facet(default)]
    pub workdir: String,
    #[facet(default)]
    pub config: BTreeMap<String, String>,
}

impl Default for VmEntry {
    fn default() -> Self {
        Self {
            image: String::new(),
            ip: String::new(),
            disk_size_gb: 100,
            cpu: 1,
            mem_gb: 1,
            workdir: String::new(),
            config: BTreeMap::new(),
        }
    }
}

// ── Loaded inventory ─────────────────────────────────────

/// The fully validated configuration: settings, override records, and the
/// image/VM inventory keyed by name.
pub struct Inventory {
    pub settings: Settings,
    pub overrides: BTreeMap<String, String>,
    pub images: BTreeMap<String, BaseImage>,
    pub vms: BTreeMap<String, Vm>,
}

impl Inventory {
    pub fn image_for(&self, vm: &Vm) -> Result<&BaseImage, MinivirtError> {
        self.images
            .get(&vm.image)
            .ok_or_else(|| MinivirtError::Validation {
                message: format!("VM '{}' references unknown image '{}'", vm.name, vm.image),
            })
    }
}

pub fn load_config(path: &Path) -> Result<Inventory, MinivirtError> {
    let contents = std::fs::read_to_string(path).map_err(|source| MinivirtError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: FileConfig =
        facet_toml::from_str(&contents).map_err(|e| MinivirtError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    validate(&config)?;
    Ok(build_inventory(config))
}

fn validate(config: &FileConfig) -> Result<(), MinivirtError> {
    for key in config.overrides.keys() {
        if ConfigKey::parse(key).is_none() {
            return Err(MinivirtError::Validation {
                message: format!("unknown config override key '{key}'"),
            });
        }
    }

    for (name, image) in &config.images {
        if name.is_empty() {
            return Err(MinivirtError::Validation {
                message: "image name must not be empty".into(),
            });
        }
        if image.path.is_empty() {
            return Err(MinivirtError::Validation {
                message: format!("image '{name}' has no path"),
            });
        }
    }

    for (name, vm) in &config.vms {
        if name.is_empty() {
            return Err(MinivirtError::Validation {
                message: "vm name must not be empty".into(),
            });
        }
        // A VM references exactly one existing image.
        if !config.images.contains_key(&vm.image) {
            return Err(MinivirtError::Validation {
                message: format!("vm '{}' references unknown image '{}'", name, vm.image),
            });
        }
        if vm.ip.is_empty() {
            return Err(MinivirtError::Validation {
                message: format!("vm '{name}' has no ip"),
            });
        }
    }

    Ok(())
}

fn build_inventory(config: FileConfig) -> Inventory {
    let images: BTreeMap<String, BaseImage> = config
        .images
        .into_iter()
        .map(|(name, e)| {
            let image = BaseImage {
                name: name.clone(),
                path: PathBuf::from(e.path),
                format: e.format,
                ifname: e.ifname,
                hostname: e.hostname,
                osvar: e.osvar,
                config: e.config,
                meta_data_template: if e.meta_data_template.is_empty() {
                    DEFAULT_META_DATA_TEMPLATE.into()
                } else {
                    e.meta_data_template
                },
                user_data_template: if e.user_data_template.is_empty() {
                    DEFAULT_USER_DATA_TEMPLATE.into()
                } else {
                    e.user_data_template
                },
            };
            (name, image)
        })
        .collect();

    let vms: BTreeMap<String, Vm> = config
        .vms
        .into_iter()
        .map(|(name, e)| {
            let workdir = if e.workdir.is_empty() {
                paths::default_workdir(&name)
            } else {
                PathBuf::from(e.workdir)
            };
            let vm = Vm {
                name: name.clone(),
                image: e.image,
                workdir,
                ip: e.ip,
                disk_size_gb: e.disk_size_gb,
                cpus: e.cpu,
                mem_gb: e.mem_gb,
                config: e.config,
                status: VmStatus::Created,
                stdout: String::new(),
            };
            (name, vm)
        })
        .collect();

    Inventory {
        settings: Settings::new(config.defaults),
        overrides: config.overrides,
        images,
        vms,
    }
}
