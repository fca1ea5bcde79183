//! The top-level provisioning workflow.
//!
//! A single provisioning attempt walks a fixed stage sequence:
//!
//! ```text
//!   Init → SeedBuilt → DiskBuilt → Imported
//!                 any failure ↓
//!                          Failed
//! ```
//!
//! Fail-fast, no retries: the first non-zero exit stops the workflow and
//! surfaces as a stage-tagged error. Re-invoking `provision` is the
//! caller's retry mechanism — the file-level steps are idempotent.
//!
//! Logging contract (preserved from the original design, including its
//! asymmetry): seed and disk output is *appended* to `vm.stdout`; an import
//! failure *overwrites* the log with the import command's own output; a
//! successful import captures nothing. The record is always saved before
//! an error propagates.
//!
//! Not reentrant per VM: concurrent runs on the same VM identity would race
//! on the workdir files and the log, so callers serialize them. Distinct
//! VMs provision fully independently.

use std::fmt;

use crate::disk;
use crate::error::MinivirtError;
use crate::model::{BaseImage, Vm, VmStatus};
use crate::process::{self, DEFAULT_TIMEOUT, Runner};
use crate::resolve::{self, Settings};
use crate::commands;
use crate::seed;
use crate::store::Store;

/// Which external step a provisioning failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Seed,
    Disk,
    Import,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Seed => "seed",
            Stage::Disk => "disk",
            Stage::Import => "import",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run the full workflow for one VM: fresh log, seed, disk, hypervisor
/// import. On success the VM is left `Running` with
/// `meta_data.txt`, `user_data.txt`, `seed.iso` and `os.img` in its
/// workdir; on failure it is left `Error` with the log persisted.
pub async fn provision<R: Runner>(
    vm: &mut Vm,
    image: &BaseImage,
    settings: &Settings,
    runner: &R,
    store: &dyn Store,
) -> Result<(), MinivirtError> {
    tracing::info!(vm = %vm.name, image = %image.name, "provisioning");

    // Init: each attempt starts with a fresh log.
    vm.stdout.clear();
    std::fs::create_dir_all(&vm.workdir).map_err(|e| MinivirtError::Io {
        context: format!("creating workdir {}", vm.workdir.display()),
        source: e,
    })?;

    match run_stages(vm, image, settings, runner, store).await {
        Ok(()) => {
            vm.status = VmStatus::Running;
            store.save_vm(vm)?;
            tracing::info!(vm = %vm.name, "provisioned");
            Ok(())
        }
        Err(err) => {
            vm.status = VmStatus::Error;
            // Persist log + status before surfacing; a save failure must
            // not mask the original error.
            if let Err(save_err) = store.save_vm(vm) {
                tracing::warn!(vm = %vm.name, error = %save_err, "failed to save VM record");
            }
            tracing::warn!(vm = %vm.name, error = %err, "provisioning failed");
            Err(err)
        }
    }
}

async fn run_stages<R: Runner>(
    vm: &mut Vm,
    image: &BaseImage,
    settings: &Settings,
    runner: &R,
    store: &dyn Store,
) -> Result<(), MinivirtError> {
    let resolved = resolve::resolve(vm, store, settings)?;

    seed::build_seed(vm, image, &resolved, runner, store).await?;
    disk::build_disk(vm, image, runner, store).await?;

    let out = runner
        .run(&commands::import(vm, image), DEFAULT_TIMEOUT)
        .await?;
    if !out.success() {
        // The import output is authoritative on failure: it replaces the
        // accumulated seed/disk log. On success it is not captured at all.
        vm.stdout = out.output;
        return Err(MinivirtError::Provision {
            stage: Stage::Import,
            message: process::last_line(&vm.stdout).to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DEFAULT_META_DATA_TEMPLATE, DEFAULT_USER_DATA_TEMPLATE,
    };
    use crate::paths;
    use crate::process::testing::{Scripted, ScriptedRunner};
    use crate::store::MemoryStore;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn fixture(dir: &Path) -> (Vm, BaseImage) {
        let base_path = dir.join("base.qcow2");
        std::fs::write(&base_path, b"base-image").unwrap();
        let vm = Vm {
            name: "web1".into(),
            image: "noble".into(),
            workdir: dir.join("web1"),
            ip: "192.168.122.10".into(),
            disk_size_gb: 20,
            cpus: 2,
            mem_gb: 4,
            config: BTreeMap::new(),
            status: VmStatus::Created,
            stdout: String::new(),
        };
        let image = BaseImage {
            name: "noble".into(),
            path: base_path,
            format: "qcow2".into(),
            ifname: "enp1s0".into(),
            hostname: "web1".into(),
            osvar: "ubuntu24.04".into(),
            config: BTreeMap::new(),
            meta_data_template: DEFAULT_META_DATA_TEMPLATE.into(),
            user_data_template: DEFAULT_USER_DATA_TEMPLATE.into(),
        };
        (vm, image)
    }

    fn settings() -> Settings {
        Settings::from_pairs(&[
            ("NETWORK", "192.168.122.0"),
            ("GATEWAY", "192.168.122.1"),
            ("BROADCAST", "192.168.122.255"),
            ("DNS1", "1.1.1.1"),
            ("DNS2", "8.8.8.8"),
            ("ALLOW_PASSWORD_AUTH", "true"),
            ("PASSWORD_EXPIRE", "false"),
        ])
    }

    #[tokio::test]
    async fn success_leaves_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let seed_iso = paths::seed_path(&vm.workdir);
        let runner = ScriptedRunner::new(vec![
            Scripted::ok("iso written\n").creating(seed_iso.clone()),
            Scripted::ok("Image resized.\n"),
            Scripted::ok("Starting install...\nDomain creation completed.\n"),
        ]);
        let store = MemoryStore::new();

        provision(&mut vm, &image, &settings(), &runner, &store)
            .await
            .unwrap();

        for artifact in ["meta_data.txt", "user_data.txt", "seed.iso", "os.img"] {
            assert!(vm.workdir.join(artifact).exists(), "missing {artifact}");
        }
        assert_eq!(vm.status, VmStatus::Running);
        // Log holds seed + disk output; import's success output is never
        // captured (documented contract).
        assert_eq!(vm.stdout, "iso written\nImage resized.\n");
        assert_eq!(store.saves().last().unwrap().0, VmStatus::Running);
    }

    #[tokio::test]
    async fn seed_failure_stops_before_disk_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let output = "sh: genisoimage: command not found\n";
        let runner = ScriptedRunner::new(vec![Scripted::fail(output, 127)]);
        let store = MemoryStore::new();

        let err = provision(&mut vm, &image, &settings(), &runner, &store)
            .await
            .unwrap_err();

        match err {
            MinivirtError::Provision { stage, message } => {
                assert_eq!(stage, Stage::Seed);
                assert_eq!(message, "sh: genisoimage: command not found");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(vm.status, VmStatus::Error);
        assert_eq!(vm.stdout, output);
        // Only the geniso command ran
        assert_eq!(runner.commands().len(), 1);
        assert!(!vm.img().exists());
        // Error state was persisted
        assert_eq!(store.saves().last().unwrap().0, VmStatus::Error);
    }

    #[tokio::test]
    async fn import_failure_overwrites_log_with_import_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let import_output = "Starting install...\nERROR unable to connect to libvirt\n";
        let runner = ScriptedRunner::new(vec![
            Scripted::ok("iso written\n").creating(paths::seed_path(&vm.workdir)),
            Scripted::ok("Image resized.\n"),
            Scripted::fail(import_output, 1),
        ]);
        let store = MemoryStore::new();

        let err = provision(&mut vm, &image, &settings(), &runner, &store)
            .await
            .unwrap_err();

        match err {
            MinivirtError::Provision { stage, message } => {
                assert_eq!(stage, Stage::Import);
                assert_eq!(message, "ERROR unable to connect to libvirt");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Seed/disk output is discarded — the import output is authoritative
        assert_eq!(vm.stdout, import_output);
        assert_eq!(vm.status, VmStatus::Error);
        assert_eq!(
            store.saves().last().unwrap().1,
            import_output,
            "overwritten log must be what was persisted"
        );
    }

    #[tokio::test]
    async fn each_attempt_starts_with_a_fresh_log() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let store = MemoryStore::new();

        let runner = ScriptedRunner::new(vec![Scripted::fail("first attempt failed\n", 1)]);
        let _ = provision(&mut vm, &image, &settings(), &runner, &store).await;
        assert!(vm.stdout.contains("first attempt"));

        let runner = ScriptedRunner::new(vec![
            Scripted::ok("second iso\n").creating(paths::seed_path(&vm.workdir)),
            Scripted::ok("second resize\n"),
            Scripted::ok(""),
        ]);
        provision(&mut vm, &image, &settings(), &runner, &store)
            .await
            .unwrap();
        assert!(!vm.stdout.contains("first attempt"));
        assert_eq!(vm.stdout, "second iso\nsecond resize\n");
    }

    #[tokio::test]
    async fn missing_config_key_fails_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let runner = ScriptedRunner::new(vec![]);
        let store = MemoryStore::new();

        let err = provision(&mut vm, &image, &Settings::default(), &runner, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, MinivirtError::MissingConfigKey { .. }));
        assert!(runner.commands().is_empty());
        assert_eq!(vm.status, VmStatus::Error);
    }
}
