//! Cloud-init seed volume construction.

use std::collections::BTreeMap;

use crate::commands;
use crate::error::MinivirtError;
use crate::model::{BaseImage, Vm};
use crate::paths;
use crate::process::{self, DEFAULT_TIMEOUT, Runner};
use crate::provision::Stage;
use crate::store::Store;
use crate::template;

/// Render the image's metadata and user-data templates into the VM workdir
/// and master them into `seed.iso`.
///
/// The ISO tool's combined output is appended to `vm.stdout` and the record
/// saved whether or not the command succeeded; a non-zero exit surfaces the
/// last non-empty output line as the failure cause.
pub async fn build_seed<R: Runner>(
    vm: &mut Vm,
    image: &BaseImage,
    resolved: &BTreeMap<String, String>,
    runner: &R,
    store: &dyn Store,
) -> Result<(), MinivirtError> {
    // One substitution namespace: the flat config map plus the image-level
    // static fields.
    let mut subs = resolved.clone();
    subs.insert("iface".into(), image.ifname.clone());
    subs.insert("hostname".into(), image.hostname.clone());

    let meta_data = template::render(&image.meta_data_template, &subs)?;
    template::write(&paths::meta_data_path(&vm.workdir), &meta_data)?;

    let user_data = template::render(&image.user_data_template, &subs)?;
    template::write(&paths::user_data_path(&vm.workdir), &user_data)?;

    let out = runner
        .run(&commands::geniso(&vm.workdir), DEFAULT_TIMEOUT)
        .await?;
    vm.stdout.push_str(&out.output);
    store.save_vm(vm)?;

    if !out.success() {
        return Err(MinivirtError::Provision {
            stage: Stage::Seed,
            message: process::last_line(&out.output).to_string(),
        });
    }

    tracing::info!(vm = %vm.name, path = %vm.seed().display(), "built cloud-init seed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DEFAULT_META_DATA_TEMPLATE, DEFAULT_USER_DATA_TEMPLATE, VmStatus,
    };
    use crate::process::testing::{Scripted, ScriptedRunner};
    use crate::store::MemoryStore;
    use std::path::Path;

    fn fixture(workdir: &Path) -> (Vm, BaseImage) {
        let vm = Vm {
            name: "web1".into(),
            image: "noble".into(),
            workdir: workdir.to_path_buf(),
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
            path: workdir.join("base.qcow2"),
            format: "qcow2".into(),
            ifname: "enp1s0".into(),
            hostname: "web1.internal".into(),
            osvar: "ubuntu24.04".into(),
            config: BTreeMap::new(),
            meta_data_template: DEFAULT_META_DATA_TEMPLATE.into(),
            user_data_template: DEFAULT_USER_DATA_TEMPLATE.into(),
        };
        (vm, image)
    }

    fn resolved() -> BTreeMap<String, String> {
        [
            ("network", "192.168.122.0"),
            ("gateway", "192.168.122.1"),
            ("broadcast", "192.168.122.255"),
            ("dns1", "1.1.1.1"),
            ("dns2", "8.8.8.8"),
            ("allow_password_auth", "true"),
            ("password_expire", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn renders_both_files_and_masters_iso() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let runner = ScriptedRunner::new(vec![
            Scripted::ok("ISO image produced\n").creating(vm.seed()),
        ]);

        build_seed(&mut vm, &image, &resolved(), &runner, &MemoryStore::new())
            .await
            .unwrap();

        let meta = std::fs::read_to_string(paths::meta_data_path(&vm.workdir)).unwrap();
        assert!(meta.contains("auto enp1s0"));
        assert!(meta.contains("hostname: web1.internal"));
        assert!(meta.contains("address {ip}")); // inner namespace untouched

        let user = std::fs::read_to_string(paths::user_data_path(&vm.workdir)).unwrap();
        assert!(user.contains("ssh_pwauth: true"));
        assert!(user.contains("password: {password}"));

        assert!(vm.seed().exists());
        let cmds = runner.commands();
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].starts_with("genisoimage -output"));
        assert!(cmds[0].contains("-volid cidata -joliet -rock"));
    }

    #[tokio::test]
    async fn appends_output_without_clobbering_log() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        vm.stdout = "earlier output\n".into();
        let runner = ScriptedRunner::new(vec![Scripted::ok("iso done\n")]);

        build_seed(&mut vm, &image, &resolved(), &runner, &MemoryStore::new())
            .await
            .unwrap();

        assert_eq!(vm.stdout, "earlier output\niso done\n");
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let (mut vm, image) = fixture(dir.path());
        let store = MemoryStore::new();
        let runner = ScriptedRunner::new(vec![Scripted::fail(
            "sh: genisoimage: command not found\n",
            127,
        )]);

        let err = build_seed(&mut vm, &image, &resolved(), &runner, &store)
            .await
            .unwrap_err();

        match err {
            MinivirtError::Provision { stage, message } => {
                assert_eq!(stage, Stage::Seed);
                assert_eq!(message, "sh: genisoimage: command not found");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Output was captured and saved before the error propagated
        assert!(vm.stdout.contains("command not found"));
        assert_eq!(store.saves().len(), 1);
    }
}
