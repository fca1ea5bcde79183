//! Per-VM disk preparation: clone the base image, grow it to size.

use crate::commands;
use crate::error::MinivirtError;
use crate::model::{BaseImage, Vm};
use crate::process::{self, DEFAULT_TIMEOUT, Runner};
use crate::provision::Stage;
use crate::store::Store;

/// Copy the base image to `<workdir>/os.img` and grow it by the VM's
/// requested capacity on top of the base image's native size.
///
/// The copy overwrites any previous clone, so re-provisioning is
/// idempotent at the file level.
pub async fn build_disk<R: Runner>(
    vm: &mut Vm,
    image: &BaseImage,
    runner: &R,
    store: &dyn Store,
) -> Result<(), MinivirtError> {
    let target = vm.img();
    std::fs::copy(&image.path, &target).map_err(|e| MinivirtError::Io {
        context: format!(
            "copying base image {} to {}",
            image.path.display(),
            target.display()
        ),
        source: e,
    })?;

    let out = runner
        .run(&commands::resize(&target, vm.disk_size_gb), DEFAULT_TIMEOUT)
        .await?;
    vm.stdout.push_str(&out.output);
    store.save_vm(vm)?;

    if !out.success() {
        return Err(MinivirtError::Provision {
            stage: Stage::Disk,
            message: process::last_line(&out.output).to_string(),
        });
    }

    tracing::info!(vm = %vm.name, path = %target.display(), "prepared disk image");
    Ok(())
}
