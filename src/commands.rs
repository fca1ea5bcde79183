//! External tool command lines.
//!
//! Every command line minivirt hands to the shell is built here, so the
//! format strings and their escaping are auditable in one place.

use std::path::Path;

use crate::model::{BaseImage, Vm};
use crate::paths;

/// Master the cloud-init seed volume: fixed volume id `cidata`, Joliet and
/// Rock Ridge extensions, the two rendered files as input.
pub fn geniso(workdir: &Path) -> String {
    format!(
        "genisoimage -output {} -volid cidata -joliet -rock {} {}",
        paths::seed_path(workdir).display(),
        paths::meta_data_path(workdir).display(),
        paths::user_data_path(workdir).display(),
    )
}

/// Grow the cloned disk by `extra_gb` beyond its current size.
pub fn resize(img: &Path, extra_gb: u32) -> String {
    format!("qemu-img resize {} +{}GB", img.display(), extra_gb)
}

/// Import the prepared disk + seed as a new domain. Memory is configured
/// in GB on the VM record but virt-install takes MB. `--noautoconsole`
/// keeps the invocation non-interactive.
pub fn import(vm: &Vm, image: &BaseImage) -> String {
    format!(
        "virt-install --import --name={} --memory={} --vcpus={} \
         --disk {},format={},bus=virtio --disk {},device=cdrom \
         --osinfo detect=on,name={} --noautoconsole",
        vm.name,
        vm.mem_gb * 1024,
        vm.cpus,
        vm.img().display(),
        image.format,
        vm.seed().display(),
        image.osvar,
    )
}
