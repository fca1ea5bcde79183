use clap::Parser;
use tracing_subscriber::EnvFilter;

use minivirt::cli::{Cli, Command};
use minivirt::config::{self, Inventory};
use minivirt::error::MinivirtError;
use minivirt::process::ShellRunner;
use minivirt::provision;
use minivirt::store::{self, FsStore};
use minivirt::{model, paths};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("minivirt=debug")
    } else {
        EnvFilter::from_default_env().add_directive(
            "minivirt=info".parse().expect("valid log directive"),
        )
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let inventory = config::load_config(&cli.config)?;

    match cli.command {
        Command::Provision { name } => run_provision(&inventory, &name).await?,
        Command::List => run_list(&inventory),
        Command::Status { name } => run_status(&inventory, &name)?,
    }

    Ok(())
}

async fn run_provision(inventory: &Inventory, name: &str) -> Result<(), MinivirtError> {
    let mut vm = inventory
        .vms
        .get(name)
        .cloned()
        .ok_or_else(|| MinivirtError::Validation {
            message: format!("no VM named '{name}' in config"),
        })?;
    let image = inventory.image_for(&vm)?;
    let store = FsStore::new(inventory.overrides.clone());

    provision::provision(&mut vm, image, &inventory.settings, &ShellRunner, &store).await?;

    println!("VM '{}' provisioned and imported (workdir: {})", vm.name, vm.workdir.display());
    Ok(())
}

fn run_list(inventory: &Inventory) {
    println!("Images:");
    for image in inventory.images.values() {
        println!("  {}  {}  ({})", image.name, image.osvar, image.path.display());
    }
    println!("VMs:");
    for vm in inventory.vms.values() {
        let status = store::load_status(vm).unwrap_or(vm.status);
        println!("  {}  image={}  ip={}  status={}", vm.name, vm.image, vm.ip, status);
    }
}

fn run_status(inventory: &Inventory, name: &str) -> Result<(), MinivirtError> {
    let vm = inventory
        .vms
        .get(name)
        .ok_or_else(|| MinivirtError::Validation {
            message: format!("no VM named '{name}' in config"),
        })?;

    match store::load_status(vm) {
        Some(status) => {
            println!("{}: {}", vm.name, status);
            let log = std::fs::read_to_string(paths::log_path(&vm.workdir)).unwrap_or_default();
            if !log.is_empty() {
                println!("--- provision.log ---");
                print!("{log}");
            }
        }
        None => println!("{}: {} (never provisioned)", vm.name, model::VmStatus::Created),
    }
    Ok(())
}
