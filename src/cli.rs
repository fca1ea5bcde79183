use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minivirt", about = "Lightweight KVM guest provisioning via cloud-init")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "minivirt.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build seed + disk for a VM and import it into the hypervisor
    Provision {
        /// VM name from the config file
        name: String,
    },

    /// List configured images and VMs
    List,

    /// Show a VM's persisted status and provisioning log
    Status {
        /// VM name from the config file
        name: String,
    },
}
