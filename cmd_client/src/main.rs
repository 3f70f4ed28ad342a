use std::path::PathBuf;

use clap::Parser;
use cmd_handler::CommandHandler;
use commands::Command;
use log::{debug, error};
use utils::file_system::config_directory::ConfigDirectory;
use vm_manager::{
    config::ManagerConfig,
    managers::vm_config_manager::VmConfigManager,
    storage::descriptor_store::DescriptorStore,
    virtualization::{host_memory::SysinfoHostMemory, qemu_img::QemuImg},
};

mod cmd_handler;
mod commands;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the VM descriptors
    #[arg(short = 'd', long)]
    config_dir: Option<PathBuf>,

    /// Path to the qemu-img executable
    #[arg(short, long)]
    qemu_img_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => ManagerConfig::read_from_file(path).await?,
        None => ManagerConfig::default(),
    };
    if let Some(config_dir) = args.config_dir {
        config.config_dir = config_dir;
    }
    if let Some(qemu_img_path) = args.qemu_img_path {
        config.qemu_img_path = qemu_img_path;
    }
    debug!("Using configuration: {:?}", config);

    let directory = ConfigDirectory::new(config.config_dir).await?;
    let manager = VmConfigManager::new(
        DescriptorStore::new(directory),
        QemuImg::new(config.qemu_img_path),
        SysinfoHostMemory,
    );
    let handler = CommandHandler::new(manager, config.preallocate_full);

    if let Err(err) = handler.handle_command(args.command).await {
        error!("Error occurred while handling command: {:#}", err);
        return Err(err);
    }
    Ok(())
}
