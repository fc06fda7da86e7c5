//! Mount entry point: parse the CLI, wire up the object-store client and
//! `Drive`, and hand control to the host callback surface (spec §6).

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fuser::MountOption;
use log::{error, info};

use qsfs::client::{QingStorClient, Signer};
use qsfs::config::{Cli, Config};
use qsfs::credentials;
use qsfs::drive::Drive;
use qsfs::logging;

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli).map_err(|e| e.to_string())?;

    logging::init(&config).map_err(|e| e.to_string())?;
    info!("starting qsfs on bucket {}", config.bucket);

    let credentials = credentials::load(&config.credentials_path).map_err(|e| e.to_string())?;
    let credential = credentials
        .for_bucket(&config.bucket)
        .ok_or_else(|| format!("no credentials available for bucket {}", config.bucket))?;

    let signer = Signer::new(credential.access_key_id.clone(), credential.secret_access_key.clone());
    let client: Arc<dyn qsfs::client::ObjectStoreClient> = Arc::new(QingStorClient::new(
        config.endpoint.clone(),
        config.bucket.clone(),
        signer,
        Duration::from_millis(config.request_timeout_ms),
    ));

    let drive = Drive::new(&config, client);

    let options = vec![
        MountOption::FSName(format!("qsfs:{}", config.bucket)),
        MountOption::DefaultPermissions,
        MountOption::AutoUnmount,
    ];

    if config.single_thread {
        info!("single-threaded dispatch requested; the worker pool still parallelizes transfers internally");
    }
    if !config.foreground {
        info!("backgrounding is left to the invoking shell; running the mount loop on this process");
    }

    fuser::mount2(drive, &config.mount_point, &options).map_err(|e| format!("mount failed: {e}"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("qsfs: {message}");
            ExitCode::FAILURE
        }
    }
}
