//! CLI surface and validated startup configuration (spec §6 "Mount CLI").

use std::path::PathBuf;

use clap::Parser;

use crate::defaults::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_METADATA_ENTRIES, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TRANSFER_BUFFER_SIZE, DEFAULT_TRANSFER_POOL_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Fatal => log::LevelFilter::Off,
        }
    }
}

/// Mirrors the option table in spec §6 one-to-one; `clap` derive in the
/// teacher's own style (long + short flags, no nested subcommands).
#[derive(Debug, Parser)]
#[command(name = "qsfs", version, about = "Mount a remote object store bucket as a POSIX filesystem")]
pub struct Cli {
    #[arg(short = 'b', long = "bucket")]
    pub bucket: String,

    #[arg(short = 'm', long = "mount")]
    pub mount_point: PathBuf,

    #[arg(short = 'z', long = "zone", default_value = "")]
    pub zone: String,

    #[arg(short = 'c', long = "credentials")]
    pub credentials: PathBuf,

    #[arg(short = 'l', long = "logdir")]
    pub log_dir: Option<PathBuf>,

    #[arg(short = 'L', long = "loglevel", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[arg(short = 'r', long = "retries", default_value_t = DEFAULT_MAX_RETRIES)]
    pub retries: u32,

    #[arg(short = 'R', long = "reqtimeout", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    #[arg(short = 'Z', long = "maxcache", default_value_t = DEFAULT_CACHE_CAPACITY / (1024 * 1024))]
    pub max_cache_mib: u64,

    #[arg(short = 'D', long = "diskdir")]
    pub disk_dir: Option<PathBuf>,

    #[arg(short = 't', long = "maxstat", default_value_t = (DEFAULT_MAX_METADATA_ENTRIES / 1000) as u64)]
    pub max_stat_thousands: u64,

    #[arg(short = 'e', long = "statexpire", default_value_t = -1)]
    pub stat_expire_minutes: i64,

    #[arg(short = 'n', long = "numtransfer", default_value_t = DEFAULT_TRANSFER_POOL_SIZE)]
    pub num_transfer: usize,

    #[arg(short = 'u', long = "bufsize", default_value_t = DEFAULT_TRANSFER_BUFFER_SIZE / (1024 * 1024))]
    pub bufsize_mib: u64,

    #[arg(short = 'H', long = "host", default_value = "qingstor.com")]
    pub host: String,

    #[arg(short = 'p', long = "protocol", default_value = "https")]
    pub protocol: String,

    #[arg(short = 'P', long = "port", default_value_t = 443)]
    pub port: u16,

    #[arg(short = 'C', long = "clearlogdir", default_value_t = false)]
    pub clear_log_dir: bool,

    #[arg(short = 'f', long = "foreground", default_value_t = false)]
    pub foreground: bool,

    #[arg(short = 's', long = "single", default_value_t = false)]
    pub single_thread: bool,

    #[arg(short = 'S', long = "Single", default_value_t = false)]
    pub single_thread_uppercase: bool,

    #[arg(short = 'd', long = "debug", default_value_t = false)]
    pub debug: bool,
}

/// Validated, derived form of [`Cli`]: numeric fields converted to the
/// units the rest of the crate actually uses, and existence checks run.
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub mount_point: PathBuf,
    pub zone: String,
    pub credentials_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_level: LogLevel,
    pub max_retries: u32,
    pub request_timeout_ms: u64,
    pub cache_capacity_bytes: u64,
    pub disk_dir: Option<PathBuf>,
    pub max_metadata_entries: usize,
    pub stat_expire_minutes: i64,
    pub transfer_pool_size: usize,
    pub transfer_buffer_size: u64,
    pub endpoint: String,
    pub clear_log_dir: bool,
    pub foreground: bool,
    pub single_thread: bool,
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("bucket name must not be empty")]
    EmptyBucket,
    #[error("mount point {0} does not exist")]
    MountPointMissing(PathBuf),
    #[error("credentials file {0} does not exist")]
    CredentialsMissing(PathBuf),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if !cli.mount_point.exists() {
            return Err(ConfigError::MountPointMissing(cli.mount_point));
        }
        if !cli.credentials.exists() {
            return Err(ConfigError::CredentialsMissing(cli.credentials));
        }
        if cli.num_transfer == 0 {
            return Err(ConfigError::NotPositive("numtransfer"));
        }
        if cli.bufsize_mib == 0 {
            return Err(ConfigError::NotPositive("bufsize"));
        }

        let endpoint = format!("{}://{}:{}", cli.protocol, cli.host, cli.port);
        Ok(Config {
            bucket: cli.bucket,
            mount_point: cli.mount_point,
            zone: cli.zone,
            credentials_path: cli.credentials,
            log_dir: cli.log_dir,
            log_level: cli.log_level,
            max_retries: cli.retries,
            request_timeout_ms: cli.request_timeout_ms,
            cache_capacity_bytes: cli.max_cache_mib * 1024 * 1024,
            disk_dir: cli.disk_dir,
            max_metadata_entries: (cli.max_stat_thousands * 1000) as usize,
            stat_expire_minutes: cli.stat_expire_minutes,
            transfer_pool_size: cli.num_transfer,
            transfer_buffer_size: cli.bufsize_mib * 1024 * 1024,
            endpoint,
            clear_log_dir: cli.clear_log_dir,
            foreground: cli.foreground,
            single_thread: cli.single_thread || cli.single_thread_uppercase,
            debug: cli.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn rejects_empty_bucket() {
        let cli = Cli::parse_from(["qsfs", "-b", "", "-m", "/tmp", "-c", "/etc/hostname"]);
        assert!(matches!(Config::from_cli(cli), Err(ConfigError::EmptyBucket)));
    }

    #[test]
    fn rejects_missing_mount_point() {
        let cli = Cli::parse_from(["qsfs", "-b", "mybucket", "-m", "/no/such/dir", "-c", "/etc/hostname"]);
        assert!(matches!(Config::from_cli(cli), Err(ConfigError::MountPointMissing(_))));
    }

    #[test]
    fn accepts_minimal_valid_invocation() {
        let cli = Cli::parse_from(["qsfs", "-b", "mybucket", "-m", "/tmp", "-c", "/etc/hostname"]);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.bucket, "mybucket");
        assert_eq!(config.endpoint, "https://qingstor.com:443");
    }
}
