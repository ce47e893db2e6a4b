//! Configuration types for alti-cli
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//!
//! Commands never read flags from global state: `main.rs` parses
//! `CliArgs` once and hands validated config structs to each component.

use crate::error::ConfigError;
use crate::remote::UploadKind;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Timeout applied to each HTTP request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for importing and checking image-processing projects
#[derive(Parser, Debug, Clone)]
#[command(
    name = "alti-cli",
    version,
    about = "Import images, meta files and models into remote projects",
    after_help = "EXAMPLES:\n    \
        alti-cli check image -d ./photos -t\n    \
        alti-cli import image -p <PID> -d ./photos -m s3\n    \
        alti-cli import meta -p <PID> -f ./camera.txt\n    \
        alti-cli import model -p <PID> -f ./model.zip -m direct --ip 10.0.0.2 --port 8082\n    \
        alti-cli list buckets\n    \
        alti-cli export image -p <PID> -d ./downloads"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// API server endpoint
    #[arg(long, env = "ALTI_ENDPOINT", default_value = "https://api.altizure.com", global = true)]
    pub endpoint: String,

    /// API key
    #[arg(long, env = "ALTI_KEY", default_value = "", hide_env_values = true, global = true)]
    pub key: String,

    /// Verbose output (per-item details)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// Top-level subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Audit local files
    #[command(subcommand)]
    Check(CheckTarget),

    /// Upload into a project
    #[command(subcommand)]
    Import(ImportTarget),

    /// List server resources
    #[command(subcommand)]
    List(ListTarget),

    /// Export project contents
    #[command(subcommand)]
    Export(ExportTarget),
}

#[derive(Subcommand, Debug, Clone)]
pub enum CheckTarget {
    /// Compute checksum, dimensions and giga-pixels of all images under a directory
    Image(CheckImageArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ImportTarget {
    /// Register, upload and verify every image under a directory
    Image(ImportImageArgs),

    /// Import a meta file (camera.txt, pose.txt or group.txt)
    Meta(ImportFileArgs),

    /// Import a model archive into an imported project
    Model(ImportFileArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListTarget {
    /// List available buckets per kind and cloud
    Buckets,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExportTarget {
    /// Write every image of a project to a CSV, optionally downloading them
    Image(ExportImageArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckImageArgs {
    /// Directory to scan recursively
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Regular expression of paths to skip
    #[arg(short = 's', long, value_name = "PATTERN")]
    pub skip: Option<String>,

    /// Number of worker threads (0 = number of cores)
    #[arg(short = 'n', long, default_value_t = 0, value_name = "NUM")]
    pub threads: usize,

    /// Print a table of every valid image
    #[arg(short = 't', long)]
    pub table: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Project id
    #[arg(short = 'p', long = "id", value_name = "PID")]
    pub project_id: String,

    /// Upload method: 's3', 'oss', 'minio' or 'direct'
    #[arg(short = 'm', long, value_name = "METHOD")]
    pub method: Option<String>,

    /// Destination bucket for cloud methods
    #[arg(short = 'b', long, value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// IP address of the ad-hoc listener for direct upload
    #[arg(long, value_name = "IP", requires = "port")]
    pub ip: Option<IpAddr>,

    /// Port of the ad-hoc listener for direct upload
    #[arg(long, value_name = "PORT", requires = "ip")]
    pub port: Option<u16>,

    /// Seconds to wait for the server to accept each item
    #[arg(long, default_value_t = 7200, value_name = "SECS")]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ImportImageArgs {
    #[command(flatten)]
    pub upload: UploadArgs,

    /// Directory of images
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Regular expression of paths to skip
    #[arg(short = 's', long, value_name = "PATTERN")]
    pub skip: Option<String>,

    /// Number of worker threads per stage (0 = number of cores)
    #[arg(short = 'n', long, default_value_t = 0, value_name = "NUM")]
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ImportFileArgs {
    #[command(flatten)]
    pub upload: UploadArgs,

    /// File to import
    #[arg(short = 'f', long, value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExportImageArgs {
    /// Project id
    #[arg(short = 'p', long = "id", value_name = "PID")]
    pub project_id: String,

    /// Path of the output CSV (default: <PID>-images.csv)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Directory to download every ready image into
    #[arg(short = 'd', long, value_name = "DIR")]
    pub download: Option<PathBuf>,
}

/// Remote service connection settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub key: String,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let endpoint = args.endpoint.trim().to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint {
                endpoint,
                reason: "must start with http:// or https://".into(),
            });
        }
        Ok(Self {
            endpoint,
            key: args.key.clone(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }
}

/// Validated settings for `check image`
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub dir: PathBuf,
    pub skip: Option<Regex>,
    /// 0 = one per core
    pub workers: usize,
    pub table: bool,
    pub verbose: bool,
    pub show_progress: bool,
}

impl CheckConfig {
    pub fn from_args(args: &CheckImageArgs, verbose: bool, quiet: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            dir: args.dir.clone(),
            skip: compile_skip(args.skip.as_deref())?,
            workers: validate_workers(args.threads)?,
            table: args.table,
            verbose,
            show_progress: !quiet,
        })
    }
}

/// Validated settings for `export image`
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub project_id: String,
    pub out: PathBuf,
    pub download: Option<PathBuf>,
}

impl ExportConfig {
    pub fn from_args(args: &ExportImageArgs) -> Result<Self, ConfigError> {
        let project_id = args.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(ConfigError::MissingProjectId);
        }
        let out = args
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}-images.csv", project_id)));
        Ok(Self {
            project_id,
            out,
            download: args.download.clone(),
        })
    }
}

/// Address of the ad-hoc direct upload listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectAddr {
    pub ip: IpAddr,
    pub port: u16,
}

/// Validated settings shared by all `import` commands
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub kind: UploadKind,
    pub project_id: String,
    /// File for meta/model, directory for images
    pub source: PathBuf,
    /// Lowercased; `None` lets the server suggest one
    pub method: Option<String>,
    pub bucket: Option<String>,
    pub direct: Option<DirectAddr>,
    /// Per-item client-side timeout
    pub timeout: Duration,
    pub skip: Option<Regex>,
    /// 0 = one per core
    pub workers: usize,
    pub verbose: bool,
}

impl UploadConfig {
    pub fn for_file(kind: UploadKind, args: &ImportFileArgs, verbose: bool) -> Result<Self, ConfigError> {
        Self::build(kind, &args.upload, args.file.clone(), None, 1, verbose)
    }

    pub fn for_images(args: &ImportImageArgs, verbose: bool) -> Result<Self, ConfigError> {
        let skip = compile_skip(args.skip.as_deref())?;
        let workers = validate_workers(args.threads)?;
        Self::build(UploadKind::Image, &args.upload, args.dir.clone(), skip, workers, verbose)
    }

    fn build(
        kind: UploadKind,
        upload: &UploadArgs,
        source: PathBuf,
        skip: Option<Regex>,
        workers: usize,
        verbose: bool,
    ) -> Result<Self, ConfigError> {
        if upload.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { secs: upload.timeout });
        }
        let direct = match (upload.ip, upload.port) {
            (Some(ip), Some(port)) => Some(DirectAddr { ip, port }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteDirectAddr),
        };
        Ok(Self {
            kind,
            project_id: upload.project_id.clone(),
            source,
            method: upload
                .method
                .as_ref()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty()),
            bucket: upload.bucket.clone().filter(|b| !b.is_empty()),
            direct,
            timeout: Duration::from_secs(upload.timeout),
            skip,
            workers,
            verbose,
        })
    }
}

fn compile_skip(pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidSkipPattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn validate_workers(count: usize) -> Result<usize, ConfigError> {
    if count > MAX_WORKERS {
        return Err(ConfigError::InvalidWorkerCount {
            count,
            max: MAX_WORKERS,
        });
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_check_image() {
        let args = parse(&["alti-cli", "check", "image", "-d", "/data", "-s", r"\.thumbs", "-n", "4", "-t"]);
        let Command::Check(CheckTarget::Image(check)) = &args.command else {
            panic!("wrong command");
        };
        let config = CheckConfig::from_args(check, false, true).unwrap();
        assert_eq!(config.workers, 4);
        assert!(config.table);
        assert!(!config.show_progress);
        assert!(config.skip.unwrap().is_match("/data/.thumbs/a.jpg"));
    }

    #[test]
    fn test_invalid_skip_pattern() {
        assert!(matches!(
            compile_skip(Some("(unclosed")),
            Err(ConfigError::InvalidSkipPattern { .. })
        ));
        assert!(compile_skip(Some("")).unwrap().is_none());
    }

    #[test]
    fn test_worker_bound() {
        assert_eq!(validate_workers(0).unwrap(), 0);
        assert!(validate_workers(MAX_WORKERS + 1).is_err());
    }

    #[test]
    fn test_import_meta_config() {
        let args = parse(&[
            "alti-cli", "import", "meta", "-p", "pid1", "-f", "camera.txt", "-m", " S3 ", "--timeout", "60",
        ]);
        let Command::Import(ImportTarget::Meta(meta)) = &args.command else {
            panic!("wrong command");
        };
        let config = UploadConfig::for_file(UploadKind::Meta, meta, false).unwrap();
        assert_eq!(config.project_id, "pid1");
        assert_eq!(config.method.as_deref(), Some("s3"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.workers, 1);
        assert!(config.direct.is_none());
    }

    #[test]
    fn test_direct_requires_both_ip_and_port() {
        assert!(CliArgs::try_parse_from([
            "alti-cli", "import", "model", "-p", "x", "-f", "m.zip", "--ip", "10.0.0.2",
        ])
        .is_err());

        let args = parse(&[
            "alti-cli", "import", "model", "-p", "x", "-f", "m.zip", "--ip", "10.0.0.2", "--port", "8082",
        ]);
        let Command::Import(ImportTarget::Model(model)) = &args.command else {
            panic!("wrong command");
        };
        let config = UploadConfig::for_file(UploadKind::Model, model, false).unwrap();
        assert_eq!(config.direct.unwrap().port, 8082);
    }

    #[test]
    fn test_half_direct_addr_rejected() {
        let upload = UploadArgs {
            project_id: "x".into(),
            method: Some("direct".into()),
            bucket: None,
            ip: None,
            port: Some(9000),
            timeout: 60,
        };
        let args = ImportFileArgs {
            upload,
            file: PathBuf::from("m.zip"),
        };
        assert!(matches!(
            UploadConfig::for_file(UploadKind::Model, &args, false),
            Err(ConfigError::IncompleteDirectAddr)
        ));
    }

    #[test]
    fn test_export_default_out() {
        let args = parse(&["alti-cli", "export", "image", "-p", "pid9"]);
        let Command::Export(ExportTarget::Image(export)) = &args.command else {
            panic!("wrong command");
        };
        let config = ExportConfig::from_args(export).unwrap();
        assert_eq!(config.out, PathBuf::from("pid9-images.csv"));
        assert!(config.download.is_none());

        let args = parse(&["alti-cli", "export", "image", "-p", "pid9", "-o", "all.csv", "-d", "imgs"]);
        let Command::Export(ExportTarget::Image(export)) = &args.command else {
            panic!("wrong command");
        };
        let config = ExportConfig::from_args(export).unwrap();
        assert_eq!(config.out, PathBuf::from("all.csv"));
        assert_eq!(config.download, Some(PathBuf::from("imgs")));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = parse(&["alti-cli", "import", "meta", "-p", "x", "-f", "pose.txt", "--timeout", "0"]);
        let Command::Import(ImportTarget::Meta(meta)) = &args.command else {
            panic!("wrong command");
        };
        assert!(matches!(
            UploadConfig::for_file(UploadKind::Meta, meta, false),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_endpoint_validation() {
        let mut args = parse(&["alti-cli", "list", "buckets"]);
        args.endpoint = "ftp://nope".into();
        assert!(RemoteConfig::from_args(&args).is_err());
        args.endpoint = "http://localhost:8082".into();
        assert_eq!(RemoteConfig::from_args(&args).unwrap().endpoint, "http://localhost:8082");
    }
}
