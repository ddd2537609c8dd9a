//! Configuration types for fastmig
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Storage URL parsing (local paths vs s3://bucket/prefix)

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable concurrent stream count
const MAX_STREAMS: usize = 512;

/// Buffer size limits
const MIN_BUFFER_SIZE: usize = 4 * 1024;
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Minimum job queue capacity
const MIN_QUEUE_CAPACITY: usize = 10;

/// High-concurrency data migration between storage backends
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fastmig",
    version,
    about = "High-concurrency data migration between storage backends",
    long_about = "Moves arbitrarily large file trees between local filesystems and \
                  S3-compatible object stores with stateful resume, bounded memory, \
                  and metadata preservation.",
    after_help = "EXAMPLES:\n    \
        fastmig --source /data/old --dest /data/new --streams 64\n    \
        fastmig --source /data/local --dest s3://bucket/prefix\n    \
        fastmig --source s3://bucket/a --dest /restore --checksum --resume\n\n\
    SIGNALS:\n    \
        SIGUSR1 adds a transfer stream, SIGUSR2 removes one;\n    \
        SIGINT/SIGTERM shut down gracefully (press Ctrl+C twice to force)."
)]
pub struct CliArgs {
    /// Source path or s3://bucket/prefix
    #[arg(long, value_name = "PATH")]
    pub source: String,

    /// Destination path or s3://bucket/prefix
    #[arg(long, value_name = "PATH")]
    pub dest: String,

    /// Number of concurrent transfer streams
    #[arg(short = 's', long, default_value = "32", value_name = "NUM")]
    pub streams: usize,

    /// Copy buffer size in bytes for each stream
    #[arg(long, default_value = "1048576", value_name = "BYTES")]
    pub buffer_size: usize,

    /// Job queue capacity (controls walker memory under backpressure)
    #[arg(long, default_value = "1000", value_name = "NUM")]
    pub queue_size: usize,

    /// Directory for the resumable state database
    #[arg(long, default_value = "./.fastmig-state", value_name = "DIR")]
    pub state_dir: PathBuf,

    /// Disable metadata preservation (UID/GID/mode/mtime)
    #[arg(long)]
    pub no_metadata: bool,

    /// Enable streaming checksum verification (CRC-64)
    #[arg(long)]
    pub checksum: bool,

    /// Skip files already recorded as completed in the state store
    #[arg(long)]
    pub resume: bool,

    /// Quiet mode - suppress the live progress display
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Where a migration endpoint lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUrl {
    /// A local filesystem path
    Local { path: String },

    /// An S3 bucket, optionally scoped to a key prefix
    S3 { bucket: String, prefix: String },
}

impl StorageUrl {
    /// Parse a CLI endpoint: `s3://bucket/prefix` is an object store,
    /// anything else is a filesystem path
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "empty path".into(),
            });
        }

        let Some(rest) = raw.strip_prefix("s3://") else {
            return Ok(StorageUrl::Local {
                path: raw.to_string(),
            });
        };

        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing bucket name".into(),
            });
        }

        Ok(StorageUrl::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// The path to start walking from within the provider
    pub fn root_path(&self) -> &str {
        match self {
            StorageUrl::Local { path } => path,
            StorageUrl::S3 { prefix, .. } => prefix,
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, StorageUrl::S3 { .. })
    }
}

impl std::fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageUrl::Local { path } => write!(f, "{path}"),
            StorageUrl::S3 { bucket, prefix } if prefix.is_empty() => {
                write!(f, "s3://{bucket}")
            }
            StorageUrl::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Parsed source endpoint
    pub source: StorageUrl,

    /// Parsed destination endpoint
    pub dest: StorageUrl,

    /// Concurrent transfer streams
    pub streams: usize,

    /// Copy buffer size per stream
    pub buffer_size: usize,

    /// Job queue capacity
    pub queue_size: usize,

    /// State database directory
    pub state_dir: PathBuf,

    /// Preserve UID/GID/mode/mtime at the destination
    pub preserve_metadata: bool,

    /// Verify CRC-64 of read vs written streams
    pub verify_checksum: bool,

    /// Skip already-completed jobs from a previous run
    pub resume: bool,

    /// Show the live progress display
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl MigrateConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let source = StorageUrl::parse(&args.source)?;
        let dest = StorageUrl::parse(&args.dest)?;

        if args.streams == 0 || args.streams > MAX_STREAMS {
            return Err(ConfigError::InvalidStreamCount {
                count: args.streams,
                max: MAX_STREAMS,
            });
        }

        if args.buffer_size < MIN_BUFFER_SIZE || args.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize {
                size: args.buffer_size,
                min: MIN_BUFFER_SIZE,
                max: MAX_BUFFER_SIZE,
            });
        }

        if args.queue_size < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity {
                size: args.queue_size,
                min: MIN_QUEUE_CAPACITY,
            });
        }

        Ok(Self {
            source,
            dest,
            streams: args.streams,
            buffer_size: args.buffer_size,
            queue_size: args.queue_size,
            state_dir: args.state_dir,
            preserve_metadata: !args.no_metadata,
            verify_checksum: args.checksum,
            resume: args.resume,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str, dest: &str) -> CliArgs {
        CliArgs {
            source: source.into(),
            dest: dest.into(),
            streams: 32,
            buffer_size: 1024 * 1024,
            queue_size: 1000,
            state_dir: PathBuf::from("./.fastmig-state"),
            no_metadata: false,
            checksum: false,
            resume: false,
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_local_path() {
        let url = StorageUrl::parse("/data/old").unwrap();
        assert_eq!(
            url,
            StorageUrl::Local {
                path: "/data/old".into()
            }
        );
        assert!(!url.is_s3());
        assert_eq!(url.root_path(), "/data/old");
    }

    #[test]
    fn test_parse_s3_url() {
        let url = StorageUrl::parse("s3://bucket/some/prefix").unwrap();
        assert_eq!(
            url,
            StorageUrl::S3 {
                bucket: "bucket".into(),
                prefix: "some/prefix".into()
            }
        );
        assert_eq!(url.root_path(), "some/prefix");
    }

    #[test]
    fn test_parse_s3_bucket_only() {
        let url = StorageUrl::parse("s3://bucket").unwrap();
        assert_eq!(
            url,
            StorageUrl::S3 {
                bucket: "bucket".into(),
                prefix: "".into()
            }
        );

        let url = StorageUrl::parse("s3://bucket/").unwrap();
        assert_eq!(url.root_path(), "");
    }

    #[test]
    fn test_parse_invalid_urls() {
        assert!(StorageUrl::parse("").is_err());
        assert!(StorageUrl::parse("s3://").is_err());
        assert!(StorageUrl::parse("s3:///prefix").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(
            StorageUrl::parse("s3://b/p/q").unwrap().to_string(),
            "s3://b/p/q"
        );
        assert_eq!(StorageUrl::parse("s3://b").unwrap().to_string(), "s3://b");
        assert_eq!(StorageUrl::parse("/x/y").unwrap().to_string(), "/x/y");
    }

    #[test]
    fn test_config_validation() {
        let config = MigrateConfig::from_args(args("/a", "s3://b/c")).unwrap();
        assert_eq!(config.streams, 32);
        assert!(config.preserve_metadata);
        assert!(config.dest.is_s3());

        let mut bad = args("/a", "/b");
        bad.streams = 0;
        assert!(matches!(
            MigrateConfig::from_args(bad),
            Err(ConfigError::InvalidStreamCount { .. })
        ));

        let mut bad = args("/a", "/b");
        bad.buffer_size = 16;
        assert!(matches!(
            MigrateConfig::from_args(bad),
            Err(ConfigError::InvalidBufferSize { .. })
        ));

        let mut bad = args("/a", "/b");
        bad.queue_size = 1;
        assert!(matches!(
            MigrateConfig::from_args(bad),
            Err(ConfigError::InvalidQueueCapacity { .. })
        ));
    }
}
