use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

/// Which media store implementation backs image uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaBackendKind {
    Local,
    S3,
}

impl FromStr for MediaBackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => bail!("unknown media backend `{}` (expected `local` or `s3`)", other),
        }
    }
}

/// Fully-resolved media store configuration.
#[derive(Debug, Clone)]
pub enum MediaConfig {
    /// Files on disk under `upload_dir`, served by this process.
    Local { upload_dir: String },
    /// S3-compatible bucket; references are URLs under `public_url`.
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        public_url: String,
        key_prefix: String,
    },
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub media: MediaConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Petfolio community post API")]
pub struct Args {
    /// Host to bind to (overrides COMMUNITY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides COMMUNITY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides COMMUNITY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Media backend, `local` or `s3` (overrides COMMUNITY_MEDIA_BACKEND)
    #[arg(long)]
    pub media_backend: Option<String>,

    /// Directory for locally stored uploads (overrides COMMUNITY_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("COMMUNITY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("COMMUNITY_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing COMMUNITY_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3002,
            Err(err) => return Err(err).context("reading COMMUNITY_PORT"),
        };
        let env_db = env::var("COMMUNITY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/community.db".into());

        let backend_raw = args
            .media_backend
            .or_else(|| env::var("COMMUNITY_MEDIA_BACKEND").ok())
            .unwrap_or_else(|| "local".into());
        let backend = MediaBackendKind::from_str(&backend_raw)?;

        let media = match backend {
            MediaBackendKind::Local => MediaConfig::Local {
                upload_dir: args
                    .upload_dir
                    .or_else(|| env::var("COMMUNITY_UPLOAD_DIR").ok())
                    .unwrap_or_else(|| "./uploads".into()),
            },
            MediaBackendKind::S3 => MediaConfig::S3 {
                bucket: env::var("COMMUNITY_S3_BUCKET")
                    .context("COMMUNITY_S3_BUCKET is required for the s3 media backend")?,
                region: env::var("COMMUNITY_S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                endpoint: env::var("COMMUNITY_S3_ENDPOINT").ok(),
                public_url: env::var("COMMUNITY_S3_PUBLIC_URL")
                    .context("COMMUNITY_S3_PUBLIC_URL is required for the s3 media backend")?,
                key_prefix: env::var("COMMUNITY_S3_KEY_PREFIX")
                    .unwrap_or_else(|_| "community".into()),
            },
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            media,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_known_values() {
        assert_eq!(
            MediaBackendKind::from_str("local").unwrap(),
            MediaBackendKind::Local
        );
        assert_eq!(MediaBackendKind::from_str("S3").unwrap(), MediaBackendKind::S3);
        assert!(MediaBackendKind::from_str("gcs").is_err());
    }
}
