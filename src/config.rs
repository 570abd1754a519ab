use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::err::Error;

/// Server settings. Every flag can also come from the environment (or a
/// `.env` file loaded at startup).
#[derive(Debug, Clone, Parser)]
#[command(name = "atestado-server", about = "Medical certificate submission API")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Keep all data in process memory instead of Postgres
    #[arg(long)]
    pub in_memory: bool,

    /// HS256 signing secret for session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "STORAGE_BUCKET", default_value = "atestados")]
    pub storage_bucket: String,

    /// Directory attachments are written under
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Mark the session cookie `Secure`
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,
}

impl Config {
    /// Catches settings that parse fine but cannot run a server.
    pub fn validate(&self) -> Result<(), Error> {
        if self.jwt_secret.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(Error::Configuration {
                message: "JWT_SECRET must be set".to_string(),
            });
        }
        if self.database_url.is_none() && !self.in_memory {
            return Err(Error::Configuration {
                message: "DATABASE_URL must be set unless --in-memory is given".to_string(),
            });
        }
        if self.storage_bucket.is_empty() || self.storage_bucket.contains('/') {
            return Err(Error::Configuration {
                message: format!("Invalid storage bucket `{}`", self.storage_bucket),
            });
        }
        Ok(())
    }
}
