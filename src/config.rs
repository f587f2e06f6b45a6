use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "classbook-server", version, about = "Student and class records over HTTP")]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "CLASSBOOK_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Postgres connection string; records are kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "CLASSBOOK_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Directory uploaded avatars are written to
    #[arg(long, env = "CLASSBOOK_MEDIA_ROOT", default_value = "media")]
    pub media_root: PathBuf,

    /// Path every endpoint is mounted under
    #[arg(long, env = "CLASSBOOK_API_PREFIX", default_value = "/api")]
    pub api_prefix: String,

    /// Lifetime of a login session, in days
    #[arg(long, env = "CLASSBOOK_SESSION_DAYS", default_value_t = 2)]
    pub session_days: i64,
}

/// `""` or `"/"` mount at the root; otherwise a leading slash and no trailing one.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
