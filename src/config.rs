//! Command-line and environment configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// MongoDeck - browse and edit MongoDB collections over HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "mongodeck", version, about)]
pub struct Config {
    /// MongoDB connection string
    #[arg(
        long,
        env = "MONGODB_URI",
        default_value = "mongodb://localhost:27017/expressapp"
    )]
    pub mongodb_uri: String,

    /// Database to browse (overrides the one in the connection string)
    #[arg(long, env = "MONGODB_DATABASE")]
    pub database: Option<String>,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Use an in-memory store instead of MongoDB
    #[arg(short, long, env = "MONGODECK_MEMORY")]
    pub memory: bool,

    /// Directory holding the built frontend (index.html + assets)
    #[arg(long, env = "FRONTEND_DIR", default_value = "frontend/build")]
    pub frontend_dir: PathBuf,

    /// Directory holding the runnable scripts
    #[arg(long, env = "SCRIPTS_DIR", default_value = "scripts")]
    pub scripts_dir: PathBuf,

    /// Interpreter used to run scripts
    #[arg(long, env = "PYTHON", default_value = "python")]
    pub interpreter: String,

    /// Seconds a script may run before it is killed
    #[arg(long, env = "SCRIPT_TIMEOUT_SECS", default_value_t = 60)]
    pub script_timeout_secs: u64,
}

impl Config {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["mongodeck"]).unwrap();
        assert!(!config.memory);
        assert_eq!(config.script_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "mongodeck",
            "--memory",
            "--port",
            "8080",
            "--host",
            "127.0.0.1",
            "--database",
            "shop",
        ])
        .unwrap();

        assert!(config.memory);
        assert_eq!(config.database.as_deref(), Some("shop"));
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }
}
