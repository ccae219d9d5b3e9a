use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "civicsense", about = "Citizen complaint feed server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
}

/// Endpoints for the external collaborators. Each call made against these
/// carries an explicit timeout; see `upload` and `external`.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub image_upload_url: String,
    pub image_api_key: Option<String>,
    pub triage_url: String,
    pub geocoder_url: String,
    pub categorizer_url: String,
    pub categorizer_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "civicsense_session".to_string(),
            session_hours: 720,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            image_upload_url: "https://api.imgbb.com/1/upload".to_string(),
            image_api_key: None,
            triage_url: "https://civicsense-ai-32j8.onrender.com/api/submit-complaint"
                .to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            categorizer_url:
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
                    .to_string(),
            categorizer_api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("civicsense.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not determine home directory")
                .join(".civicsense")
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        self.database.path.as_ref().unwrap()
    }
}
