use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::credentials::write_private;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub imap: ImapConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
    /// Appended to a typed login that has no `@`, e.g. `@example.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_domain: Option<String>,
    /// IMAP SEARCH criteria selecting the pending messages.
    #[serde(default = "default_search")]
    pub search: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_body_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
            max_body_chars: 8000,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RoutingConfig {
    /// Source folder, and the destination that means "leave in place".
    pub inbox: String,
    pub categories: Vec<String>,
    pub batch_size: usize,
    pub request_delay_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            inbox: "INBOX".to_string(),
            categories: vec!["INBOX".to_string(), "INBOX.Spam".to_string()],
            batch_size: 50,
            request_delay_secs: 3,
        }
    }
}

impl RoutingConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_search() -> String {
    "ALL".to_string()
}

impl Config {
    pub fn dir() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
        Ok(dir.join("mailsift"))
    }

    pub fn path() -> Result<PathBuf> {
        Ok(Self::dir()?.join("config.toml"))
    }

    /// Loads `path`, writing the default file first when it does not exist.
    /// The flag is `true` when the file was just created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_private(path, DEFAULT_CONFIG.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
            let cfg: Self = toml::from_str(DEFAULT_CONFIG)?;
            return Ok((cfg, true));
        }

        let data =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg: Self =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok((cfg, false))
    }

    pub fn validate(&self) -> Result<()> {
        if self.imap.host.trim().is_empty() {
            bail!("imap.host is empty");
        }
        if self.routing.inbox.trim().is_empty() {
            bail!("routing.inbox is empty");
        }
        if self.routing.categories.is_empty() {
            bail!("routing.categories is empty");
        }
        if self.routing.batch_size == 0 {
            bail!("routing.batch_size must be at least 1");
        }
        Ok(())
    }
}

const DEFAULT_CONFIG: &str = r#"
[imap]
host = "imap.example.com"
port = 993
starttls = false
# login_domain = "@example.com"
search = "ALL"

[classifier]
# or set GEMINI_API_KEY
api_key = ""
model = "gemini-1.5-flash"
base_url = "https://generativelanguage.googleapis.com/v1beta"
timeout_secs = 30
max_body_chars = 8000

[routing]
inbox = "INBOX"
categories = ["INBOX", "INBOX.Spam"]
batch_size = 50
request_delay_secs = 3
"#;
