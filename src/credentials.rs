//! Saved mailbox login.
//!
//! A `credentials.json` record next to the config file is offered for reuse
//! on startup; otherwise the operator is prompted and the answer is saved.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved record, or `None` when absent or unreadable.
    pub fn load(&self) -> Option<Credentials> {
        let data = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&data).ok()
    }

    pub fn save(&self, creds: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(creds)?;
        write_private(&self.path, data.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))
    }

    /// Offers the saved record, prompting for a new one when declined or missing.
    pub fn obtain<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        login_domain: Option<&str>,
    ) -> Result<Credentials> {
        if let Some(saved) = self.load() {
            let answer = ask(input, output, &format!("Use saved account: {}? (y/n): ", saved.login))?;
            if answer == "y" {
                return Ok(saved);
            }
        }

        let hint = login_domain
            .map(|d| format!("Enter login (without {d}): "))
            .unwrap_or_else(|| "Enter login: ".to_string());
        let login = qualify_login(&ask(input, output, &hint)?, login_domain);
        let password = ask(input, output, "Enter password: ")?;

        let creds = Credentials { login, password };
        self.save(&creds)?;
        Ok(creds)
    }
}

/// Appends `domain` to a bare login; a login that already has `@` is kept.
pub fn qualify_login(login: &str, domain: Option<&str>) -> String {
    let login = login.trim();
    match domain {
        Some(d) if !login.contains('@') => format!("{login}{d}"),
        _ => login.to_string(),
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<String> {
    write!(output, "{prompt}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Writes `data` to a file readable by the owner only. A new file is created
/// with mode 0600; an existing one is narrowed before anything is written.
#[cfg(unix)]
pub(crate) fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
pub(crate) fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)
}
