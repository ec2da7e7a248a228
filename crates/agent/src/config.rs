// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration: CLI flags (clap), layered over `~/.plexus/config.json`,
//! layered over built-in defaults. Precedence is CLI flag / env var, then the
//! JSON file, then the default.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://app.plexus.company";

/// Shape of `~/.plexus/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub source_id: Option<String>,
    pub org_id: Option<String>,
    pub endpoint: Option<String>,
    pub command_allowlist: Option<Vec<String>>,
    pub command_denylist: Option<Vec<String>>,
}

impl ConfigFile {
    pub fn path() -> anyhow::Result<PathBuf> {
        let home = dirs_home()?;
        Ok(home.join(".plexus").join("config.json"))
    }

    /// Load the config file, falling back to defaults on any read/parse error.
    pub fn load() -> Self {
        let Ok(path) = Self::path() else { return Self::default() };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Self {
        fs::read_to_string(path).ok().and_then(|text| serde_json::from_str(&text).ok()).unwrap_or_default()
    }

    /// Persist the config file at mode 0600, creating the parent directory
    /// if needed.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        set_owner_only(&path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

fn dirs_home() -> anyhow::Result<PathBuf> {
    std::env::var("HOME").map(PathBuf::from).map_err(|_| anyhow::anyhow!("HOME is not set"))
}

/// Edge telemetry agent configuration.
#[derive(Debug, Parser)]
#[command(name = "plexus-agent", version, about)]
pub struct Config {
    /// API key for ingest/control-channel authentication.
    #[arg(long, env = "PLEXUS_API_KEY")]
    pub api_key: Option<String>,

    /// API endpoint, overriding the configured/default one.
    #[arg(long, env = "PLEXUS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Organization id.
    #[arg(long, env = "PLEXUS_ORG_ID")]
    pub org_id: Option<String>,

    /// Control-channel URL override, bypassing `/api/config` discovery.
    #[arg(long, env = "PLEXUS_WS_URL")]
    pub ws_url: Option<String>,

    /// Source id identifying this agent instance. Auto-generated and
    /// persisted if never set.
    #[arg(long, env = "PLEXUS_SOURCE_ID")]
    pub source_id: Option<String>,

    /// Durable (SQLite) buffer instead of the in-memory default.
    #[arg(long, env = "PLEXUS_DURABLE_BUFFER")]
    pub durable_buffer: bool,

    /// Log format (json or text).
    #[arg(long, env = "PLEXUS_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PLEXUS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Subcommand>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Write `~/.plexus/config.json`, prompting only for what's required.
    Init,
    /// Alias for `init`.
    Pair,
}

/// Fully-resolved configuration, CLI/env layered over the JSON file over
/// built-in defaults. This is what the rest of the agent consumes.
pub struct ResolvedConfig {
    pub api_key: String,
    pub endpoint: String,
    pub org_id: Option<String>,
    pub ws_url: Option<String>,
    pub source_id: String,
    pub durable_buffer: bool,
    pub command_allowlist: Option<Vec<String>>,
    pub command_denylist: Option<Vec<String>>,
}

impl Config {
    pub fn resolve(&self) -> anyhow::Result<ResolvedConfig> {
        let mut file = ConfigFile::load();

        let api_key = self
            .api_key
            .clone()
            .or_else(|| file.api_key.clone())
            .ok_or_else(|| anyhow::anyhow!("no API key configured; run `plexus-agent init` or set PLEXUS_API_KEY"))?;

        let endpoint = self.endpoint.clone().or_else(|| file.endpoint.clone()).unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());

        let org_id = self.org_id.clone().or_else(|| file.org_id.clone());

        let source_id = match self.source_id.clone().or_else(|| file.source_id.clone()) {
            Some(id) => id,
            None => {
                let generated = format!("source-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
                file.source_id = Some(generated.clone());
                if let Err(e) = file.save() {
                    tracing::warn!(err = %e, "failed to persist generated source_id");
                }
                generated
            }
        };

        Ok(ResolvedConfig {
            api_key,
            endpoint,
            org_id,
            ws_url: self.ws_url.clone(),
            source_id,
            durable_buffer: self.durable_buffer,
            command_allowlist: file.command_allowlist.clone(),
            command_denylist: file.command_denylist.clone(),
        })
    }

    /// Validate flag combinations the parser itself can't express.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format '{other}': expected 'json' or 'text'"),
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("invalid --log-level '{other}'"),
        }
        Ok(())
    }
}

/// Initialize tracing from config. Safe to call more than once (`try_init`).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// `init`/`pair`: write `~/.plexus/config.json` with the fields required to
/// authenticate, prompting on stdin for anything missing.
pub fn run_init(config: &Config) -> anyhow::Result<()> {
    let mut file = ConfigFile::load();

    file.api_key = Some(config.api_key.clone().or(file.api_key).unwrap_or_else(|| prompt("API key: ")));
    file.org_id = Some(config.org_id.clone().or(file.org_id).unwrap_or_else(|| prompt("Organization id: ")));
    if file.source_id.is_none() {
        file.source_id = config.source_id.clone();
    }

    file.save()?;
    println!("Wrote {}", ConfigFile::path()?.display());
    Ok(())
}

fn prompt(label: &str) -> String {
    use std::io::Write;
    print!("{label}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    line.trim().to_owned()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
