// Warden — Runtime Configuration
//
// `Settings` is resolved once per process from clap arguments (each also
// readable from a `WARDEN_*` environment variable) and handed by reference to
// the service layer. Nothing here is global or mutable after startup.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use clap::Args;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::store::Identity;
use crate::vault::{HttpVaultFallback, VaultError};

/// Database file name inside the data directory.
pub const DB_FILE: &str = "warden.db";

const DEFAULT_VAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid grant TTL '{0}': expected a positive number followed by s, m, h, or d (e.g. \"30m\")")]
    InvalidTtl(String),

    #[error("Could not determine a data directory; pass --data-dir or set WARDEN_DATA_DIR")]
    NoDataDir,

    #[error("Could not determine the caller identity; pass --identity or set WARDEN_IDENTITY")]
    NoIdentity,
}

/// Global command-line options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Directory holding the database (default: platform data dir + "warden").
    #[arg(long, env = "WARDEN_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// How long an approval stays valid after the decision (e.g. "30m", "1h", "7d").
    /// Grants never expire when unset.
    #[arg(long, env = "WARDEN_GRANT_TTL", global = true)]
    pub grant_ttl: Option<String>,

    /// Comma-separated identities that hold the admin role.
    #[arg(long, env = "WARDEN_ADMINS", value_delimiter = ',', global = true)]
    pub admins: Vec<String>,

    /// Base URL of the external vault consulted on local misses.
    #[arg(long, env = "WARDEN_VAULT_URL", global = true)]
    pub vault_url: Option<String>,

    /// Token sent to the external vault as X-Vault-Token.
    #[arg(long, env = "WARDEN_VAULT_TOKEN", hide_env_values = true, global = true)]
    pub vault_token: Option<String>,

    /// Request timeout for the external vault, in seconds.
    #[arg(long, env = "WARDEN_VAULT_TIMEOUT_SECS", default_value_t = DEFAULT_VAULT_TIMEOUT_SECS, global = true)]
    pub vault_timeout_secs: u64,

    /// Identity this invocation acts as (default: $USER).
    #[arg(long, env = "WARDEN_IDENTITY", global = true)]
    pub identity: Option<String>,
}

/// External vault connection details.
#[derive(Clone)]
pub struct VaultSettings {
    pub url: String,
    pub token: Option<Zeroizing<String>>,
    pub timeout: StdDuration,
}

impl VaultSettings {
    /// Build the HTTP adapter. Must not be called from inside an async task.
    pub fn connect(&self) -> Result<HttpVaultFallback, VaultError> {
        HttpVaultFallback::new(&self.url, self.timeout, self.token.clone())
    }
}

impl fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub grant_ttl: Option<chrono::Duration>,
    pub admins: Vec<String>,
    pub vault: Option<VaultSettings>,
    /// Caller identity name for CLI invocations.
    pub identity: String,
}

impl Settings {
    pub fn from_args(args: &SettingsArgs) -> Result<Self, ConfigError> {
        let data_dir = match &args.data_dir {
            Some(dir) => dir.clone(),
            None => dirs_next::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("warden"),
        };

        let grant_ttl = args.grant_ttl.as_deref().map(parse_ttl).transpose()?;

        let admins = args
            .admins
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();

        let vault = args
            .vault_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| VaultSettings {
                url: url.trim().to_string(),
                token: args.vault_token.clone().map(Zeroizing::new),
                timeout: StdDuration::from_secs(args.vault_timeout_secs),
            });

        let identity = args
            .identity
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::NoIdentity)?;

        Ok(Self {
            data_dir,
            grant_ttl,
            admins,
            vault,
            identity,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Attach the configured role to a bare identity name.
    pub fn resolve_identity(&self, name: &str) -> Identity {
        if self.admins.iter().any(|a| a == name) {
            Identity::admin(name)
        } else {
            Identity::member(name)
        }
    }

    /// The configured vault adapter, if any. Trouble building it only
    /// disables the fallback; local operations never depend on the vault.
    pub fn vault_fallback(&self) -> Option<HttpVaultFallback> {
        let vault = self.vault.as_ref()?;
        match vault.connect() {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(url = %vault.url, error = %e, "Vault fallback disabled");
                None
            }
        }
    }

    /// The identity this CLI invocation acts as.
    pub fn caller(&self) -> Identity {
        self.resolve_identity(&self.identity)
    }
}

/// Parse a TTL string such as `"90s"`, `"30m"`, `"1h"`, or `"7d"`.
pub fn parse_ttl(raw: &str) -> Result<chrono::Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTtl(raw.to_string());

    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = trimmed.split_at(split);

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let ttl = match unit {
        "s" => chrono::Duration::try_seconds(amount),
        "m" => chrono::Duration::try_minutes(amount),
        "h" => chrono::Duration::try_hours(amount),
        "d" => chrono::Duration::try_days(amount),
        _ => None,
    };
    ttl.ok_or_else(invalid)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
