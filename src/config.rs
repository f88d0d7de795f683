use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::http_client::{DEFAULT_REQUEST_TIMEOUT_SECS, http_client};
use crate::retry::{RetryPolicy, RetryingStore};
use crate::sheets_store::{SHEETS_API_BASE, SheetsStore};
use crate::sqlite_store::SqliteStore;
use crate::store::{MemoryStore, RecordStore};

const APP_DIR: &str = "idp_portal";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
const DEFAULT_FETCH_PARALLELISM: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sheets,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub backend: Backend,
    pub spreadsheet_id: Option<String>,
    pub api_base: String,
    pub access_token: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub sqlite_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub fetch_parallelism: usize,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    access_token: Option<String>,
    token: Option<String>,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        let spreadsheet_id = opt_env("IDP_SPREADSHEET_ID");
        let backend = match opt_env("IDP_BACKEND")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Some("sheets") => Backend::Sheets,
            Some("sqlite") => Backend::Sqlite,
            Some("memory") => Backend::Memory,
            _ if spreadsheet_id.is_some() => Backend::Sheets,
            _ => Backend::Sqlite,
        };
        let timeout_secs = env_u64("IDP_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)
            .clamp(1, 120);
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: env_u64("IDP_RETRY_MAX_ATTEMPTS", defaults.max_attempts as u64)
                .clamp(1, 10) as u32,
            base_delay: Duration::from_millis(env_u64(
                "IDP_RETRY_BASE_MS",
                defaults.base_delay.as_millis() as u64,
            )),
            max_delay: defaults.max_delay,
        };
        let credentials_file = opt_env("IDP_CREDENTIALS_FILE").map(PathBuf::from).or_else(|| {
            let fallback = PathBuf::from(DEFAULT_CREDENTIALS_FILE);
            fallback.exists().then_some(fallback)
        });

        Self {
            backend,
            spreadsheet_id,
            api_base: opt_env("IDP_SHEETS_API_BASE").unwrap_or_else(|| SHEETS_API_BASE.to_string()),
            access_token: opt_env("IDP_ACCESS_TOKEN"),
            credentials_file,
            sqlite_path: opt_env("IDP_SQLITE_PATH")
                .map(PathBuf::from)
                .or_else(|| app_cache_dir().map(|dir| dir.join("workbook.sqlite"))),
            request_timeout: Duration::from_secs(timeout_secs),
            retry,
            fetch_parallelism: env_u64("IDP_FETCH_PARALLELISM", DEFAULT_FETCH_PARALLELISM as u64)
                .clamp(1, 16) as usize,
            log_file: opt_env("IDP_LOG_FILE")
                .map(PathBuf::from)
                .or_else(|| app_cache_dir().map(|dir| dir.join("idp_portal.log"))),
        }
    }

    /// Bearer token for the Sheets API: the env token wins over the file.
    pub fn resolve_access_token(&self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }
        let Some(path) = &self.credentials_file else {
            return Err(anyhow!(
                "no credential: set IDP_ACCESS_TOKEN or IDP_CREDENTIALS_FILE"
            ));
        };
        read_credential_file(path)
    }

    /// Builds the configured store wrapped in the retry policy.
    pub fn open_store(&self) -> Result<Box<dyn RecordStore>> {
        match self.backend {
            Backend::Sheets => {
                let spreadsheet_id = self
                    .spreadsheet_id
                    .clone()
                    .context("IDP_SPREADSHEET_ID is required for the sheets backend")?;
                let token = self.resolve_access_token()?;
                let client = http_client(self.request_timeout)?;
                let store = SheetsStore::new(client, self.api_base.clone(), spreadsheet_id, token);
                Ok(Box::new(RetryingStore::new(store, self.retry)))
            }
            Backend::Sqlite => {
                let path = self
                    .sqlite_path
                    .clone()
                    .context("unable to resolve sqlite path")?;
                let store = SqliteStore::open(&path)?;
                store.ensure_catalog()?;
                Ok(Box::new(RetryingStore::new(store, self.retry)))
            }
            Backend::Memory => Ok(Box::new(MemoryStore::with_catalog())),
        }
    }
}

pub fn read_credential_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read credential file {}", path.display()))?;
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        if trimmed.is_empty() {
            return Err(anyhow!("credential file {} is empty", path.display()));
        }
        return Ok(trimmed.to_string());
    }
    let parsed: CredentialFile =
        serde_json::from_str(trimmed).context("invalid credential json")?;
    parsed
        .access_token
        .or(parsed.token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("credential file {} has no access_token", path.display()))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = opt_env("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = opt_env("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::read_credential_file;

    #[test]
    fn credential_file_accepts_json_or_bare_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = dir.path().join("credentials.json");
        fs::write(&json, r#"{"access_token":" ya29.abc "}"#).expect("write");
        assert_eq!(read_credential_file(&json).expect("token"), "ya29.abc");

        let legacy = dir.path().join("legacy.json");
        fs::write(&legacy, r#"{"token":"t-1"}"#).expect("write");
        assert_eq!(read_credential_file(&legacy).expect("token"), "t-1");

        let bare = dir.path().join("token.txt");
        fs::write(&bare, "plain-token\n").expect("write");
        assert_eq!(read_credential_file(&bare).expect("token"), "plain-token");
    }

    #[test]
    fn service_account_key_without_token_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sa.json");
        fs::write(&path, r#"{"type":"service_account","private_key":"-----BEGIN"}"#)
            .expect("write");
        assert!(read_credential_file(&path).is_err());
    }
}
