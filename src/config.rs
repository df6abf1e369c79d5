use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::auth::{StaffDirectory, StaffMember};
use crate::limits::MAX_STAFF_NAME_LEN;
use crate::model::Role;
use crate::report;

const PREFIX: &str = "ROOMSYNC_";

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: String, reason: String },
    Missing(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, reason } => write!(f, "{var}: {reason}"),
            ConfigError::Missing(var) => write!(f, "{var} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Google Sheets feed settings. All three must be present to use the feed.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub api_key: String,
    pub spreadsheet_id: String,
    pub range: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    pub staff: StaffDirectory,
    pub sheets: Option<SheetsConfig>,
    pub sync_interval: Option<Duration>,
    pub report_start: NaiveTime,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(&format!("{PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };

        let sheets = match (get("SHEETS_API_KEY"), get("SPREADSHEET_ID")) {
            (Some(api_key), Some(spreadsheet_id)) => Some(SheetsConfig {
                api_key,
                spreadsheet_id,
                range: get("SHEETS_RANGE").unwrap_or_else(|| "A1:L200".into()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(format!("{PREFIX}SPREADSHEET_ID"))),
            (None, Some(_)) => return Err(ConfigError::Missing(format!("{PREFIX}SHEETS_API_KEY"))),
        };

        let report_start = match get("REPORT_START") {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|e| invalid("REPORT_START", e))?,
            None => report::default_report_start(),
        };

        let sync_interval = parse_opt::<u64>(&get, "SYNC_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let staff = match get("STAFF") {
            Some(raw) => parse_staff(&raw)?,
            None => StaffDirectory::default(),
        };

        Ok(Self {
            port: parse_opt(&get, "PORT")?.unwrap_or(5433),
            bind: get("BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".into())),
            max_connections: parse_opt(&get, "MAX_CONNECTIONS")?.unwrap_or(64),
            compact_threshold: parse_opt(&get, "COMPACT_THRESHOLD")?.unwrap_or(1000),
            tls_cert: get("TLS_CERT"),
            tls_key: get("TLS_KEY"),
            metrics_port: parse_opt(&get, "METRICS_PORT")?,
            staff,
            sheets,
            sync_interval,
            report_start,
        })
    }
}

fn invalid(name: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var: format!("{PREFIX}{name}"),
        reason: reason.to_string(),
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    get(name)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| invalid(name, e)))
        .transpose()
}

/// Parse `name:password:role;name:password:role`. Role is `fo` or `hk`.
pub fn parse_staff(raw: &str) -> Result<StaffDirectory, ConfigError> {
    let mut directory = StaffDirectory::default();
    for item in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.splitn(3, ':');
        let (Some(name), Some(password), Some(role)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("STAFF", format!("expected name:password:role, got '{item}'")));
        };
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_STAFF_NAME_LEN {
            return Err(invalid("STAFF", format!("bad staff name '{name}'")));
        }
        let role = Role::parse(role)
            .ok_or_else(|| invalid("STAFF", format!("unknown role '{}' for {name}", role.trim())))?;
        if !directory.insert(StaffMember {
            name: name.to_string(),
            password: password.to_string(),
            role,
        }) {
            return Err(invalid("STAFF", format!("duplicate staff name '{name}'")));
        }
    }
    Ok(directory)
}
