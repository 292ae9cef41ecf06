//! Server configuration read from the process environment.
//!
//! The script URL and sheet identifiers are optional at startup: the proxy
//! still boots without them and each endpoint fails closed with a
//! configuration error until they are provided.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::api::normalize_script_url;
use crate::error::CafeError;

pub const ENV_SCRIPT_URL: &str = "GOOGLE_SCRIPT_URL";
pub const ENV_MENU_SHEET_ID: &str = "MENU_SHEET_ID";
pub const ENV_ORDER_SHEET_ID: &str = "ORDER_SHEET_ID";
pub const ENV_BIND_ADDR: &str = "CAFE_BIND_ADDR";
pub const ENV_PORT: &str = "CAFE_PORT";
pub const ENV_UPSTREAM_TIMEOUT: &str = "CAFE_UPSTREAM_TIMEOUT_SECS";
/// Read before logging starts, so not part of [`Config`].
pub const ENV_LOG_DIR: &str = "CAFE_LOG_DIR";

#[derive(Debug, Clone)]
pub struct Config {
    pub script_url: Option<String>,
    pub menu_sheet_id: Option<String>,
    pub order_sheet_id: Option<String>,
    pub bind_addr: String,
    pub port: u16,
    pub upstream_timeout: Duration,
}

/// Which spreadsheet a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Menu,
    Orders,
}

impl Sheet {
    fn env_key(self) -> &'static str {
        match self {
            Sheet::Menu => ENV_MENU_SHEET_ID,
            Sheet::Orders => ENV_ORDER_SHEET_ID,
        }
    }
}

/// Fully resolved upstream destination for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub script_url: String,
    pub sheet_id: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            let value = lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            if value.is_none() {
                warn!("{key} not set; endpoints depending on it will fail closed");
            }
            value
        };

        Self {
            script_url: secret(ENV_SCRIPT_URL).map(|u| normalize_script_url(&u)),
            menu_sheet_id: secret(ENV_MENU_SHEET_ID),
            order_sheet_id: secret(ENV_ORDER_SHEET_ID),
            bind_addr: lookup(ENV_BIND_ADDR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: try_load(&lookup, ENV_PORT, 3000),
            upstream_timeout: Duration::from_secs(try_load(&lookup, ENV_UPSTREAM_TIMEOUT, 30)),
        }
    }

    /// Resolve the script URL and sheet id for `sheet`, or a configuration
    /// error naming what is missing.
    pub fn sheet_target(&self, sheet: Sheet) -> Result<SheetTarget, CafeError> {
        let sheet_id = match sheet {
            Sheet::Menu => self.menu_sheet_id.as_ref(),
            Sheet::Orders => self.order_sheet_id.as_ref(),
        };
        match (self.script_url.as_ref(), sheet_id) {
            (Some(script_url), Some(sheet_id)) => Ok(SheetTarget {
                script_url: script_url.clone(),
                sheet_id: sheet_id.clone(),
            }),
            (None, _) => Err(CafeError::Config(format!(
                "{ENV_SCRIPT_URL} or {} is not set",
                sheet.env_key()
            ))),
            (Some(_), None) => Err(CafeError::Config(format!("{} is not set", sheet.env_key()))),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}; using default: {default}");
            default
        }),
    }
}
