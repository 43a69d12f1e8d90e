//! Connection parameters handed to the driver adapters.

use std::time::Duration;

/// Vendor-neutral connect parameters.
///
/// Each adapter turns these into its client library's own options and fills in its
/// defaults (port, user) where a value is missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectParams {
    /// Host name or IP address. For SQLite, unused.
    pub host: String,
    /// Port, `None` for the vendor default.
    pub port: Option<u16>,
    /// Database name, or the file path for SQLite.
    pub database: String,
    /// Username.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Time allowed for establishing one connection.
    pub connect_timeout: Option<Duration>,
    /// Application name reported to the server where supported.
    pub application_name: Option<String>,
}

impl ConnectParams {
    /// Parameters for `database` on `host`.
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Port, or `default` when unset.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Username, or `default` when unset.
    pub fn user_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.user.as_deref().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ConnectParams::new("db.internal", "app");
        assert_eq!(params.port_or(5432), 5432);
        assert_eq!(params.user_or("postgres"), "postgres");

        let params = ConnectParams {
            port: Some(6543),
            user: Some("svc".into()),
            ..params
        };
        assert_eq!(params.port_or(5432), 6543);
        assert_eq!(params.user_or("postgres"), "svc");
    }
}
