//! Connection configuration.

use std::path::PathBuf;

/// Where a connection dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// TCP to `host:port`.
    Tcp {
        /// Hostname or address.
        host: String,
        /// Port.
        port: u16,
    },
    /// UNIX-domain socket.
    Unix {
        /// Filesystem path of the socket.
        path: PathBuf,
    },
}

/// Configuration for a [`Connection`](crate::Connection).
///
/// `password` and `db_index` are carried for the session layer that
/// issues AUTH and SELECT as its first submissions after connect; the
/// connection itself does not read them.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server hostname or address for TCP connects.
    pub host: String,
    /// Server port for TCP connects.
    pub port: u16,
    /// UNIX socket path. A non-empty path selects the UNIX transport
    /// over TCP.
    pub path: Option<PathBuf>,
    /// Password for the session layer's AUTH.
    pub password: Option<String>,
    /// Database index for the session layer's SELECT.
    pub db_index: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            path: None,
            password: None,
            db_index: 0,
        }
    }
}

impl ConnectionConfig {
    /// The transport target this configuration selects.
    pub fn target(&self) -> Target {
        match &self.path {
            Some(path) if !path.as_os_str().is_empty() => Target::Unix { path: path.clone() },
            _ => Target::Tcp {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }
}
