//! Client configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the daemon's instance directory
pub const INSTANCE_PATH_ENV: &str = "MDP_INSTANCE_PATH";

/// File name of the daemon socket inside the instance directory
pub const DEFAULT_DAEMON_SOCKET_NAME: &str = "mdp.socket";

/// Receive buffer requested for client sockets
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 128 * 1024;

/// Reply timeout used by the request helpers
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Client configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MdpConfig {
    /// Directory holding the daemon socket and client sockets.
    pub instance_dir: PathBuf,
    /// File name of the daemon socket.
    pub daemon_socket_name: String,
    /// Receive buffer size requested for the client socket.
    pub recv_buffer_size: usize,
    /// Reply timeout for `bind` and address queries.
    pub request_timeout: Duration,
}

impl Default for MdpConfig {
    fn default() -> Self {
        let instance_dir = env::var_os(INSTANCE_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map_or_else(env::temp_dir, PathBuf::from);
        Self::new(instance_dir)
    }
}

impl MdpConfig {
    /// Configuration for the daemon running in `instance_dir`
    #[must_use]
    pub fn new(instance_dir: impl Into<PathBuf>) -> Self {
        Self {
            instance_dir: instance_dir.into(),
            daemon_socket_name: DEFAULT_DAEMON_SOCKET_NAME.to_owned(),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Use another instance directory
    #[must_use]
    pub fn with_instance_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.instance_dir = dir.into();
        self
    }

    /// Use another daemon socket name
    #[must_use]
    pub fn with_daemon_socket_name(mut self, name: impl Into<String>) -> Self {
        self.daemon_socket_name = name.into();
        self
    }

    /// Use another receive buffer size
    #[must_use]
    pub const fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Use another request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full path of the daemon socket
    #[must_use]
    pub fn daemon_socket_path(&self) -> PathBuf {
        self.instance_dir.join(&self.daemon_socket_name)
    }

    /// Path for a client socket owned by process `pid`
    #[must_use]
    pub fn client_socket_path(&self, pid: u32, random: u32) -> PathBuf {
        self.instance_dir
            .join(format!("mdp.client.{pid}.{random:08x}.socket"))
    }

    /// Request timeout in whole milliseconds
    #[must_use]
    pub fn request_timeout_ms(&self) -> i64 {
        i64::try_from(self.request_timeout.as_millis()).unwrap_or(i64::MAX)
    }

    pub(crate) fn is_daemon(&self, path: &Path) -> bool {
        path == self.daemon_socket_path()
    }
}
