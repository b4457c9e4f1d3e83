use std::path::PathBuf;

pub const DEFAULT_NAME: &str = "unnamed";
pub const DEFAULT_URI: &str = "unix:///tmp/sw-axi";

/// Settings a [`Bridge`](crate::Bridge) is created with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Name the bridge announces to the router. Only used for display purposes.
    pub name: String,
    /// Rendezvous point of the router, `unix://<socket path>`.
    pub uri: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            uri: DEFAULT_URI.to_owned(),
        }
    }
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_uri(self, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..self
        }
    }

    /// Configuration pointing at a socket at `path`.
    pub fn with_socket_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.with_uri(format!("unix://{}", path.display()))
    }
}
