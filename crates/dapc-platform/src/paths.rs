use std::path::PathBuf;

use crate::error::PlatformError;

/// Standard directories used by dapc.
pub trait PlatformPaths: Send + Sync {
    /// Returns the configuration directory (`~/.config/dapc`).
    fn config_dir(&self) -> PathBuf;
    /// Returns the data directory (`~/.local/share/dapc`).
    fn data_dir(&self) -> PathBuf;
    /// Returns the log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// Returns the user's home directory.
    fn home_dir(&self) -> PathBuf;
}

/// Default implementation of [`PlatformPaths`] using the `dirs` crate and
/// environment variables.
#[derive(Debug, Clone)]
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Creates a new `DefaultPaths` instance, resolving the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Creates paths rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join("dapc")
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("dapc")
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_paths() -> DefaultPaths {
        DefaultPaths::with_home("/home/tester")
    }

    #[test]
    fn config_dir_ends_with_config_dapc() {
        let config = make_paths().config_dir();
        assert!(
            config.ends_with(".config/dapc"),
            "config_dir should end with .config/dapc, got: {:?}",
            config
        );
    }

    #[test]
    fn data_dir_is_under_home() {
        let paths = make_paths();
        assert!(paths.data_dir().starts_with(paths.home_dir()));
        assert!(paths.data_dir().ends_with(".local/share/dapc"));
    }

    #[test]
    fn log_dir_is_under_data_dir() {
        let paths = make_paths();
        let log = paths.log_dir();
        assert!(log.starts_with(paths.data_dir()), "log_dir should be under data_dir");
        assert!(log.ends_with("logs"));
    }

    #[test]
    fn home_dir_round_trips() {
        let paths = make_paths();
        assert_eq!(paths.home_dir(), PathBuf::from("/home/tester"));
    }

    #[test]
    fn default_paths_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DefaultPaths>();
    }
}
