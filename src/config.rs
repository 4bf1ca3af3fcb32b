//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::recognition::RecognitionConfig;
use crate::session::SessionConfig;

/// Which recognition capability the daemon drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Lines typed on stdin are treated as utterances
    Console,
    /// No capability; the session can never listen
    Unavailable,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Backend::Console),
            "none" => Ok(Backend::Unavailable),
            other => bail!("unknown recognition backend: {}", other),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Recognition capability to use
    pub backend: Backend,

    /// Settings applied to the recognition handle
    pub recognition: RecognitionConfig,

    /// Session tuning
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-session");

        let socket_path = lookup("VOICE_SESSION_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let backend = match lookup("VOICE_SESSION_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Console,
        };

        let defaults = RecognitionConfig::default();
        let recognition = RecognitionConfig {
            continuous: parse_flag(&lookup, "VOICE_SESSION_CONTINUOUS", defaults.continuous)?,
            interim_results: parse_flag(&lookup, "VOICE_SESSION_INTERIM", defaults.interim_results)?,
            language: lookup("VOICE_SESSION_LANG").unwrap_or(defaults.language),
        };

        let session = match lookup("VOICE_SESSION_TIMEOUT_MS") {
            Some(value) => {
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("invalid VOICE_SESSION_TIMEOUT_MS: {}", value))?;
                SessionConfig {
                    transition_timeout: (ms > 0).then(|| Duration::from_millis(ms)),
                }
            }
            None => SessionConfig::default(),
        };

        Ok(Self {
            socket_path,
            data_dir,
            backend,
            recognition,
            session,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => bail!("invalid {}: {}", key, other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[("HOME", "/home/test")]).unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/home/test/.local/share/voice-session/daemon.sock")
        );
        assert_eq!(config.backend, Backend::Console);
        assert_eq!(config.recognition, RecognitionConfig::default());
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = load(&[
            ("HOME", "/home/test"),
            ("VOICE_SESSION_SOCKET", "/tmp/voice.sock"),
            ("VOICE_SESSION_BACKEND", "none"),
            ("VOICE_SESSION_LANG", "de-DE"),
            ("VOICE_SESSION_INTERIM", "false"),
            ("VOICE_SESSION_TIMEOUT_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/voice.sock"));
        assert_eq!(config.backend, Backend::Unavailable);
        assert_eq!(config.recognition.language, "de-DE");
        assert!(!config.recognition.interim_results);
        assert!(config.recognition.continuous);
        assert_eq!(config.session.transition_timeout, None);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[("HOME", "/h"), ("VOICE_SESSION_BACKEND", "cloud")]).is_err());
        assert!(load(&[("HOME", "/h"), ("VOICE_SESSION_TIMEOUT_MS", "soon")]).is_err());
        assert!(load(&[("HOME", "/h"), ("VOICE_SESSION_CONTINUOUS", "maybe")]).is_err());
    }
}
