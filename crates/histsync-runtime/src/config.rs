use crate::error::{Error, Result};
use histsync_providers::{RootSpec, default_roots, expand_home_path, format_from_name};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Resolve the daemon state directory:
/// 1. Explicit path (with tilde expansion)
/// 2. HISTSYNC_PATH environment variable (with tilde expansion)
/// 3. XDG data directory
/// 4. ~/.histsync (fallback for systems without XDG)
pub fn resolve_state_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return expand(path);
    }

    if let Ok(env_path) = std::env::var("HISTSYNC_PATH") {
        return expand(&env_path);
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("histsync"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".histsync"));
    }

    Err(Error::Config(
        "could not determine state path: no HOME directory or XDG data directory found".to_string(),
    ))
}

fn expand(path: &str) -> Result<PathBuf> {
    expand_home_path(path)
        .ok_or_else(|| Error::Config(format!("cannot resolve path: {}", path)))
}

/// Per-source override: disable a built-in source, point it somewhere else,
/// or define a new source with an explicit path and format name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Format name for user-defined sources: `timestamp_log`,
    /// `shell_history`, `prompt_jsonl`, or `session_jsonl`.
    #[serde(default)]
    pub format: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Remote indexing endpoint receiving digest payloads.
    pub endpoint_url: String,
    /// Inactivity duration after which an active session is complete.
    pub idle_timeout_secs: u64,
    /// Sessions with fewer turns than this are discarded, not exported.
    pub min_turns: usize,
    /// Base poll interval.
    pub poll_interval_secs: u64,
    /// Lower bound for the adaptive poll interval.
    pub fast_poll_interval_secs: u64,
    /// HTTP connect/read timeout for deliveries.
    pub http_timeout_secs: u64,
    /// Log an operator-visible warning once a pending export has failed this
    /// many delivery attempts. The item is still retried forever.
    pub warn_after_attempts: u32,
    /// Consecutive ticks allowed to fail on local durability before the
    /// process exits instead of spinning.
    pub max_consecutive_storage_failures: u32,
    /// Seconds between heartbeat log lines.
    pub heartbeat_interval_secs: u64,
    /// Where exported digests are written; defaults to `<state>/exports`.
    pub export_dir: Option<PathBuf>,
    /// Per-source toggles and user-defined sources, keyed by source name.
    pub sources: HashMap<String, SourceConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            endpoint_url: "http://127.0.0.1:8090/api/v1/resources".to_string(),
            idle_timeout_secs: 300,
            min_turns: 2,
            poll_interval_secs: 30,
            fast_poll_interval_secs: 3,
            http_timeout_secs: 30,
            warn_after_attempts: 8,
            max_consecutive_storage_failures: 5,
            heartbeat_interval_secs: 600,
            export_dir: None,
            sources: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path(state_dir: &std::path::Path) -> PathBuf {
        state_dir.join("config.toml")
    }

    /// The source roots this run should poll: the built-in table minus
    /// disabled entries, with path overrides applied, plus any user-defined
    /// sources that name a valid format.
    pub fn effective_roots(&self) -> Vec<RootSpec> {
        let mut roots = Vec::new();

        for mut root in default_roots() {
            match self.sources.get(&root.name) {
                Some(source) if !source.enabled => continue,
                Some(source) => {
                    if let Some(path) = &source.path
                        && let Some(expanded) = expand_source_path(&root.name, path)
                    {
                        root.candidates = vec![expanded];
                    }
                    roots.push(root);
                }
                None => roots.push(root),
            }
        }

        for (name, source) in &self.sources {
            if !source.enabled || default_roots().iter().any(|r| &r.name == name) {
                continue;
            }
            let (Some(path), Some(format_name)) = (&source.path, &source.format) else {
                tracing::warn!(source = name, "user source needs both path and format");
                continue;
            };
            let Some((format, kind)) = format_from_name(format_name) else {
                tracing::warn!(source = name, format = format_name, "unknown source format");
                continue;
            };
            let Some(expanded) = expand_source_path(name, path) else {
                continue;
            };
            roots.push(RootSpec {
                name: name.clone(),
                format,
                kind,
                candidates: vec![expanded],
            });
        }

        roots
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }
}

/// Configured source paths get the same tilde expansion as the built-in
/// candidate table. Relative paths are rejected, not guessed at.
fn expand_source_path(name: &str, path: &std::path::Path) -> Option<PathBuf> {
    match expand_home_path(&path.to_string_lossy()) {
        Some(expanded) => Some(expanded),
        None => {
            tracing::warn!(
                source = name,
                path = %path.display(),
                "source path must be absolute or ~/-relative"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histsync_providers::{RootKind, SourceFormat};
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_documented_policy() {
        let config = DaemonConfig::default();
        assert_eq!(config.idle_timeout_secs, 300);
        assert_eq!(config.min_turns, 2);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = DaemonConfig::default();
        config.idle_timeout_secs = 120;
        config.sources.insert(
            "shell_zsh".to_string(),
            SourceConfig {
                enabled: false,
                path: None,
                format: None,
            },
        );
        config.save_to(&path)?;

        let loaded = DaemonConfig::load_from(&path)?;
        assert_eq!(loaded.idle_timeout_secs, 120);
        assert!(!loaded.sources.get("shell_zsh").unwrap().enabled);
        Ok(())
    }

    #[test]
    fn load_missing_file_returns_defaults() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        let config = DaemonConfig::load_from(&tmp.path().join("none.toml"))?;
        assert_eq!(config.poll_interval_secs, 30);
        Ok(())
    }

    #[test]
    fn disabled_sources_are_dropped_from_the_roots() {
        let mut config = DaemonConfig::default();
        config.sources.insert(
            "shell_zsh".to_string(),
            SourceConfig {
                enabled: false,
                path: None,
                format: None,
            },
        );

        let roots = config.effective_roots();
        assert!(roots.iter().all(|r| r.name != "shell_zsh"));
        assert!(roots.iter().any(|r| r.name == "shell_bash"));
    }

    #[test]
    fn user_defined_source_becomes_a_root() {
        let mut config = DaemonConfig::default();
        config.sources.insert(
            "term_log".to_string(),
            SourceConfig {
                enabled: true,
                path: Some(PathBuf::from("/var/log/term.log")),
                format: Some("timestamp_log".to_string()),
            },
        );

        let roots = config.effective_roots();
        let root = roots.iter().find(|r| r.name == "term_log").unwrap();
        assert_eq!(root.format, SourceFormat::TimestampLog);
        assert_eq!(root.kind, RootKind::File);
        assert_eq!(root.candidates, vec![PathBuf::from("/var/log/term.log")]);
    }

    #[test]
    fn configured_source_paths_are_tilde_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let mut config = DaemonConfig::default();
        config.sources.insert(
            "shell_zsh".to_string(),
            SourceConfig {
                enabled: true,
                path: Some(PathBuf::from("~/histories/zsh_history")),
                format: None,
            },
        );
        config.sources.insert(
            "term_log".to_string(),
            SourceConfig {
                enabled: true,
                path: Some(PathBuf::from("~/term.log")),
                format: Some("timestamp_log".to_string()),
            },
        );

        let roots = config.effective_roots();
        let builtin = roots.iter().find(|r| r.name == "shell_zsh").unwrap();
        assert_eq!(builtin.candidates, vec![home.join("histories/zsh_history")]);
        let user = roots.iter().find(|r| r.name == "term_log").unwrap();
        assert_eq!(user.candidates, vec![home.join("term.log")]);
    }

    #[test]
    fn relative_user_source_paths_are_rejected() {
        let mut config = DaemonConfig::default();
        config.sources.insert(
            "term_log".to_string(),
            SourceConfig {
                enabled: true,
                path: Some(PathBuf::from("relative/term.log")),
                format: Some("timestamp_log".to_string()),
            },
        );
        assert!(config.effective_roots().iter().all(|r| r.name != "term_log"));
    }
}
