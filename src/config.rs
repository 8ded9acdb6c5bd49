//! Server configuration layered from TOML files and command-line flags.
//!
//! Later sources override earlier ones field by field, highest priority first:
//! 1. CLI flags (`--root`, `--host`, `--port`, `--watch`, `--debug`)
//! 2. Explicit `--config` file
//! 3. `$MFD_CONFIG` environment variable (path to config file)
//! 4. Project-local `.mfd.toml` in the current working directory
//! 5. Global `~/.config/mfd/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::scan::variants::VariantSize;

// ── Section configs ──────────────────────────────────────────────────────────

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Content root settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory holding the media files.
    pub root: Option<PathBuf>,
    /// Public URL of the content root, used to build record guids.
    pub base_url: Option<String>,
}

/// Catalog store settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file.
    pub database: Option<PathBuf>,
}

/// Derived-size variant settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct VariantsConfig {
    /// Generate resized copies of images registered by a sync.
    pub enabled: Option<bool>,
    pub sizes: Option<Vec<VariantSize>>,
    /// Permission bits applied to generated files.
    pub mode: Option<u32>,
}

/// Auto-sync settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Sync automatically when files change below the content root.
    pub enabled: Option<bool>,
    /// Quiet period before a batch of changes is synced.
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, e.g. "info" or "media_folders=debug".
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Everything `mfd` reads at startup.
///
/// Every field is optional; unset fields fall back to the getters' defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub content: ContentConfig,
    pub catalog: CatalogConfig,
    pub variants: VariantsConfig,
    pub watcher: WatcherConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BASE_URL: &str = "http://localhost/uploads";
/// Catalog file name inside the content root. Hidden, so scans skip it.
pub const DEFAULT_DATABASE_NAME: &str = ".catalog.sqlite3";
pub const DEFAULT_VARIANT_MODE: u32 = 0o755;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ── Config file locator ──────────────────────────────────────────────────────

/// Config files probed on every start, highest priority first. `--config` is handled by
/// [`AppConfig::load`].
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("MFD_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".mfd.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mfd").join("config.toml"));
    }

    paths
}

/// A config file that exists but could not be parsed. Logged once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Parse one config file. A missing file yields `Ok(None)`.
fn load_file(path: &Path) -> Result<Option<AppConfig>, ConfigWarning> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Ok(None);
    };
    toml::from_str::<AppConfig>(&content)
        .map(Some)
        .map_err(|e| ConfigWarning {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: other.server.host.clone().or(self.server.host),
                port: other.server.port.or(self.server.port),
            },
            content: ContentConfig {
                root: other.content.root.clone().or(self.content.root),
                base_url: other.content.base_url.clone().or(self.content.base_url),
            },
            catalog: CatalogConfig {
                database: other.catalog.database.clone().or(self.catalog.database),
            },
            variants: VariantsConfig {
                enabled: other.variants.enabled.or(self.variants.enabled),
                sizes: other.variants.sizes.clone().or(self.variants.sizes),
                mode: other.variants.mode.or(self.variants.mode),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
            },
            logging: LoggingConfig {
                level: other.logging.level.clone().or(self.logging.level),
            },
        }
    }

    /// Resolve the effective configuration from defaults, discovered files, the `--config`
    /// file and finally the flag overrides.
    ///
    /// Malformed files are skipped and returned as warnings, since this runs before the tracing
    /// subscriber exists.
    pub fn load(
        cli_config_path: Option<&Path>,
        cli_overrides: Option<&AppConfig>,
    ) -> (AppConfig, Vec<ConfigWarning>) {
        let mut config = AppConfig::default();
        let mut warnings = Vec::new();

        // Lowest priority first; each merge overrides what came before.
        let mut files: Vec<PathBuf> = candidate_paths().into_iter().rev().collect();
        files.extend(cli_config_path.map(Path::to_path_buf));
        for path in &files {
            match load_file(path) {
                Ok(Some(file_cfg)) => config = config.merge(&file_cfg),
                Ok(None) => {}
                Err(warning) => warnings.push(warning),
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        (config, warnings)
    }

    // ── Effective values ─────────────────────────────────────────────────────

    pub fn host(&self) -> &str {
        self.server.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.server.port.unwrap_or(DEFAULT_PORT)
    }

    /// Content root; the current directory when unset.
    pub fn content_root(&self) -> PathBuf {
        self.content
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn base_url(&self) -> &str {
        self.content.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Catalog database path; defaults to a hidden file inside the content root.
    pub fn database_path(&self) -> PathBuf {
        self.catalog
            .database
            .clone()
            .unwrap_or_else(|| self.content_root().join(DEFAULT_DATABASE_NAME))
    }

    pub fn variants_enabled(&self) -> bool {
        self.variants.enabled.unwrap_or(true)
    }

    pub fn variant_sizes(&self) -> Vec<VariantSize> {
        self.variants
            .sizes
            .clone()
            .unwrap_or_else(VariantSize::defaults)
    }

    pub fn variant_mode(&self) -> u32 {
        self.variants.mode.unwrap_or(DEFAULT_VARIANT_MODE)
    }

    /// Whether the watcher is enabled.
    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(false)
    }

    /// Watcher debounce interval in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_any_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.host(), "127.0.0.1");
        assert_eq!(cfg.port(), 8787);
        assert_eq!(cfg.content_root(), PathBuf::from("."));
        assert_eq!(cfg.base_url(), "http://localhost/uploads");
        assert_eq!(cfg.database_path(), PathBuf::from(".").join(".catalog.sqlite3"));
        assert!(cfg.variants_enabled());
        assert_eq!(cfg.variant_sizes(), VariantSize::defaults());
        assert_eq!(cfg.variant_mode(), 0o755);
        assert!(!cfg.watcher_enabled());
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(cfg.log_level(), "info");
    }

    #[test]
    fn parses_every_section() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000

[content]
root = "/srv/media"
base_url = "https://cdn.example.com/media/"

[catalog]
database = "/var/lib/mfd/catalog.db"

[variants]
enabled = false
mode = 420
sizes = [{ name = "small", width = 64, height = 64, crop = true }]

[watcher]
enabled = true
debounce_ms = 500

[logging]
level = "debug"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.host(), "0.0.0.0");
        assert_eq!(cfg.port(), 9000);
        assert_eq!(cfg.content_root(), PathBuf::from("/srv/media"));
        assert_eq!(cfg.base_url(), "https://cdn.example.com/media/");
        assert_eq!(cfg.database_path(), PathBuf::from("/var/lib/mfd/catalog.db"));
        assert!(!cfg.variants_enabled());
        assert_eq!(cfg.variant_mode(), 0o644);
        assert_eq!(
            cfg.variant_sizes(),
            vec![VariantSize::new("small", 64, 64, true)]
        );
        assert!(cfg.watcher_enabled());
        assert_eq!(cfg.debounce_ms(), 500);
        assert_eq!(cfg.log_level(), "debug");
    }

    #[test]
    fn partial_file_leaves_other_fields_unset() {
        let toml = r#"
[content]
root = "/srv/media"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/srv/media").join(".catalog.sqlite3")
        );
        assert_eq!(cfg.port(), 8787);
    }

    #[test]
    fn merge_prefers_the_override() {
        let base = AppConfig {
            server: ServerConfig {
                host: Some("0.0.0.0".into()),
                port: Some(9000),
            },
            ..Default::default()
        };
        let over = AppConfig {
            server: ServerConfig {
                port: Some(9100),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.port(), 9100);
        assert_eq!(merged.host(), "0.0.0.0");
    }

    #[test]
    fn merge_keeps_values_the_override_lacks() {
        let base = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(true),
                debounce_ms: Some(500),
            },
            ..Default::default()
        };

        let merged = base.merge(&AppConfig::default());
        assert!(merged.watcher_enabled());
        assert_eq!(merged.debounce_ms(), 500);
    }

    #[test]
    fn loads_explicit_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[server]
port = 7000

[logging]
level = "warn"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("parse").expect("exists");
        assert_eq!(cfg.port(), 7000);
        assert_eq!(cfg.log_level(), "warn");
        assert_eq!(cfg.host(), "127.0.0.1");
    }

    #[test]
    fn missing_file_is_skipped() {
        assert_eq!(load_file(Path::new("/nonexistent/config.toml")), Ok(None));
    }

    #[test]
    fn malformed_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        let warning = load_file(&cfg_path).unwrap_err();
        assert_eq!(warning.path, cfg_path);

        let (cfg, warnings) = AppConfig::load(Some(&cfg_path), None);
        assert_eq!(cfg.port(), DEFAULT_PORT);
        assert!(warnings.iter().any(|w| w.path == cfg_path && !w.message.is_empty()));
    }

    #[test]
    fn flags_override_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[server]
host = "0.0.0.0"
port = 7000
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            server: ServerConfig {
                port: Some(7100),
                ..Default::default()
            },
            ..Default::default()
        };

        let (cfg, warnings) = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        assert!(warnings.iter().all(|w| w.path != cfg_path));
        assert_eq!(cfg.port(), 7100);
        assert_eq!(cfg.host(), "0.0.0.0");
    }
}
