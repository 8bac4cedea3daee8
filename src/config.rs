use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Supabase,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "supabase" => Ok(BackendKind::Supabase),
            "memory" => Ok(BackendKind::Memory),
            other => anyhow::bail!("unknown backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub backend: BackendKind,
    pub supabase_url: String,
    pub supabase_key: String,
    pub jwt_secret: Option<String>,
    pub bucket: String,
    pub todos_table: String,
    pub cache_control: String,
    pub max_upload_size: usize,
    pub allowed_origins: Vec<String>,
    pub seed_sample_todos: bool,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            backend: BackendKind::Supabase,
            supabase_url: "http://localhost:54321".to_string(),
            supabase_key: String::new(),
            jwt_secret: None,
            bucket: "temp_1".to_string(),
            todos_table: "todos".to_string(),
            cache_control: "3600".to_string(),
            max_upload_size: 50 * 1024 * 1024,
            allowed_origins: Vec::new(),
            seed_sample_todos: true,
            secure_cookies: false,
        }
    }
}

impl Config {
    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
        } else {
            let default_config = Config::default();
            let toml_string = toml::to_string_pretty(&default_config)
                .context("failed to serialize default config")?;
            std::fs::write(path, toml_string)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote default configuration to {}", path.display());
            Ok(default_config)
        }
    }

    pub fn from_env_config() -> anyhow::Result<Self> {
        let mut final_cfg = Self::load(Path::new("config.toml"))?;
        final_cfg.apply_env(|key| std::env::var(key).ok())?;

        if final_cfg.backend == BackendKind::Memory && final_cfg.jwt_secret.is_none() {
            final_cfg.jwt_secret = Some(uuid::Uuid::new_v4().to_string());
        }
        if final_cfg.backend == BackendKind::Supabase && final_cfg.supabase_key.is_empty() {
            anyhow::bail!("supabase_key is not configured (set SUPABASE_KEY)");
        }
        Ok(final_cfg)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("TODODRIVE_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = var("TODODRIVE_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = var("SUPABASE_URL") {
            self.supabase_url = v;
        }
        if let Some(v) = var("SUPABASE_KEY") {
            self.supabase_key = v;
        }
        if let Some(v) = var("SUPABASE_JWT_SECRET") {
            self.jwt_secret = Some(v);
        }
        Ok(())
    }

    pub fn jwt_secret_bytes(&self) -> Option<&[u8]> {
        self.jwt_secret.as_deref().map(str::as_bytes)
    }

    /// `Cache-Control` value sent with uploads.
    pub fn cache_control_header(&self) -> String {
        if self.cache_control.chars().all(|c| c.is_ascii_digit()) {
            format!("max-age={}", self.cache_control)
        } else {
            self.cache_control.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.bucket, "temp_1");
        assert!(path.exists());
        let reread = Config::load(&path).unwrap();
        assert_eq!(reread.listen, cfg.listen);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"memory\"\nbucket = \"drops\"\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.bucket, "drops");
        assert_eq!(cfg.todos_table, "todos");
    }

    #[test]
    fn env_overrides_file() {
        let vars: HashMap<&str, &str> = [
            ("SUPABASE_URL", "https://demo.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("TODODRIVE_BACKEND", "Memory"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.supabase_url, "https://demo.supabase.co");
        assert_eq!(cfg.supabase_key, "anon");
        assert_eq!(cfg.backend, BackendKind::Memory);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut cfg = Config::default();
        assert!(cfg.apply_env(|k| (k == "TODODRIVE_BACKEND").then(|| "sqlite".to_string())).is_err());
    }

    #[test]
    fn cache_control_seconds_become_max_age() {
        let mut cfg = Config::default();
        assert_eq!(cfg.cache_control_header(), "max-age=3600");
        cfg.cache_control = "no-cache".into();
        assert_eq!(cfg.cache_control_header(), "no-cache");
    }
}
