use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::ingest::DocumentType;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub drive: DriveConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Drive access plus the fixed list of source folders
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_drive_token_env")]
    pub token_env: String,
    pub folders: Vec<FolderConfig>,
}

/// One configured source folder
#[derive(Debug, Clone, Deserialize)]
pub struct FolderConfig {
    pub id: String,
    /// Human label used in logs and folder-level error reports
    pub label: String,
    /// Document type assumed when filename-based inference fails
    pub default_document_type: Option<String>,
}

/// Structured registry source (JSON cache maintained by the spreadsheet sync)
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub cache_path: PathBuf,
}

/// Vector store connection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub index_host: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_store_api_key_env")]
    pub api_key_env: String,
}

/// LLM-assisted segmentation (optional — pipeline degrades without it)
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
        }
    }
}

/// Ingestion tuning
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Soft character budget for section-style chunks
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Soft character budget for transcript/survey paragraph grouping
    #[serde(default = "default_transcript_chunk_chars")]
    pub transcript_chunk_chars: usize,
    /// Delay between successive file operations in live mode
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            transcript_chunk_chars: default_transcript_chunk_chars(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_drive_token_env() -> String {
    "GOOGLE_DRIVE_TOKEN".to_string()
}

fn default_namespace() -> String {
    "grants".to_string()
}

fn default_store_api_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_chunk_chars() -> usize {
    2000
}

fn default_transcript_chunk_chars() -> usize {
    1500
}

fn default_pacing_ms() -> u64 {
    200
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for the config file in this order:
    /// 1. Path specified in GRANTRAG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional; ignore errors
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GRANTRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values and required credentials
    fn validate(&self) -> Result<()> {
        if self.drive.folders.is_empty() {
            anyhow::bail!("drive.folders must list at least one source folder");
        }

        for folder in &self.drive.folders {
            if let Some(doc_type) = &folder.default_document_type {
                if DocumentType::parse(doc_type).is_none() {
                    anyhow::bail!(
                        "folder '{}': unknown default_document_type '{}'",
                        folder.label,
                        doc_type
                    );
                }
            }
        }

        std::env::var(&self.drive.token_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or environment with a drive access token.",
                self.drive.token_env
            )
        })?;

        std::env::var(&self.store.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or environment with the vector store API key.",
                self.store.api_key_env
            )
        })?;

        // The LLM credential is deliberately NOT required: segmentation falls
        // back to deterministic mode when it is absent.

        if self.ingest.chunk_chars == 0 || self.ingest.transcript_chunk_chars == 0 {
            anyhow::bail!("ingest chunk budgets must be greater than 0");
        }

        Ok(())
    }

    /// The LLM API key, if configured in the environment.
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(registry_path: &std::path::Path) -> String {
        format!(
            r#"
[drive]
token_env = "GOOGLE_DRIVE_TOKEN"

[[drive.folders]]
id = "folder-grant-desc"
label = "Grant Descriptions"
default_document_type = "grant_description"

[[drive.folders]]
id = "folder-transcripts"
label = "Call Transcripts"

[registry]
cache_path = "{}"

[store]
index_host = "https://test-index.example.com"
namespace = "grants-test"

[llm]
model = "gpt-4o-mini"

[ingest]
chunk_chars = 2000
transcript_chunk_chars = 1500
pacing_ms = 0
"#,
            registry_path.to_str().unwrap().replace('\\', "\\\\")
        )
    }

    fn with_config_env(config_path: &std::path::Path, with_creds: bool, f: impl FnOnce()) {
        let original = std::env::var("GRANTRAG_CONFIG").ok();
        std::env::set_var("GRANTRAG_CONFIG", config_path.to_str().unwrap());
        if with_creds {
            std::env::set_var("GOOGLE_DRIVE_TOKEN", "test-token");
            std::env::set_var("PINECONE_API_KEY", "test-key");
        } else {
            std::env::remove_var("GOOGLE_DRIVE_TOKEN");
            std::env::remove_var("PINECONE_API_KEY");
        }
        f();
        std::env::remove_var("GRANTRAG_CONFIG");
        std::env::remove_var("GOOGLE_DRIVE_TOKEN");
        std::env::remove_var("PINECONE_API_KEY");
        if let Some(val) = original {
            std::env::set_var("GRANTRAG_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let registry_path = temp_dir.path().join("registry.json");
        fs::write(&registry_path, "[]").unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&registry_path)).unwrap();

        with_config_env(&config_path, true, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.drive.folders.len(), 2);
            assert_eq!(
                config.drive.folders[0].default_document_type.as_deref(),
                Some("grant_description")
            );
            assert_eq!(config.store.namespace, "grants-test");
            assert_eq!(config.ingest.pacing_ms, 0);
        });
    }

    #[test]
    fn test_config_missing_credentials() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let registry_path = temp_dir.path().join("registry.json");
        fs::write(&registry_path, "[]").unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&registry_path)).unwrap();

        with_config_env(&config_path, false, || {
            let config = Config::load();
            assert!(config.is_err(), "Expected missing credential error");
            assert!(config.unwrap_err().to_string().contains("GOOGLE_DRIVE_TOKEN"));
        });
    }

    #[test]
    fn test_config_rejects_unknown_document_type() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = r#"
[drive]
folders = [{ id = "f1", label = "Bad", default_document_type = "press_release" }]

[registry]
cache_path = "registry.json"

[store]
index_host = "https://test-index.example.com"
"#;
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, true, || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("press_release"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("GRANTRAG_CONFIG").ok();
        std::env::set_var("GRANTRAG_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("GRANTRAG_CONFIG");
        if let Some(v) = original {
            std::env::set_var("GRANTRAG_CONFIG", v);
        }
    }
}
