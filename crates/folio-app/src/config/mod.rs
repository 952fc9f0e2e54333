//! Configuration loading and XDG path helpers.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "config/settings";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in chars.
    pub window: usize,
    /// Chars shared between consecutive chunks.
    pub overlap: usize,
    /// How far past the window a sentence terminator is searched for.
    pub sentence_lookahead: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub dim: usize,
    /// Concurrent embedding requests per file.
    pub concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Concurrent layout requests per file.
    pub concurrency: usize,
    /// Layout provider rate limit, requests per second.
    pub requests_per_second: u32,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = default_storage_path()?;
    let builder = Config::builder()
        .set_default("server.listen_addr", "127.0.0.1:8080")?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .set_default("chunking.window", 1024_i64)?
        .set_default("chunking.overlap", 50_i64)?
        .set_default("chunking.sentence_lookahead", 100_i64)?
        .set_default("embedding.dim", 1536_i64)?
        .set_default("embedding.concurrency", 4_i64)?
        .set_default("retrieval.top_k", 3_i64)?
        .set_default("extraction.concurrency", 4_i64)?
        .set_default("extraction.requests_per_second", 10_i64)?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("FOLIO").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "folio", "folio").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_storage_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
