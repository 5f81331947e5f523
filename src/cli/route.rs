//! CLI route: single route table and run context. Dispatches to the parser and upload pipeline.

use crate::cli::command_name;
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, PlayerConfig};
use crate::error::{ApiError, UploadError};
use crate::parser::substitute::PlaceholderPolicy;
use crate::parser::ExperimentParser;
use crate::types::{Participant, PastSession};
use crate::upload::{
    CompletedUpload, HttpMultipartStore, MemoryStore, MultipartStore, UploadManager,
};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: PlayerConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self {
            workspace_root,
            config: config.validated()?,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(command = command_name(command), elapsed_ms, "Command finished"),
            Err(e) => warn!(
                command = command_name(command),
                elapsed_ms,
                error = %e,
                "Command failed"
            ),
        }
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Parse {
                experiment,
                past_sessions,
                age_days,
                seed,
                strict,
            } => self.handle_parse(
                experiment,
                past_sessions.as_deref(),
                *age_days,
                *seed,
                *strict,
            ),
            Commands::Upload {
                file,
                name,
                chunk_bytes,
                dry_run,
            } => self.handle_upload(file, name, *chunk_bytes, *dry_run),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn read_json(&self, path: &Path) -> Result<Value, ApiError> {
        let text = std::fs::read_to_string(self.resolve(path))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn handle_parse(
        &self,
        experiment: &Path,
        past_sessions: Option<&Path>,
        age_days: Option<u32>,
        seed: Option<u64>,
        strict: bool,
    ) -> Result<String, ApiError> {
        let structure = self.read_json(experiment)?;
        let past_sessions: Vec<PastSession> = match past_sessions {
            Some(path) => serde_json::from_value(self.read_json(path)?)?,
            None => Vec::new(),
        };

        let mut parser_config = self.config.parser.clone();
        if strict {
            parser_config.placeholder_policy = PlaceholderPolicy::Strict;
        }
        if seed.is_some() {
            parser_config.seed = seed;
        }

        let mut parser = ExperimentParser::from_json(structure, past_sessions)?
            .with_config(&parser_config)
            .with_participant(Participant {
                age_in_days: age_days,
            });
        let output = parser.parse()?;
        Ok(serde_json::to_string_pretty(&output)?)
    }

    fn handle_upload(
        &self,
        file: &Path,
        name: &str,
        chunk_bytes: usize,
        dry_run: bool,
    ) -> Result<String, ApiError> {
        if chunk_bytes == 0 {
            return Err(ApiError::ConfigError(
                "--chunk-bytes must be greater than zero".to_string(),
            ));
        }
        let store: Arc<dyn MultipartStore> = if dry_run {
            Arc::new(MemoryStore::new())
        } else {
            let store =
                HttpMultipartStore::from_config(&self.config.upload).map_err(UploadError::from)?;
            Arc::new(store)
        };

        let mut source = std::fs::File::open(self.resolve(file))?;
        let rt = tokio::runtime::Runtime::new()?;
        let completed = rt.block_on(stream_file(
            store,
            &self.config,
            name,
            &mut source,
            chunk_bytes,
        ))?;

        Ok(format!(
            "{}{}: {} parts, {} bytes",
            if dry_run { "[dry run] " } else { "" },
            completed.key,
            completed.parts.len(),
            completed.total_bytes
        ))
    }
}

/// Feed `source` through an [`UploadManager`] in `chunk_bytes` pieces.
async fn stream_file(
    store: Arc<dyn MultipartStore>,
    config: &PlayerConfig,
    name: &str,
    source: &mut impl Read,
    chunk_bytes: usize,
) -> Result<CompletedUpload, ApiError> {
    let mut manager = UploadManager::new(store, &config.upload, name);
    manager.create_upload().await?;

    let mut buffer = vec![0u8; chunk_bytes];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if let Err(abort_error) = manager.abort().await {
                    warn!(error = %abort_error, "Failed to abort upload after read error");
                }
                return Err(e.into());
            }
        };
        manager.on_data_available(&buffer[..read]).await?;
    }

    Ok(manager.complete_upload().await?)
}
