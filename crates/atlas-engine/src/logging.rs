//! Logging bootstrap for embedding binaries.
//!
//! The engine only emits `tracing` events; the process hosting it decides
//! where they go. When the engine runs behind a stdio transport, stdout
//! carries protocol payloads only, so every sink here is stderr or a file.
//! `logging.directory` routes events to `atlas.log` in that directory;
//! `logging.mirror_tmp` tees a copy into the system temp directory.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use atlas_core::config::LoggingConfig;
use atlas_core::error::EngineError;

fn open_log(dir: &Path) -> Result<Arc<std::fs::File>, EngineError> {
    std::fs::create_dir_all(dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("atlas.log"))?;
    Ok(Arc::new(file))
}

/// Install the global subscriber once per process. Respects `RUST_LOG`;
/// defaults to `info`.
pub fn init(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match (&config.directory, config.mirror_tmp) {
        (Some(dir), true) => {
            let file = open_log(Path::new(dir))?;
            let tmp = open_log(&std::env::temp_dir().join("atlas"))?;
            BoxMakeWriter::new(file.and(tmp))
        }
        (Some(dir), false) => BoxMakeWriter::new(open_log(Path::new(dir))?),
        (None, true) => {
            let tmp = open_log(&std::env::temp_dir().join("atlas"))?;
            BoxMakeWriter::new(std::io::stderr.and(tmp))
        }
        (None, false) => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| EngineError::Io(format!("subscriber already installed: {e}")))
}
