//! Application context shared by all route handlers.
//!
//! [`AppContext`] is cloned into every handler through Axum state. Every
//! field is either an `Arc` or a cheap handle, so cloning never copies data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::events::EventBus;
use rf_core::UploadId;
use rf_pipeline::{Pipeline, Transformer};

#[derive(Clone, Debug)]
pub struct AppContext {
    /// Startup configuration.
    pub config: Arc<Config>,
    /// The job pipeline.
    pub pipeline: Pipeline,
    /// Job lifecycle events, streamed over SSE.
    pub event_bus: Arc<EventBus>,
    /// Discovered external tools.
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    /// Build the context, creating the staging directories if needed.
    pub fn new(
        config: Config,
        transformer: Arc<dyn Transformer>,
        tools: Arc<ToolRegistry>,
    ) -> rf_core::Result<Self> {
        config.storage.ensure_dirs()?;

        let event_bus = Arc::new(EventBus::default());
        let pipeline = Pipeline::new(
            &config.storage,
            &config.pipeline,
            transformer,
            event_bus.clone(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            event_bus,
            tools,
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.config.storage.uploads_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.config.storage.outputs_dir
    }

    /// Directory holding one upload session's files.
    pub fn upload_dir(&self, id: UploadId) -> PathBuf {
        self.uploads_dir().join(id.to_string())
    }
}
