// Open, edit, save: the lifecycle every document command runs inside.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use outliner_core::{Document, Engine, EngineConfig};
use tracing::debug;

pub struct Session {
    engine: Engine,
    document: Arc<Document>,
}

impl Session {
    /// Open `path` with the user's engine configuration.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let engine = Engine::new(EngineConfig::load());
        let document = engine
            .open(path)
            .with_context(|| format!("failed to open document `{}`", path.display()))?;
        Ok(Self { engine, document })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Persist pending changes, then shut the engine down.
    pub fn finish(self) -> anyhow::Result<()> {
        let path = self.document.path().to_path_buf();
        if self.document.pending_changes() {
            self.engine
                .save(&path)
                .with_context(|| format!("failed to save document `{}`", path.display()))?;
            debug!(path = %path.display(), "session saved");
        }
        self.engine.exit();
        Ok(())
    }
}
