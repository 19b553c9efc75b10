// outliner-core: document registry, item tree, history ledger and events.

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod history;
pub mod registry;
pub mod store;
pub mod tree;

pub use config::EngineConfig;
pub use document::Document;
pub use error::{Error, Result};
pub use events::EventBus;
pub use registry::{BlockGuard, CloseMode, Engine, Protection};
pub use store::CheckoutPolicy;
