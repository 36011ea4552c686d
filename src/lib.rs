pub mod config;
pub mod drive;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod registry;
pub mod resolve;
pub mod singleflight;
pub mod store;

pub use config::Config;
pub use error::{GrantRagError, Result};
