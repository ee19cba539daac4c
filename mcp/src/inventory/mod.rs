//! Tool catalog and qualified naming.
//!
//! - Qualified tool names (`server::tool`), unique across servers
//! - Per-server tool sets replaced atomically on discovery and refresh
//! - Enabled/disabled projection

pub mod index;
pub mod types;

pub use index::ToolCatalog;
pub use types::{QualifiedToolName, ToolEntry, ToolInfo, SEPARATOR};
