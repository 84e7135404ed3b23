pub mod change_scanner;
pub mod compile_commands;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod mcp;
pub mod parsing;
pub mod query;
pub mod scanner;
pub mod storage;
pub mod symbol;
pub mod types;
pub mod worker_pool;

pub use config::Settings;
pub use coordinator::{Coordinator, RefreshMode, RefreshReport};
pub use error::{IndexError, IndexResult};
pub use identity::ProjectIdentity;
pub use lifecycle::{Lifecycle, State};
pub use mcp::IndexServer;
pub use query::QueryLayer;
pub use symbol::{CallSite, Symbol};
pub use types::{Access, FileId, Position, SymbolId, SymbolKind};
