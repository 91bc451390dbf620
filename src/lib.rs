//! `surgical-modifier`: pattern-driven, reversible source edits behind MCP.
//!
//! Callers describe an edit (search, replace, insert, delete, append) as a
//! pattern plus options. The selector scores every registered engine against
//! the capabilities the edit needs and the complexity of the pattern and
//! content, then the surgeon applies the edit with the winner. Every write is
//! snapshotted first and journalled so it can be rolled back or committed.
//!
//! # Tools
//!
//! - `execute`: run one operation against a workspace file
//! - `rollback`: undo pending edits, or restore a stored snapshot
//! - `commit`: accept an edit and drop its rollback record
//! - `engines`: list engines, their metrics, and explain a selection
//!
//! # Architecture
//!
//! ```text
//! stdin (JSON-RPC) → McpServer → ToolRouter → Surgeon → EngineSelector → Registry
//!                                               ↓                          ↓
//!                                         BackupStore            literal / regex / fuzzy
//!                                         RollbackJournal        block / ast-grep
//! stdout (JSON-RPC) ←─────────────────────────┘
//! ```

pub mod capability;
pub mod complexity;
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod matcher;
pub mod ops;
pub mod selector;
pub mod server;
pub mod structure;
pub mod tools;
pub mod util;

pub use config::SurgeonConfig;
pub use engine::registry::Registry;
pub use error::{SurgeonError, SurgeonResult};
pub use ops::{ExecuteOptions, Operation, OperationResult, OperationStatus, Surgeon};
pub use selector::EngineSelector;
pub use server::{McpServer, run_mcp_server};
