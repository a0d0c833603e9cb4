pub mod config;
pub mod error;
pub mod hashing;
pub mod registry;
pub mod text_edit;
pub mod workspace;

pub use error::ToolError;
