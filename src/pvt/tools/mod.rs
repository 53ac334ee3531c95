pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod sync;

pub use error::{ReconcileError, Result, ToolError};
