//! Core library for the pvt-tools command line application.
//!
//! The library merges a psychomotor-vigilance-task (PVT) export with a survey
//! export keyed by session identifier. Table loaders live under
//! [`pvt::tools::io`], the tabular data model inside [`pvt::tools::model`], the
//! aggregation and join logic in [`pvt::tools::reconcile`], and the end-to-end
//! orchestration under [`pvt::tools::sync`].

pub mod pvt;

pub use pvt::tools::{
    ReconcileError, Result, ToolError, config, error, io, model, reconcile, session, sync,
};
