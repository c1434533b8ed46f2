pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod plan;
pub mod state;
