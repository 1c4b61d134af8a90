pub mod config;
pub mod execution;
pub mod export;
pub mod models;
pub mod orchestration;
pub mod sources;
