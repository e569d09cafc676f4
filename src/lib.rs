pub mod analysis;
pub mod cache;
pub mod config;
pub mod db;
pub mod deepl;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod retry;
pub mod security;
pub mod segmentation;
pub mod server;
