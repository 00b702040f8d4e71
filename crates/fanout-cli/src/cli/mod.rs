pub mod config;
pub mod downloader;
pub mod output;
pub mod telemetry;
