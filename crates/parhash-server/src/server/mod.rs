pub mod backend;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod run;
pub mod service;
pub mod telemetry;
