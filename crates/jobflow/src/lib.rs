//! Durable background job queue: a store of record, an advisory dispatch queue, and
//! workers that claim, execute and retry jobs.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod queue;
pub mod telemetry;

pub use error::JobError;
