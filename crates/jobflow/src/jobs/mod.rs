pub mod executor;
pub mod memory;
pub mod model;
pub mod repo;
pub mod retry;
pub mod runner;
pub mod service;
pub mod store;
pub mod worker;

pub use executor::{EchoExecutor, ExecutionError, TaskExecutor};
pub use memory::InMemoryJobStore;
pub use model::{Job, JobStats, JobStatus, NewJob};
pub use repo::JobsRepo;
pub use runner::{FinalizeRetry, Finalized, JobRunner};
pub use service::JobService;
pub use store::JobStore;
pub use worker::{Iteration, Worker, WorkerConfig, WorkerPool};
