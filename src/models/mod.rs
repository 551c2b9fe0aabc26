pub mod activation;
pub mod catalog;
pub mod download;
pub mod jobs;
pub mod orchestrator;

pub use activation::{ActivationState, ActivationStore, ModelStatus};
pub use catalog::{Catalog, CatalogStore, License, ModelEntry};
pub use download::{HfHub, ModelHub};
pub use jobs::{DownloadJob, DownloadJobs, JobState};
pub use orchestrator::{DownloadOrchestrator, DownloadPolicy, DownloadReport, ItemResult};
