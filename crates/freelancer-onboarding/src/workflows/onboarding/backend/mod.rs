//! In-process reference backend for the application REST contract.
//!
//! Serves the same routes [`HttpBackendClient`](super::remote::HttpBackendClient) calls,
//! backed by in-memory storage. Used by the API service and by end-to-end tests.

pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

pub use memory::{InMemoryApplicationRepository, InMemoryBlobStore};
pub use repository::{ApplicationRecord, ApplicationRepository, BlobStore, RepositoryError};
pub use router::{onboarding_router, MAX_UPLOAD_BYTES};
pub use service::{BackendError, OnboardingBackend};
