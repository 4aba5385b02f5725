//! External collaborators of the generation pipeline.
//!
//! This crate provides:
//! - The collaborator traits consumed by the worker ([`JobStore`],
//!   [`GenerationProvider`], [`VisionProvider`], [`ArtifactSink`])
//! - [`ProviderError`] with a structured [`ErrorKind`] assigned where each
//!   failure is raised
//! - HTTP clients for generation, Gemini vision analysis and downloads
//! - In-memory and JSON-file job stores

pub mod download;
pub mod error;
pub mod generation;
mod http;
pub mod metrics;
pub mod store;
pub mod traits;
pub mod vision;

pub use download::HttpArtifactSink;
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use generation::{HttpGenerationClient, HttpGenerationConfig};
pub use store::{InMemoryJobStore, JsonFileJobStore, StoreDocument};
pub use traits::{
    ArtifactSink, FetchedImage, GenerationProvider, GenerationRequest, JobStore, PendingFilter,
    VideoRequest, VisionProvider,
};
pub use vision::{GeminiVisionClient, GeminiVisionConfig};
