//! Client side of the external generation service.
//!
//! The pipeline depends only on the three-operation [`GenerationService`]
//! contract (submit, get status, cancel) and on [`AssetDownloader`] for
//! fetching finished clips. [`GenerationApi`] and [`HttpDownloader`] are the
//! reqwest-backed implementations.

pub mod api;
pub mod download;
pub mod messages;
pub mod service;

pub use api::GenerationApi;
pub use download::{AssetDownloader, DownloadError, HttpDownloader, DOWNLOAD_CHUNK_BYTES};
pub use messages::{OperationStage, OperationStatus};
pub use service::{GenerationService, ServiceError};
