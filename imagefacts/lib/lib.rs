//! `imagefacts` resolves container image references discovered from a cluster to authoritative
//! registry metadata and emits a stable, schema-versioned `facts.json` document plus companion
//! statistics and error reports.
//!
//! # Overview
//!
//! The engine is a batch collector designed to run inside a larger support-bundle pipeline.
//! It handles:
//! - OCI distribution and Docker v2 manifest formats
//! - Multiple authentication schemes (anonymous, basic, bearer with token exchange)
//! - Multi-registry idiosyncrasies (Docker Hub, GCR, Quay, GHCR, ECR, ACR)
//! - Partial-failure semantics: every reference ends up as facts, fallback facts, or a
//!   classified error, and the artifacts are written either way
//!
//! # Architecture
//!
//! The engine is assembled from capability implementations chosen at construction:
//! registry access, digest resolution, facts building, and progress reporting. Collection is
//! strictly sequential in v1, which keeps cache and counter invariants trivial; a cancellation
//! token is consulted at every suspension point.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use imagefacts::{
//!     bundle::{BundleCollector, DirectoryWriter},
//!     collect::CollectorEngine,
//!     config::CollectionConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = CollectorEngine::new(CollectionConfig::default())?;
//! let writer = Arc::new(DirectoryWriter::new("bundle/images"));
//! let collector = BundleCollector::new(engine, writer);
//!
//! let references = vec!["nginx:latest".to_string(), "postgres:13".to_string()];
//! let result = collector
//!     .collect_references(&references, &CancellationToken::new())
//!     .await?;
//! println!("collected {} images", result.statistics.successful_images);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`reference`] - Image reference parsing, normalization, and deduplication
//! - [`registry`] - The registry protocol client and authentication schemes
//! - [`resolver`] - Tag-to-digest resolution with TTL caching
//! - [`facts`] - The facts data model and builder
//! - [`collect`] - The resilient batch collector, error classifier, and facts cache
//! - [`output`] - The versioned `facts.json` serializer and validator
//! - [`bundle`] - The integration façade binding discovery input to bundle artifacts

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod bundle;
pub mod collect;
pub mod config;
pub mod facts;
pub mod output;
pub mod progress;
pub mod reference;
pub mod registry;
pub mod resolver;

pub use error::*;
