//! price-scout - extract a single numeric price from rendered web pages
//!
//! Bounded-retry extraction sessions over a pluggable rendering engine,
//! concurrent batches, and locale-aware price normalization.

pub mod batch;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod format;
pub mod price;
pub mod session;
pub mod sites;

pub use batch::{BatchOptions, BatchResult, BatchSummary, ConcurrentBatchRunner};
pub use config::Config;
pub use engine::{EngineLauncher, IdentityPool, IdentityProfile, Locator, RenderingEngine};
pub use error::{EngineError, ExtractionError};
pub use extractor::{Backoff, ExtractionReport, ExtractionRequest, RetryingExtractor};
pub use price::parse_price;
pub use session::{ExtractionSession, SessionSettings};
