pub mod client;
pub mod error;
pub mod http;
pub mod testkit;

pub use client::{QuoteBatch, QuoteSource};
pub use error::{Result, SourceError};
pub use http::{HttpQuoteSource, HttpSourceConfig};
