use std::path::PathBuf;
use thiserror::Error;

/// Named failure conditions of the acquisition pipeline.
///
/// Collaborator failures (HTTP, file I/O, provider responses) travel as plain
/// `anyhow::Error`; these variants are wrapped into it so callers can
/// `downcast_ref::<Error>()` when they need to tell them apart.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Planet API key not provided. Set PL_API_KEY or pass --api-key")]
    MissingApiKey,

    #[error("Invalid date '{value}', expected YYYY-MM-DD")]
    DateFormat {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Start date {start} is after end date {end}")]
    InvertedDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Cloud cover threshold must be within [0, 1], got {0}")]
    CloudCover(f64),

    #[error("Unsupported AOI: {0}")]
    UnsupportedAoi(String),

    #[error("Order {order_id} finished in state '{state}'")]
    OrderFailed { order_id: String, state: String },

    #[error("Order {order_id} still not ready after {attempts} polls")]
    OrderTimeout { order_id: String, attempts: u32 },

    #[error("Order result name '{0}' points outside the download directory")]
    UnsafeResultName(String),

    #[error("Refusing to overwrite existing file {0}")]
    OutputExists(PathBuf),
}
