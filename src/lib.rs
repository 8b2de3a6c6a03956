#![forbid(unsafe_code)]

//! Rust client for environmental monitoring readings published by the UK
//! Environment Agency (flood-monitoring and hydrology APIs) and services with
//! the same paginated JSON shape.
//!
//! A run goes through four stages:
//! - [`Client`] fetches every page of a [`ReadingsQuery`], following cursors,
//!   retrying transient failures with backoff and spacing requests out;
//! - [`parser`] decodes each page into [`Record`]s, skipping malformed entries;
//! - [`merge()`] deduplicates by `(station, timestamp, measurement type)`,
//!   keeping the best quality flag, and sorts the result;
//! - [`Dataset`] answers read-only queries and can be exported with [`export`].
//!
//! [`Pipeline`] strings them together.
//!
//! **Quick start**
//! ```no_run
//! use chrono::NaiveDate;
//! use ea_readings::{ClientOptions, MeasurementType, Pipeline, ReadingsQuery, Selection};
//!
//! # async fn run() -> ea_readings::Result<()> {
//! let pipeline = Pipeline::new(ClientOptions::default().source("ea-flood"))?;
//!
//! let query = ReadingsQuery::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
//! )
//! .station("E7050")
//! .parameter(MeasurementType::Rainfall);
//!
//! let dataset = pipeline.run(&query).await?;
//! let wet = dataset.select(&Selection::new().station("E7050"));
//! println!("{} readings", wet.len());
//! ea_readings::export::write_csv_file(&dataset, "rainfall.csv")?;
//! # Ok(())
//! # }
//! ```
//!
//! Notes:
//! - Environment Agency data is published under the Open Government Licence;
//!   attribution is required.
//! - Nothing is persisted: responses are cached in memory for the lifetime of
//!   the [`Client`] only.

mod cache;
mod client;
mod config;
mod dataset;
mod date;
mod error;
mod merge;
mod model;
mod rate_limit;
mod request;
mod retry;
mod sources;
mod url_builder;

pub mod export;
pub mod parser;
pub mod pipeline;

pub use crate::client::{Client, ClientOptions, Pagination};
pub use crate::dataset::{Dataset, FetchSummary, Selection, StationTotal};
pub use crate::error::{
    Error, FetchError, FetchErrorKind, MergeError, MergeErrorKind, ParseError, ParseErrorKind, Result,
};
pub use crate::merge::merge;
pub use crate::model::{MeasurementType, Page, ParsedPage, QualityFlag, Record};
pub use crate::parser::ParserOptions;
pub use crate::pipeline::Pipeline;
pub use crate::rate_limit::RateLimiter;
pub use crate::request::ReadingsQuery;
pub use crate::retry::RetryPolicy;
