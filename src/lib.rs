#![allow(async_fn_in_trait)]
pub mod aoi;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod orchestrator;
pub mod order;
pub mod order_plan;
pub mod planet;
pub mod progress;
pub mod vector;

#[cfg(test)]
mod mock;

pub use error::Error;
