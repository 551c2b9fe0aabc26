#![allow(clippy::multiple_crate_versions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;

pub use error::{DownloaderError, Result};
