//! Client library and CLI for the posts-scan HTTP API.

pub mod cli;
pub mod client;

pub use client::{ClientError, ScanClient};
