//! autoship: description in, published and deployed repository out.
//!
//! The core lives in [`pipeline`]; [`server`] exposes it over HTTP and the
//! `autoship` binary drives it from the command line.

pub mod config;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod util;
