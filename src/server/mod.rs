//! HTTP surface over the image pipeline.
//!
//! - [`api`]: Request/response types and route handlers

pub mod api;
