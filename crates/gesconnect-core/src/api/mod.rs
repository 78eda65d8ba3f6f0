//! REST API client module for the GES Connect backend.
//!
//! This module provides the `ApiClient` for authenticated requests, the
//! `Transport` seam it sends them through, and the wire types of the
//! endpoints the client knows about.
//!
//! The API uses opaque bearer tokens; a 401 means the access token has
//! expired and triggers one refresh-and-retry.

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
