//! ComfyUI REST client library.
//!
//! Provides the `POST /prompt` request and response types and an HTTP
//! wrapper for queuing prompt graphs on a ComfyUI server.

pub mod api;
