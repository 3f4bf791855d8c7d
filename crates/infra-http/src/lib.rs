// Mediabatch Infrastructure - HTTP Adapters
// Implements: EncodingService

pub mod http_encoding_service;

pub use http_encoding_service::{HttpEncodingConfig, HttpEncodingService};
