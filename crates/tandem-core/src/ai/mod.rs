//! Provider communication: unified types, wire formats, and streaming adapters

pub mod client;
pub mod format;
pub mod json_stream;
pub mod parsers;
pub mod providers;
pub mod sse;
pub mod types;

pub use client::{ChatProvider, ResponseStream};
pub use providers::{
    build_http_client, create_provider, CredentialSource, ModelSelection, ProviderCredentials,
    ProviderType,
};
