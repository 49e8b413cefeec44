//! Driven adapters for the HTTP services this app depends on. Both share the traced HTTP
//! client owned by [ExternalConnectivity][crate::external_connections::ExternalConnectivity].

pub mod gemini_suggester;
pub mod identity_toolkit;
