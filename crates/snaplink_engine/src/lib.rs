//! Snaplink engine: session bootstrap, signature derivation, protocol
//! orchestration and response normalization for every supported provider.
//!
//! The calling layer hands `Resolver::resolve` a provider id and free-form
//! text and gets back one canonical `MediaResult`; everything upstream-shaped
//! stays inside this crate.
mod http;
mod normalize;
mod providers;
mod resolver;
mod session;
mod signature;

pub use http::{Endpoints, EngineSettings};
pub use normalize::{embedded_json, unescape_ampersands};
pub use resolver::Resolver;
pub use session::{SessionContext, SessionManager};
pub use signature::{
    derive_signing_token, extract_cipher_blob, parse_cipher_config, CipherConfig, SigningKey,
};
