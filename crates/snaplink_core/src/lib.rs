//! Snaplink core: provider registry, source-URL extraction and the canonical
//! result model. Pure and side-effect free; all I/O lives in the engine crate.
mod error;
mod extract;
mod provider;
mod result;

pub use error::{ErrorKind, ResolveError};
pub use extract::{extract_for, extract_source, SourceUrl};
pub use provider::{
    registry, spec_for, ProtocolShape, ProviderId, ProviderSpec, DEFAULT_USER_AGENT,
};
pub use result::{
    format_note, FormatVariant, MediaData, MediaResult, ResolveStatus, BEST_QUALITY_MARKER,
};
