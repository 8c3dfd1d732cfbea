//! Viewer page logic: which example a page shows, how its meta block is
//! split off, and how edits survive a reload.
//!
//! Browser facilities (storage, the editor widget, fetching, evaluation)
//! are reached through traits so the state machine runs anywhere.

use thiserror::Error;

mod identity;
mod links;
mod meta;
mod session;

pub use identity::{
    CombinedIdentity, ExampleIdentity, IdentityEncoding, LegacyIdentity, QueryParams,
    DEFAULT_VERSION_TAG, EXAMPLE_SOURCE_ROOT,
};
pub use links::{
    encode_query_value, example_url, legacy_example_url, version_switch_url, VIEWER_PATH,
};
pub use meta::{extract_meta, ExampleMeta, ParsedSource};
pub use session::{
    CodeEditor, Cursor, EditSession, ExampleHost, MemoryStorage, ScrollOffset, SessionController,
    SessionState, SessionStorage, SourceFetcher,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no example named in page URL")]
    MissingExample,
    #[error("example path `{0}` is not of the form dir/name")]
    InvalidPath(String),
    #[error("invalid page URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to load {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage rejected write: {0}")]
    Storage(String),
}
