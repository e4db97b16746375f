//! Face embedding extraction gateway.
//!
//! [`FaceEmbedder`] is the single boundary to the face-embedding model.
//! [`HttpEmbedder`] talks to a remote model service; the [`wire`] module
//! holds the request/reply shapes shared with servers that expose the same
//! protocol.

pub mod config;
pub mod embed;
pub mod error;
pub mod http;
pub mod model;
pub mod wire;

pub use config::EmbedConfig;
pub use embed::{FaceEmbedder, ImageSource};
pub use error::{EmbedError, ErrorKind};
pub use http::HttpEmbedder;
pub use model::{DEFAULT_DETECTOR_BACKEND, ENFORCE_DETECTION, ModelFamily};
pub use wire::{ExtractReply, FILE_FIELD, UrlRequest};
