//! # basm-mirror
//!
//! Mirrors the newest stemcell of a series from the public feed into a cloud
//! image gallery.
//!
//! Build a [`Mirror`] from a feed, gallery, blob store and notifier, then call
//! [`Mirror::run`] once per scheduled invocation. Runs are idempotent: a
//! version already present in the gallery is never downloaded again.

pub mod error;
pub mod extractor;
pub mod feed;
pub mod orchestrator;
pub mod resolver;
pub mod workspace;

pub use error::MirrorError;
pub use feed::{HttpFeed, DEFAULT_FEED_URL};
pub use orchestrator::{Mirror, MirrorConfig, MirrorOutcome};
pub use resolver::{resolve, Selection};
pub use workspace::ExtractionWorkspace;
