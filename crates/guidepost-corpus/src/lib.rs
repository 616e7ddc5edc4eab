//! # guidepost-corpus
//!
//! The document store: loads a directory of NODE.md files into an
//! immutable, validated index. Node bodies are opaque payloads — only the
//! front-matter routing metadata is interpreted. Hot reload builds a fresh
//! index and swaps it atomically; readers always see a consistent
//! generation.

pub mod index;
pub mod node;
pub mod store;

pub use index::CorpusIndex;
pub use node::Node;
pub use store::CorpusStore;
