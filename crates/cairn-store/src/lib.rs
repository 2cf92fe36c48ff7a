//! Content-addressed blob storage for Cairn nodes.
//!
//! Blobs are opaque byte sequences stored under string keys. A key is never
//! used as a filesystem path directly: a [`PathTransform`] maps
//! `(root, key)` to a [`PathKey`], and the [`ContentStore`] persists the blob
//! at that location.
//!
//! # Transforms
//!
//! - [`CasTransform`] -- SHA-1 of the key, hex-encoded and split into
//!   8-character directory blocks. Fan-out per directory is bounded and the
//!   layout does not depend on the key's length or character set.
//! - [`PlainTransform`] -- `root/key/key`, for debugging.
//!
//! Any `Fn(&Path, &str) -> PathKey` closure is also a transform.
//!
//! # Rules
//!
//! 1. A transform is a pure function: the same `(root, key)` always yields
//!    the same [`PathKey`].
//! 2. After a successful write of N bytes, `has(key)` is true and
//!    `read(key)` returns exactly those N bytes until the next write or
//!    delete of that key.
//! 3. Deleting a key touches only that key's file and the directories it
//!    leaves empty; the root itself is never removed by `delete`.
//! 4. Access to disjoint keys needs no coordination.

pub mod error;
pub mod path;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use path::{CasTransform, PathKey, PathTransform, PlainTransform, BLOCK_SIZE};
pub use store::{ContentStore, DEFAULT_ROOT};
