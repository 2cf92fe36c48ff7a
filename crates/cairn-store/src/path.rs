use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

/// Width, in hex characters, of one directory block produced by
/// [`CasTransform`].
pub const BLOCK_SIZE: usize = 8;

/// Location of a blob on disk, derived from `(root, key)`.
///
/// Never stored; recomputed on every access.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathKey {
    /// Directory holding the blob, including the store root.
    pub directory: PathBuf,
    /// File name of the blob inside `directory`.
    pub filename: String,
}

impl PathKey {
    /// Full path of the blob file.
    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Name of the innermost directory segment.
    pub fn first_parent_name(&self) -> Option<&str> {
        self.directory.file_name().and_then(|name| name.to_str())
    }
}

/// Maps a key to its on-disk location under a root.
///
/// Implementations must be pure: identical inputs yield identical outputs.
pub trait PathTransform: Send + Sync {
    fn transform(&self, root: &Path, key: &str) -> PathKey;
}

impl<F> PathTransform for F
where
    F: Fn(&Path, &str) -> PathKey + Send + Sync,
{
    fn transform(&self, root: &Path, key: &str) -> PathKey {
        self(root, key)
    }
}

/// Content-addressable layout.
///
/// The key's SHA-1 digest is hex-encoded and cut into [`BLOCK_SIZE`] blocks.
/// Every block after the first becomes a nested directory under the root,
/// and the full digest is the file name:
///
/// ```text
/// root/74181a63/c50c3d81/d733a12f/14a353ff/6804429f74181a63c50c3d81d733a12f14a353ff
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct CasTransform;

impl CasTransform {
    /// Lower-case hex SHA-1 digest of a key.
    pub fn digest_hex(key: &str) -> String {
        hex::encode(Sha1::digest(key.as_bytes()))
    }
}

impl PathTransform for CasTransform {
    fn transform(&self, root: &Path, key: &str) -> PathKey {
        let digest = Self::digest_hex(key);
        let blocks = digest.len() / BLOCK_SIZE;

        let mut directory = root.to_path_buf();
        for i in 1..blocks {
            directory.push(&digest[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE]);
        }

        PathKey {
            directory,
            filename: digest,
        }
    }
}

/// Un-hashed layout: the key is both the directory and the file name.
///
/// Only suitable for keys that are valid single path segments.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTransform;

impl PathTransform for PlainTransform {
    fn transform(&self, root: &Path, key: &str) -> PathKey {
        PathKey {
            directory: root.join(key),
            filename: key.to_string(),
        }
    }
}
