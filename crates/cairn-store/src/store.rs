use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::path::{PathKey, PathTransform};

/// Root directory used when none is configured.
pub const DEFAULT_ROOT: &str = "cairn-store";

/// Distinguishes concurrent in-flight writes within this process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed key/blob store.
///
/// Cloning is cheap; clones share the transform and root. The store holds no
/// lock: callers working on disjoint keys touch disjoint files.
#[derive(Clone)]
pub struct ContentStore {
    root: PathBuf,
    transform: Arc<dyn PathTransform>,
}

impl ContentStore {
    /// Create a store rooted at `root`. An empty root falls back to
    /// [`DEFAULT_ROOT`].
    pub fn new(root: impl Into<PathBuf>, transform: Arc<dyn PathTransform>) -> Self {
        let mut root = root.into();
        if root.as_os_str().is_empty() {
            root = PathBuf::from(DEFAULT_ROOT);
        }
        Self { root, transform }
    }

    /// The root directory holding every blob.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `key` under this store's root.
    pub fn path_key(&self, key: &str) -> PathKey {
        self.transform.transform(&self.root, key)
    }

    /// Returns `true` if a blob is currently stored under `key`.
    pub async fn has(&self, key: &str) -> bool {
        fs::metadata(self.path_key(key).full_path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Store everything `reader` yields under `key`, replacing any previous
    /// blob. Returns the number of bytes written.
    ///
    /// The blob is staged in a temporary file beside its final path and
    /// renamed into place, so `has` and `read` never observe a partial blob.
    pub async fn write<R>(&self, key: &str, reader: R) -> StoreResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let path_key = self.path_key(key);
        fs::create_dir_all(&path_key.directory).await?;

        let full_path = path_key.full_path();
        let staging = path_key.directory.join(format!(
            ".{}.{}-{}.tmp",
            path_key.filename,
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let written = match stage(&staging, reader).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(&staging, &full_path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        info!(key, bytes = written, path = %full_path.display(), "blob written");
        Ok(written)
    }

    /// Open the blob stored under `key` for streamed reading.
    pub async fn open(&self, key: &str) -> StoreResult<fs::File> {
        fs::File::open(self.path_key(key).full_path())
            .await
            .map_err(|e| not_found_or_io(e, key))
    }

    /// Read the whole blob stored under `key`.
    pub async fn read(&self, key: &str) -> StoreResult<Vec<u8>> {
        let data = fs::read(self.path_key(key).full_path())
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        debug!(key, bytes = data.len(), "blob read");
        Ok(data)
    }

    /// Remove the blob stored under `key`, then every ancestor directory it
    /// leaves empty, stopping at the root.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let path_key = self.path_key(key);
        fs::remove_file(path_key.full_path())
            .await
            .map_err(|e| not_found_or_io(e, key))?;

        let mut dir = path_key.directory;
        while dir != self.root && dir.starts_with(&self.root) {
            // Fails on the first non-empty directory, which ends the walk.
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            if !dir.pop() {
                break;
            }
        }

        info!(key, "blob deleted");
        Ok(())
    }

    /// Remove the root directory and every blob under it.
    pub async fn clear(&self) -> StoreResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(root = %self.root.display(), "store cleared");
        Ok(())
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

async fn stage<R>(path: &Path, mut reader: R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = fs::File::create(path).await?;
    let written = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

fn not_found_or_io(err: std::io::Error, key: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{CasTransform, PlainTransform};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn cas_store(dir: &tempfile::TempDir) -> ContentStore {
        ContentStore::new(dir.path().join("store"), Arc::new(CasTransform))
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);
        let data = b"some jpg bytes";

        let written = store.write("momsspecials", &data[..]).await.unwrap();
        assert_eq!(written, data.len() as u64);
        assert!(store.has("momsspecials").await);
        assert_eq!(store.read("momsspecials").await.unwrap(), data);
    }

    #[tokio::test]
    async fn has_tracks_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        assert!(!store.has("k").await);
        store.write("k", &b"v"[..]).await.unwrap();
        assert!(store.has("k").await);
        store.delete("k").await.unwrap();
        assert!(!store.has("k").await);
    }

    #[tokio::test]
    async fn overwrite_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        store.write("k", &b"a much longer first value"[..]).await.unwrap();
        store.write("k", &b"short"[..]).await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn empty_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        assert_eq!(store.write("empty", &b""[..]).await.unwrap(), 0);
        assert!(store.has("empty").await);
        assert!(store.read("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_is_invisible_until_fully_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);
        store.write("k", &b"old"[..]).await.unwrap();

        let (mut tx, rx) = tokio::io::duplex(1024);
        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.write("k", rx).await })
        };

        tx.write_all(b"first half ").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store.read("k").await.unwrap(), b"old");

        tx.write_all(b"second half").await.unwrap();
        drop(tx);
        assert_eq!(writer.await.unwrap().unwrap(), 22);
        assert_eq!(store.read("k").await.unwrap(), b"first half second half");
    }

    #[tokio::test]
    async fn new_key_absent_while_writing_and_no_staging_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        let (mut tx, rx) = tokio::io::duplex(1024);
        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.write("fresh", rx).await })
        };
        tx.write_all(b"partial").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!store.has("fresh").await);

        drop(tx);
        writer.await.unwrap().unwrap();
        assert!(store.has("fresh").await);

        let dir_entries: Vec<_> = std::fs::read_dir(store.path_key("fresh").directory)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(dir_entries.len(), 1);
    }

    #[tokio::test]
    async fn open_streams_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);
        store.write("k", &b"streamed"[..]).await.unwrap();

        let mut file = store.open("k").await.unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "streamed");
    }

    // -----------------------------------------------------------------------
    // Missing keys
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);
        let err = store.read("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref k) if k == "nope"));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);
        let err = store.delete("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    // -----------------------------------------------------------------------
    // Deletion scope
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_prunes_empty_directories_but_keeps_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        store.write("momsspecials", &b"x"[..]).await.unwrap();
        let path_key = store.path_key("momsspecials");
        store.delete("momsspecials").await.unwrap();

        assert!(!path_key.directory.exists());
        assert!(store.root().exists());
        let leftovers: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn delete_leaves_other_keys_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        store.write("keep", &b"kept"[..]).await.unwrap();
        store.write("drop", &b"dropped"[..]).await.unwrap();
        store.delete("drop").await.unwrap();

        assert!(!store.has("drop").await);
        assert_eq!(store.read("keep").await.unwrap(), b"kept");
    }

    #[tokio::test]
    async fn delete_with_plain_transform() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("plain"), Arc::new(PlainTransform));

        store.write("photo", &b"pixels"[..]).await.unwrap();
        assert!(dir.path().join("plain/photo/photo").is_file());
        store.delete("photo").await.unwrap();
        assert!(!dir.path().join("plain/photo").exists());
        assert!(dir.path().join("plain").exists());
    }

    #[tokio::test]
    async fn clear_removes_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        store.write("a", &b"1"[..]).await.unwrap();
        store.write("b", &b"2"[..]).await.unwrap();
        store.clear().await.unwrap();

        assert!(!store.root().exists());
        assert!(!store.has("a").await);
        // Clearing an absent root is not an error.
        store.clear().await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Configuration and concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn empty_root_falls_back_to_default() {
        let store = ContentStore::new("", Arc::new(CasTransform));
        assert_eq!(store.root(), Path::new(DEFAULT_ROOT));
    }

    #[tokio::test]
    async fn concurrent_disjoint_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = cas_store(&dir);

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("key-{i}");
                let data = vec![i; 1024 + i as usize];
                store.write(&key, &data[..]).await.unwrap();
                (key, data)
            }));
        }

        for handle in handles {
            let (key, data) = handle.await.unwrap();
            assert_eq!(store.read(&key).await.unwrap(), data);
        }
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

        #[test]
        fn round_trip(key in "[a-zA-Z0-9 ./_-]{0,40}", data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let store = cas_store(&dir);
            let read_back = rt.block_on(async {
                store.write(&key, &data[..]).await.unwrap();
                store.read(&key).await.unwrap()
            });
            proptest::prop_assert_eq!(read_back, data);
        }
    }
}
