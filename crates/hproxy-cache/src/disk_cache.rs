use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::blob_cache::BlobCache;
use crate::error::{CacheError, CacheResult};

/// On-disk, content-addressed blob store.
///
/// Blobs live at `root/hex[0:3]/hex[3:6]/hex`, so no directory ever holds
/// more than a few thousand entries even for millions of blobs. Writes go
/// through a temp file in the same directory (so the final `rename` is an
/// atomic same-filesystem move) and are fsynced before the rename.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, hex_digest: &str) -> PathBuf {
        let padded;
        let hex_digest = if hex_digest.len() < 6 {
            padded = format!("{hex_digest:0<6}");
            padded.as_str()
        } else {
            hex_digest
        };
        self.root
            .join(&hex_digest[0..3])
            .join(&hex_digest[3..6])
            .join(hex_digest)
    }
}

#[async_trait]
impl BlobCache for DiskCache {
    async fn read(&self, hex_digest: &str) -> CacheResult<Vec<u8>> {
        let path = self.blob_path(hex_digest);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::Absent),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    async fn write(&self, hex_digest: &str, data: &[u8]) -> CacheResult<()> {
        let path = self.blob_path(hex_digest);
        let dir = path.parent().expect("blob_path always has a parent");
        fs::create_dir_all(dir).await?;
        set_private_mode(dir).await?;

        static NEXT_TMP_ID: AtomicU64 = AtomicU64::new(0);
        let unique = NEXT_TMP_ID.fetch_add(1, Ordering::Relaxed);
        let tmp_path = dir.join(format!(
            ".tmp.{hex_digest}.{}.{unique}",
            std::process::id()
        ));
        let write_result = async {
            let mut tmp = fs::File::create(&tmp_path).await?;
            tmp.write_all(data).await?;
            tmp.flush().await?;
            tmp.sync_all().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::Io(e));
        }

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn set_private_mode(dir: &Path) -> CacheResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o700);
    fs::set_permissions(dir, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_private_mode(_dir: &Path) -> CacheResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());

        cache.write("deadbeef", b"hello world").await.unwrap();
        let data = cache.read("deadbeef").await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn read_missing_is_absent() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        assert!(matches!(cache.read("0000").await, Err(CacheError::Absent)));
    }

    #[tokio::test]
    async fn write_fans_out_into_prefix_directories() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let digest = "abcdef0123456789";

        cache.write(digest, b"data").await.unwrap();

        let expected = dir.path().join("abc").join("def").join(digest);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn write_does_not_leave_temp_files_behind() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());

        cache.write("abcdef012345", b"data").await.unwrap();

        let leaf_dir = dir.path().join("abc").join("def");
        let mut entries = fs::read_dir(&leaf_dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["abcdef012345"]);
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());

        cache.write("aaa111", b"first").await.unwrap();
        cache.write("aaa111", b"second").await.unwrap();

        let data = cache.read("aaa111").await.unwrap();
        assert_eq!(data, b"second");
    }

    #[tokio::test]
    async fn concurrent_writes_of_the_same_digest_never_corrupt_the_blob() {
        let dir = tempdir().unwrap();
        let cache = std::sync::Arc::new(DiskCache::new(dir.path()));

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.write("sharedkey", &[7u8; 64 * 1024]).await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.write("sharedkey", &[7u8; 64 * 1024]).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let data = cache.read("sharedkey").await.unwrap();
        assert_eq!(data, vec![7u8; 64 * 1024]);
    }
}
