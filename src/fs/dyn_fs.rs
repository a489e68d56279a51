//! Object client glue that relies directly on fusio traits.

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use fusio::{
    fs::OpenOptions,
    path::{Path, PathPart},
    DynFs, Read, Write,
};
use futures_util::StreamExt;

use super::{under_prefix, ObjectClient, ObjectWriter};
use crate::error::{FilesetError, Result};

/// Longest object name whose hex encoding fits a 255-byte file name.
pub const MAX_OBJECT_NAME_LEN: usize = 127;

/// Object client over any fusio filesystem.
///
/// Object names are hex-encoded into flat file names directly below `root`,
/// so listing is a single scan on local disks and object stores alike. The
/// encoding doubles the name length: names longer than
/// [`MAX_OBJECT_NAME_LEN`] bytes are rejected with
/// [`FilesetError::InvalidName`].
///
/// fusio's tokio disk backend performs blocking writes through
/// `block_in_place`, so a client over `TokioFs` must run on a multi-thread
/// tokio runtime.
#[derive(Clone)]
pub struct FusioObjectClient {
    fs: Arc<dyn DynFs>,
    root: Path,
}

impl FusioObjectClient {
    /// Create a client storing objects under `root`, creating it if needed.
    pub async fn new(fs: Arc<dyn DynFs>, root: Path) -> Result<Self> {
        fs.create_dir_all(&root).await?;
        Ok(Self { fs, root })
    }

    /// Access the underlying filesystem.
    pub fn fs(&self) -> &Arc<dyn DynFs> {
        &self.fs
    }

    fn object_path(&self, name: &str) -> Result<Path> {
        if name.len() > MAX_OBJECT_NAME_LEN {
            return Err(FilesetError::InvalidName(format!(
                "{name}: longer than {MAX_OBJECT_NAME_LEN} bytes"
            )));
        }
        let encoded = hex::encode(name.as_bytes());
        let part = PathPart::parse(&encoded)
            .map_err(|err| FilesetError::InvalidName(format!("{name}: {err}")))?;
        Ok(self.root.child(part))
    }

    fn read_options() -> OpenOptions {
        OpenOptions::default().read(true)
    }

    fn write_options() -> OpenOptions {
        OpenOptions::default()
            .read(false)
            .write(true)
            .create(true)
            .truncate(true)
    }
}

fn decode_name(filename: &str) -> Option<String> {
    let raw = hex::decode(filename).ok()?;
    String::from_utf8(raw).ok()
}

fn not_found(name: &str, err: fusio::Error) -> FilesetError {
    match err {
        fusio::Error::Io(err) if err.kind() == io::ErrorKind::NotFound => {
            FilesetError::NotFound(name.to_string())
        }
        err => FilesetError::Fusio(err),
    }
}

#[async_trait]
impl ObjectClient for FusioObjectClient {
    async fn walk(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut stream = self.fs.list(&self.root).await?;
        while let Some(meta) = stream.next().await {
            let meta = meta?;
            let Some(name) = meta.path.filename().and_then(decode_name) else {
                continue;
            };
            if under_prefix(&name, prefix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str, offset: u64, len: Option<u64>) -> Result<Bytes> {
        let path = self.object_path(name)?;
        let mut file = self
            .fs
            .open_options(&path, Self::read_options())
            .await
            .map_err(|err| not_found(name, err))?;
        let data = match len {
            Some(len) => {
                let (result, buf) = file.read_exact_at(vec![0u8; len as usize], offset).await;
                result?;
                buf
            }
            None => {
                let (result, buf) = file.read_to_end_at(Vec::new(), offset).await;
                result?;
                buf
            }
        };
        Ok(Bytes::from(data))
    }

    async fn writer(&self, name: &str) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(FusioObjectWriter {
            fs: self.fs.clone(),
            path: self.object_path(name)?,
            buf: Vec::new(),
        }))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        let path = self.object_path(name)?;
        let file = self
            .fs
            .open_options(&path, Self::read_options())
            .await
            .map_err(|err| not_found(name, err))?;
        Ok(file.size().await?)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name)?;
        match self.fs.open_options(&path, Self::read_options()).await {
            Ok(_) => Ok(true),
            Err(fusio::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;
        self.fs
            .remove(&path)
            .await
            .map_err(|err| not_found(name, err))
    }
}

/// Buffers the whole object and writes it on close, so readers never observe
/// a partial object.
struct FusioObjectWriter {
    fs: Arc<dyn DynFs>,
    path: Path,
    buf: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for FusioObjectWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let FusioObjectWriter { fs, path, buf } = *self;
        let mut file = fs
            .open_options(&path, FusioObjectClient::write_options())
            .await?;
        let (result, _buf) = file.write_all(buf).await;
        result?;
        file.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fusio::{disk::TokioFs, path::Path, DynFs};

    use super::{FusioObjectClient, MAX_OBJECT_NAME_LEN};
    use crate::{
        error::FilesetError,
        fs::{put, ObjectClient},
    };

    async fn client(dir: &tempfile::TempDir) -> FusioObjectClient {
        let fs = Arc::new(TokioFs) as Arc<dyn DynFs>;
        let root = Path::from_filesystem_path(dir.path()).unwrap();
        FusioObjectClient::new(fs, root).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disk_objects_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let objects = client(&temp_dir).await;

        put(&objects, "pfs/a/diff", b"0123456789").await.unwrap();
        put(&objects, "pfs/a/compacted/0", b"level").await.unwrap();
        put(&objects, "chunk/ff", b"chunk").await.unwrap();

        assert_eq!(
            objects.walk("pfs/a").await.unwrap(),
            vec!["pfs/a/compacted/0", "pfs/a/diff"]
        );
        assert_eq!(&objects.read("pfs/a/diff", 2, Some(3)).await.unwrap()[..], b"234");
        assert_eq!(&objects.read("pfs/a/diff", 7, None).await.unwrap()[..], b"789");
        assert_eq!(objects.size("pfs/a/compacted/0").await.unwrap(), 5);
        assert!(objects.exists("chunk/ff").await.unwrap());

        objects.delete("chunk/ff").await.unwrap();
        assert!(!objects.exists("chunk/ff").await.unwrap());
        assert!(matches!(
            objects.read("chunk/ff", 0, None).await,
            Err(FilesetError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlong_names_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let objects = client(&temp_dir).await;

        let longest = format!("pfs/{}", "a".repeat(MAX_OBJECT_NAME_LEN - 4));
        put(&objects, &longest, b"fits").await.unwrap();
        assert_eq!(objects.walk("pfs").await.unwrap(), vec![longest.clone()]);

        let overlong = format!("{longest}b");
        assert!(matches!(
            objects.writer(&overlong).await,
            Err(FilesetError::InvalidName(_))
        ));
        assert!(matches!(
            objects.exists(&overlong).await,
            Err(FilesetError::InvalidName(_))
        ));
    }
}
