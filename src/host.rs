//! Access to the documents being published and the images next to them.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

pub trait FileStore {
    fn read_to_string(&self, path: &Path) -> impl Future<Output = io::Result<String>>;
    fn read(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>>;
    fn write(&self, path: &Path, content: &str) -> impl Future<Output = io::Result<()>>;
}

impl<F: FileStore> FileStore for &F {
    fn read_to_string(&self, path: &Path) -> impl Future<Output = io::Result<String>> {
        (**self).read_to_string(path)
    }

    fn read(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, content: &str) -> impl Future<Output = io::Result<()>> {
        (**self).write(path, content)
    }
}

/// The local file system.
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }
}

#[derive(Default)]
pub struct MemoryFileStore {
    files: tokio::sync::Mutex<HashMap<PathBuf, Vec<u8>>>,
    writes: AtomicUsize,
    read_only: bool,
}

impl MemoryFileStore {
    /// A store whose writes always fail.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.lock().await.insert(path.into(), content.into());
    }

    pub async fn get(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .await
            .get(path)
            .map(|content| String::from_utf8_lossy(content).into_owned())
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl FileStore for MemoryFileStore {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let content = self.read(path).await?;
        String::from_utf8(content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", path.display()),
            ));
        }
        self.files
            .lock()
            .await
            .insert(path.to_owned(), content.as_bytes().to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
