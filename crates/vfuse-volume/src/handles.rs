use std::collections::HashMap;
use std::fs::File;
use std::sync::{Arc, Mutex, PoisonError};

use vfuse_proto::FsError;

/// Open files keyed by responder-minted handles.
///
/// Handles start at 1; 0 is never minted so requests can use it to mean
/// "by path". Files are shared out as `Arc<File>` so I/O runs outside the
/// lock.
#[derive(Debug, Default)]
pub struct HandleTable {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last: u64,
    files: HashMap<u64, Arc<File>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `file` and return its new handle.
    pub fn insert(&self, file: File) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last += 1;
        let handle = inner.last;
        inner.files.insert(handle, Arc::new(file));
        handle
    }

    /// The file behind `handle`.
    pub fn get(&self, handle: u64) -> Result<Arc<File>, FsError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.files.get(&handle).cloned().ok_or(FsError::BadHandle)
    }

    /// Forget `handle`. The file closes once in-flight users drop it.
    pub fn remove(&self, handle: u64) -> Result<(), FsError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .files
            .remove(&handle)
            .map(drop)
            .ok_or(FsError::BadHandle)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
