//! Per-session file buffering — in-flight chunk lists and completed blobs.
//!
//! The store is purely in-memory and bounded only by the transport's
//! per-frame cap; a file larger than available RAM cannot be buffered.
//! Once a file completes its body is an immutable [`Bytes`] and may be
//! read without any lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};

use cairn_core::frame::FileMeta;
use cairn_core::ids;

/// Progress report for one accepted upload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendProgress {
    pub received: u64,
    pub total: u64,
    /// Integer percent, `round(received / total * 100)`.
    pub percent: u32,
}

#[derive(Debug)]
enum FileBody {
    /// Upload in flight: ordered chunks, `received` ≤ declared size.
    Open { chunks: Vec<Bytes>, received: u64 },
    /// Upload finished: one contiguous buffer, `len == size`.
    Complete(Bytes),
}

#[derive(Debug)]
struct StoredFile {
    name: String,
    size: u64,
    mimetype: String,
    uploader_id: String,
    uploaded_at: Instant,
    uploaded_at_ms: u64,
    body: FileBody,
}

impl StoredFile {
    fn meta(&self, id: &str) -> FileMeta {
        FileMeta {
            id: id.to_string(),
            original_name: self.name.clone(),
            size: self.size,
            mimetype: self.mimetype.clone(),
            uploaded_at: self.uploaded_at_ms,
        }
    }
}

/// File id → buffered file, owned by exactly one session.
#[derive(Debug, Default)]
pub struct FileStore {
    files: HashMap<String, StoredFile>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an open file and return its fresh id.
    pub fn begin(&mut self, uploader_id: &str, name: String, size: u64, mimetype: String) -> String {
        let id = ids::file_id();
        self.files.insert(
            id.clone(),
            StoredFile {
                name,
                size,
                mimetype,
                uploader_id: uploader_id.to_string(),
                uploaded_at: Instant::now(),
                uploaded_at_ms: crate::unix_millis(),
                body: FileBody::Open {
                    chunks: Vec::new(),
                    received: 0,
                },
            },
        );
        id
    }

    /// Append a chunk to an open file.
    ///
    /// Returns `None` — and drops the chunk — when the id is unknown, the
    /// file is already complete, or the chunk would push the total past the
    /// declared size. An overflowing upload never completes; the janitor
    /// reclaims it at TTL.
    pub fn append(&mut self, file_id: &str, chunk: Bytes) -> Option<AppendProgress> {
        let file = self.files.get_mut(file_id)?;
        let FileBody::Open { chunks, received } = &mut file.body else {
            tracing::debug!(file_id, "dropping chunk for completed file");
            return None;
        };

        let incoming = chunk.len() as u64;
        if *received + incoming > file.size {
            tracing::warn!(
                file_id,
                received = *received,
                chunk = incoming,
                declared = file.size,
                "dropping chunk that would exceed the declared file size"
            );
            return None;
        }

        *received += incoming;
        chunks.push(chunk);
        Some(AppendProgress {
            received: *received,
            total: file.size,
            percent: percent(*received, file.size),
        })
    }

    /// Seal an open file whose received bytes match its declared size.
    ///
    /// On success the chunk list is concatenated into the final buffer and
    /// freed, and the file's metadata is returned. A size mismatch (or an
    /// unknown/already-complete id) returns `None` and leaves the file as
    /// it was — the uploader gets no ack and the janitor collects it.
    pub fn complete(&mut self, file_id: &str) -> Option<FileMeta> {
        let file = self.files.get_mut(file_id)?;
        let FileBody::Open { chunks, received } = &mut file.body else {
            return None;
        };
        if *received != file.size {
            tracing::warn!(
                file_id,
                received = *received,
                declared = file.size,
                "file_complete with size mismatch, leaving file open"
            );
            return None;
        }

        let mut buf = BytesMut::with_capacity(*received as usize);
        for chunk in chunks.drain(..) {
            buf.put_slice(&chunk);
        }
        file.body = FileBody::Complete(buf.freeze());
        Some(file.meta(file_id))
    }

    /// Fetch a completed file for download. Open files are invisible here.
    pub fn get_complete(&self, file_id: &str) -> Option<(FileMeta, Bytes)> {
        let file = self.files.get(file_id)?;
        match &file.body {
            FileBody::Complete(bytes) => Some((file.meta(file_id), bytes.clone())),
            FileBody::Open { .. } => None,
        }
    }

    /// Remove a file. Idempotent; returns whether anything was removed.
    pub fn remove(&mut self, file_id: &str) -> bool {
        self.files.remove(file_id).is_some()
    }

    /// Metadata for every completed file, oldest first.
    pub fn metas(&self) -> Vec<FileMeta> {
        let mut metas: Vec<FileMeta> = self
            .files
            .iter()
            .filter(|(_, f)| matches!(f.body, FileBody::Complete(_)))
            .map(|(id, f)| f.meta(id))
            .collect();
        metas.sort_by_key(|m| m.uploaded_at);
        metas
    }

    /// Drop every file older than `ttl`, open or complete, returning the
    /// removed ids so the caller can broadcast `file_removed`.
    pub fn expire_older_than(&mut self, ttl: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        self.files.retain(|id, file| {
            if file.uploaded_at.elapsed() > ttl {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn uploader_of(&self, file_id: &str) -> Option<&str> {
        self.files.get(file_id).map(|f| f.uploader_id.as_str())
    }

    /// Test hook: pretend a file was uploaded `age` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, file_id: &str, age: Duration) {
        if let Some(file) = self.files.get_mut(file_id) {
            file.uploaded_at = Instant::now() - age;
        }
    }
}

fn percent(received: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    ((received as f64 / total as f64) * 100.0).round() as u32
}
