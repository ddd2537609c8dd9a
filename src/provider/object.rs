//! S3-compatible object store provider
//!
//! Objects live in a flat keyspace; hierarchy is simulated with `/` as
//! the delimiter. `stat` probes the exact key first and falls back to a
//! one-entry prefix listing to detect synthetic directories; `list`
//! merges common-prefixes (directories) with keys (files).
//!
//! The SDK is async while the engine runs on threads, so the provider
//! owns a small tokio runtime and bridges with `block_on`. Writes stream
//! through a bounded chunk channel into a background multipart-upload
//! thread: the worker writes synchronously, the uploader drains
//! asynchronously, and `close` joins the two and surfaces the uploader's
//! terminal error.

use crate::engine::cancel::CancelToken;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{FileMeta, Provider, WriteStream};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// S3 requires every part except the last to be at least 5 MiB
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Chunks buffered between a writing worker and its uploader thread
const UPLOAD_CHANNEL_DEPTH: usize = 4;

/// Provider for S3-compatible object stores
pub struct ObjectProvider {
    client: Client,
    bucket: String,
    prefix: String,
    runtime: Arc<Runtime>,
}

impl ObjectProvider {
    /// Connect using the ambient AWS configuration (environment,
    /// profile, instance role)
    pub fn connect(bucket: impl Into<String>, prefix: impl Into<String>) -> ProviderResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("s3-io")
            .enable_all()
            .build()
            .map_err(|e| ProviderError::InitFailed(e.to_string()))?;

        let config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            runtime: Arc::new(runtime),
        })
    }

    /// Full object key for a provider-relative path
    fn build_key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            return path.to_string();
        }

        let prefix = self.prefix.trim_matches('/');
        if path.is_empty() {
            return prefix.to_string();
        }
        format!("{prefix}/{path}")
    }

    fn check_cancel(cancel: &CancelToken) -> ProviderResult<()> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(())
    }

    fn object_error(path: &str, err: impl std::fmt::Display) -> ProviderError {
        ProviderError::Object {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    fn base_name(key: &str) -> String {
        key.trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(key)
            .to_string()
    }
}

impl Provider for ObjectProvider {
    fn stat(&self, cancel: &CancelToken, path: &str) -> ProviderResult<FileMeta> {
        Self::check_cancel(cancel)?;
        let key = self.build_key(path);

        // Exact key probe first
        let head = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send(),
        );

        if let Ok(out) = head {
            let mtime = out
                .last_modified()
                .and_then(|t| SystemTime::try_from(t.to_owned()).ok());
            return Ok(FileMeta {
                name: Self::base_name(&key),
                size: out.content_length().unwrap_or(0).max(0) as u64,
                is_dir: key.ends_with('/'),
                mtime,
                unix: None,
            });
        }

        // No such key: probe the path as a prefix; a populated prefix is
        // a synthetic directory
        let dir_prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };

        let listed = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&dir_prefix)
                    .max_keys(1)
                    .send(),
            )
            .map_err(|e| Self::object_error(path, DisplayErrorContext(e)))?;

        if !listed.contents().is_empty() || !listed.common_prefixes().is_empty() {
            return Ok(FileMeta::dir(Self::base_name(&key)));
        }

        Err(ProviderError::NotFound { path: path.into() })
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> ProviderResult<Vec<FileMeta>> {
        Self::check_cancel(cancel)?;

        let mut dir_prefix = self.build_key(path);
        if !dir_prefix.is_empty() && !dir_prefix.ends_with('/') {
            dir_prefix.push('/');
        }

        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            Self::check_cancel(cancel)?;

            let out = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(&dir_prefix)
                        .delimiter("/")
                        .set_continuation_token(continuation.clone())
                        .send(),
                )
                .map_err(|e| Self::object_error(path, DisplayErrorContext(e)))?;

            // Common prefixes are the subdirectories
            for cp in out.common_prefixes() {
                let Some(prefix) = cp.prefix() else { continue };
                let name = prefix
                    .strip_prefix(dir_prefix.as_str())
                    .unwrap_or(prefix)
                    .trim_end_matches('/');
                if !name.is_empty() {
                    entries.push(FileMeta::dir(name));
                }
            }

            // Keys are the files, except trailing-slash placeholders
            // which surface as directories
            for obj in out.contents() {
                let Some(key) = obj.key() else { continue };
                let name = key.strip_prefix(dir_prefix.as_str()).unwrap_or(key);
                if name.is_empty() {
                    // The listed prefix itself shows up in the results
                    continue;
                }

                if let Some(dir_name) = name.strip_suffix('/') {
                    entries.push(FileMeta::dir(dir_name));
                    continue;
                }

                let mtime = obj
                    .last_modified()
                    .and_then(|t| SystemTime::try_from(t.to_owned()).ok());
                entries.push(FileMeta {
                    name: name.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    is_dir: false,
                    mtime,
                    unix: None,
                });
            }

            if out.is_truncated().unwrap_or(false) {
                continuation = out.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(entries)
    }

    fn open_read(
        &self,
        cancel: &CancelToken,
        path: &str,
    ) -> ProviderResult<Box<dyn Read + Send>> {
        Self::check_cancel(cancel)?;
        let key = self.build_key(path);

        let out = self
            .runtime
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .send(),
            )
            .map_err(|e| Self::object_error(path, DisplayErrorContext(e)))?;

        Ok(Box::new(ObjectReader {
            runtime: Arc::clone(&self.runtime),
            body: out.body,
            pending: Vec::new(),
            offset: 0,
        }))
    }

    fn open_write(
        &self,
        cancel: &CancelToken,
        path: &str,
        metadata: &FileMeta,
    ) -> ProviderResult<Box<dyn WriteStream>> {
        Self::check_cancel(cancel)?;
        let mut key = self.build_key(path);

        // Directory placeholders commit immediately as zero-byte objects
        // with a trailing slash
        if metadata.is_dir {
            if !key.ends_with('/') {
                key.push('/');
            }
            self.runtime
                .block_on(
                    self.client
                        .put_object()
                        .bucket(&self.bucket)
                        .key(&key)
                        .body(ByteStream::from_static(b""))
                        .send(),
                )
                .map_err(|e| Self::object_error(path, DisplayErrorContext(e)))?;
            return Ok(Box::new(NoopWriteStream));
        }

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(UPLOAD_CHANNEL_DEPTH);
        let (result_tx, result_rx) = bounded::<ProviderResult<()>>(1);

        let uploader = Uploader {
            runtime: Arc::clone(&self.runtime),
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.clone(),
            path: path.to_string(),
        };

        let handle = thread::Builder::new()
            .name("s3-upload".to_string())
            .spawn(move || {
                let result = uploader.run(chunk_rx);
                let _ = result_tx.send(result);
            })
            .map_err(|e| ProviderError::InitFailed(e.to_string()))?;

        Ok(Box::new(ObjectWriteStream {
            chunks: Some(chunk_tx),
            result: result_rx,
            handle: Some(handle),
        }))
    }
}

/// Blocking reader over an async object body
struct ObjectReader {
    runtime: Arc<Runtime>,
    body: ByteStream,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            match self.runtime.block_on(self.body.try_next()) {
                Ok(Some(bytes)) => {
                    self.pending = bytes.to_vec();
                    self.offset = 0;
                }
                Ok(None) => return Ok(0),
                Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
            }
        }

        let n = (self.pending.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Background multipart upload consuming the chunk channel
struct Uploader {
    runtime: Arc<Runtime>,
    client: Client,
    bucket: String,
    key: String,
    path: String,
}

impl Uploader {
    fn run(&self, chunks: Receiver<Vec<u8>>) -> ProviderResult<()> {
        let created = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .send(),
            )
            .map_err(|e| ObjectProvider::object_error(&self.path, DisplayErrorContext(e)))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| ObjectProvider::object_error(&self.path, "missing upload id"))?
            .to_string();

        match self.upload_parts(&chunks, &upload_id) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Leave no dangling multipart upload behind
                if let Err(abort_err) = self.runtime.block_on(
                    self.client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(&self.key)
                        .upload_id(&upload_id)
                        .send(),
                ) {
                    warn!(
                        key = %self.key,
                        error = %DisplayErrorContext(abort_err),
                        "failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    fn upload_parts(&self, chunks: &Receiver<Vec<u8>>, upload_id: &str) -> ProviderResult<()> {
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut part_number: i32 = 1;

        while let Ok(chunk) = chunks.recv() {
            pending.extend_from_slice(&chunk);
            if pending.len() >= MIN_PART_SIZE {
                let body = std::mem::take(&mut pending);
                parts.push(self.upload_part(upload_id, part_number, body)?);
                part_number += 1;
            }
        }

        // Channel closed: flush the tail. A zero-byte object still needs
        // one (empty) part for the completion call to be valid.
        if !pending.is_empty() || parts.is_empty() {
            let body = std::mem::take(&mut pending);
            parts.push(self.upload_part(upload_id, part_number, body)?);
        }

        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send(),
            )
            .map_err(|e| ObjectProvider::object_error(&self.path, DisplayErrorContext(e)))?;

        debug!(key = %self.key, parts = part_number, "multipart upload complete");
        Ok(())
    }

    fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> ProviderResult<CompletedPart> {
        let out = self
            .runtime
            .block_on(
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| ObjectProvider::object_error(&self.path, DisplayErrorContext(e)))?;

        Ok(CompletedPart::builder()
            .set_e_tag(out.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }
}

/// Worker-facing half of a streaming upload
struct ObjectWriteStream {
    chunks: Option<Sender<Vec<u8>>>,
    result: Receiver<ProviderResult<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Write for ObjectWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(chunks) = &self.chunks else {
            return Err(io::Error::new(io::ErrorKind::Other, "stream closed"));
        };
        chunks.send(buf.to_vec()).map_err(|_| {
            // Uploader died; its real error surfaces at close
            io::Error::new(io::ErrorKind::BrokenPipe, "uploader terminated")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteStream for ObjectWriteStream {
    fn close(mut self: Box<Self>) -> ProviderResult<()> {
        // Closing the chunk channel tells the uploader to finish
        self.chunks.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(ProviderError::InitFailed("uploader panicked".into()));
            }
        }

        match self.result.recv() {
            Ok(result) => result,
            Err(_) => Err(ProviderError::InitFailed(
                "uploader exited without a result".into(),
            )),
        }
    }
}

impl Drop for ObjectWriteStream {
    fn drop(&mut self) {
        self.chunks.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sink for directory placeholders, which commit in `open_write`
struct NoopWriteStream;

impl Write for NoopWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteStream for NoopWriteStream {
    fn close(self: Box<Self>) -> ProviderResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with_prefix(prefix: &str) -> ObjectProvider {
        // Key-building logic needs no connection
        ObjectProvider {
            client: Client::from_conf(
                aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .build(),
            ),
            bucket: "test-bucket".into(),
            prefix: prefix.into(),
            runtime: Arc::new(
                tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap(),
            ),
        }
    }

    #[test]
    fn test_build_key() {
        let cases = [
            ("", "test.txt", "test.txt"),
            ("", "/test.txt", "test.txt"),
            ("myprefix", "test.txt", "myprefix/test.txt"),
            ("myprefix/", "test.txt", "myprefix/test.txt"),
            ("myprefix", "/test.txt", "myprefix/test.txt"),
            ("my/deep/prefix", "some/path.txt", "my/deep/prefix/some/path.txt"),
            ("my/deep/prefix/", "/some/path.txt", "my/deep/prefix/some/path.txt"),
            ("", "", ""),
            ("myprefix", "", "myprefix"),
        ];

        for (prefix, path, expected) in cases {
            let provider = provider_with_prefix(prefix);
            assert_eq!(
                provider.build_key(path),
                expected,
                "prefix={prefix:?} path={path:?}"
            );
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(ObjectProvider::base_name("a/b/c.txt"), "c.txt");
        assert_eq!(ObjectProvider::base_name("a/b/"), "b");
        assert_eq!(ObjectProvider::base_name("top"), "top");
    }

    #[test]
    fn test_noop_write_stream() {
        let mut stream = NoopWriteStream;
        assert_eq!(stream.write(b"ignored").unwrap(), 7);
        Box::new(stream).close().unwrap();
    }
}
