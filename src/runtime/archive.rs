// ABOUTME: Tar packing and streaming extraction for file transfer into nodes.
// ABOUTME: Engines move files as tar archives; callers deal in plain bytes.

use super::error::{ResourceKind, RuntimeError};
use super::traits::ByteStream;
use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const BLOCK: usize = 512;

/// Split an absolute in-node path into the form used inside an archive
/// uploaded at `/`.
pub fn archive_path(destination: &str) -> Result<&str, RuntimeError> {
    let relative = destination.strip_prefix('/').unwrap_or_default();
    if relative.is_empty() || relative.ends_with('/') {
        return Err(RuntimeError::engine(
            "write",
            destination,
            "destination must be an absolute file path",
        ));
    }
    Ok(relative)
}

/// Build a single-file tar archive.
pub fn pack_file(path: &str, content: &[u8], mode: u32) -> std::io::Result<Vec<u8>> {
    let mut ar = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_path(path)?;
    header.set_size(content.len() as u64);
    header.set_mode(mode & 0o7777);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    ar.append(&header, content)?;

    ar.into_inner()
}

/// Read a host file along with its permission bits.
pub async fn read_local_file(source: &Path) -> Result<(Vec<u8>, u32), RuntimeError> {
    let target = source.display().to_string();
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| RuntimeError::engine("copy", &target, e))?;
    let content = tokio::fs::read(source)
        .await
        .map_err(|e| RuntimeError::engine("copy", &target, e))?;
    Ok((content, metadata.permissions().mode()))
}

enum Phase {
    Header,
    Skip(u64),
    Body(u64),
    Done,
}

struct Untar {
    archive: ByteStream,
    buf: BytesMut,
    phase: Phase,
    path: String,
}

impl Untar {
    /// Buffer at least `n` bytes. Returns false when the archive ends first.
    async fn fill(&mut self, n: usize) -> Result<bool, RuntimeError> {
        while self.buf.len() < n {
            match self.archive.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn truncated(&self) -> RuntimeError {
        RuntimeError::engine("read", self.path.clone(), "archive ended unexpectedly")
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RuntimeError> {
        loop {
            match self.phase {
                Phase::Done => return Ok(None),
                Phase::Header => {
                    if !self.fill(BLOCK).await? {
                        return Err(self.truncated());
                    }
                    let block = self.buf.split_to(BLOCK);
                    if block.iter().all(|b| *b == 0) {
                        self.phase = Phase::Done;
                        return Err(RuntimeError::not_found(ResourceKind::File, self.path.clone()));
                    }

                    let header = tar::Header::from_byte_slice(&block);
                    let size = header
                        .entry_size()
                        .map_err(|e| RuntimeError::engine("read", self.path.clone(), e))?;
                    let entry_type = header.entry_type();

                    self.phase = if entry_type.is_file() {
                        Phase::Body(size)
                    } else if matches!(
                        entry_type,
                        tar::EntryType::XHeader
                            | tar::EntryType::XGlobalHeader
                            | tar::EntryType::GNULongName
                            | tar::EntryType::GNULongLink
                    ) {
                        Phase::Skip(size.div_ceil(BLOCK as u64) * BLOCK as u64)
                    } else {
                        self.phase = Phase::Done;
                        return Err(RuntimeError::engine(
                            "read",
                            self.path.clone(),
                            "not a regular file",
                        ));
                    };
                }
                Phase::Skip(0) => self.phase = Phase::Header,
                Phase::Skip(n) => {
                    if self.buf.is_empty() && !self.fill(1).await? {
                        return Err(self.truncated());
                    }
                    let take = (n as usize).min(self.buf.len());
                    self.buf.advance(take);
                    self.phase = Phase::Skip(n - take as u64);
                }
                Phase::Body(0) => {
                    // Padding and any trailing entries are irrelevant.
                    self.phase = Phase::Done;
                    return Ok(None);
                }
                Phase::Body(remaining) => {
                    if self.buf.is_empty() && !self.fill(1).await? {
                        return Err(self.truncated());
                    }
                    let take = (remaining as usize).min(self.buf.len());
                    let chunk = self.buf.split_to(take).freeze();
                    self.phase = Phase::Body(remaining - take as u64);
                    return Ok(Some(chunk));
                }
            }
        }
    }
}

/// Stream the content of the first regular file in a tar archive stream.
///
/// Extended headers are skipped; the archive is never buffered beyond the
/// chunk currently being forwarded.
pub fn first_file(archive: ByteStream, path: &str) -> ByteStream {
    let state = Untar {
        archive,
        buf: BytesMut::new(),
        phase: Phase::Header,
        path: path.to_string(),
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        match st.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), st)),
            Ok(None) => None,
            Err(e) => {
                st.phase = Phase::Done;
                Some((Err(e), st))
            }
        }
    }))
}

/// Collect a byte stream into memory.
pub async fn collect(mut stream: ByteStream) -> Result<Vec<u8>, RuntimeError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(data: Vec<u8>, size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes, RuntimeError>> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn round_trips_through_odd_chunking() {
        let content = b"hello".repeat(300);
        let archive = pack_file("tmp/f", &content, 0o644).unwrap();

        let out = collect(first_file(chunked(archive, 7), "/tmp/f")).await.unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn skips_pax_headers() {
        let mut ar = tar::Builder::new(Vec::new());
        let long = format!("tmp/{}", "x".repeat(150));
        let mut header = tar::Header::new_ustar();
        header.set_size(5);
        header.set_mode(0o600);
        header.set_entry_type(tar::EntryType::Regular);
        // Long names force a GNU long-name entry ahead of the file itself.
        ar.append_data(&mut header, &long, &b"hello"[..]).unwrap();
        let archive = ar.into_inner().unwrap();

        let out = collect(first_file(chunked(archive, 512), "/long")).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn skipped_entries_span_small_chunks() {
        let mut ar = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_size(5);
        header.set_mode(0o600);
        header.set_entry_type(tar::EntryType::Regular);
        ar.append_data(&mut header, format!("tmp/{}", "y".repeat(300)), &b"world"[..])
            .unwrap();
        let archive = ar.into_inner().unwrap();

        let out = collect(first_file(chunked(archive, 97), "/long")).await.unwrap();
        assert_eq!(out, b"world");
    }

    #[tokio::test]
    async fn empty_archive_is_not_found() {
        let archive = tar::Builder::new(Vec::new()).into_inner().unwrap();
        let err = collect(first_file(chunked(archive, 512), "/missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn archive_path_requires_absolute_file() {
        assert_eq!(archive_path("/tmp/f").unwrap(), "tmp/f");
        assert!(archive_path("tmp/f").is_err());
        assert!(archive_path("/").is_err());
        assert!(archive_path("/tmp/").is_err());
    }

    #[test]
    fn packed_mode_is_kept() {
        let archive = pack_file("etc/x", b"x", 0o755).unwrap();
        let header = tar::Header::from_byte_slice(&archive[..BLOCK]);
        assert_eq!(header.mode().unwrap(), 0o755);
    }
}
