//! Lazily opened response streams.
//!
//! A staged stream is only a description of where bytes come from. The host
//! opens it when writing the response and pipes it chunk by chunk, so a
//! streamed file is never held in memory as a whole.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body, Frame};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

/// Body type produced for the transport.
pub type StreamBody = BoxBody<Bytes, io::Error>;

/// Read size for whole-file handles.
pub const FILE_CHUNK_SIZE: usize = 256 * 1024;
/// Read size for chunked readers (the event-stream runtime's high-water mark).
pub const READER_CHUNK_SIZE: usize = 64 * 1024;

enum Source {
    /// A whole-file handle: opened on demand, length reported up front.
    File { path: PathBuf, chunk: usize },
    /// A chunked reader: opened on demand, length left to chunked encoding.
    Reader { path: PathBuf, chunk: usize },
    /// A caller-provided body.
    Body(StreamBody),
}

/// A response payload delivered as a stream.
pub struct ResponseStream {
    source: Source,
}

/// An opened stream ready to be piped.
#[derive(Debug)]
pub struct OpenedStream {
    pub body: StreamBody,
    /// Exact length when known.
    pub len: Option<u64>,
}

impl ResponseStream {
    /// Whole-file handle for `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File {
                path: path.into(),
                chunk: FILE_CHUNK_SIZE,
            },
        }
    }

    /// Chunked reader for `path`.
    pub fn reader(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Reader {
                path: path.into(),
                chunk: READER_CHUNK_SIZE,
            },
        }
    }

    /// Stream an arbitrary body.
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static,
    {
        Self {
            source: Source::Body(body.boxed()),
        }
    }

    /// The file path behind this stream, if it is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File { path, .. } | Source::Reader { path, .. } => Some(path),
            Source::Body(_) => None,
        }
    }

    /// Whether the stream reports its length before piping.
    pub fn is_sized(&self) -> bool {
        matches!(self.source, Source::File { .. })
    }

    /// Open the underlying source.
    pub async fn open(self) -> io::Result<OpenedStream> {
        match self.source {
            Source::File { path, chunk } => {
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                Ok(OpenedStream {
                    body: file_body(file, chunk),
                    len: Some(len),
                })
            }
            Source::Reader { path, chunk } => {
                let file = tokio::fs::File::open(&path).await?;
                Ok(OpenedStream {
                    body: file_body(file, chunk),
                    len: None,
                })
            }
            Source::Body(body) => Ok(OpenedStream { body, len: None }),
        }
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::File { path, .. } => f.debug_tuple("ResponseStream::File").field(path).finish(),
            Source::Reader { path, .. } => {
                f.debug_tuple("ResponseStream::Reader").field(path).finish()
            }
            Source::Body(_) => f.write_str("ResponseStream::Body"),
        }
    }
}

/// Pipe a file one chunk per frame without copying the chunks.
fn file_body(file: tokio::fs::File, chunk: usize) -> StreamBody {
    let frames = ReaderStream::with_capacity(file, chunk.max(1)).map_ok(Frame::data);
    http_body_util::StreamBody::new(frames).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_stream_reports_length() {
        let fixture = fixture(b"hello stream");
        let stream = ResponseStream::file(fixture.path());
        assert!(stream.is_sized());

        let opened = stream.open().await.unwrap();
        assert_eq!(opened.len, Some(12));
        let bytes = opened.body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello stream");
    }

    #[tokio::test]
    async fn test_reader_yields_multiple_chunks() {
        let contents = vec![b'x'; READER_CHUNK_SIZE * 2 + 10];
        let fixture = fixture(&contents);
        let opened = ResponseStream::reader(fixture.path()).open().await.unwrap();
        assert_eq!(opened.len, None);

        let mut body = opened.body;
        let mut frames = 0;
        let mut total = 0;
        while let Some(frame) = body.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= READER_CHUNK_SIZE);
            total += data.len();
            frames += 1;
        }
        assert_eq!(total, contents.len());
        assert!(frames >= 3);
    }

    #[tokio::test]
    async fn test_opened_stream_is_debug() {
        let fixture = fixture(b"debug me");
        let opened = ResponseStream::reader(fixture.path()).open().await.unwrap();
        assert!(format!("{:?}", opened).contains("OpenedStream"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_on_open() {
        let stream = ResponseStream::file("/definitely/not/here.bin");
        let err = stream.open().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
