//! Readable byte sources for engine resources.
//!
//! A resource (model, lexical shortlist, vocabulary) arrives as one of three
//! kinds of source, ordered by how cheaply its length can be learned:
//! in-memory bytes report it directly, seekable streams can measure it
//! without consuming themselves, and plain streams must be buffered once.

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;

use crate::error::{Error, Result};

/// Readable plus absolute-position seekable, the capability needed to measure
/// a stream without consuming it.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A readable byte source of unknown-until-queried length.
///
/// Sizes must fit in 32 bits because the engine's linear memory is 32-bit
/// addressable; anything larger is a fatal configuration error.
pub enum ResourceSource {
    /// Fully buffered bytes. Length is known; clones are cheap and share the
    /// same immutable storage.
    Bytes(Bytes),

    /// A stream supporting absolute seeks. Sized by seeking to the end and
    /// back, then consumed once during fill.
    Seekable(Box<dyn ReadSeek>),

    /// A one-shot stream. Sizing it forces a full buffer, after which the
    /// source behaves like [`ResourceSource::Bytes`].
    Stream(Box<dyn Read + Send>),
}

impl ResourceSource {
    /// Resolves the source's length in bytes.
    ///
    /// A [`ResourceSource::Stream`] is drained into memory as a side effect
    /// and replaced by the resulting buffer, so the bytes remain available
    /// for the later fill.
    pub(crate) fn resolve_size(&mut self) -> Result<u32> {
        let size = match self {
            ResourceSource::Bytes(bytes) => bytes.len() as u64,
            ResourceSource::Seekable(stream) => {
                let end = stream.seek(SeekFrom::End(0))?;
                stream.seek(SeekFrom::Start(0))?;
                end
            }
            ResourceSource::Stream(stream) => {
                // We have failed to avoid copying the data into memory
                // to get the size...
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                let len = buf.len() as u64;
                *self = ResourceSource::Bytes(Bytes::from(buf));
                len
            }
        };

        if size > u64::from(u32::MAX) {
            return Err(Error::FileTooLarge { size });
        }
        Ok(size as u32)
    }

    /// Reads the whole source into shared immutable bytes.
    ///
    /// Non-buffered sources are drained and replaced by the buffer, so the
    /// read happens at most once per source.
    pub(crate) fn read_all(&mut self) -> Result<Bytes> {
        match self {
            ResourceSource::Bytes(bytes) => Ok(bytes.clone()),
            ResourceSource::Seekable(stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                let bytes = Bytes::from(buf);
                *self = ResourceSource::Bytes(bytes.clone());
                Ok(bytes)
            }
            ResourceSource::Stream(stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                let bytes = Bytes::from(buf);
                *self = ResourceSource::Bytes(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// Copies the source into `view`, consuming the source.
    ///
    /// The number of bytes written must equal the size resolved earlier;
    /// anything less leaves garbage the engine would read past, so a
    /// mismatch is fatal.
    pub(crate) fn fill(self, view: &mut [u8], expected: u32) -> Result<()> {
        let expected = expected as usize;
        match self {
            ResourceSource::Bytes(bytes) => {
                if bytes.len() != expected {
                    return Err(Error::ShortWrite {
                        written: bytes.len() as u64,
                        expected: expected as u64,
                    });
                }
                view[..expected].copy_from_slice(&bytes);
                Ok(())
            }
            ResourceSource::Seekable(stream) => copy_stream(stream, view, expected),
            ResourceSource::Stream(stream) => copy_stream(stream, view, expected),
        }
    }
}

fn copy_stream(mut stream: impl Read, view: &mut [u8], expected: usize) -> Result<()> {
    let mut written = 0usize;
    while written < expected {
        match stream.read(&mut view[written..expected])? {
            0 => break,
            n => written += n,
        }
    }
    if written != expected {
        return Err(Error::ShortWrite {
            written: written as u64,
            expected: expected as u64,
        });
    }
    Ok(())
}

impl From<Bytes> for ResourceSource {
    fn from(bytes: Bytes) -> Self {
        ResourceSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ResourceSource {
    fn from(bytes: Vec<u8>) -> Self {
        ResourceSource::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for ResourceSource {
    fn from(bytes: &'static [u8]) -> Self {
        ResourceSource::Bytes(Bytes::from_static(bytes))
    }
}

impl From<std::fs::File> for ResourceSource {
    fn from(file: std::fs::File) -> Self {
        ResourceSource::Seekable(Box::new(file))
    }
}

impl std::fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceSource::Bytes(bytes) => {
                f.debug_tuple("Bytes").field(&bytes.len()).finish()
            }
            ResourceSource::Seekable(_) => f.write_str("Seekable(..)"),
            ResourceSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
