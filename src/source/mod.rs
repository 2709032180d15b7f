//! Source Module
//!
//! Narrow interfaces to the collaborators that populate cache entries: byte
//! stream producers and decoders.

mod file;
mod http;

use std::io::Read;

use reqwest::header::HeaderMap;

use crate::error::Result;

pub use file::FileSource;
pub use http::{HttpSource, DEFAULT_HTTP_TIMEOUT};

/// Readable stream handed from a source to a decoder.
pub type ByteStream = Box<dyn Read + Send>;

/// Hook that adds request headers before a fetch.
pub type RequestDecorator = dyn Fn(&mut HeaderMap) + Send + Sync;

// == Byte Source ==
/// Synchronous producer of byte streams.
pub trait ByteSource: Send + Sync {
    /// Opens `locator`.
    ///
    /// `Ok(None)` means the resource is unavailable. Errors describe why the
    /// source could not answer at all.
    fn open(&self, locator: &str, decorator: Option<&RequestDecorator>)
        -> Result<Option<ByteStream>>;
}

// == Image Decoding ==
/// Size limits applied while decoding, None = unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageBounds {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ImageBounds {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: Some(max_width),
            max_height: Some(max_height),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Decoded pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Turns a byte stream into an image no larger than `bounds`.
pub trait ImageDecoder: Send + Sync {
    /// `Ok(None)` when the bytes are not a decodable image.
    fn decode(&self, stream: &mut dyn Read, bounds: ImageBounds) -> Result<Option<DecodedImage>>;
}

// == Text Decoding ==
/// Reads a whole stream as text.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD, so a page in a
/// legacy encoding still yields cacheable text. Only read failures are errors.
pub fn read_text(stream: &mut dyn Read) -> Result<String> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::io::Cursor;

    #[test]
    fn test_read_text_utf8() {
        let mut stream = Cursor::new("héllo".as_bytes().to_vec());
        assert_eq!(read_text(&mut stream).unwrap(), "héllo");
    }

    #[test]
    fn test_read_text_replaces_invalid_utf8() {
        let mut stream = Cursor::new(b"caf\xe9 menu".to_vec());
        assert_eq!(read_text(&mut stream).unwrap(), "caf\u{fffd} menu");
    }

    /// Reader whose every read fails.
    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            ))
        }
    }

    #[test]
    fn test_read_text_propagates_read_failures() {
        assert!(matches!(read_text(&mut BrokenPipe), Err(CacheError::Io(_))));
    }

    #[test]
    fn test_image_bounds() {
        assert_eq!(ImageBounds::unbounded().max_width, None);
        assert_eq!(ImageBounds::new(640, 480).max_height, Some(480));
    }
}
