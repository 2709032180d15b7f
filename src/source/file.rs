//! File Source
//!
//! Byte source over local files, optionally rooted at a directory.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::source::{ByteSource, ByteStream, RequestDecorator};

// == File Source ==
/// Opens locators as file paths. A missing file is unavailable, not an error.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    /// Resolves locators as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves locators relative to `root`, e.g. a bundle of resources
    /// addressed by id.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(locator),
            None => PathBuf::from(locator),
        }
    }
}

impl ByteSource for FileSource {
    fn open(
        &self,
        locator: &str,
        _decorator: Option<&RequestDecorator>,
    ) -> Result<Option<ByteStream>> {
        let path = self.resolve(locator);
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist", path.display());
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
