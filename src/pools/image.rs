//! Image Pool
//!
//! Expiring pool of decoded images keyed by locator and size bounds.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheKey, Cacheable, Expirable, ExpiringCachePool};
use crate::error::Result;
use crate::source::{
    ByteSource, ByteStream, DecodedImage, FileSource, ImageBounds, ImageDecoder, RequestDecorator,
};

/// Pool of decoded images.
pub type ImagePool = ExpiringCachePool<ImageKey>;

// == Image Locator ==
/// Where the encoded image lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageLocator {
    Url(String),
    Path(PathBuf),
    /// Bundled resource addressed by id
    Resource(u32),
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLocator::Url(url) => write!(f, "{}", url),
            ImageLocator::Path(path) => write!(f, "{}", path.display()),
            ImageLocator::Resource(id) => write!(f, "res:{}", id),
        }
    }
}

// == Image Entry ==
/// Decoded image. Images never go stale.
#[derive(Debug)]
pub struct ImageEntry {
    image: DecodedImage,
}

impl ImageEntry {
    pub fn new(image: DecodedImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &DecodedImage {
        &self.image
    }
}

impl Cacheable for ImageEntry {
    fn byte_cost(&self) -> usize {
        self.image.pixels.len()
    }
}

impl Expirable for ImageEntry {
    fn is_stale(&self) -> bool {
        false
    }
}

// == Image Loader ==
/// Fetches and decodes images for [`ImageKey`]s.
pub struct ImageLoader {
    remote: Arc<dyn ByteSource>,
    files: Arc<dyn ByteSource>,
    resources: Option<Arc<dyn ByteSource>>,
    decoder: Arc<dyn ImageDecoder>,
    decorator: Option<Arc<RequestDecorator>>,
}

impl ImageLoader {
    /// Loader fetching URLs from `remote` and paths from the local disk.
    pub fn new(remote: Arc<dyn ByteSource>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            remote,
            files: Arc::new(FileSource::new()),
            resources: None,
            decoder,
            decorator: None,
        }
    }

    pub fn with_files(mut self, files: Arc<dyn ByteSource>) -> Self {
        self.files = files;
        self
    }

    /// Source for [`ImageLocator::Resource`], opened with the id as locator.
    pub fn with_resources(mut self, resources: Arc<dyn ByteSource>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Adds request headers to remote fetches.
    pub fn with_decorator(mut self, decorator: Arc<RequestDecorator>) -> Self {
        self.decorator = Some(decorator);
        self
    }

    pub fn key(self: &Arc<Self>, locator: ImageLocator, bounds: ImageBounds) -> ImageKey {
        ImageKey {
            locator,
            bounds,
            loader: Arc::clone(self),
        }
    }

    pub fn url_key(self: &Arc<Self>, url: impl Into<String>, bounds: ImageBounds) -> ImageKey {
        self.key(ImageLocator::Url(url.into()), bounds)
    }

    fn open(&self, locator: &ImageLocator) -> Result<Option<ByteStream>> {
        match locator {
            ImageLocator::Url(url) => self.remote.open(url, self.decorator.as_deref()),
            ImageLocator::Path(path) => self.files.open(&path.to_string_lossy(), None),
            ImageLocator::Resource(id) => match &self.resources {
                Some(resources) => resources.open(&id.to_string(), None),
                None => {
                    debug!("No resource source for {}", locator);
                    Ok(None)
                }
            },
        }
    }

    fn load(&self, locator: &ImageLocator, bounds: ImageBounds) -> Result<Option<ImageEntry>> {
        let Some(mut stream) = self.open(locator)? else {
            return Ok(None);
        };
        let decoded = self.decoder.decode(&mut stream, bounds)?;
        if decoded.is_none() {
            debug!("{} did not decode to an image", locator);
        }
        Ok(decoded.map(ImageEntry::new))
    }
}

impl fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoader")
            .field("resources", &self.resources.is_some())
            .field("decorated", &self.decorator.is_some())
            .finish()
    }
}

// == Image Key ==
/// Identifies an image by locator and decode bounds. The loader is not part
/// of the identity.
#[derive(Clone)]
pub struct ImageKey {
    locator: ImageLocator,
    bounds: ImageBounds,
    loader: Arc<ImageLoader>,
}

impl ImageKey {
    pub fn locator(&self) -> &ImageLocator {
        &self.locator
    }

    pub fn bounds(&self) -> ImageBounds {
        self.bounds
    }
}

impl PartialEq for ImageKey {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator && self.bounds == other.bounds
    }
}

impl Eq for ImageKey {}

impl Hash for ImageKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.locator.hash(state);
        self.bounds.hash(state);
    }
}

impl fmt::Debug for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageKey")
            .field("locator", &self.locator)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl CacheKey for ImageKey {
    type Value = ImageEntry;

    fn create_entry(&self) -> Result<Option<ImageEntry>> {
        self.loader.load(&self.locator, self.bounds)
    }

    /// `<locator>|<width>x<height>`, unbounded sides shown as `-1`.
    fn describe(&self) -> String {
        let side = |limit: Option<u32>| limit.map_or(-1, i64::from);
        format!(
            "{}|{}x{}",
            self.locator,
            side(self.bounds.max_width),
            side(self.bounds.max_height)
        )
    }
}
