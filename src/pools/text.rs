//! Text Pool
//!
//! Expiring pool of remote text documents keyed by URL.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheKey, Cacheable, Clock, Expirable, ExpiringCachePool, Expiry, SystemClock};
use crate::error::Result;
use crate::source::{read_text, ByteSource, RequestDecorator};

/// Lifetime of a text entry when none is configured.
pub const DEFAULT_TEXT_TTL: Duration = Duration::from_secs(5 * 60);

/// Pool of text documents.
pub type TextPool = ExpiringCachePool<TextKey>;

// == Text Entry ==
/// A downloaded document that goes stale after its TTL.
#[derive(Debug)]
pub struct TextEntry {
    text: String,
    expiry: Expiry,
}

impl TextEntry {
    pub fn new(text: String, expiry: Expiry) -> Self {
        Self { text, expiry }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expiry(&self) -> &Expiry {
        &self.expiry
    }
}

impl Cacheable for TextEntry {
    fn byte_cost(&self) -> usize {
        self.text.len()
    }
}

impl Expirable for TextEntry {
    fn is_stale(&self) -> bool {
        self.expiry.is_stale()
    }
}

// == Text Loader ==
/// Fetches and decodes documents for [`TextKey`]s.
pub struct TextLoader {
    source: Arc<dyn ByteSource>,
    decorator: Option<Arc<RequestDecorator>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TextLoader {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source,
            decorator: None,
            ttl: DEFAULT_TEXT_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds request headers to every fetch.
    pub fn with_decorator(mut self, decorator: Arc<RequestDecorator>) -> Self {
        self.decorator = Some(decorator);
        self
    }

    /// Key for the document at `url`, loaded through this loader.
    pub fn key(self: &Arc<Self>, url: impl Into<String>) -> TextKey {
        TextKey {
            url: url.into(),
            loader: Arc::clone(self),
        }
    }

    fn load(&self, url: &str) -> Result<Option<TextEntry>> {
        let Some(mut stream) = self.source.open(url, self.decorator.as_deref())? else {
            return Ok(None);
        };
        let text = read_text(&mut stream)?;
        debug!("Loaded {} bytes of text from {}", text.len(), url);
        Ok(Some(TextEntry::new(
            text,
            Expiry::with_clock(self.ttl, Arc::clone(&self.clock)),
        )))
    }
}

impl fmt::Debug for TextLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextLoader")
            .field("ttl", &self.ttl)
            .field("decorated", &self.decorator.is_some())
            .finish()
    }
}

// == Text Key ==
/// Identifies a document by URL. The loader is not part of the identity.
#[derive(Clone)]
pub struct TextKey {
    url: String,
    loader: Arc<TextLoader>,
}

impl TextKey {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PartialEq for TextKey {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for TextKey {}

impl Hash for TextKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Debug for TextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextKey").field(&self.url).finish()
    }
}

impl CacheKey for TextKey {
    type Value = TextEntry;

    fn create_entry(&self) -> Result<Option<TextEntry>> {
        self.loader.load(&self.url)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::CacheError;
    use crate::source::ByteStream;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// In-memory source counting how often each locator is opened.
    #[derive(Default)]
    struct FakeSource {
        docs: HashMap<String, Vec<u8>>,
        opened: Mutex<Vec<String>>,
    }

    impl ByteSource for FakeSource {
        fn open(
            &self,
            locator: &str,
            _decorator: Option<&RequestDecorator>,
        ) -> Result<Option<ByteStream>> {
            self.opened.lock().push(locator.to_string());
            if locator.starts_with("down://") {
                return Err(CacheError::Transport("connection reset".to_string()));
            }
            Ok(self
                .docs
                .get(locator)
                .map(|doc| Box::new(Cursor::new(doc.clone())) as ByteStream))
        }
    }

    fn loader(clock: &ManualClock) -> (Arc<FakeSource>, Arc<TextLoader>) {
        let mut source = FakeSource::default();
        source.docs.insert("http://x/a".to_string(), b"alpha".to_vec());
        source.docs.insert("http://x/b".to_string(), b"bravo!".to_vec());
        // Latin-1 encoded page
        source
            .docs
            .insert("http://x/menu".to_string(), b"caf\xe9 menu".to_vec());
        let source = Arc::new(source);
        let loader = TextLoader::new(source.clone()).with_clock(Arc::new(clock.clone()));
        (source, Arc::new(loader))
    }

    #[test]
    fn test_key_identity_is_url() {
        let clock = ManualClock::default();
        let (_, first) = loader(&clock);
        let (_, second) = loader(&clock);

        assert_eq!(first.key("http://x/a"), second.key("http://x/a"));
        assert_ne!(first.key("http://x/a"), first.key("http://x/b"));
        assert_eq!(first.key("http://x/a").describe(), "http://x/a");
    }

    #[test]
    fn test_text_entry_cost_is_utf8_length() {
        let entry = TextEntry::new("héllo".to_string(), Expiry::never());
        assert_eq!(entry.byte_cost(), 6);
        assert!(!entry.is_stale());
    }

    #[test]
    fn test_pool_loads_and_caches_text() {
        let clock = ManualClock::default();
        let (source, loader) = loader(&clock);
        let pool = TextPool::new(1024);
        let key = loader.key("http://x/a");

        assert_eq!(pool.get(&key).unwrap().text(), "alpha");
        assert_eq!(pool.get(&key).unwrap().text(), "alpha");
        assert_eq!(source.opened.lock().len(), 1);
        assert_eq!(pool.size_bytes(), 5);
    }

    #[test]
    fn test_text_goes_stale_after_five_minutes() {
        let clock = ManualClock::default();
        let (source, loader) = loader(&clock);
        let pool = TextPool::new(1024);
        let key = loader.key("http://x/b");

        pool.get(&key);
        clock.advance(Duration::from_secs(60));
        pool.get(&key);
        assert_eq!(source.opened.lock().len(), 1);

        clock.advance(Duration::from_secs(300));
        let entry = pool.get(&key).unwrap();
        assert!(!entry.is_stale());
        assert_eq!(source.opened.lock().len(), 2);
    }

    #[test]
    fn test_legacy_encoded_page_is_cached_once() {
        let clock = ManualClock::default();
        let (source, loader) = loader(&clock);
        let pool = TextPool::new(1024);
        let key = loader.key("http://x/menu");

        let first = pool.get(&key).unwrap();
        assert_eq!(first.text(), "caf\u{fffd} menu");

        let second = pool.get(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.opened.lock().len(), 1);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_missing_and_failing_documents() {
        let clock = ManualClock::default();
        let (_, loader) = loader(&clock);
        let pool = TextPool::new(1024);

        assert!(pool.get(&loader.key("http://x/missing")).is_none());
        assert!(matches!(
            pool.try_get(&loader.key("down://x")),
            Err(CacheError::Transport(_))
        ));
        assert!(pool.is_empty());
    }
}
