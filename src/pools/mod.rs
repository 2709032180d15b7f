//! Pools Module
//!
//! Expiring pools specialised for decoded images and remote text.
//!
//! Keys carry a handle to the loader that knows how to fetch and decode
//! their value. The handle is not part of the key's identity, so two keys
//! naming the same resource hit the same entry whichever loader built them.

mod image;
mod text;

pub use image::{ImageEntry, ImageKey, ImageLoader, ImageLocator, ImagePool};
pub use text::{TextEntry, TextKey, TextLoader, TextPool, DEFAULT_TEXT_TTL};
