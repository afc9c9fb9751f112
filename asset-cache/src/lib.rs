//! Bounded, thread-safe asset caches for rendered templates and CAD meshes.
//!
//! # Architecture
//!
//! - [`LruCache`]: plain single-threaded LRU map
//! - [`AssetCache`]: the LRU behind a `parking_lot` mutex, plus hit/miss counters
//! - [`AssetLoader`]: async loaders that read assets from disk without holding any lock
//! - [`AssetRegistry`]: the template and CAD caches side by side, with get-or-load and preload
//!
//! Entries are keyed by canonicalized path and are only ever evicted by
//! capacity pressure. A file that changes on disk at a cached path is not
//! detected.

pub mod cache;
pub mod error;
pub mod loader;
pub mod lru;
pub mod registry;

pub use cache::{AssetCache, CacheStats};
pub use error::{AssetError, Result};
pub use loader::{
    find_cad_file, AssetLoader, CadAsset, CadFileLoader, CadFormat, TemplateBundle, TemplateDirLoader,
    CAD_EXTENSIONS,
};
pub use lru::LruCache;
pub use registry::{canonical_key, AssetRegistry, PreloadReport, RegistryStats};
