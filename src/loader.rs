//! Maps image identifiers such as `dicomfile:IM0001.dcm` to decoded frames.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use thiserror::Error;

use crate::decoder::{DecodeError, DecodedImage, FrameDecoder};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Frame {0} was never fetched")]
    NotCached(String),

    #[error("No image loader registered for scheme {0}")]
    UnknownScheme(String),

    #[error("Image id {0} has no scheme prefix")]
    InvalidImageId(String),

    #[error("Failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },

    #[error("Scan {0} contains no files")]
    EmptyScan(String),

    #[error("Load cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn image_id(scheme: &str, name: &str) -> String {
    format!("{scheme}:{name}")
}

/// Splits `scheme:name`; the name itself may contain further colons.
pub fn split_image_id(image_id: &str) -> Result<(&str, &str), LoadError> {
    image_id
        .split_once(':')
        .filter(|(scheme, _)| !scheme.is_empty())
        .ok_or_else(|| LoadError::InvalidImageId(image_id.to_string()))
}

/// Raw bytes and decoded frames of the open scan, keyed by file name.
///
/// Entries are inserted once and never mutated; the whole cache is cleared
/// when another scan is opened or the viewer is torn down.
#[derive(Debug, Default)]
pub struct FrameCache {
    raw: RwLock<HashMap<String, Arc<[u8]>>>,
    decoded: RwLock<HashMap<String, Arc<DecodedImage>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_raw(&self, name: &str, bytes: Vec<u8>) {
        self.raw
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::from(bytes));
    }

    pub fn raw(&self, name: &str) -> Option<Arc<[u8]>> {
        self.raw
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn decoded(&self, name: &str) -> Option<Arc<DecodedImage>> {
        self.decoded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn publish(&self, name: &str, image: DecodedImage) -> Arc<DecodedImage> {
        self.decoded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(image))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.raw.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.raw
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.decoded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

pub trait ImageLoader: Send + Sync {
    fn load(&self, image_id: &str) -> BoxFuture<'static, Result<Arc<DecodedImage>, LoadError>>;
}

impl<F> ImageLoader for F
where
    F: Fn(&str) -> BoxFuture<'static, Result<Arc<DecodedImage>, LoadError>> + Send + Sync,
{
    fn load(&self, image_id: &str) -> BoxFuture<'static, Result<Arc<DecodedImage>, LoadError>> {
        self(image_id)
    }
}

/// Loader for frames whose raw bytes were stored in a [`FrameCache`].
pub struct DicomFileLoader {
    cache: Arc<FrameCache>,
    decoder: FrameDecoder,
}

impl DicomFileLoader {
    pub fn new(cache: Arc<FrameCache>, decoder: FrameDecoder) -> Self {
        Self { cache, decoder }
    }

    /// Decodes at most once per file name
    pub fn load_now(&self, image_id: &str) -> Result<Arc<DecodedImage>, LoadError> {
        let (_, name) = split_image_id(image_id)?;
        if let Some(image) = self.cache.decoded(name) {
            return Ok(image);
        }
        let bytes = self
            .cache
            .raw(name)
            .ok_or_else(|| LoadError::NotCached(name.to_string()))?;
        let image = self
            .decoder
            .decode(&bytes)
            .map_err(|source| LoadError::Decode {
                name: name.to_string(),
                source,
            })?;
        Ok(self.cache.publish(name, image))
    }
}

impl ImageLoader for DicomFileLoader {
    fn load(&self, image_id: &str) -> BoxFuture<'static, Result<Arc<DecodedImage>, LoadError>> {
        future::ready(self.load_now(image_id)).boxed()
    }
}

#[derive(Default)]
pub struct ImageLoaderRegistry {
    loaders: HashMap<String, Arc<dyn ImageLoader>>,
}

impl ImageLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any loader previously registered for `scheme`.
    pub fn register_image_loader(&mut self, scheme: &str, loader: impl ImageLoader + 'static) {
        log::debug!("Registering image loader for scheme {scheme}");
        self.loaders.insert(scheme.to_string(), Arc::new(loader));
    }

    pub fn has_loader(&self, scheme: &str) -> bool {
        self.loaders.contains_key(scheme)
    }

    pub async fn resolve(&self, image_id: &str) -> Result<Arc<DecodedImage>, LoadError> {
        let (scheme, _) = split_image_id(image_id)?;
        let loader = self
            .loaders
            .get(scheme)
            .cloned()
            .ok_or_else(|| LoadError::UnknownScheme(scheme.to_string()))?;
        loader.load(image_id).await
    }
}
