use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::decoder::{DecodedImage, FrameDecoder};
use crate::engine::RenderingEngine;
use crate::loader::{DicomFileLoader, FrameCache, ImageLoaderRegistry, LoadError, image_id};

/// Everything owned by one open viewer: the frame cache, the loader
/// registry resolving image ids against it, and the rendering engine.
pub struct VolumeSession<E: RenderingEngine> {
    pub engine: E,
    cache: Arc<FrameCache>,
    registry: ImageLoaderRegistry,
    scheme: String,
}

impl<E: RenderingEngine> VolumeSession<E> {
    pub fn new(engine: E, config: &ViewerConfig) -> Self {
        let cache = Arc::new(FrameCache::new());
        let mut registry = ImageLoaderRegistry::new();
        registry.register_image_loader(
            &config.scheme,
            DicomFileLoader::new(cache.clone(), FrameDecoder::new(config.sample_target)),
        );
        Self {
            engine,
            cache,
            registry,
            scheme: config.scheme.clone(),
        }
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn registry(&self) -> &ImageLoaderRegistry {
        &self.registry
    }

    /// Host hook for additional schemes
    pub fn registry_mut(&mut self) -> &mut ImageLoaderRegistry {
        &mut self.registry
    }

    pub fn image_id(&self, name: &str) -> String {
        image_id(&self.scheme, name)
    }

    pub fn store(&self, name: &str, bytes: Vec<u8>) -> String {
        self.cache.store_raw(name, bytes);
        self.image_id(name)
    }

    pub async fn resolve(&self, image_id: &str) -> Result<Arc<DecodedImage>, LoadError> {
        self.registry.resolve(image_id).await
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
