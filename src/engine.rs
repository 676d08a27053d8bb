//! Narrow view of the host rendering engine.
//!
//! The review engine never touches GPU or canvas resources directly. The host
//! owns them and implements [`RenderingEngine`] and [`Viewport`];
//! [`HeadlessEngine`] is an offscreen implementation that only records what
//! it was asked to display.

use std::future::Future;

use thiserror::Error;

use crate::enums::Orientation;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering engine error: {0}")]
    Host(String),

    #[error("Unknown viewport: {0}")]
    UnknownViewport(String),
}

/// Lower/upper intensity bounds handed to the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewportProperties {
    pub voi_range: Option<VoiRange>,
    pub invert: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportOptions {
    pub orientation: Orientation,
    pub background: [f32; 3],
}

impl ViewportOptions {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            background: [0.0, 0.0, 0.0],
        }
    }
}

pub trait Viewport {
    fn set_stack(&mut self, image_ids: &[String], initial_index: usize)
    -> Result<(), RenderError>;

    fn set_image_id_index(&mut self, index: usize) -> Result<(), RenderError>;

    fn current_image_id_index(&self) -> usize;

    fn set_properties(&mut self, properties: ViewportProperties) -> Result<(), RenderError>;

    fn reset_camera(&mut self) -> Result<(), RenderError>;

    fn render(&mut self) -> Result<(), RenderError>;
}

pub trait RenderingEngine {
    type Viewport: Viewport;

    /// Asynchronous set-up of the underlying toolset
    fn initialize(&mut self) -> impl Future<Output = Result<(), RenderError>>;

    fn create_viewport(&mut self, id: &str, options: ViewportOptions) -> Result<(), RenderError>;

    fn viewport(&self, id: &str) -> Option<&Self::Viewport>;

    fn viewport_mut(&mut self, id: &str) -> Option<&mut Self::Viewport>;

    fn viewport_ids(&self) -> Vec<String>;

    fn resize(&mut self, force: bool) -> Result<(), RenderError>;

    fn destroy(&mut self);
}

/// Offscreen viewport keeping the last state pushed to it
#[derive(Debug, Clone, Default)]
pub struct HeadlessViewport {
    pub stack: Vec<String>,
    pub index: usize,
    pub properties: ViewportProperties,
    pub camera_resets: usize,
    pub renders: usize,
}

impl HeadlessViewport {
    pub fn current_image_id(&self) -> Option<&str> {
        self.stack.get(self.index).map(String::as_str)
    }
}

impl Viewport for HeadlessViewport {
    fn set_stack(
        &mut self,
        image_ids: &[String],
        initial_index: usize,
    ) -> Result<(), RenderError> {
        if image_ids.is_empty() {
            return Err(RenderError::Host(String::from("empty stack")));
        }
        self.stack = image_ids.to_vec();
        self.index = initial_index.min(image_ids.len() - 1);
        Ok(())
    }

    fn set_image_id_index(&mut self, index: usize) -> Result<(), RenderError> {
        if index >= self.stack.len() {
            return Err(RenderError::Host(format!(
                "image index {index} outside stack of {}",
                self.stack.len()
            )));
        }
        self.index = index;
        Ok(())
    }

    fn current_image_id_index(&self) -> usize {
        self.index
    }

    fn set_properties(&mut self, properties: ViewportProperties) -> Result<(), RenderError> {
        if properties.voi_range.is_some() {
            self.properties.voi_range = properties.voi_range;
        }
        if properties.invert.is_some() {
            self.properties.invert = properties.invert;
        }
        Ok(())
    }

    fn reset_camera(&mut self) -> Result<(), RenderError> {
        self.camera_resets += 1;
        Ok(())
    }

    fn render(&mut self) -> Result<(), RenderError> {
        self.renders += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HeadlessEngine {
    pub initialized: bool,
    pub resizes: usize,
    viewports: Vec<(String, HeadlessViewport)>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderingEngine for HeadlessEngine {
    type Viewport = HeadlessViewport;

    async fn initialize(&mut self) -> Result<(), RenderError> {
        self.initialized = true;
        Ok(())
    }

    fn create_viewport(&mut self, id: &str, _options: ViewportOptions) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::Host(String::from("engine not initialized")));
        }
        match self.viewports.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, viewport)) => *viewport = HeadlessViewport::default(),
            None => self
                .viewports
                .push((id.to_string(), HeadlessViewport::default())),
        }
        Ok(())
    }

    fn viewport(&self, id: &str) -> Option<&HeadlessViewport> {
        self.viewports
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, viewport)| viewport)
    }

    fn viewport_mut(&mut self, id: &str) -> Option<&mut HeadlessViewport> {
        self.viewports
            .iter_mut()
            .find(|(existing, _)| existing == id)
            .map(|(_, viewport)| viewport)
    }

    fn viewport_ids(&self) -> Vec<String> {
        self.viewports.iter().map(|(id, _)| id.clone()).collect()
    }

    fn resize(&mut self, _force: bool) -> Result<(), RenderError> {
        self.resizes += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.viewports.clear();
        self.initialized = false;
    }
}
