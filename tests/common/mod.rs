#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use dicom_review::{
    FileTransport, HeadlessEngine, HeadlessViewport, LoadError, Orchestrator, RenderError,
    RenderingEngine, ViewerConfig, Viewport, ViewportOptions, ViewportProperties,
};

/// 4x4 16-bit frame spanning `offset..=offset + 1000`
pub fn frame(offset: u16) -> Vec<u8> {
    let pixels: Vec<u16> = (0..16u16).map(|k| k * 1000 / 15 + offset).collect();
    frame_with_pixels(pixels)
}

pub fn frame_with_pixels(pixels: Vec<u16>) -> Vec<u8> {
    let mut object = InMemDicomObject::new_empty();
    object.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)));
    object.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)));
    object.put(DataElement::new(
        tags::BITS_ALLOCATED,
        VR::US,
        PrimitiveValue::from(16_u16),
    ));
    object.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(pixels.into()),
    ));
    write(object)
}

/// A well-formed file that carries no pixel data
pub fn frame_without_pixels() -> Vec<u8> {
    let mut object = InMemDicomObject::new_empty();
    object.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)));
    object.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)));
    write(object)
}

fn write(object: InMemDicomObject) -> Vec<u8> {
    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("2.25.90210"),
        )
        .expect("file meta should build");
    let mut bytes = Vec::new();
    file.write_all(&mut bytes).expect("in-memory write");
    bytes
}

/// Scans held in memory; records every fetch in order
#[derive(Default)]
pub struct MemoryTransport {
    scans: HashMap<String, Vec<(String, Vec<u8>)>>,
    failing: Option<String>,
    pub fetched: RefCell<Vec<String>>,
}

impl MemoryTransport {
    pub fn with_scan(mut self, scan_id: &str, files: Vec<(String, Vec<u8>)>) -> Self {
        self.scans.insert(scan_id.to_string(), files);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing = Some(name.to_string());
        self
    }
}

impl FileTransport for MemoryTransport {
    async fn list_files(&self, scan_id: &str) -> Result<Vec<String>, LoadError> {
        self.scans
            .get(scan_id)
            .map(|files| files.iter().map(|(name, _)| name.clone()).collect())
            .ok_or_else(|| LoadError::NetworkFailure(format!("404 for scan {scan_id}")))
    }

    async fn fetch_file(&self, scan_id: &str, name: &str) -> Result<Vec<u8>, LoadError> {
        self.fetched.borrow_mut().push(name.to_string());
        if self.failing.as_deref() == Some(name) {
            return Err(LoadError::NetworkFailure(format!("503 for {name}")));
        }
        self.scans
            .get(scan_id)
            .and_then(|files| files.iter().find(|(file, _)| file == name))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| LoadError::NetworkFailure(format!("404 for {name}")))
    }
}

pub fn stack_files(count: u16) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("IM{:04}.dcm", i + 1), frame(i)))
        .collect()
}

/// Headless engine whose next `failing_resizes` resize calls fail
#[derive(Default)]
pub struct FlakyEngine {
    pub inner: HeadlessEngine,
    pub failing_resizes: usize,
}

impl RenderingEngine for FlakyEngine {
    type Viewport = HeadlessViewport;

    async fn initialize(&mut self) -> Result<(), RenderError> {
        self.inner.initialize().await
    }

    fn create_viewport(&mut self, id: &str, options: ViewportOptions) -> Result<(), RenderError> {
        self.inner.create_viewport(id, options)
    }

    fn viewport(&self, id: &str) -> Option<&HeadlessViewport> {
        self.inner.viewport(id)
    }

    fn viewport_mut(&mut self, id: &str) -> Option<&mut HeadlessViewport> {
        self.inner.viewport_mut(id)
    }

    fn viewport_ids(&self) -> Vec<String> {
        self.inner.viewport_ids()
    }

    fn resize(&mut self, force: bool) -> Result<(), RenderError> {
        if self.failing_resizes > 0 {
            self.failing_resizes -= 1;
            return Err(RenderError::Host(String::from("canvas has zero size")));
        }
        self.inner.resize(force)
    }

    fn destroy(&mut self) {
        self.inner.destroy();
    }
}

/// Viewport whose canvas can be lost: it keeps taking properties but
/// every render fails
#[derive(Debug, Default)]
pub struct CanvasViewport {
    pub inner: HeadlessViewport,
    pub lost: bool,
}

impl Viewport for CanvasViewport {
    fn set_stack(&mut self, image_ids: &[String], initial_index: usize) -> Result<(), RenderError> {
        self.inner.set_stack(image_ids, initial_index)
    }

    fn set_image_id_index(&mut self, index: usize) -> Result<(), RenderError> {
        self.inner.set_image_id_index(index)
    }

    fn current_image_id_index(&self) -> usize {
        self.inner.current_image_id_index()
    }

    fn set_properties(&mut self, properties: ViewportProperties) -> Result<(), RenderError> {
        self.inner.set_properties(properties)
    }

    fn reset_camera(&mut self) -> Result<(), RenderError> {
        self.inner.reset_camera()
    }

    fn render(&mut self) -> Result<(), RenderError> {
        if self.lost {
            return Err(RenderError::Host(String::from("canvas lost")));
        }
        self.inner.render()
    }
}

/// Engine whose viewports listed in `lost` fail to render from creation on
#[derive(Default)]
pub struct CanvasEngine {
    pub lost: Vec<String>,
    viewports: Vec<(String, CanvasViewport)>,
}

impl CanvasEngine {
    pub fn losing(id: &str) -> Self {
        Self {
            lost: vec![id.to_string()],
            viewports: Vec::new(),
        }
    }
}

impl RenderingEngine for CanvasEngine {
    type Viewport = CanvasViewport;

    async fn initialize(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn create_viewport(&mut self, id: &str, _options: ViewportOptions) -> Result<(), RenderError> {
        let viewport = CanvasViewport {
            inner: HeadlessViewport::default(),
            lost: self.lost.iter().any(|lost| lost == id),
        };
        self.viewports.retain(|(existing, _)| existing != id);
        self.viewports.push((id.to_string(), viewport));
        Ok(())
    }

    fn viewport(&self, id: &str) -> Option<&CanvasViewport> {
        self.viewports
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, viewport)| viewport)
    }

    fn viewport_mut(&mut self, id: &str) -> Option<&mut CanvasViewport> {
        self.viewports
            .iter_mut()
            .find(|(existing, _)| existing == id)
            .map(|(_, viewport)| viewport)
    }

    fn viewport_ids(&self) -> Vec<String> {
        self.viewports.iter().map(|(id, _)| id.clone()).collect()
    }

    fn resize(&mut self, _force: bool) -> Result<(), RenderError> {
        Ok(())
    }

    fn destroy(&mut self) {
        self.viewports.clear();
    }
}

pub fn test_config() -> ViewerConfig {
    ViewerConfig::default().with_layout_retry(Duration::ZERO, 2)
}

pub fn viewer(
    transport: MemoryTransport,
) -> Orchestrator<HeadlessEngine, MemoryTransport> {
    Orchestrator::new(HeadlessEngine::new(), transport, test_config())
}
