use std::path::Path;
use std::sync::Arc;

use futures::future::{AbortRegistration, Abortable};
use image::GrayImage;
use thiserror::Error;
use web_time::Instant;

use crate::config::ViewerConfig;
use crate::decoder::DecodedImage;
use crate::engine::{
    RenderError, RenderingEngine, Viewport, ViewportOptions, ViewportProperties,
};
use crate::enums::{Orientation, PresetKind};
use crate::histogram::{Histogram, HistogramInteraction, PointerEvent, image_histogram};
use crate::loader::{ImageLoader, LoadError};
use crate::render::{RasterError, render_frame};
use crate::session::VolumeSession;
use crate::transport::FileTransport;
use crate::windowing::{WindowLevel, WindowingEngine};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Viewer is not ready")]
    NotReady,

    #[error("Viewer failed: {0}")]
    Terminal(String),

    #[error("The {0} viewport shows a single static slice")]
    NotNavigable(Orientation),

    #[error("Slice {index} is outside the stack of {len}")]
    SliceOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Screenshot failed: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerState {
    Uninitialized,
    LoadingFiles,
    LoadingVolume { loaded: usize, total: usize },
    Ready,
    /// Terminal; only [`Orchestrator::close`] followed by a new load recovers
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub orientation: Orientation,
    pub stack_image_ids: Vec<String>,
    pub current_index: usize,
    pub linked: bool,
    pub maximized: bool,
    pub visible: bool,
}

impl ViewportState {
    pub fn current_image_id(&self) -> Option<&str> {
        self.stack_image_ids
            .get(self.current_index)
            .map(String::as_str)
    }
}

/// What the info panel and histogram overlay show for the axial slice
#[derive(Debug, Clone)]
pub struct DisplayedImage {
    pub image_id: String,
    pub slice_index: usize,
    pub slice_count: usize,
    pub rows: usize,
    pub columns: usize,
    pub row_spacing: f64,
    pub column_spacing: f64,
    pub window: WindowLevel,
    pub preset: PresetKind,
    pub histogram: Histogram,
}

/// Drives the axial, sagittal and coronal viewports of one scan.
pub struct Orchestrator<E: RenderingEngine, T: FileTransport> {
    config: ViewerConfig,
    session: VolumeSession<E>,
    transport: T,
    state: ViewerState,
    viewports: Vec<ViewportState>,
    windowing: WindowingEngine,
    interaction: HistogramInteraction,
    current_image: Option<Arc<DecodedImage>>,
    displayed: Option<DisplayedImage>,
    loaded_scan: Option<String>,
    skipped: Vec<String>,
    engine_ready: bool,
    linked: bool,
    fullscreen: bool,
    show_metadata: bool,
    layout_pending: bool,
}

impl<E: RenderingEngine, T: FileTransport> Orchestrator<E, T> {
    pub fn new(engine: E, transport: T, config: ViewerConfig) -> Self {
        let session = VolumeSession::new(engine, &config);
        let interaction = HistogramInteraction::new(
            config.edge_threshold_px,
            config.min_window_width,
            config.wheel_sensitivity,
        );
        let windowing = WindowingEngine::default().with_min_width(config.min_window_width);
        Self {
            config,
            session,
            transport,
            state: ViewerState::Uninitialized,
            viewports: Vec::new(),
            windowing,
            interaction,
            current_image: None,
            displayed: None,
            loaded_scan: None,
            skipped: Vec::new(),
            engine_ready: false,
            linked: true,
            fullscreen: false,
            show_metadata: false,
            layout_pending: false,
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn session(&self) -> &VolumeSession<E> {
        &self.session
    }

    pub fn engine(&self) -> &E {
        &self.session.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.session.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Route image ids with `scheme` to a host supplied loader
    pub fn register_image_loader(&mut self, scheme: &str, loader: impl ImageLoader + 'static) {
        self.session.registry_mut().register_image_loader(scheme, loader);
    }

    pub fn viewports(&self) -> &[ViewportState] {
        &self.viewports
    }

    pub fn viewport_state(&self, orientation: Orientation) -> Option<&ViewportState> {
        self.viewports
            .iter()
            .find(|state| state.orientation == orientation)
    }

    pub fn window(&self) -> WindowLevel {
        self.windowing.current()
    }

    pub fn active_preset(&self) -> PresetKind {
        self.windowing.active_preset()
    }

    pub fn displayed(&self) -> Option<&DisplayedImage> {
        self.displayed.as_ref()
    }

    /// Frames dropped from the stack because they failed to decode
    pub fn skipped_frames(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn metadata_visible(&self) -> bool {
        self.show_metadata
    }

    pub fn layout_pending(&self) -> bool {
        self.layout_pending
    }

    /// Fetch, decode and display every file of `scan_id`.
    ///
    /// Loading the scan that is already on screen is a no-op. Any failure
    /// moves the viewer to the terminal [`ViewerState::Error`].
    pub async fn load_scan(&mut self, scan_id: &str) -> Result<(), ViewerError> {
        if let ViewerState::Error(message) = &self.state {
            return Err(ViewerError::Terminal(message.clone()));
        }
        if self.state == ViewerState::Ready && self.loaded_scan.as_deref() == Some(scan_id) {
            log::debug!("Scan {scan_id} already loaded");
            return Ok(());
        }

        match self.load_volume(scan_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                log::error!("Loading scan {scan_id} failed: {err}");
                self.state = ViewerState::Error(err.to_string());
                Err(err)
            }
        }
    }

    /// Like [`Orchestrator::load_scan`], but aborting the paired
    /// `AbortHandle` stops the load between suspension points, clears the
    /// cache and returns the viewer to [`ViewerState::Uninitialized`].
    pub async fn load_scan_abortable(
        &mut self,
        scan_id: &str,
        registration: AbortRegistration,
    ) -> Result<(), ViewerError> {
        match Abortable::new(self.load_scan(scan_id), registration).await {
            Ok(result) => result,
            Err(_aborted) => {
                log::info!("Load of scan {scan_id} cancelled");
                self.reset_volume();
                Err(LoadError::Cancelled.into())
            }
        }
    }

    async fn load_volume(&mut self, scan_id: &str) -> Result<(), ViewerError> {
        let started = Instant::now();
        if !self.engine_ready {
            self.session.engine.initialize().await?;
            self.engine_ready = true;
        }
        if self.loaded_scan.as_deref() != Some(scan_id) {
            self.session.clear();
        }
        self.loaded_scan = None;
        self.skipped.clear();
        self.viewports.clear();
        self.current_image = None;
        self.displayed = None;

        self.state = ViewerState::LoadingFiles;
        let names = self.transport.list_files(scan_id).await?;
        if names.is_empty() {
            return Err(LoadError::EmptyScan(scan_id.to_string()).into());
        }

        let total = names.len();
        let mut stack = Vec::with_capacity(total);
        for (position, name) in names.iter().enumerate() {
            self.state = ViewerState::LoadingVolume {
                loaded: position,
                total,
            };
            let bytes = self.transport.fetch_file(scan_id, name).await?;
            let image_id = self.session.store(name, bytes);
            match self.session.resolve(&image_id).await {
                Ok(_) => stack.push(image_id),
                // the first frame seeds the viewports, later ones may be dropped
                Err(LoadError::Decode { name, source }) if position > 0 => {
                    log::warn!("Skipping {name}: {source}");
                    self.skipped.push(format!("{name}: {source}"));
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.state = ViewerState::LoadingVolume {
            loaded: total,
            total,
        };

        self.configure_viewports(stack).await?;
        self.loaded_scan = Some(scan_id.to_string());
        self.state = ViewerState::Ready;
        log::info!(
            "Loaded scan {scan_id}: {} slices ({} skipped) in {:.1?}",
            self.stack_len(),
            self.skipped.len(),
            started.elapsed()
        );
        Ok(())
    }

    async fn configure_viewports(&mut self, stack: Vec<String>) -> Result<(), ViewerError> {
        let seed = self.session.resolve(&stack[0]).await?;
        let middle = stack[stack.len() / 2].clone();
        let properties = ViewportProperties {
            voi_range: None,
            invert: Some(seed.invert()),
        };

        let mut states = Vec::with_capacity(Orientation::ALL.len());
        for orientation in Orientation::ALL {
            let id = orientation.viewport_id();
            let image_ids = if orientation.is_navigable() {
                stack.clone()
            } else {
                vec![middle.clone()]
            };
            self.session
                .engine
                .create_viewport(id, ViewportOptions::new(orientation))?;
            let viewport = self
                .session
                .engine
                .viewport_mut(id)
                .ok_or_else(|| RenderError::UnknownViewport(id.to_string()))?;
            viewport.set_stack(&image_ids, 0)?;
            if let Err(err) = viewport.set_properties(properties) {
                log::warn!("Photometric setup of {id} failed: {err}");
            }
            states.push(ViewportState {
                orientation,
                stack_image_ids: image_ids,
                current_index: 0,
                linked: self.linked,
                maximized: false,
                visible: true,
            });
        }
        self.viewports = states;

        self.windowing = WindowingEngine::with_initial(seed.default_window)
            .with_min_width(self.config.min_window_width);
        let initial = self.windowing.initial();
        let ids = self.active_ids();
        self.windowing.apply_window_level(
            &mut self.session.engine,
            &ids,
            initial.center,
            initial.width,
        )?;
        self.show(stack[0].clone(), 0, seed);

        self.layout_pending = true;
        self.layout_settled();
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), ViewerError> {
        match &self.state {
            ViewerState::Ready => Ok(()),
            ViewerState::Error(message) => Err(ViewerError::Terminal(message.clone())),
            _ => Err(ViewerError::NotReady),
        }
    }

    fn active_ids(&self) -> Vec<&'static str> {
        self.viewports
            .iter()
            .map(|state| state.orientation.viewport_id())
            .collect()
    }

    fn stack_len(&self) -> usize {
        self.viewport_state(Orientation::Axial)
            .map_or(0, |state| state.stack_image_ids.len())
    }

    /// Make `image` the displayed axial slice and recompute its histogram
    fn show(&mut self, image_id: String, slice_index: usize, image: Arc<DecodedImage>) {
        let histogram = image_histogram(&image, self.config.histogram_bins);
        self.displayed = Some(DisplayedImage {
            image_id,
            slice_index,
            slice_count: self.stack_len(),
            rows: image.rows,
            columns: image.columns,
            row_spacing: image.row_spacing,
            column_spacing: image.column_spacing,
            window: self.windowing.current(),
            preset: self.windowing.active_preset(),
            histogram,
        });
        self.current_image = Some(image);
    }

    /// Keep the displayed record in step with what was pushed to the viewports
    fn sync_display(&mut self) {
        if let Some(displayed) = self.displayed.as_mut() {
            displayed.window = self.windowing.current();
            displayed.preset = self.windowing.active_preset();
        }
    }

    pub fn apply_window_level(
        &mut self,
        center: f64,
        width: f64,
    ) -> Result<WindowLevel, ViewerError> {
        self.ensure_ready()?;
        let ids = self.active_ids();
        let window =
            self.windowing
                .apply_window_level(&mut self.session.engine, &ids, center, width)?;
        self.windowing.mark_custom();
        self.sync_display();
        Ok(window)
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<WindowLevel, ViewerError> {
        self.ensure_ready()?;
        let ids = self.active_ids();
        let window = self
            .windowing
            .apply_preset(&mut self.session.engine, &ids, name)?;
        self.sync_display();
        Ok(window)
    }

    /// Restore the image's own window and reset every camera
    pub fn reset_view(&mut self) -> Result<WindowLevel, ViewerError> {
        self.ensure_ready()?;
        let ids = self.active_ids();
        let window = self.windowing.reset(&mut self.session.engine, &ids)?;
        for id in ids {
            if let Some(viewport) = self.session.engine.viewport_mut(id) {
                if let Err(err) = viewport.reset_camera().and_then(|()| viewport.render()) {
                    log::warn!("Resetting {id} failed: {err}");
                }
            }
        }
        self.sync_display();
        Ok(window)
    }

    /// Feed a histogram widget gesture. `width_px` is the widget width.
    pub fn histogram_event(
        &mut self,
        event: PointerEvent,
        width_px: f64,
    ) -> Result<Option<WindowLevel>, ViewerError> {
        if matches!(event, PointerEvent::Up) {
            self.histogram_pointer_up();
            return Ok(None);
        }
        self.ensure_ready()?;
        let Some(axis) = self
            .displayed
            .as_ref()
            .map(|displayed| displayed.histogram.axis(width_px))
        else {
            return Ok(None);
        };

        self.windowing.mark_custom();
        let updated = self
            .interaction
            .handle(event, &axis, self.windowing.current());
        let applied = match updated {
            Some(window) => {
                let ids = self.active_ids();
                Some(self.windowing.apply_window_level(
                    &mut self.session.engine,
                    &ids,
                    window.center,
                    window.width,
                )?)
            }
            None => None,
        };
        self.sync_display();
        Ok(applied)
    }

    /// Ends any histogram drag; safe to call from a global pointer-up listener
    pub fn histogram_pointer_up(&mut self) {
        self.interaction.release();
    }

    pub async fn set_slice_index(
        &mut self,
        orientation: Orientation,
        index: usize,
    ) -> Result<(), ViewerError> {
        self.ensure_ready()?;
        if !orientation.is_navigable() {
            return Err(ViewerError::NotNavigable(orientation));
        }
        let state = self
            .viewport_state(orientation)
            .ok_or(ViewerError::NotReady)?;
        let len = state.stack_image_ids.len();
        let image_id = state
            .stack_image_ids
            .get(index)
            .cloned()
            .ok_or(ViewerError::SliceOutOfRange { index, len })?;

        let image = self.session.resolve(&image_id).await?;
        let id = orientation.viewport_id();
        let viewport = self
            .session
            .engine
            .viewport_mut(id)
            .ok_or_else(|| RenderError::UnknownViewport(id.to_string()))?;
        viewport.set_image_id_index(index)?;
        let properties = ViewportProperties {
            voi_range: Some(self.windowing.current().voi_range()),
            invert: Some(image.invert()),
        };
        if let Err(err) = viewport
            .set_properties(properties)
            .and_then(|()| viewport.render())
        {
            log::warn!("Rendering slice {index} on {id} failed: {err}");
        }

        if let Some(state) = self
            .viewports
            .iter_mut()
            .find(|state| state.orientation == orientation)
        {
            state.current_index = index;
        }
        self.show(image_id, index, image);
        Ok(())
    }

    /// Move the axial slice by `delta`, clamped to the stack
    pub async fn scroll_slice(&mut self, delta: isize) -> Result<usize, ViewerError> {
        self.ensure_ready()?;
        let state = self
            .viewport_state(Orientation::Axial)
            .ok_or(ViewerError::NotReady)?;
        let last = state.stack_image_ids.len().saturating_sub(1);
        let index = state.current_index.saturating_add_signed(delta).min(last);
        self.set_slice_index(Orientation::Axial, index).await?;
        Ok(index)
    }

    /// Stores the link flag; propagation of gestures is up to the host
    pub fn toggle_link(&mut self) -> bool {
        self.linked = !self.linked;
        for state in &mut self.viewports {
            state.linked = self.linked;
        }
        self.linked
    }

    pub fn toggle_metadata(&mut self) -> bool {
        self.show_metadata = !self.show_metadata;
        self.show_metadata
    }

    /// Maximize `orientation`, or restore all three when it already is.
    pub async fn toggle_maximize(&mut self, orientation: Orientation) -> Result<(), ViewerError> {
        self.ensure_ready()?;
        let restoring = self
            .viewport_state(orientation)
            .is_some_and(|state| state.maximized);
        for state in &mut self.viewports {
            if restoring {
                state.maximized = false;
                state.visible = true;
            } else {
                state.maximized = state.orientation == orientation;
                state.visible = state.maximized;
            }
        }
        self.layout_pending = true;
        self.apply_pending_layout().await;
        Ok(())
    }

    pub async fn toggle_fullscreen(&mut self) -> Result<bool, ViewerError> {
        self.ensure_ready()?;
        self.fullscreen = !self.fullscreen;
        self.layout_pending = true;
        self.apply_pending_layout().await;
        Ok(self.fullscreen)
    }

    /// The host surface changed size
    pub async fn resize(&mut self) -> Result<(), ViewerError> {
        self.ensure_ready()?;
        self.layout_pending = true;
        self.apply_pending_layout().await;
        Ok(())
    }

    /// Run the pending layout after a short delay, retrying a bounded number
    /// of times while the engine reports errors. Returns whether the layout
    /// was applied.
    pub async fn apply_pending_layout(&mut self) -> bool {
        let attempts = self.config.layout_retry_attempts;
        for attempt in 1..=attempts {
            if !self.layout_pending {
                return true;
            }
            tokio::time::sleep(self.config.layout_retry_delay).await;
            if self.layout_settled() {
                return true;
            }
            log::debug!("Layout attempt {attempt}/{attempts} did not settle");
        }
        false
    }

    /// Explicit "layout settled" signal from the host: apply the pending
    /// layout right away.
    pub fn layout_settled(&mut self) -> bool {
        if !self.layout_pending {
            return true;
        }
        match self.run_layout() {
            Ok(()) => {
                self.layout_pending = false;
                true
            }
            Err(err) => {
                log::warn!("Layout failed, will retry on the next change: {err}");
                false
            }
        }
    }

    fn run_layout(&mut self) -> Result<(), RenderError> {
        self.session.engine.resize(true)?;
        for state in self.viewports.iter().filter(|state| state.visible) {
            let id = state.orientation.viewport_id();
            let viewport = self
                .session
                .engine
                .viewport_mut(id)
                .ok_or_else(|| RenderError::UnknownViewport(id.to_string()))?;
            viewport.reset_camera()?;
            viewport.render()?;
        }
        Ok(())
    }

    /// Current axial slice through the current window
    pub fn screenshot_image(&self) -> Result<GrayImage, ViewerError> {
        self.ensure_ready()?;
        let image = self.current_image.as_ref().ok_or(ViewerError::NotReady)?;
        Ok(render_frame(image, self.windowing.current())?)
    }

    pub fn screenshot(&self, path: impl AsRef<Path>) -> Result<(), ViewerError> {
        let bitmap = self.screenshot_image()?;
        bitmap.save(path.as_ref())?;
        log::info!("Screenshot written to {}", path.as_ref().display());
        Ok(())
    }

    /// Tear the viewer down. A later [`Orchestrator::load_scan`] starts over.
    pub fn close(&mut self) {
        self.session.engine.destroy();
        self.engine_ready = false;
        self.reset_volume();
    }

    fn reset_volume(&mut self) {
        self.session.clear();
        self.viewports.clear();
        self.current_image = None;
        self.displayed = None;
        self.loaded_scan = None;
        self.skipped.clear();
        self.layout_pending = false;
        self.interaction.release();
        self.windowing =
            WindowingEngine::default().with_min_width(self.config.min_window_width);
        self.state = ViewerState::Uninitialized;
    }
}
