use crate::engine::{RenderError, RenderingEngine, Viewport, ViewportProperties, VoiRange};
use crate::enums::PresetKind;

/// Smallest window width ever pushed to a viewport
pub const MIN_WINDOW_WIDTH: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub center: f64,
    pub width: f64,
}

impl WindowLevel {
    /// Width is clamped to [`MIN_WINDOW_WIDTH`]; a non-finite width
    /// collapses to the minimum as well.
    pub fn new(center: f64, width: f64) -> Self {
        Self::with_min_width(center, width, MIN_WINDOW_WIDTH)
    }

    /// Like [`WindowLevel::new`] with a caller supplied floor, which is
    /// itself never below [`MIN_WINDOW_WIDTH`].
    pub fn with_min_width(center: f64, width: f64, min_width: f64) -> Self {
        let floor = min_width.max(MIN_WINDOW_WIDTH);
        let width = if width.is_finite() {
            width.max(floor)
        } else {
            floor
        };
        Self { center, width }
    }

    pub fn from_bounds(lower: f64, upper: f64) -> Self {
        let width = upper - lower;
        Self::new(lower + width / 2.0, width)
    }

    pub fn lower(&self) -> f64 {
        self.center - self.width / 2.0
    }

    pub fn upper(&self) -> f64 {
        self.center + self.width / 2.0
    }

    pub fn voi_range(&self) -> VoiRange {
        VoiRange {
            lower: self.lower(),
            upper: self.upper(),
        }
    }
}

impl PresetKind {
    /// Center/width from the preset table. `Custom` has no entry.
    pub fn window(&self) -> Option<WindowLevel> {
        let (center, width) = match self {
            PresetKind::Lung => (-600.0, 1500.0),
            PresetKind::Bone => (300.0, 1500.0),
            PresetKind::Brain => (40.0, 80.0),
            PresetKind::SoftTissue => (40.0, 400.0),
            PresetKind::Liver => (60.0, 160.0),
            PresetKind::Mediastinum => (50.0, 350.0),
            PresetKind::Default => (2048.0, 4096.0),
            PresetKind::Custom => return None,
        };
        Some(WindowLevel { center, width })
    }
}

/// Holds the window currently on screen and pushes changes to viewports.
#[derive(Debug, Clone)]
pub struct WindowingEngine {
    current: WindowLevel,
    initial: WindowLevel,
    active_preset: PresetKind,
    min_width: f64,
}

impl Default for WindowingEngine {
    fn default() -> Self {
        let window = PresetKind::Default
            .window()
            .unwrap_or(WindowLevel::new(0.0, MIN_WINDOW_WIDTH));
        Self {
            current: window,
            initial: window,
            active_preset: PresetKind::Default,
            min_width: MIN_WINDOW_WIDTH,
        }
    }
}

impl WindowingEngine {
    /// Starts from the window an image carries (native tags or the
    /// percentile default computed by the decoder).
    pub fn with_initial(initial: WindowLevel) -> Self {
        Self {
            current: initial,
            initial,
            active_preset: PresetKind::Default,
            min_width: MIN_WINDOW_WIDTH,
        }
    }

    /// Floor for every width this engine applies
    pub fn with_min_width(mut self, min_width: f64) -> Self {
        self.min_width = min_width.max(MIN_WINDOW_WIDTH);
        self
    }

    pub fn current(&self) -> WindowLevel {
        self.current
    }

    pub fn initial(&self) -> WindowLevel {
        self.initial
    }

    pub fn active_preset(&self) -> PresetKind {
        self.active_preset
    }

    pub fn mark_custom(&mut self) {
        self.active_preset = PresetKind::Custom;
    }

    /// Clamp, record and push a window to every listed viewport.
    ///
    /// Only an unknown viewport id fails, and it does so before anything
    /// changes. A viewport that fails to take the properties or to render is
    /// logged and skipped; the others still receive the window.
    pub fn apply_window_level<E: RenderingEngine>(
        &mut self,
        engine: &mut E,
        viewport_ids: &[&str],
        center: f64,
        width: f64,
    ) -> Result<WindowLevel, RenderError> {
        if let Some(unknown) = viewport_ids
            .iter()
            .find(|id| engine.viewport(id).is_none())
        {
            return Err(RenderError::UnknownViewport(unknown.to_string()));
        }
        let window = WindowLevel::with_min_width(center, width, self.min_width);
        self.current = window;
        Self::push(engine, viewport_ids, window);
        Ok(window)
    }

    /// Unknown names fall back to the default entry.
    pub fn apply_preset<E: RenderingEngine>(
        &mut self,
        engine: &mut E,
        viewport_ids: &[&str],
        name: &str,
    ) -> Result<WindowLevel, RenderError> {
        let preset = PresetKind::from_name(name);
        let window = preset
            .window()
            .unwrap_or_else(|| WindowingEngine::default().current);
        log::debug!(
            "Applying preset {} (C {} / W {})",
            preset.name(),
            window.center,
            window.width
        );
        let applied = self.apply_window_level(engine, viewport_ids, window.center, window.width)?;
        self.active_preset = preset;
        Ok(applied)
    }

    pub fn reset<E: RenderingEngine>(
        &mut self,
        engine: &mut E,
        viewport_ids: &[&str],
    ) -> Result<WindowLevel, RenderError> {
        let initial = self.initial;
        let applied = self.apply_window_level(engine, viewport_ids, initial.center, initial.width)?;
        self.active_preset = PresetKind::Default;
        Ok(applied)
    }

    fn push<E: RenderingEngine>(engine: &mut E, viewport_ids: &[&str], window: WindowLevel) {
        let properties = ViewportProperties {
            voi_range: Some(window.voi_range()),
            invert: None,
        };
        for id in viewport_ids {
            let Some(viewport) = engine.viewport_mut(id) else {
                continue;
            };
            if let Err(err) = viewport
                .set_properties(properties)
                .and_then(|()| viewport.render())
            {
                log::warn!("Window update on {id} not rendered: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HeadlessEngine, ViewportOptions};
    use crate::enums::Orientation;

    async fn engine_with_viewports() -> HeadlessEngine {
        let mut engine = HeadlessEngine::new();
        engine.initialize().await.unwrap();
        for orientation in Orientation::ALL {
            engine
                .create_viewport(orientation.viewport_id(), ViewportOptions::new(orientation))
                .unwrap();
        }
        engine
    }

    const IDS: [&str; 3] = ["AXIAL", "SAGITTAL", "CORONAL"];

    #[test]
    fn width_never_drops_below_minimum() {
        assert_eq!(WindowLevel::new(10.0, 0.0).width, MIN_WINDOW_WIDTH);
        assert_eq!(WindowLevel::new(10.0, -40.0).width, MIN_WINDOW_WIDTH);
        assert_eq!(WindowLevel::new(10.0, f64::NAN).width, MIN_WINDOW_WIDTH);
        assert_eq!(WindowLevel::from_bounds(-100.0, 100.0).center, 0.0);
    }

    #[tokio::test]
    async fn bone_preset_reads_back_exactly() {
        let mut engine = engine_with_viewports().await;
        let mut windowing = WindowingEngine::default();
        windowing.apply_preset(&mut engine, &IDS, "bone").unwrap();

        assert_eq!(
            windowing.current(),
            WindowLevel {
                center: 300.0,
                width: 1500.0
            }
        );
        assert_eq!(windowing.active_preset(), PresetKind::Bone);
    }

    #[tokio::test]
    async fn unknown_preset_falls_back_to_default() {
        let mut engine = engine_with_viewports().await;
        let mut windowing = WindowingEngine::with_initial(WindowLevel::new(40.0, 400.0));
        let applied = windowing
            .apply_preset(&mut engine, &IDS, "does-not-exist")
            .unwrap();

        assert_eq!(Some(applied), PresetKind::Default.window());
        assert_eq!(windowing.active_preset(), PresetKind::Default);
    }

    #[tokio::test]
    async fn voi_range_is_pushed_to_every_viewport() {
        let mut engine = engine_with_viewports().await;
        let mut windowing = WindowingEngine::default();
        windowing
            .apply_window_level(&mut engine, &IDS, 40.0, 400.0)
            .unwrap();

        for id in IDS {
            let viewport = engine.viewport(id).unwrap();
            assert_eq!(
                viewport.properties.voi_range,
                Some(VoiRange {
                    lower: -160.0,
                    upper: 240.0
                })
            );
            assert_eq!(viewport.renders, 1);
        }
    }

    #[tokio::test]
    async fn unknown_viewport_is_reported() {
        let mut engine = engine_with_viewports().await;
        let mut windowing = WindowingEngine::default();
        let before = windowing.current();
        let result =
            windowing.apply_window_level(&mut engine, &["AXIAL", "OBLIQUE"], 0.0, 10.0);
        assert!(matches!(result, Err(RenderError::UnknownViewport(_))));

        // nothing was pushed, so the recorded window still matches the screen
        assert_eq!(windowing.current(), before);
        assert_eq!(engine.viewport("AXIAL").unwrap().properties.voi_range, None);
    }

    #[tokio::test]
    async fn configured_floor_applies_to_every_width() {
        let mut engine = engine_with_viewports().await;
        let mut windowing = WindowingEngine::default().with_min_width(50.0);
        let applied = windowing
            .apply_window_level(&mut engine, &IDS, 100.0, 10.0)
            .unwrap();

        assert_eq!(applied, WindowLevel::new(100.0, 50.0));
        assert_eq!(
            engine.viewport("CORONAL").unwrap().properties.voi_range,
            Some(VoiRange {
                lower: 75.0,
                upper: 125.0
            })
        );
        assert_eq!(WindowLevel::with_min_width(0.0, 10.0, 0.25).width, 10.0);
        assert_eq!(WindowLevel::with_min_width(0.0, 0.5, 0.25).width, MIN_WINDOW_WIDTH);
    }

    #[tokio::test]
    async fn reset_restores_initial_window() {
        let mut engine = engine_with_viewports().await;
        let initial = WindowLevel::new(1200.0, 800.0);
        let mut windowing = WindowingEngine::with_initial(initial);
        windowing.apply_preset(&mut engine, &IDS, "lung").unwrap();
        windowing.mark_custom();
        windowing.reset(&mut engine, &IDS).unwrap();

        assert_eq!(windowing.current(), initial);
        assert_eq!(windowing.active_preset(), PresetKind::Default);
    }
}
