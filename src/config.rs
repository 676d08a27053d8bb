use std::time::Duration;

/// Tunables shared by the decoder, histogram and orchestrator.
///
/// Built with `ViewerConfig::default()` and adjusted through the `with_*`
/// methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Scheme prefix of image identifiers handed to the rendering engine
    pub scheme: String,
    pub histogram_bins: usize,
    /// Pointer tolerance in pixels around a window edge on the histogram
    pub edge_threshold_px: f64,
    pub min_window_width: f64,
    pub wheel_sensitivity: f64,
    /// Roughly how many pixels the decoder samples for min/max and percentiles
    pub sample_target: usize,
    pub layout_retry_delay: Duration,
    pub layout_retry_attempts: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scheme: String::from("dicomfile"),
            histogram_bins: 256,
            edge_threshold_px: 10.0,
            min_window_width: 1.0,
            wheel_sensitivity: 0.01,
            sample_target: 10_000,
            layout_retry_delay: Duration::from_millis(50),
            layout_retry_attempts: 2,
        }
    }
}

impl ViewerConfig {
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = bins.max(1);
        self
    }

    pub fn with_edge_threshold(mut self, px: f64) -> Self {
        self.edge_threshold_px = px;
        self
    }

    /// Narrowest window any edit may produce; never below 1
    pub fn with_min_window_width(mut self, width: f64) -> Self {
        self.min_window_width = width.max(1.0);
        self
    }

    pub fn with_wheel_sensitivity(mut self, sensitivity: f64) -> Self {
        self.wheel_sensitivity = sensitivity;
        self
    }

    pub fn with_sample_target(mut self, target: usize) -> Self {
        self.sample_target = target.max(1);
        self
    }

    pub fn with_layout_retry(mut self, delay: Duration, attempts: usize) -> Self {
        self.layout_retry_delay = delay;
        self.layout_retry_attempts = attempts.max(1);
        self
    }
}
