use crate::decoder::DecodedImage;
use crate::enums::DragMode;
use crate::windowing::{MIN_WINDOW_WIDTH, WindowLevel};

use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    /// Lower edge of the bin
    pub value: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|bin| bin.count).sum()
    }

    pub fn axis(&self, width_px: f64) -> HistogramAxis {
        HistogramAxis {
            min: self.min,
            max: self.max,
            width_px,
        }
    }
}

/// Bucket `values` into `bins` equal-width bins spanning `[min, max]`.
///
/// A constant input yields one bin holding every sample, an empty input
/// yields no bins with `min`, `max` and `mean` at zero.
pub fn compute_histogram<T>(values: &[T], bins: usize) -> Histogram
where
    T: Copy + Into<f64> + Sync,
{
    let bins = bins.max(1);
    let (min, max, sum) = values
        .par_iter()
        .map(|&v| v.into())
        .fold(
            || (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), v: f64| (min.min(v), max.max(v), sum + v),
        )
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |a, b| (a.0.min(b.0), a.1.max(b.1), a.2 + b.2),
        );

    if values.is_empty() || !min.is_finite() || !max.is_finite() {
        return Histogram::default();
    }
    let mean = (sum / values.len() as f64).clamp(min, max);

    if max == min {
        return Histogram {
            bins: vec![HistogramBin {
                value: min,
                count: values.len() as u64,
            }],
            min,
            max,
            mean,
        };
    }

    let bin_size = (max - min) / bins as f64;
    let counts = values
        .par_iter()
        .fold(
            || vec![0u64; bins],
            |mut counts, &v| {
                let index = ((v.into() - min) / bin_size).floor();
                let index = (index.max(0.0) as usize).min(bins - 1);
                counts[index] += 1;
                counts
            },
        )
        .reduce(
            || vec![0u64; bins],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(left, right)| *left += right);
                a
            },
        );

    Histogram {
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                value: (i as f64).mul_add(bin_size, min),
                count,
            })
            .collect(),
        min,
        max,
        mean,
    }
}

/// Histogram of an image in modality units, so its axis matches the window
pub fn image_histogram(image: &DecodedImage, bins: usize) -> Histogram {
    compute_histogram(&image.modality_values(), bins)
}

/// Maps the horizontal histogram widget onto intensities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramAxis {
    pub min: f64,
    pub max: f64,
    pub width_px: f64,
}

impl HistogramAxis {
    pub fn value_at(&self, x: f64) -> f64 {
        if self.width_px <= 0.0 {
            return self.min;
        }
        let fraction = (x / self.width_px).clamp(0.0, 1.0);
        fraction.mul_add(self.max - self.min, self.min)
    }

    pub fn x_of(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        (value - self.min) / range * self.width_px
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f64 },
    Move { x: f64 },
    Up,
    Wheel { delta: f64 },
}

/// Drag state of the histogram widget.
#[derive(Debug, Clone)]
pub struct HistogramInteraction {
    mode: Option<DragMode>,
    edge_threshold_px: f64,
    min_width: f64,
    wheel_sensitivity: f64,
}

impl Default for HistogramInteraction {
    fn default() -> Self {
        Self::new(10.0, MIN_WINDOW_WIDTH, 0.01)
    }
}

impl HistogramInteraction {
    pub fn new(edge_threshold_px: f64, min_width: f64, wheel_sensitivity: f64) -> Self {
        Self {
            mode: None,
            edge_threshold_px,
            min_width,
            wheel_sensitivity,
        }
    }

    pub fn mode(&self) -> Option<DragMode> {
        self.mode
    }

    pub fn release(&mut self) {
        self.mode = None;
    }

    /// Turn a pointer or wheel event into a new window. `None` means the
    /// window stays as it is.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        axis: &HistogramAxis,
        current: WindowLevel,
    ) -> Option<WindowLevel> {
        match event {
            PointerEvent::Down { x } => self.pointer_down(x, axis, current),
            PointerEvent::Move { x } => self.pointer_move(x, axis, current),
            PointerEvent::Up => {
                self.release();
                None
            }
            PointerEvent::Wheel { delta } => Some(self.wheel(delta, axis, current)),
        }
    }

    fn pointer_down(
        &mut self,
        x: f64,
        axis: &HistogramAxis,
        current: WindowLevel,
    ) -> Option<WindowLevel> {
        let lower_x = axis.x_of(current.lower());
        let upper_x = axis.x_of(current.upper());

        if (x - lower_x).abs() <= self.edge_threshold_px {
            self.mode = Some(DragMode::Min);
            None
        } else if (x - upper_x).abs() <= self.edge_threshold_px {
            self.mode = Some(DragMode::Max);
            None
        } else {
            self.mode = Some(DragMode::Center);
            Some(WindowLevel::new(axis.value_at(x), current.width))
        }
    }

    fn pointer_move(
        &mut self,
        x: f64,
        axis: &HistogramAxis,
        current: WindowLevel,
    ) -> Option<WindowLevel> {
        let value = axis.value_at(x);
        let min_width = self.min_width.max(MIN_WINDOW_WIDTH);
        match self.mode? {
            // the dragged edge stops min_width short of the fixed one
            DragMode::Min => {
                let upper = current.upper();
                let lower = value.min(upper - min_width);
                Some(WindowLevel::with_min_width(
                    lower + (upper - lower) / 2.0,
                    upper - lower,
                    min_width,
                ))
            }
            DragMode::Max => {
                let lower = current.lower();
                let upper = value.max(lower + min_width);
                Some(WindowLevel::with_min_width(
                    lower + (upper - lower) / 2.0,
                    upper - lower,
                    min_width,
                ))
            }
            DragMode::Center => Some(WindowLevel::with_min_width(value, current.width, min_width)),
        }
    }

    fn wheel(&self, delta: f64, axis: &HistogramAxis, current: WindowLevel) -> WindowLevel {
        let width = delta.mul_add(axis.range() * self.wheel_sensitivity, current.width);
        WindowLevel::with_min_width(current.center, width, self.min_width)
    }
}
