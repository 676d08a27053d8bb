//! # DICOM review engine
//!
//! This crate drives an interactive multi-planar review of a DICOM scan:
//! it decodes raw DICOM frames, derives window/level parameters, computes an
//! editable intensity histogram and keeps three viewports (axial, sagittal
//! and coronal) consistent with each other.
//!
//! The crate never owns GPU or canvas resources. A host rendering engine
//! implements [`RenderingEngine`] and receives stacks of image identifiers,
//! VOI ranges and camera/render requests. Raw bytes arrive through a
//! [`FileTransport`]. Both are traits so the whole viewer can be exercised
//! against [`HeadlessEngine`] and [`DirectoryTransport`].
//!
//! Frames are assumed to have the following attributes:
//!  - Uncompressed native pixel data, 8 or 16 bits allocated
//!  - No multiframe (the first frame is used)
//!  - One series per scan, delivered in stack order
//!
//! The sagittal and coronal viewports show the middle slice of the stack.
//! They are not reformatted planes; that would need a reconstructed volume
//! and resampling.
//!
//! # Examples
//!
//! ## Reviewing a scan from disk
//!
//! Load every `.dcm` file of `scans/ct-head`, apply the bone preset, step to
//! the last slice and save what the axial viewport shows.
//!
//! ```no_run
//! # use dicom_review::{DirectoryTransport, HeadlessEngine, Orchestrator, Orientation, ViewerConfig};
//! # async fn review() -> Result<(), dicom_review::ViewerError> {
//! let mut viewer = Orchestrator::new(
//!     HeadlessEngine::new(),
//!     DirectoryTransport::new("scans"),
//!     ViewerConfig::default(),
//! );
//! viewer.load_scan("ct-head").await?;
//! viewer.apply_preset("bone")?;
//! viewer.scroll_slice(isize::MAX).await?;
//! viewer.screenshot("result.png")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod engine;
pub mod enums;
pub mod histogram;
pub mod loader;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod transport;
pub mod windowing;

#[cfg(test)]
mod test_support;

pub use config::ViewerConfig;
pub use decoder::{DecodeError, DecodedImage, FrameDecoder, PixelBuffer, decode};
pub use engine::{
    HeadlessEngine, HeadlessViewport, RenderError, RenderingEngine, Viewport, ViewportOptions,
    ViewportProperties, VoiRange,
};
pub use enums::{DragMode, Orientation, PhotometricInterpretation, PresetKind};
pub use histogram::{
    Histogram, HistogramAxis, HistogramBin, HistogramInteraction, PointerEvent, compute_histogram,
};
pub use loader::{DicomFileLoader, FrameCache, ImageLoader, ImageLoaderRegistry, LoadError};
pub use orchestrator::{DisplayedImage, Orchestrator, ViewerError, ViewerState, ViewportState};
pub use render::{RasterError, render_frame};
pub use session::VolumeSession;
pub use transport::{DirectoryTransport, FileTransport};
pub use windowing::{WindowLevel, WindowingEngine};
