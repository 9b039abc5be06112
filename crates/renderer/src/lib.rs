//! Frame rendering for MSM forecast steps.
//!
//! - [`frame`]: composite panel layout and the on-disk frame writer
//! - [`colorscale`]: named colour scales
//! - [`png`]: indexed/RGBA PNG encoding
//! - [`job`]: the by-value input of a render

pub mod colorscale;
pub mod frame;
pub mod job;
pub mod png;
pub mod style;
pub mod text;

pub use colorscale::{ColorScale, KNOWN_SCALES};
pub use frame::{frame_metadata, render, render_to_disk, Layout};
pub use job::{RenderJob, RenderLayer, WorkerReply};
pub use style::{FrameStyle, MapExtent};
pub use text::TextPainter;
