mod error;
pub mod locator;
pub mod marker;
pub mod reframe;
pub mod statistics;
mod traits;
mod types;

pub use error::{CoreError, Result};
pub use locator::{locate, LocatorConfig, RunTracker, SegmentLocator};
pub use marker::{
    embedded_payload, find_marker, marker_offsets, parse_marker_at, read_marker, split_rebuilt,
    MarkerBlock, RebuiltParts,
};
pub use reframe::{head_size, reframe, reframe_to_writer, reframed_len, MARKER};
pub use traits::BlockSource;
pub use types::{CandidateRun, Detection, DetectionKind, PayloadSegment, MIB};
