mod naming;
mod types;
pub mod utils;

pub use naming::{
    normalize_title, part_index, part_label, SegmentName, PART_MARKER,
};
pub use types::*;
