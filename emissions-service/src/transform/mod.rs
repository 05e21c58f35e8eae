pub mod bucket;
pub mod normalize;

pub use normalize::{DropReason, DroppedRow, Normalized, Normalizer};
