pub mod domain;
pub mod timestamp;
