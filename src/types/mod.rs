//! Type definitions for the default prediction pipeline

pub mod frame;
pub mod label;
pub mod matrix;

pub use frame::{Cell, CustomerGroup, CustomerTable, RawFrame, RawRow};
pub use label::Labels;
pub use matrix::FeatureMatrix;
