//! Gradient-boosted decision trees for binary default prediction

pub mod binning;
pub mod booster;
pub mod params;
pub mod tree;

pub use booster::{Booster, EvalRecord, FeatureImportance, TrainData, TrainOptions};
pub use params::{BoosterParams, ParamOverrides};
