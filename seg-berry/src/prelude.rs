//! 🫐欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Idx4d};

pub use crate::consts::{ANISOTROPY_THRESHOLD, BACKGROUND, REGION_PROB_THRESHOLD};

pub use crate::data::{LabelVolume, ProbSource, ProbVolume};

pub use crate::export::{
    store_label_from_probs, ExportError, ExportOptions, ExportResult, PostProcess,
};

pub use crate::labeling::{collapse_to_label, LabelPolicy};

pub use crate::meta::{CropBbox, SpatialMetadata};

pub use crate::resample::{resample_probs, InterpOrder, ResamplePlan};

pub use crate::restore_original_extent;
