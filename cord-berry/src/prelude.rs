//! 🍒欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{CordError, CordResult, Idx2d, Idx3d, LandmarkId};

pub use crate::data::{
    AxialSlice, CenterlineVolume, ImgWriteVis, LandmarkVolume, NiftiHeaderAttr, ProjectionAxis,
};

pub use crate::centerline::Centerline;
pub use crate::config::{FittingMethod, StraightenConfig};
pub use crate::consts::defaults;
pub use crate::fitting::{CurveFitter, CurveType, FittedCurve};
pub use crate::landmark::{
    CrossKind, CrossPoint, DegeneratePolicy, LandmarkCross, LandmarkPair, LandmarkSeries,
    LandmarkSpec,
};
pub use crate::register::{RegistrationPlan, SystemRunner, ToolRunner};
pub use crate::straighten::{StraightenOutput, Straightener};
