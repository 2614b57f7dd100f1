// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The context-sensitive pointer analysis core.

pub mod context;
pub mod context_selector;
pub mod cs_manager;
pub mod heap;
pub mod plugin;
pub mod reflection;
pub mod result;
pub mod solver;

use crate::pta::cs_manager::{CSObjId, PointerId};
use crate::pts_set::points_to::PointsToSet;
use crate::pts_set::pt_data::DiffPTData;

pub type PointsTo = PointsToSet<CSObjId>;
pub type DiffPTDataTy = DiffPTData<PointerId, CSObjId>;

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// A statement's shape is inconsistent with its kind.
    #[error("malformed IR: {0}")]
    MalformedIr(String),
    /// The stop flag was raised; points-to data is partial but consistent.
    #[error("analysis cancelled")]
    Cancelled,
    /// A plugin handler failed; no partial result is trusted.
    #[error(transparent)]
    Plugin(#[from] plugin::PluginError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
