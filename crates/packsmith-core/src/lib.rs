//! Core library for building and importing game resource packs.
//!
//! - Mapping: identifier tables with version-keyed overrides, resolved per schema version
//! - Atlases: grid and stamp/tga layouts, composed on build and split back on import
//! - Resampling: separate-channel downsampling with alpha bleed
//! - Build: the platform x version x resolution matrix, one deterministic zip per cell
//! - Import: metadata detection, atlas deconstruction and placeholder extraction
//!
//! Quick example:
//! ```ignore
//! use packsmith_core::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let plan = BuildPlan::from_path("faithful.config".as_ref())?;
//! let summary = plan.run(&CancelToken::new(), &mut |event| println!("{event:?}"))?;
//! println!("artifacts: {}", summary.artifacts.len());
//! print!("{}", summary.report);
//! # Ok(()) }
//! ```

pub mod archive;
pub mod atlas;
pub mod build;
pub mod compositing;
pub mod config;
pub mod error;
pub mod formats;
pub mod importer;
pub mod mapping;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod resample;
pub mod rules;
pub mod run_log;
pub mod scale;
pub mod session;
pub mod template;
pub mod version;
pub mod workspace;

pub use build::*;
pub use config::*;
pub use error::*;
pub use formats::*;
pub use importer::*;
pub use mapping::*;
pub use model::*;
pub use report::*;
pub use session::*;
pub use version::*;
pub use workspace::*;

/// Convenience prelude for common types and functions.
/// Importing `packsmith_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::build::{BuildCell, BuildEvent, BuildPlan, BuildSummary, CancelToken};
    pub use crate::config::{BuildConfig, PackConfig, Resolution};
    pub use crate::error::{PackError, Result};
    pub use crate::formats::FormatTable;
    pub use crate::importer::{ImportConfig, ImportReport, import_pack};
    pub use crate::mapping::{EffectiveRecord, IdentifierTable, ResolvedIdentifiers};
    pub use crate::model::{AtlasLayout, AtlasRule, Flip, MappingRule, Rect, StampLayer, Toggle};
    pub use crate::report::RunReport;
    pub use crate::scale::ScaleFactor;
    pub use crate::session::BuildSession;
    pub use crate::version::SchemaVersion;
}
