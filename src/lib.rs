//! Core of a multi-page regional dashboard.
//!
//! Each page runs the same shape of pipeline:
//!
//! ```text
//!  source file ──► loader ──► filter/aggregate ──► forecaster ──► presenter
//!                 (cache)       GroupedSeries       Strategy       chart / map / CSV
//! ```
//!
//! Rendering, map tiles and navigation belong to whatever front-end drives
//! [`pages`]; the `rusty-atlas` binary prints page outputs as JSON.

pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod pages;
pub mod pipeline;
pub mod present;

pub use config::DashboardConfig;
pub use data::cache::FileCache;
pub use error::{DashboardError, Result};
pub use forecast::{Forecaster, Strategy};
pub use pages::{PageContext, PageOutput};
pub use pipeline::{Notice, Pipeline, PipelineSpec};
