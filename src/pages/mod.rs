//! One module per dashboard page.
//!
//! Each page turns plain parameters (what the excluded UI would collect from
//! its widgets) into a serialisable output by configuring one or more
//! [`Pipeline`](crate::pipeline::Pipeline) runs. Pages hold no state between
//! renders; the only shared thing is the [`FileCache`].

pub mod building_permits;
pub mod cadastral;
pub mod housing;
pub mod population_analysis;
pub mod population_forecast;
pub mod traffic;
pub mod vehicle_forecast;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{DashboardConfig, InputBounds};
use crate::data::cache::FileCache;
use crate::error::Result;
use crate::pipeline::Notice;

/// What every page render needs besides its own parameters.
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    pub cache: &'a FileCache,
    pub config: &'a DashboardConfig,
}

impl<'a> PageContext<'a> {
    pub fn new(cache: &'a FileCache, config: &'a DashboardConfig) -> Self {
        PageContext { cache, config }
    }

    pub fn source(&self, file: &Path) -> PathBuf {
        self.config.source_path(file)
    }

    pub fn bounds(&self) -> &InputBounds {
        &self.config.bounds
    }
}

/// The serialisable result of rendering a page.
pub trait PageOutput: Serialize {
    /// Non-fatal problems met during the render.
    fn notices(&self) -> &[Notice];

    /// The downloadable table for this page.
    fn export_csv(&self) -> Result<Vec<u8>>;
}
