//! Data layer: core types, loading, caching and filtering.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet / .geojson
//!        │
//!        ▼
//!   ┌──────────┐   ┌─────────┐
//!   │  loader   │◄──│   geo    │  geometry text, CRS → EPSG:4326
//!   └──────────┘   └─────────┘
//!        │  TableSchema: coerce years / dates / measures, drop bad rows
//!        ▼
//!   ┌──────────┐
//!   │  cache    │  Arc<LoadedTable> per (path, schema), mtime invalidation
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  model    │  Table { rows: Vec<Record>, column index }
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  FilterState → indices → GroupedSeries
//!   └──────────┘
//! ```

pub mod cache;
pub mod filter;
pub mod geo;
pub mod loader;
pub mod model;
