/// Data layer: image reduction, the labeled dataset, and table I/O.
///
/// Architecture:
/// ```text
///  class folders (.tiff / .png)
///        │
///        ▼
///   ┌──────────┐
///   │  images   │  list + decode (parallel) → reduce → Vec<Spectrum>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  model    │  Dataset::assemble(class A, class B) → labeled table
///   └──────────┘
///        │                     ┌──────────┐
///        ├────────────────────▶│  loader   │  .csv / .parquet export
///        ▼                     └──────────┘
///   ┌──────────┐
///   │  filter   │  rows grouped by label
///   └──────────┘
/// ```

pub mod filter;
pub mod images;
pub mod loader;
pub mod model;
pub mod reduce;
