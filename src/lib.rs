pub mod config;
pub mod contents;
pub mod dependency;
pub mod error;
pub mod overlay;
pub mod package;
pub mod report;
pub mod repository;
pub mod utils;

pub use config::Config;
pub use contents::{ContentsHandle, ContentsIndex, FileAttrs, FileDetail, FileKind, UsageSummary};
pub use dependency::{build_reverse_index, DependencySets, ReverseIndex};
pub use error::{ScopeError, ScopeResult};
pub use overlay::{Overlay, OverlayCatalog};
pub use package::{PackageCatalog, PackageRecord};
pub use report::{DependencyReport, Inspector, OverlayStatus};
pub use repository::{available_versions, load_catalogs, CatalogEntry, RepositoryCatalog};

pub const PKGSCOPE_VERSION: &str = "0.1.0";
