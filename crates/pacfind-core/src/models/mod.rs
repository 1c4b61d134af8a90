pub mod error;
pub mod package;
pub mod search;
pub mod version;

pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use package::{PLACEHOLDER_DESCRIPTION, PackageRecord, SourceTag, UpdateRecord};
pub use search::{AggregationResult, Query, QueryMode, SourceFailure, fold_name, names_match};
pub use version::{is_newer, vercmp};
