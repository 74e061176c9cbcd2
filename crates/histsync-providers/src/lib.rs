pub mod formats;
pub mod registry;

pub use formats::SourceFormat;
pub use registry::{
    RootKind, RootSpec, Source, default_roots, discover, expand_home_path, format_from_name,
};
