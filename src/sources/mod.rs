pub mod factory;
pub mod http;
pub mod traits;

pub use factory::build_sources;
pub use http::HttpSource;
pub use traits::{SourceAdapter, SourceCapabilities};
