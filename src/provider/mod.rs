pub mod adapter;
pub mod http;
pub mod types;

pub use adapter::{MockProviderAdapter, ProviderAdapter};
pub use http::HttpProviderAdapter;
pub use types::{DispatchResult, ProviderError, ProviderResult, ProviderSecret};
