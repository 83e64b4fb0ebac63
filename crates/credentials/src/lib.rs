pub mod cache;
pub mod credential;
pub mod service;

pub use cache::*;
pub use credential::*;
pub use service::*;
