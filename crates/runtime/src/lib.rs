pub mod animation;
pub mod frame;
pub mod notice;

pub use animation::*;
pub use frame::*;
pub use notice::*;
