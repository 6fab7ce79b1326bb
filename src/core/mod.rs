pub mod map;
pub mod store;

pub use map::{MapError, MapFiles, MapStyle};
pub use store::{CoordinateStore, StoreError};
