//! Various utilities functions and types

mod geometry;
pub mod serial;

pub use self::geometry::{Buffer, Logical, Rectangle};
pub use self::serial::{Serial, SerialCounter};
