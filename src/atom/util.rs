mod debug;
mod fixed_point;
mod fourcc;
pub mod parser;
pub mod serializer;
mod time;

pub use debug::*;
pub use fixed_point::*;
pub use fourcc::*;
pub use time::*;
