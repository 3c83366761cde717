pub mod management;
pub mod pool;

pub use management::*;
pub use pool::*;
