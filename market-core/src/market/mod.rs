pub mod clearing;
pub mod good;
pub mod orders;
pub mod settlement;

pub use clearing::*;
pub use good::*;
pub use orders::*;
pub use settlement::*;
