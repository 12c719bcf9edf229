pub mod execute;
pub mod recipe;

pub use execute::*;
pub use recipe::*;
