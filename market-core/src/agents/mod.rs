pub mod inventory;
pub mod store;

pub use inventory::*;
pub use store::*;
