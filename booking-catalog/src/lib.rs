pub mod directory;
pub mod inventory;
pub mod remote;

pub use directory::InMemoryUserDirectory;
pub use inventory::{InMemoryInventory, InventoryError, InventoryItem};
pub use remote::{HttpInventoryKeeper, HttpUserDirectory};
