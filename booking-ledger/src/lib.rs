pub mod capacity;
pub mod coordinator;
pub mod ledger;
pub mod memory;
pub mod reaper;

pub use capacity::CapacityGuard;
pub use coordinator::{InventoryCoordinator, ReleaseDrift, ReleaseOutcome};
pub use ledger::{ReservationLedger, TicketAvailability};
pub use memory::InMemoryLedgerStore;
pub use reaper::{ExpiryReaper, SweepFailure, SweepReport};
