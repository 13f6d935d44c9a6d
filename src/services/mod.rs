pub mod click_throttle;
pub mod lock_store;
pub mod map_extractor;
pub mod payment;
pub mod reconciler;
pub mod session;

pub use click_throttle::{ClickThrottle, ThrottleStats};
pub use lock_store::{LockView, SeatLockStore};
pub use map_extractor::{ExtractOptions, MapSeatExtractor};
pub use payment::{CircuitBreaker, CircuitState, PaymentStatusCache};
pub use reconciler::{reconcile, ViewTracker};
pub use session::{SeatClick, SeatingSession};
