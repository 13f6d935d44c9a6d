pub mod ids;
pub mod lock;
pub mod map;
pub mod payment;
pub mod seat;
pub mod view;

pub use ids::{PerformanceId, SeatId, SessionId};
pub use lock::{FeedEvent, FeedStatus, Lock, LockSnapshot, LockStatus, SeatOverride, StoredLock};
pub use map::{DecorationKind, MapElement, SeatElement, TableElement};
pub use payment::{PaymentRecord, PaymentSource, PaymentStatus};
pub use seat::{BaseStatus, Seat, SeatOrigin, ZoneRef};
pub use view::{DisplayStatus, FeedState, MergedSeatView, Ownership};
