pub mod ttl;

pub use ttl::{TtlCache, TtlClass, TtlPolicy};
