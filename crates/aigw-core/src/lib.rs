//! Primitives shared by every crate in the gateway: the interned string type,
//! the read-mostly snapshot wrapper used for `FilterConfig`, and small
//! `serde` duration helpers.

pub mod duration;
pub mod snapshot;
pub mod strng;
pub mod tokio_metrics;

pub use snapshot::Snapshot;
pub use strng::Strng;

pub mod prelude {
	pub use crate::strng::Strng;
	pub use crate::{Snapshot, literal, strng};
}
