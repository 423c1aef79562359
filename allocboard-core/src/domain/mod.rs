//! Typed contest records decoded from store documents.

pub mod allocation;
pub mod balance;
pub mod decode;
pub mod ids;
pub mod market;
pub mod user;
pub mod week;

pub use allocation::Allocation;
pub use balance::{Balance, WeeklyBalance};
pub use decode::RecordError;
pub use ids::{split_weekly_key, weekly_key, WeekId, WeekIdError};
pub use market::{MarketDataError, MarketMeta, MarketSnapshot, Quote};
pub use user::{Instrument, User};
pub use week::{settled_most_recent_first, Week, WeekStatus};
