//! Broadcasting of batch state and user-facing notices.

pub mod notice;
pub mod state;

pub use notice::{Notice, NoticeBroadcaster, NoticeKind};
pub use state::{BatchSnapshot, StateBroadcaster, Subscription};
