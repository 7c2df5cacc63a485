//! Reaction-tally mirroring.
//!
//! Messages in watched channels are scored by three configured reactions.  The reaction(s) with
//! the highest count above the threshold decide which target channels carry a mirror (an embed
//! copy) of the message.  Reconciliation creates missing mirrors and deletes stale ones whenever
//! a message's reactions change.

pub mod decision;
pub mod messenger;
pub mod reaction;
pub mod reconcile;
pub mod score;
pub mod store;

pub use decision::DEFAULT_MIN_THRESHOLD;
pub use messenger::DiscordMessenger;
pub use reconcile::{BacklogReport, Reconciler};
