//! Update coordinator
//!
//! Persists the auto-update flags, drives the four-state transition table and
//! rebuilds the menu after every change. Checks are only started where an OS
//! update mechanism exists, decided by an injected capability predicate.
//!
//! ## Module Organization
//! - `state`: flags and the transition table
//! - `feed`: update check parameters and feed URL construction
//! - `coordinator`: the `UpdateCoordinator` and the `Updater` seam
//! - `squirrel`: HTTP feed updater that downloads through the download queue

mod coordinator;
pub mod feed;
mod squirrel;
mod state;

pub use coordinator::{
    CHECK_FAILED_MESSAGE, CheckRequest, ServerEndpoint, TransitionSender, UpdateCoordinator,
    Updater,
};
pub use feed::UpdateCheckParams;
pub use squirrel::{FeedAnswer, SquirrelUpdater};
pub use state::{UnknownTransition, UpdateState, UpdateTransition};
