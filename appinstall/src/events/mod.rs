//! Outbound notifications for launcher collaborators.
//!
//! The install state machine publishes an [`InstallEvent`] for every record
//! creation, state change, progress update, icon update and removal. UI
//! collaborators subscribe on the [`NotificationBus`], either to a single
//! application or to everything.
//!
//! Delivery is synchronous and in-process. There is no replay: a subscriber
//! that attaches late must read current state from the state machine.

mod bus;
mod event;

pub use bus::{EventHandler, NotificationBus, SubscriptionId, Topic};
pub use event::InstallEvent;
