//! Portico Protocol
//!
//! Shared types between the Portico broker core and its frontends.
//! A frontend renders `BrokerView` snapshots and feeds `InputEvent`s back.

pub mod input;
pub mod layout;
pub mod types;
pub mod view;

pub use input::InputEvent;
pub use layout::{Layout, Rect};
pub use types::*;
pub use view::{ActiveNotification, BrokerView, IdentityRow, SessionRow};
