//! Application core: port traits and outbound events.
//!
//! The sampling node's business rules live in [`crate::fusion`],
//! [`crate::checkpoint`] and [`crate::scheduler`]. All interaction with
//! hardware happens through the **port traits** defined in [`ports`],
//! keeping those modules fully testable without real peripherals.

pub mod events;
pub mod ports;
