//! Physical kill switch for arcade cabinets.
//!
//! Watches a GPIO push button. A press terminates the running emulators and
//! holding it past the long-press threshold powers the host down.

pub mod button;
pub mod config;
pub mod system;
