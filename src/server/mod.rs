//! Process-level plumbing: binding the listening socket and wiring it into a
//! reactor built from the configuration.

pub mod listener;
