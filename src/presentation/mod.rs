//! Presentation Module
//!
//! Observers of a running sweep. The controller only emits [`SweepEvent`]s;
//! rendering them is up to whichever presenter drains the channel.
//!
//! [`SweepEvent`]: crate::domain::models::SweepEvent

pub mod console;

pub use console::ConsolePresenter;
