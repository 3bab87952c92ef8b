//! The application core of TaskFlow, a personal task/habit tracker.
//!
//! Everything but the pixels lives here: the task and activity-log model,
//! per-username persistence, the reminder evaluator and its scheduler, the
//! capture-flow stopwatch, plain-text export, and gist backup/restore. A
//! GUI shell supplies the host capabilities (data directory, notification
//! permission surface, alerts, state events) by implementing
//! [`commands::CommandCtx`], then drives the `*_impl` command functions and
//! a [`session::Session`].

pub mod commands;
pub mod events;
pub mod gist;
pub mod logging;
pub mod models;
pub mod reminder;
pub mod session;
pub mod state;
pub mod storage;
pub mod tracking;
