//! Ong avatar agent worker.
//!
//! Listens for LiveKit room webhooks and runs one avatar session per room.

pub mod config;
pub mod logging;
pub mod worker;

pub use worker::{app, drain, handle_event, Dispatch, WorkerState};
