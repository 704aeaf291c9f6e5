//! Analysis sessions: the state machine, its stores, the run loop that drives the
//! pipeline for one session, and the worker pool that schedules runs.

pub mod handlers;
pub mod models;
pub mod pg_store;
pub mod queue;
pub mod runner;
pub mod store;
