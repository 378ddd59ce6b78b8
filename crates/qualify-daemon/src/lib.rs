//! qualify-daemon - Background mutation worker and dispatcher
//!
//! Hosts the asynchronous side of the qualification engine: the
//! [`worker::MutationWorker`] that applies ledger mutations one scan pass at
//! a time, the [`dispatcher::Dispatcher`] through which callers append
//! mutations and optionally wait for them, and the [`signal::WakeSignal`]
//! connecting the two.

pub mod dispatcher;
pub mod signal;
pub mod worker;
