//! Integration tests for planwise-sync
//!
//! Drives the reconciliation engine, scheduler and service against
//! in-memory test doubles (and the SQLite repository where durability
//! matters), with a manual clock for backoff windows.


mod test_conflicts;
mod test_pull;
mod test_scheduler;
mod test_service;
