//! Integration tests for planwise-remote
//!
//! Uses wiremock to simulate the document API and verifies request
//! shapes, version extraction and failure classification of the
//! HttpRemoteStore.

mod common;

mod test_errors;
mod test_store;
