//! Integration tests driving the public API against in-memory backends

mod support;

mod test_api;
mod test_consumers;
mod test_launcher;
mod test_logs;
mod test_status;
