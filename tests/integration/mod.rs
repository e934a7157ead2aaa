//! Integration tests of the realtime core over the in-memory store

mod presence_flow;
mod read_receipts;
mod send_flow;
