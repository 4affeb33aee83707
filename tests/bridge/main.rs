//! Integration tests for the bridge stack
//!
//! These tests exercise full paths through the stack: a real socket server
//! on an ephemeral port, real clients, and the gateway router driven with
//! in-process HTTP requests.


mod cli;
mod client_transport;
mod end_to_end;
mod gateway_http;
mod pooling;
