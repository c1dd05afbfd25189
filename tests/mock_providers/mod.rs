//! Mock provider servers
//!
//! Simulates the DashScope duplex websocket used by streaming sessions.
//! The REST fallback is covered with `wiremock` directly in the tests.

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod dashscope_mock;
