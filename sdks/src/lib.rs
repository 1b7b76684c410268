// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! Alinea Rust SDK
//!
//! Typed async client for the Alinea-AI multi-agent coordination backend:
//! intentions and actions, causality tracing, learned patterns and shared
//! world state.

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use client::AlineaClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{AlineaError, ConnectivityCause, Result};
pub use transport::{HttpTransport, MockTransport, Transport};
pub use types::*;
