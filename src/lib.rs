// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

pub mod agent;      // transform calling convention
pub mod bridge;     // shared-memory + distributed bridges
pub mod config;     // topology configs + registry
pub mod errors;     // error handling
pub mod feeder;     // sources and sinks
pub mod graph;      // builder and teardown
pub mod observability;
pub mod scheduler;  // wake-driven run loop
pub mod stream;     // append-only streams
pub mod transforms; // built-in transforms
