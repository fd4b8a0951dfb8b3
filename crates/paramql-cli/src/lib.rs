// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! paramql CLI library.
//!
//! This crate provides the command-line interface for the paramql
//! templating engine: compiling templates to Lua artifacts, inspecting
//! their static metadata, and rendering or executing them against data.
//!
//! # Usage
//!
//! ```text
//! paramql compile users/list --root ./queries
//! paramql metadata users/list --root ./queries
//! paramql render users/list --root ./queries --data '{"limit": 50}'
//! paramql execute limit-rule --root ./queries --data '{"tier": "pro"}'
//! ```

/// CLI command implementations.
pub mod commands;
