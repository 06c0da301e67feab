// SPDX-License-Identifier: GPL-3.0-only

//! Format utilities
//!
//! Container selection for recordings.

pub mod container;

pub use container::ContainerFormat;
