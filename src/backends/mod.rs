// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for frame capture
//!
//! # Modules
//!
//! - [`source`]: Frame source trait, ownership and the still-image source

pub mod source;
