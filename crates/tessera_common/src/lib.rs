//! Shared foundational types used across the Tessera placement engine.
//!
//! This crate provides the geometry primitives (axis-aligned rectangles)
//! and common result types shared by the floorplanning cores and the
//! orchestration-facing interfaces.

#![warn(missing_docs)]

pub mod rect;
pub mod result;

pub use rect::Rect;
pub use result::{InternalError, TesseraResult};
