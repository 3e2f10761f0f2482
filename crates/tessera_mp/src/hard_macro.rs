//! Rigid macros with fixed dimensions and flippable orientation.
//!
//! A hard macro's stored width and height include its halo (a keep-out
//! margin on all four sides); the `real_*` accessors strip the halo for
//! write-back into the design database. The virtual pin is the centroid of
//! the macro's signal pins and moves when the macro is flipped.

use crate::orientation::Orientation;
use crate::placeable::Placeable;
use serde::{Deserialize, Serialize};

/// A rigid placeable macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardMacro {
    name: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    halo_width: f32,
    halo_height: f32,
    pin_x: f32,
    pin_y: f32,
    orientation: Orientation,
    fixed: bool,
}

impl HardMacro {
    /// Creates a movable hard macro of the given size with its pin at the
    /// center.
    pub fn new(name: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width,
            height,
            halo_width: 0.0,
            halo_height: 0.0,
            pin_x: width / 2.0,
            pin_y: height / 2.0,
            orientation: Orientation::R0,
            fixed: false,
        }
    }

    /// Creates a movable hard macro with a halo margin on all four sides.
    ///
    /// The stored width/height are inflated by twice the halo; the pin
    /// offset is shifted into the halo-inclusive frame.
    pub fn with_halo(
        name: impl Into<String>,
        width: f32,
        height: f32,
        halo_width: f32,
        halo_height: f32,
        pin_x: f32,
        pin_y: f32,
    ) -> Self {
        Self {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width: width + 2.0 * halo_width,
            height: height + 2.0 * halo_height,
            halo_width,
            halo_height,
            pin_x: pin_x + halo_width,
            pin_y: pin_y + halo_height,
            orientation: Orientation::R0,
            fixed: false,
        }
    }

    /// Creates a hard macro pinned at the given lower-left position.
    pub fn fixed_at(name: impl Into<String>, width: f32, height: f32, x: f32, y: f32) -> Self {
        let mut m = Self::new(name, width, height);
        m.x = x;
        m.y = y;
        m.fixed = true;
        m
    }

    /// Returns the macro's current orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Flips the macro about the x-axis (`horizontal == true`) or y-axis.
    ///
    /// Rotation is never applied; only mirror flips, which keep the
    /// footprint but move the pin.
    pub fn flip(&mut self, horizontal: bool) {
        if horizontal {
            self.orientation = self.orientation.flip_x();
            self.pin_y = self.height - self.pin_y;
        } else {
            self.orientation = self.orientation.flip_y();
            self.pin_x = self.width - self.pin_x;
        }
    }

    /// Returns the lower-left x coordinate without the halo.
    pub fn real_x(&self) -> f32 {
        self.x + self.halo_width
    }

    /// Returns the lower-left y coordinate without the halo.
    pub fn real_y(&self) -> f32 {
        self.y + self.halo_height
    }

    /// Returns the width without the halo.
    pub fn real_width(&self) -> f32 {
        self.width - 2.0 * self.halo_width
    }

    /// Returns the height without the halo.
    pub fn real_height(&self) -> f32 {
        self.height - 2.0 * self.halo_height
    }

    /// Sets the halo-exclusive location (the stored location shifts by the
    /// halo).
    pub fn set_real_location(&mut self, x: f32, y: f32) {
        if self.fixed {
            return;
        }
        self.x = x - self.halo_width;
        self.y = y - self.halo_height;
    }
}

impl Placeable for HardMacro {
    fn name(&self) -> &str {
        &self.name
    }

    fn x(&self) -> f32 {
        self.x
    }

    fn y(&self) -> f32 {
        self.y
    }

    fn set_x(&mut self, x: f32) {
        if !self.fixed {
            self.x = x;
        }
    }

    fn set_y(&mut self, y: f32) {
        if !self.fixed {
            self.y = y;
        }
    }

    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn area(&self) -> f32 {
        self.width * self.height
    }

    fn is_fixed(&self) -> bool {
        self.fixed
    }

    fn pin_x(&self) -> f32 {
        self.x + self.pin_x
    }

    fn pin_y(&self) -> f32 {
        self.y + self.pin_y
    }
}
