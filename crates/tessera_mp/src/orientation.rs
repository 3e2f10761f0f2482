//! Rectilinear macro orientations.
//!
//! Hard macros keep one of the eight rectilinear orientations. Rotation is
//! never applied during annealing (it would violate the preferred routing
//! direction of metal layers); only mirror flips are, so the transition
//! tables below cover `flip_x` (mirror about the x-axis) and `flip_y`
//! (mirror about the y-axis).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the eight rectilinear orientations of a hard macro.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// No rotation, no mirror.
    #[default]
    R0,
    /// Rotated 90 degrees counterclockwise.
    R90,
    /// Rotated 180 degrees.
    R180,
    /// Rotated 270 degrees counterclockwise.
    R270,
    /// Mirrored about the x-axis.
    Mx,
    /// Mirrored about the y-axis.
    My,
    /// Mirrored about the x-axis, then rotated 90 degrees.
    Mx90,
    /// Mirrored about the y-axis, then rotated 90 degrees.
    My90,
}

impl Orientation {
    /// Returns the orientation after mirroring about the x-axis.
    pub fn flip_x(self) -> Self {
        match self {
            Orientation::R0 => Orientation::Mx,
            Orientation::R90 => Orientation::My90,
            Orientation::R180 => Orientation::My,
            Orientation::R270 => Orientation::Mx90,
            Orientation::Mx => Orientation::R0,
            Orientation::My90 => Orientation::R90,
            Orientation::My => Orientation::R180,
            Orientation::Mx90 => Orientation::R270,
        }
    }

    /// Returns the orientation after mirroring about the y-axis.
    pub fn flip_y(self) -> Self {
        match self {
            Orientation::R0 => Orientation::My,
            Orientation::R90 => Orientation::Mx90,
            Orientation::R180 => Orientation::Mx,
            Orientation::R270 => Orientation::My90,
            Orientation::My => Orientation::R0,
            Orientation::Mx90 => Orientation::R90,
            Orientation::Mx => Orientation::R180,
            Orientation::My90 => Orientation::R270,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Orientation::R0 => "R0",
            Orientation::R90 => "R90",
            Orientation::R180 => "R180",
            Orientation::R270 => "R270",
            Orientation::Mx => "MX",
            Orientation::My => "MY",
            Orientation::Mx90 => "MX90",
            Orientation::My90 => "MY90",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Orientation; 8] = [
        Orientation::R0,
        Orientation::R90,
        Orientation::R180,
        Orientation::R270,
        Orientation::Mx,
        Orientation::My,
        Orientation::Mx90,
        Orientation::My90,
    ];

    #[test]
    fn flip_x_is_involution() {
        for o in ALL {
            assert_eq!(o.flip_x().flip_x(), o);
        }
    }

    #[test]
    fn flip_y_is_involution() {
        for o in ALL {
            assert_eq!(o.flip_y().flip_y(), o);
        }
    }

    #[test]
    fn flips_change_orientation() {
        for o in ALL {
            assert_ne!(o.flip_x(), o);
            assert_ne!(o.flip_y(), o);
        }
    }

    #[test]
    fn double_flip_is_rotation() {
        assert_eq!(Orientation::R0.flip_x().flip_y(), Orientation::R180);
    }

    #[test]
    fn default_is_r0() {
        assert_eq!(Orientation::default(), Orientation::R0);
    }

    #[test]
    fn display_names() {
        assert_eq!(format!("{}", Orientation::R0), "R0");
        assert_eq!(format!("{}", Orientation::Mx90), "MX90");
    }
}
