//! Elastic macros abstracting clusters of the physical hierarchy.
//!
//! A soft macro stands in for a whole sub-cluster during one level of the
//! hierarchical placement: a standard-cell or mixed cluster that can trade
//! width for height along a [`ShapeCurve`], a macro-array cluster limited to
//! discrete tilings, a placement blockage, a fixed terminal, or a group of
//! IO pins. The classification selects which penalties and perturbations
//! apply to the object.

use crate::placeable::Placeable;
use crate::shape::ShapeCurve;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tessera_common::Rect;

/// What a [`SoftMacro`] represents at the current hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftMacroKind {
    /// A cluster containing only standard cells.
    StdCellCluster,
    /// A cluster containing both standard cells and hard macros.
    MixedCluster,
    /// A cluster containing only hard macros (resizes along discrete tilings).
    MacroCluster,
    /// A placement blockage (kept inside its fence by the fence penalty).
    Blockage,
    /// A fixed zero-area terminal (e.g. a placed sibling or parent pin).
    FixedTerminal,
    /// A group of IO pins on the die boundary.
    IoPinGroup,
}

/// A resizable placeable macro abstracting a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftMacro {
    name: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    area: f32,
    curve: Option<ShapeCurve>,
    kind: SoftMacroKind,
    fixed: bool,
    num_macros: u32,
    macro_area_fraction: f32,
    io_regions: Vec<Rect>,
}

impl SoftMacro {
    /// Creates a movable cluster macro with the given shape curve.
    ///
    /// # Panics
    ///
    /// Panics if the curve's flavor does not match the kind (a macro cluster
    /// needs a discrete curve, other clusters a piecewise one) — caller
    /// misuse.
    pub fn cluster(name: impl Into<String>, kind: SoftMacroKind, curve: ShapeCurve) -> Self {
        assert!(
            matches!(
                kind,
                SoftMacroKind::StdCellCluster
                    | SoftMacroKind::MixedCluster
                    | SoftMacroKind::MacroCluster
            ),
            "cluster macros must be std-cell, mixed, or macro clusters"
        );
        assert_eq!(
            kind == SoftMacroKind::MacroCluster,
            curve.is_discrete(),
            "macro clusters take discrete tilings, other clusters piecewise curves"
        );
        let (width, height) = curve.initial_shape();
        Self {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width,
            height,
            area: width * height,
            curve: Some(curve),
            kind,
            fixed: false,
            num_macros: 0,
            macro_area_fraction: 0.0,
            io_regions: Vec::new(),
        }
    }

    /// Creates a movable blockage macro of fixed size (held in place by a
    /// fence).
    pub fn blockage(name: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width,
            height,
            area: width * height,
            curve: None,
            kind: SoftMacroKind::Blockage,
            fixed: false,
            num_macros: 0,
            macro_area_fraction: 0.0,
            io_regions: Vec::new(),
        }
    }

    /// Creates a fixed zero-area terminal at the given position.
    pub fn fixed_terminal(name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width: 0.0,
            height: 0.0,
            area: 0.0,
            curve: None,
            kind: SoftMacroKind::FixedTerminal,
            fixed: true,
            num_macros: 0,
            macro_area_fraction: 0.0,
            io_regions: Vec::new(),
        }
    }

    /// Creates a placed IO pin group: a fixed zero-area span on the die
    /// boundary whose center is the pin position.
    pub fn io_pin_group(name: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
            area: 0.0,
            curve: None,
            kind: SoftMacroKind::IoPinGroup,
            fixed: true,
            num_macros: 0,
            macro_area_fraction: 0.0,
            io_regions: Vec::new(),
        }
    }

    /// Creates an unplaced IO pin group constrained to the given boundary
    /// regions.
    ///
    /// Nets targeting this object are costed by the distance to the nearest
    /// region instead of pin-to-pin distance.
    ///
    /// # Panics
    ///
    /// Panics if `regions` is empty — the distance fallback would have
    /// nothing to measure against (caller misuse).
    pub fn unplaced_io_pin_group(name: impl Into<String>, regions: Vec<Rect>) -> Self {
        assert!(
            !regions.is_empty(),
            "unplaced IO pin group needs at least one permitted region"
        );
        Self {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            area: 0.0,
            curve: None,
            kind: SoftMacroKind::IoPinGroup,
            fixed: true,
            num_macros: 0,
            macro_area_fraction: 0.0,
            io_regions: regions,
        }
    }

    /// Attaches macro statistics: the instance count and the fraction of the
    /// cluster's area occupied by macros.
    pub fn with_macro_stats(mut self, num_macros: u32, macro_area_fraction: f32) -> Self {
        self.num_macros = num_macros;
        self.macro_area_fraction = macro_area_fraction;
        self
    }

    /// Returns this macro's classification.
    pub fn kind(&self) -> SoftMacroKind {
        self.kind
    }

    /// Returns whether this is a macro-only cluster.
    pub fn is_macro_cluster(&self) -> bool {
        self.kind == SoftMacroKind::MacroCluster
    }

    /// Returns whether this is a mixed cluster.
    pub fn is_mixed_cluster(&self) -> bool {
        self.kind == SoftMacroKind::MixedCluster
    }

    /// Returns whether this is a standard-cell-only cluster.
    pub fn is_std_cell_cluster(&self) -> bool {
        self.kind == SoftMacroKind::StdCellCluster
    }

    /// Returns the number of hard macros inside the abstracted cluster.
    pub fn num_macros(&self) -> u32 {
        self.num_macros
    }

    /// Returns the fraction of the cluster's area occupied by macros.
    ///
    /// 1.0 for macro clusters, the recorded fraction for mixed clusters,
    /// 0.0 otherwise.
    pub fn macro_area_fraction(&self) -> f32 {
        match self.kind {
            SoftMacroKind::MacroCluster => 1.0,
            SoftMacroKind::MixedCluster => self.macro_area_fraction,
            _ => 0.0,
        }
    }

    /// Returns the shape curve, if this macro is resizable.
    pub fn shape_curve(&self) -> Option<&ShapeCurve> {
        self.curve.as_ref()
    }

    /// Sets the width, snapping onto the shape curve and recomputing the
    /// height so `width * height == area`.
    ///
    /// Only std-cell and mixed clusters resize this way; other kinds (and
    /// non-positive widths) are ignored.
    pub fn set_width(&mut self, width: f32) {
        if width <= 0.0 || !self.resizes_continuously() {
            return;
        }
        let Some(curve) = self.curve.as_ref() else {
            return;
        };
        let (w, h) = curve.resolve_width(width);
        self.width = w;
        self.height = h;
        self.area = w * h;
    }

    /// Sets the height, snapping onto the shape curve and recomputing the
    /// width so `width * height == area`.
    pub fn set_height(&mut self, height: f32) {
        if height <= 0.0 || !self.resizes_continuously() {
            return;
        }
        let Some(curve) = self.curve.as_ref() else {
            return;
        };
        let (w, h) = curve.resolve_height(height);
        self.width = w;
        self.height = h;
        self.area = w * h;
    }

    /// Grows the cluster to a new area, rescaling the shape curve.
    ///
    /// Shrink requests and non-resizable kinds are ignored.
    pub fn set_area(&mut self, area: f32) {
        if !self.resizes_continuously() {
            return;
        }
        let Some(curve) = self.curve.as_mut() else {
            return;
        };
        if let Some((w, h)) = curve.set_area(area) {
            self.width = w;
            self.height = h;
            self.area = area;
        }
    }

    /// Picks a uniform-random shape along the curve (a random tiling for
    /// macro clusters).
    pub fn resize_randomly<R: Rng>(&mut self, rng: &mut R) {
        let Some(curve) = self.curve.as_ref() else {
            return;
        };
        let (w, h) = curve.random_shape(rng);
        self.width = w;
        self.height = h;
        self.area = w * h;
    }

    fn resizes_continuously(&self) -> bool {
        self.curve.is_some()
            && matches!(
                self.kind,
                SoftMacroKind::StdCellCluster | SoftMacroKind::MixedCluster
            )
    }

    /// Overrides the location without the fixed-object guard.
    ///
    /// Used by dead-space filling and alignment passes that reshape the
    /// final floorplan directly.
    pub(crate) fn override_location(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Overrides the shape without consulting the curve.
    pub(crate) fn override_shape(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
        self.area = width * height;
    }

    /// Returns the bounding box at the current position.
    pub fn bbox(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

impl Placeable for SoftMacro {
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
        self.area
    }

    fn is_fixed(&self) -> bool {
        self.fixed
    }

    fn pin_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    fn pin_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    fn unplaced_io_regions(&self) -> Option<&[Rect]> {
        if self.io_regions.is_empty() {
            None
        } else {
            Some(&self.io_regions)
        }
    }
}
