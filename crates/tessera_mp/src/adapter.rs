//! Conversion of orchestration-layer snapshots into annealing problems.
//!
//! The clustering engine hands over a flat snapshot of one hierarchy
//! level: child clusters with their shape freedom, fixed terminals, pairwise
//! connection weights, and constraint regions in the parent's coordinate
//! frame. This module flattens that snapshot into the object list, bundled
//! net list, and outline-local constraint maps the annealing cores consume.

use crate::ids::MacroId;
use crate::net::{merge_nets, BundledNet};
use crate::shape::ShapeCurve;
use crate::soft_macro::{SoftMacro, SoftMacroKind};
use std::collections::BTreeMap;
use tessera_common::Rect;

/// The shape class of a child cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    /// Standard cells only; resizes along a piecewise curve.
    StdCell,
    /// Standard cells and macros; resizes along a piecewise curve.
    Mixed,
    /// Hard macros only; resizes along discrete tilings.
    Macro,
}

/// A child cluster as snapshotted by the clustering engine.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    /// Cluster name, unique within the snapshot.
    pub name: String,
    /// Shape class.
    pub kind: ClusterKind,
    /// Total cluster area.
    pub area: f32,
    /// Feasible width intervals (std-cell and mixed clusters).
    pub width_intervals: Vec<(f32, f32)>,
    /// Feasible tilings (macro clusters).
    pub tilings: Vec<(f32, f32)>,
    /// Number of hard macros inside the cluster.
    pub num_macros: u32,
    /// Area occupied by hard macros inside the cluster.
    pub macro_area: f32,
    /// Hard constraint region, parent frame.
    pub fence: Option<Rect>,
    /// Soft attraction region, parent frame.
    pub guide: Option<Rect>,
}

/// A fixed terminal (placed sibling, parent pin, or IO span), parent frame.
#[derive(Debug, Clone)]
pub struct TerminalSnapshot {
    /// Terminal name, unique within the snapshot.
    pub name: String,
    /// Lower-left x in the parent frame.
    pub x: f32,
    /// Lower-left y in the parent frame.
    pub y: f32,
    /// Horizontal span (zero for point terminals).
    pub width: f32,
    /// Vertical span (zero for point terminals).
    pub height: f32,
}

/// A weighted connection between two named objects.
#[derive(Debug, Clone)]
pub struct Connection {
    /// First endpoint name.
    pub a: String,
    /// Second endpoint name.
    pub b: String,
    /// Positive connection weight.
    pub weight: f32,
}

/// A flattened soft-macro annealing problem.
#[derive(Debug)]
pub struct SoftProblem {
    /// Sequence-pair-controlled objects.
    pub macros: Vec<SoftMacro>,
    /// Fixed terminals appended after the movable prefix.
    pub terminals: Vec<SoftMacro>,
    /// Merged bundled nets.
    pub nets: Vec<BundledNet>,
    /// Fences, outline-local.
    pub fences: BTreeMap<MacroId, Rect>,
    /// Guides, outline-local.
    pub guides: BTreeMap<MacroId, Rect>,
    /// Blockages clipped to the outline, outline-local.
    pub blockages: Vec<Rect>,
    /// Name-to-id map over movable objects and terminals.
    pub id_by_name: BTreeMap<String, MacroId>,
}

/// Builds a soft-macro problem from a hierarchy-level snapshot.
///
/// Fences, guides, and blockages are clipped to the outline and translated
/// into its local frame; regions left without overlap are dropped.
/// Connections are resolved by name and merged per unordered pair.
///
/// # Panics
///
/// Panics if a connection references an unknown object name or a cluster
/// snapshot lacks the shape data its kind requires (caller misuse).
pub fn build_soft_problem(
    outline: &Rect,
    clusters: &[ClusterSnapshot],
    terminals: &[TerminalSnapshot],
    connections: &[Connection],
    blockages: &[Rect],
) -> SoftProblem {
    let mut macros = Vec::with_capacity(clusters.len());
    let mut fences = BTreeMap::new();
    let mut guides = BTreeMap::new();
    let mut id_by_name = BTreeMap::new();

    for cluster in clusters {
        let id = MacroId::from_raw(macros.len() as u32);
        let soft = match cluster.kind {
            ClusterKind::Macro => {
                assert!(
                    !cluster.tilings.is_empty(),
                    "macro cluster '{}' has no tilings",
                    cluster.name
                );
                SoftMacro::cluster(
                    cluster.name.clone(),
                    SoftMacroKind::MacroCluster,
                    ShapeCurve::discrete(&cluster.tilings),
                )
                .with_macro_stats(cluster.num_macros, 1.0)
            }
            ClusterKind::Mixed => {
                assert!(
                    !cluster.width_intervals.is_empty(),
                    "mixed cluster '{}' has no width intervals",
                    cluster.name
                );
                SoftMacro::cluster(
                    cluster.name.clone(),
                    SoftMacroKind::MixedCluster,
                    ShapeCurve::piecewise(&cluster.width_intervals, cluster.area),
                )
                .with_macro_stats(cluster.num_macros, cluster.macro_area / cluster.area)
            }
            ClusterKind::StdCell => {
                assert!(
                    !cluster.width_intervals.is_empty(),
                    "std-cell cluster '{}' has no width intervals",
                    cluster.name
                );
                SoftMacro::cluster(
                    cluster.name.clone(),
                    SoftMacroKind::StdCellCluster,
                    ShapeCurve::piecewise(&cluster.width_intervals, cluster.area),
                )
            }
        };
        if let Some(fence) = cluster.fence {
            let mut fence = fence;
            fence.relocate(outline);
            if fence.is_valid() {
                fences.insert(id, fence);
            }
        }
        if let Some(guide) = cluster.guide {
            let mut guide = guide;
            guide.relocate(outline);
            if guide.is_valid() {
                guides.insert(id, guide);
            }
        }
        id_by_name.insert(cluster.name.clone(), id);
        macros.push(soft);
    }

    let mut terminal_macros = Vec::with_capacity(terminals.len());
    for terminal in terminals {
        let id = MacroId::from_raw((macros.len() + terminal_macros.len()) as u32);
        let x = terminal.x - outline.lx;
        let y = terminal.y - outline.ly;
        let soft = if terminal.width > 0.0 || terminal.height > 0.0 {
            SoftMacro::io_pin_group(terminal.name.clone(), x, y, terminal.width, terminal.height)
        } else {
            SoftMacro::fixed_terminal(terminal.name.clone(), x, y)
        };
        id_by_name.insert(terminal.name.clone(), id);
        terminal_macros.push(soft);
    }

    let nets = connections
        .iter()
        .map(|conn| {
            let a = *id_by_name
                .get(&conn.a)
                .unwrap_or_else(|| panic!("connection references unknown object '{}'", conn.a));
            let b = *id_by_name
                .get(&conn.b)
                .unwrap_or_else(|| panic!("connection references unknown object '{}'", conn.b));
            BundledNet::new(a, b, conn.weight)
        })
        .collect();

    let mut clipped_blockages = Vec::new();
    for blockage in blockages {
        let mut blockage = *blockage;
        blockage.relocate(outline);
        if blockage.is_valid() {
            clipped_blockages.push(blockage);
        }
    }

    SoftProblem {
        macros,
        terminals: terminal_macros,
        nets: merge_nets(nets),
        fences,
        guides,
        blockages: clipped_blockages,
        id_by_name,
    }
}
