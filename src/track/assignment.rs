//! Minimum-cost bipartite matching between tracks and detections.
//!
//! Costs are quantized to integers for `pathfinding`'s Kuhn-Munkres solver.
//! Every pair above the gate, and every padding cell of the square matrix,
//! gets the same "no match" cost (`gate + 1` quantum), so gated pairs never
//! distort the optimum among valid ones; such pairs are dropped after solving.
//!
//! Ties: each quantized cost is scaled by `n^2 + 1` and the detection index is
//! added for real rows only. The tie term of a full assignment is below one
//! cost quantum, so it only decides between assignments of equal cost, and it
//! then prefers the lowest detection indices.

use anyhow::Result;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};

use crate::PipelineError;

const COST_SCALE: f64 = 1000.0;

/// Outcome of one assignment round. Indices refer to the cost matrix rows
/// (tracks) and columns (detections).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl Assignment {
    /// Everything unmatched; used when solving fails.
    pub fn unmatched(tracks: usize, detections: usize) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_tracks: (0..tracks).collect(),
            unmatched_detections: (0..detections).collect(),
        }
    }
}

/// Solve the gated assignment for `costs[track][detection]`.
pub fn solve(costs: &[Vec<f32>], detections: usize, gate: f32) -> Result<Assignment> {
    let tracks = costs.len();
    if let Some(row) = costs.iter().position(|row| row.len() != detections) {
        return Err(PipelineError::AssignmentFailure {
            reason: format!(
                "cost row {} has {} entries, expected {}",
                row,
                costs[row].len(),
                detections
            ),
        }
        .into());
    }
    if !gate.is_finite() || gate < 0.0 {
        return Err(PipelineError::AssignmentFailure {
            reason: format!("gating distance {} is not usable", gate),
        }
        .into());
    }
    for (t, row) in costs.iter().enumerate() {
        if let Some(d) = row.iter().position(|c| !c.is_finite() || *c < 0.0) {
            return Err(PipelineError::AssignmentFailure {
                reason: format!("cost for track {} / detection {} is {}", t, d, row[d]),
            }
            .into());
        }
    }
    if tracks == 0 || detections == 0 {
        return Ok(Assignment::unmatched(tracks, detections));
    }

    let size = tracks.max(detections);
    let tie_scale = (size as i64) * (size as i64) + 1;
    let no_match = quantize(gate) + 1;

    let mut weights = Matrix::new(size, size, no_match * tie_scale);
    for (t, row) in costs.iter().enumerate() {
        for (d, &cost) in row.iter().enumerate() {
            let q = if cost > gate { no_match } else { quantize(cost) };
            weights[(t, d)] = q * tie_scale + d as i64;
        }
    }

    let (_, columns) = kuhn_munkres_min(&weights);

    let mut matches = Vec::new();
    let mut detection_used = vec![false; detections];
    let mut unmatched_tracks = Vec::new();
    for (t, &d) in columns.iter().enumerate().take(tracks) {
        if d < detections && costs[t][d] <= gate {
            matches.push((t, d));
            detection_used[d] = true;
        } else {
            unmatched_tracks.push(t);
        }
    }
    let unmatched_detections = detection_used
        .iter()
        .enumerate()
        .filter_map(|(d, used)| (!used).then_some(d))
        .collect();

    Ok(Assignment {
        matches,
        unmatched_tracks,
        unmatched_detections,
    })
}

fn quantize(cost: f32) -> i64 {
    (cost as f64 * COST_SCALE).round() as i64
}
