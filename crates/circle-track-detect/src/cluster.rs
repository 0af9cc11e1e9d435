//! Grouping of redundant detections.
//!
//! Two boxes are *similar* when each of `|Δx|`, `|Δy|`, `|Δwidth|`,
//! `|Δheight|` is at most `tolerance` times the larger box's matching
//! dimension (width for x and width, height for y and height). The bound
//! is inclusive.
//!
//! Groups are the connected components of the similarity graph: merging
//! continues until no pair of boxes from different groups is similar. This
//! partition does not depend on the input order. Groups with fewer than
//! `min_group_size` members are dropped; the others collapse to the mean box.

use circle_track_core::Rectangle;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Clustering settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Smallest group that is trusted; smaller groups are discarded.
    pub min_group_size: usize,
    /// Relative similarity tolerance in `(0, 1)`.
    pub tolerance: f32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_group_size: 1,
            tolerance: 0.2,
        }
    }
}

/// Rectangles judged to be the same physical marker.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterGroup {
    pub members: Vec<Rectangle>,
}

impl ClusterGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Component-wise mean of the members.
    pub fn representative(&self) -> Option<Rectangle> {
        if self.members.is_empty() {
            return None;
        }
        let n = self.members.len() as f32;
        let (mut x, mut y, mut w, mut h) = (0f32, 0f32, 0f32, 0f32);
        for r in &self.members {
            x += r.x;
            y += r.y;
            w += r.width;
            h += r.height;
        }
        Some(Rectangle::new(x / n, y / n, w / n, h / n))
    }
}

#[inline]
fn within(delta: f32, a: f32, b: f32, tolerance: f32) -> bool {
    delta.abs() <= tolerance * a.max(b)
}

/// Similarity test between two boxes (inclusive bound).
pub fn rectangles_similar(a: &Rectangle, b: &Rectangle, tolerance: f32) -> bool {
    within(a.x - b.x, a.width, b.width, tolerance)
        && within(a.y - b.y, a.height, b.height, tolerance)
        && within(a.width - b.width, a.width, b.width, tolerance)
        && within(a.height - b.height, a.height, b.height, tolerance)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

// Union by smaller index, so every root is its component's first member.
fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Split boxes into similarity groups, ordered by each group's first member.
pub fn partition_rectangles(rects: &[Rectangle], tolerance: f32) -> Vec<ClusterGroup> {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if rectangles_similar(&rects[i], &rects[j], tolerance) {
                union(&mut parent, i, j);
            }
        }
    }

    let mut slot_of_root = vec![usize::MAX; n];
    let mut groups: Vec<ClusterGroup> = Vec::new();
    for (i, rect) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        if slot_of_root[root] == usize::MAX {
            slot_of_root[root] = groups.len();
            groups.push(ClusterGroup {
                members: Vec::new(),
            });
        }
        groups[slot_of_root[root]].members.push(*rect);
    }
    groups
}

/// Representative box of every group with at least `min_group_size` members.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(rects), fields(n = rects.len()))
)]
pub fn group_rectangles(rects: &[Rectangle], params: &ClusterParams) -> Vec<Rectangle> {
    partition_rectangles(rects, params.tolerance)
        .into_iter()
        .filter(|g| g.len() >= params.min_group_size)
        .filter_map(|g| g.representative())
        .collect()
}

/// Clusterer bound to one set of parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct RectangleClusterer {
    params: ClusterParams,
}

impl RectangleClusterer {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    pub fn cluster(&self, rects: &[Rectangle]) -> Vec<Rectangle> {
        group_rectangles(rects, &self.params)
    }
}
