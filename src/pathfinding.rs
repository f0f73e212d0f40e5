use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::map::WorldMap;
use crate::types::GridPosition;

#[derive(Debug)]
struct OpenNode {
    f: u32,
    g: u32,
    cell: GridPosition,
    tie: u64,
}

impl OpenNode {
    fn key(&self) -> (u32, u32, GridPosition, u64) {
        (self.f, self.g, self.cell, self.tie)
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest node first.
        other.key().cmp(&self.key())
    }
}

fn heuristic(a: GridPosition, b: GridPosition) -> u32 {
    ((a.x - b.x).abs() + (a.y - b.y).abs()) as u32
}

/// Weighted 4-neighbour A* from `start` to `goal`, both included in the result.
///
/// Roads cost 1, open ground 10, walls are impassable. Cells in `blocked`
/// are treated as walls unless they are the start cell. No corner cutting,
/// since there are no diagonal moves.
pub fn find_path(
    map: &WorldMap,
    start: GridPosition,
    goal: GridPosition,
    blocked: &HashSet<GridPosition>,
) -> Option<Vec<GridPosition>> {
    let start_idx = map.index(start)?;
    let goal_idx = map.index(goal)?;
    if !map.is_walkable(goal) || blocked.contains(&goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let len = (map.width * map.height) as usize;
    let mut g_score = vec![u32::MAX; len];
    let mut came_from: Vec<Option<usize>> = vec![None; len];
    let mut open = BinaryHeap::new();
    let mut tie: u64 = 0;

    g_score[start_idx] = 0;
    open.push(OpenNode {
        f: heuristic(start, goal),
        g: 0,
        cell: start,
        tie,
    });

    while let Some(node) = open.pop() {
        if node.cell == goal {
            return Some(reconstruct(map, &came_from, goal_idx));
        }
        let Some(node_idx) = map.index(node.cell) else {
            continue;
        };
        if node.g != g_score[node_idx] {
            // Stale heap entry.
            continue;
        }

        for next in node.cell.neighbours() {
            let Some(next_idx) = map.index(next) else {
                continue;
            };
            if blocked.contains(&next) {
                continue;
            }
            let Some(cost) = map.terrain(next).cost() else {
                continue;
            };
            let tentative = node.g.saturating_add(cost);
            if tentative >= g_score[next_idx] {
                continue;
            }
            g_score[next_idx] = tentative;
            came_from[next_idx] = Some(node_idx);
            tie += 1;
            open.push(OpenNode {
                f: tentative.saturating_add(heuristic(next, goal)),
                g: tentative,
                cell: next,
                tie,
            });
        }
    }

    None
}

fn reconstruct(map: &WorldMap, came_from: &[Option<usize>], mut current: usize) -> Vec<GridPosition> {
    let mut out = vec![current];
    while let Some(prev) = came_from[current] {
        current = prev;
        out.push(current);
    }
    out.reverse();
    out.into_iter()
        .map(|idx| {
            let idx = idx as i32;
            GridPosition::new(idx % map.width, idx / map.width)
        })
        .collect()
}
