//! A* search over the tile grid
//!
//! The pathfinder only knows the grid dimensions. Whether a tile can be entered
//! is decided by a predicate supplied per search, so the same instance serves
//! static walls and live occupancy alike.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

pub type Tile = (i32, i32);

/// Upper bound on expanded tiles per search, keeps a hopeless search from
/// eating the tick.
const DEFAULT_MAX_EXPANSIONS: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    tile: Tile,
    cost: f32,
    estimate: f32,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    // Reversed so the max-heap pops the lowest estimate first; deeper nodes win ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| self.cost.total_cmp(&other.cost))
            .then_with(|| other.tile.cmp(&self.tile))
    }
}

#[derive(Debug, Clone)]
pub struct Pathfinder {
    width: i32,
    height: i32,
    max_expansions: usize,
}

impl Pathfinder {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            max_expansions: DEFAULT_MAX_EXPANSIONS,
        }
    }

    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    pub fn in_bounds(&self, (x, y): Tile) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Orthogonal neighbours of `tile` that lie on the grid.
    pub fn neighbors(&self, (x, y): Tile) -> impl Iterator<Item = Tile> + '_ {
        [(x, y - 1), (x, y + 1), (x - 1, y), (x + 1, y)]
            .into_iter()
            .filter(move |&tile| self.in_bounds(tile))
    }

    /// Finds a path from `start` to `goal`.
    ///
    /// The returned tiles exclude `start` and end with `goal`; when both are
    /// the same tile the path is empty. `None` means no path within the search
    /// budget. `is_blocked` is consulted for every tile the path would enter,
    /// including the goal.
    pub fn navigate<F>(&self, start: Tile, goal: Tile, mut is_blocked: F) -> Option<Vec<Tile>>
    where
        F: FnMut(Tile) -> bool,
    {
        if start == goal {
            return Some(Vec::new());
        }
        if !self.in_bounds(goal) {
            return None;
        }

        let mut open = BinaryHeap::new();
        let mut best_cost: HashMap<Tile, f32> = HashMap::new();
        let mut came_from: HashMap<Tile, Tile> = HashMap::new();
        let mut closed: HashSet<Tile> = HashSet::new();

        best_cost.insert(start, 0.0);
        open.push(OpenNode {
            tile: start,
            cost: 0.0,
            estimate: heuristic(start, goal),
        });

        while let Some(current) = open.pop() {
            if current.tile == goal {
                return Some(reconstruct(&came_from, start, goal));
            }
            if !closed.insert(current.tile) {
                continue;
            }
            if closed.len() > self.max_expansions {
                return None;
            }

            for neighbor in self.neighbors(current.tile) {
                if closed.contains(&neighbor) || is_blocked(neighbor) {
                    continue;
                }

                let cost = current.cost + step_cost(current.tile, neighbor);
                if best_cost.get(&neighbor).is_some_and(|&known| known <= cost) {
                    continue;
                }

                best_cost.insert(neighbor, cost);
                came_from.insert(neighbor, current.tile);
                open.push(OpenNode {
                    tile: neighbor,
                    cost,
                    estimate: cost + heuristic(neighbor, goal),
                });
            }
        }

        None
    }
}

/// Euclidean distance between two tiles.
fn step_cost(from: Tile, to: Tile) -> f32 {
    let dx = (to.0 - from.0) as f32;
    let dy = (to.1 - from.1) as f32;
    (dx * dx + dy * dy).sqrt()
}

/// Manhattan distance to the goal.
fn heuristic(from: Tile, goal: Tile) -> f32 {
    ((goal.0 - from.0).abs() + (goal.1 - from.1).abs()) as f32
}

fn reconstruct(came_from: &HashMap<Tile, Tile>, start: Tile, goal: Tile) -> Vec<Tile> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = came_from.get(&current) {
        if previous == start {
            break;
        }
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}
