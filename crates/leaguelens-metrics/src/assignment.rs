// Exact maximum-weight bipartite assignment between players and slot instances.
//
// Every slot may stay empty and every player may stay on the bench, so the
// problem is always feasible. The Hungarian solver works on a square cost
// matrix padded with zero-cost "empty slot" rows and "bench" columns.

/// Result of a solve: the slot instance chosen for each player (if any) and
/// the total weight of the chosen edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub slot_of: Vec<Option<usize>>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("non-finite weight {weight} for player {player}, slot {slot}")]
    InvalidWeight {
        player: usize,
        slot: usize,
        weight: f64,
    },

    #[error("weight row {player} has {found} slots, expected {expected}")]
    Ragged {
        player: usize,
        expected: usize,
        found: usize,
    },

    #[error("no feasible assignment found")]
    Infeasible,
}

/// Solves "maximum-weight bipartite assignment with capacity 1 per player
/// and per slot". `weights[i][j]` is `Some(points)` when player `i` may fill
/// slot `j`, `None` otherwise. Leaving a slot or a player unassigned is
/// always allowed.
pub trait AssignmentSolver {
    fn solve(&self, weights: &[Vec<Option<f64>>], num_slots: usize)
        -> Result<Assignment, SolverError>;
}

/// O(n^3) Hungarian algorithm with row/column potentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct HungarianSolver;

impl AssignmentSolver for HungarianSolver {
    fn solve(
        &self,
        weights: &[Vec<Option<f64>>],
        num_slots: usize,
    ) -> Result<Assignment, SolverError> {
        let num_players = weights.len();
        let mut big = 1.0;
        for (i, row) in weights.iter().enumerate() {
            if row.len() != num_slots {
                return Err(SolverError::Ragged {
                    player: i,
                    expected: num_slots,
                    found: row.len(),
                });
            }
            for (j, w) in row.iter().enumerate() {
                if let Some(w) = *w {
                    if !w.is_finite() {
                        return Err(SolverError::InvalidWeight {
                            player: i,
                            slot: j,
                            weight: w,
                        });
                    }
                    big += w.abs();
                }
            }
        }

        // Rows: players, then one filler per slot. Columns: slots, then one
        // bench per player. Forbidden edges cost more than any legal lineup
        // could gain.
        let n = num_players + num_slots;
        let mut cost = vec![vec![0.0; n]; n];
        for (i, row) in weights.iter().enumerate() {
            for (j, w) in row.iter().enumerate() {
                cost[i][j] = match w {
                    Some(w) => -w,
                    None => big,
                };
            }
        }

        let col_of_row = hungarian(&cost);

        let mut slot_of = vec![None; num_players];
        let mut total = 0.0;
        for (i, slot) in slot_of.iter_mut().enumerate() {
            let j = col_of_row[i];
            if j >= num_slots {
                continue;
            }
            match weights[i][j] {
                Some(w) => {
                    *slot = Some(j);
                    total += w;
                }
                None => return Err(SolverError::Infeasible),
            }
        }
        Ok(Assignment { slot_of, total })
    }
}

/// Minimum-cost perfect matching on a square matrix. Returns the column
/// assigned to each row.
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    // 1-indexed potentials; column 0 is the virtual start.
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut row_of_col = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        row_of_col[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = row_of_col[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[row_of_col[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if row_of_col[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            row_of_col[j0] = row_of_col[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut col_of_row = vec![0usize; n];
    for j in 1..=n {
        col_of_row[row_of_col[j] - 1] = j - 1;
    }
    col_of_row
}
