//! Archetype selection from a pairwise chi2 matrix.
//!
//! Selection is a set-cover problem: candidate `j` covers input `i` when
//! `chi2[[i, j]] <= threshold`. A greedy pass picks the candidate covering
//! the most still-uncovered inputs until everything is covered (or the
//! archetype cap is hit). Refinement passes then drop archetypes whose
//! coverage is entirely duplicated by the others. Finally every input is
//! assigned to the selected archetype that explains it best, and the number
//! of inputs assigned to an archetype is its responsibility.

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("chi2 matrix is empty")]
    Empty,
    #[error("chi2 matrix must be square, got {0}x{1}")]
    NotSquare(usize, usize),
    #[error("chi2 threshold must be finite and positive, got {0}")]
    InvalidThreshold(f64),
    #[error("Maximum number of archetypes must be at least 1")]
    ZeroArchetypes,
}

/// Tuning for [`ArchetypeSelector::select`]
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    /// Inputs with chi2 at or below this value are considered explained
    pub chi2_threshold: f64,
    /// Stop the greedy pass after this many archetypes
    pub max_archetypes: Option<usize>,
    /// Upper bound on redundancy-pruning passes
    pub max_iterations: usize,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            chi2_threshold: 0.1,
            max_archetypes: None,
            max_iterations: 100,
        }
    }
}

/// Archetypes chosen from the inputs, ordered by responsibility
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Input index of each archetype
    pub archetypes: Vec<usize>,
    /// Number of inputs best explained by each archetype
    pub responsibility: Vec<usize>,
    /// Inputs assigned to each archetype, ascending
    pub members: Vec<Vec<usize>>,
    /// Inputs that no archetype explains within the threshold
    pub uncovered: Vec<usize>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }
}

/// Greedy set-cover archetype selector
pub struct ArchetypeSelector<'a> {
    chi2: &'a Array2<f64>,
}

impl<'a> ArchetypeSelector<'a> {
    pub fn new(chi2: &'a Array2<f64>) -> Result<Self, SelectionError> {
        let (rows, cols) = chi2.dim();
        if rows == 0 || cols == 0 {
            return Err(SelectionError::Empty);
        }
        if rows != cols {
            return Err(SelectionError::NotSquare(rows, cols));
        }
        Ok(Self { chi2 })
    }

    fn nspec(&self) -> usize {
        self.chi2.nrows()
    }

    fn covers(&self, candidate: usize, input: usize, threshold: f64) -> bool {
        self.chi2[[input, candidate]] <= threshold
    }

    /// Choose archetypes and assign every input to one of them.
    pub fn select(&self, params: &SelectionParams) -> Result<Selection, SelectionError> {
        let threshold = params.chi2_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(SelectionError::InvalidThreshold(threshold));
        }
        if params.max_archetypes == Some(0) {
            return Err(SelectionError::ZeroArchetypes);
        }

        let mut selected = self.greedy_cover(threshold, params.max_archetypes);
        debug!("Greedy cover chose {} archetypes", selected.len());

        let mut iterations = 0;
        while iterations < params.max_iterations {
            match self.most_redundant(&selected, threshold) {
                Some(position) => {
                    let dropped = selected.remove(position);
                    debug!("Dropping redundant archetype {dropped}");
                }
                None => break,
            }
            iterations += 1;
        }

        let selection = self.assign(&selected, threshold);
        info!(
            "Selected {} archetypes for {} spectra ({} uncovered, {} refinement passes)",
            selection.len(),
            self.nspec(),
            selection.uncovered.len(),
            iterations
        );
        Ok(selection)
    }

    /// Greedy set cover, returning chosen candidates in pick order.
    fn greedy_cover(&self, threshold: f64, max_archetypes: Option<usize>) -> Vec<usize> {
        let n = self.nspec();
        let cap = max_archetypes.unwrap_or(n);
        let mut covered = vec![false; n];
        let mut is_selected = vec![false; n];
        let mut selected = Vec::new();

        while selected.len() < cap && covered.iter().any(|c| !c) {
            // (gain, chi2 over newly covered inputs, index)
            let best = (0..n)
                .into_par_iter()
                .filter(|&j| !is_selected[j])
                .map(|j| {
                    let mut gain = 0usize;
                    let mut cost = 0.0;
                    for i in 0..n {
                        if !covered[i] && self.covers(j, i, threshold) {
                            gain += 1;
                            cost += self.chi2[[i, j]];
                        }
                    }
                    (gain, cost, j)
                })
                .reduce_with(|a, b| {
                    let better_b = b.0 > a.0
                        || (b.0 == a.0 && (b.1 < a.1 || (b.1 == a.1 && b.2 < a.2)));
                    if better_b {
                        b
                    } else {
                        a
                    }
                });

            let Some((gain, _, j)) = best else { break };
            // A matrix without a zero diagonal may leave nothing coverable;
            // still return one archetype so every input can be assigned.
            if gain == 0 && !selected.is_empty() {
                break;
            }

            is_selected[j] = true;
            selected.push(j);
            for (i, c) in covered.iter_mut().enumerate() {
                if self.covers(j, i, threshold) {
                    *c = true;
                }
            }
        }

        selected
    }

    /// Position in `selected` of the archetype whose coverage is fully
    /// duplicated by the others, preferring the one covering the fewest inputs.
    fn most_redundant(&self, selected: &[usize], threshold: f64) -> Option<usize> {
        if selected.len() < 2 {
            return None;
        }

        let n = self.nspec();
        let cover_counts: Vec<usize> = (0..n)
            .map(|i| {
                selected
                    .iter()
                    .filter(|&&j| self.covers(j, i, threshold))
                    .count()
            })
            .collect();

        selected
            .iter()
            .enumerate()
            .filter_map(|(position, &j)| {
                let covered: Vec<usize> =
                    (0..n).filter(|&i| self.covers(j, i, threshold)).collect();
                let redundant = covered.iter().all(|&i| cover_counts[i] >= 2);
                redundant.then_some((covered.len(), j, position))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, _, position)| position)
    }

    /// Assign inputs to their best archetype and order by responsibility.
    fn assign(&self, selected: &[usize], threshold: f64) -> Selection {
        let n = self.nspec();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); selected.len()];
        let mut uncovered = Vec::new();

        for i in 0..n {
            let best = match selected.iter().position(|&j| j == i) {
                Some(own) => own,
                None => {
                    let mut best = 0;
                    for (position, &j) in selected.iter().enumerate() {
                        if self.chi2[[i, j]] < self.chi2[[i, selected[best]]] {
                            best = position;
                        }
                    }
                    best
                }
            };
            if !self.covers(selected[best], i, threshold) {
                uncovered.push(i);
            }
            members[best].push(i);
        }

        let mut order: Vec<usize> = (0..selected.len()).collect();
        order.sort_by(|&a, &b| {
            members[b]
                .len()
                .cmp(&members[a].len())
                .then(selected[a].cmp(&selected[b]))
        });

        Selection {
            archetypes: order.iter().map(|&p| selected[p]).collect(),
            responsibility: order.iter().map(|&p| members[p].len()).collect(),
            members: order.iter().map(|&p| members[p].clone()).collect(),
            uncovered,
        }
    }
}
