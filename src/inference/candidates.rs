//! Candidate arena
//!
//! Candidates are owned by a single [`CandidateSet`] and referenced by index.
//! Passes relabel them through [`CandidateSet::mark`] and
//! [`CandidateSet::demote`]; nothing is ever removed.

use crate::types::{OffPeriod, SleepCandidate};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Vec<SleepCandidate>,
}

impl CandidateSet {
    /// Wrap periods as unconfirmed candidates, preserving order
    pub fn from_periods(periods: Vec<OffPeriod>) -> Self {
        Self {
            candidates: periods.into_iter().map(SleepCandidate::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SleepCandidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SleepCandidate> {
        self.candidates.iter()
    }

    pub fn is_sleep(&self, index: usize) -> bool {
        self.candidates.get(index).is_some_and(|c| c.is_sleep)
    }

    /// Label a candidate as sleep. Returns true if the label changed.
    pub fn mark(&mut self, index: usize) -> bool {
        self.set_label(index, true)
    }

    /// Label a candidate as not sleep. Returns true if the label changed.
    pub fn demote(&mut self, index: usize) -> bool {
        self.set_label(index, false)
    }

    fn set_label(&mut self, index: usize, is_sleep: bool) -> bool {
        match self.candidates.get_mut(index) {
            Some(candidate) if candidate.is_sleep != is_sleep => {
                candidate.is_sleep = is_sleep;
                true
            }
            _ => false,
        }
    }

    /// Indices of confirmed candidates, in arena order
    pub fn confirmed_indices(&self) -> Vec<usize> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_sleep)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn confirmed_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_sleep).count()
    }

    /// All indices ordered by start time (ties keep arena order)
    pub fn order_by_start(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.candidates.len()).collect();
        order.sort_by_key(|&i| self.candidates[i].period.start);
        order
    }

    /// Confirmed periods ordered by start time
    pub fn confirmed_periods(&self) -> Vec<OffPeriod> {
        self.order_by_start()
            .into_iter()
            .filter(|&i| self.candidates[i].is_sleep)
            .map(|i| self.candidates[i].period)
            .collect()
    }

    pub fn into_candidates(self) -> Vec<SleepCandidate> {
        self.candidates
    }
}
