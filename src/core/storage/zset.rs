// src/core/storage/zset.rs

use crate::core::commands::ScoreBoundary;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

/// A single member of a sorted set, ordered by score and then by member.
#[derive(Debug, Clone)]
pub struct ZSetEntry {
    pub score: f64,
    pub member: Bytes,
}

impl Ord for ZSetEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.member.cmp(&other.member))
    }
}

impl PartialOrd for ZSetEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ZSetEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.member == other.member
    }
}

impl Eq for ZSetEntry {}

/// A sorted set with O(1) score lookup and ordered iteration.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    members: HashMap<Bytes, f64>,
    sorted: BTreeSet<ZSetEntry>,
}

impl SortedSet {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds or updates a member. Returns `true` only when the member is new.
    pub fn add(&mut self, score: f64, member: Bytes) -> bool {
        match self.members.insert(member.clone(), score) {
            Some(old_score) => {
                self.sorted.remove(&ZSetEntry {
                    score: old_score,
                    member: member.clone(),
                });
                self.sorted.insert(ZSetEntry { score, member });
                false
            }
            None => {
                self.sorted.insert(ZSetEntry { score, member });
                true
            }
        }
    }

    /// Removes a member. Returns `true` if it was present.
    pub fn remove(&mut self, member: &Bytes) -> bool {
        match self.members.remove(member) {
            Some(score) => {
                self.sorted.remove(&ZSetEntry {
                    score,
                    member: member.clone(),
                });
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &Bytes) -> Option<f64> {
        self.members.get(member).copied()
    }

    /// Returns members by 0-based rank; negative indexes count from the end.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let len = self.len() as i64;
        if len == 0 {
            return vec![];
        }
        let start = if start < 0 { len + start } else { start }.max(0);
        let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
        if start > stop || start >= len {
            return vec![];
        }
        self.sorted
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|entry| entry.member.clone())
            .collect()
    }

    /// Removes every member whose score lies within `[min, max]` (honouring
    /// exclusive bounds). Returns the number of members removed.
    pub fn remove_range_by_score(&mut self, min: ScoreBoundary, max: ScoreBoundary) -> usize {
        let doomed: Vec<ZSetEntry> = self
            .sorted
            .iter()
            .filter(|e| min.admits_from_below(e.score) && max.admits_from_above(e.score))
            .cloned()
            .collect();
        for entry in &doomed {
            self.sorted.remove(entry);
            self.members.remove(&entry.member);
        }
        doomed.len()
    }
}
