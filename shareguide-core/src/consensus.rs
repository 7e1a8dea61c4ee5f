//! Per-label vote aggregation for extracted screen data.
//!
//! Vision models misread short strings (handles, counters) intermittently.
//! Requiring two agreeing readings filters transient noise while bounding
//! latency to two successful frames.

use serde::{Deserialize, Serialize};
use shareguide_types::analysis::ExtractedField;

/// Vote tally for one candidate value of a label.
///
/// Kept in first-seen order inside [`ExtractionConsensus`] so plurality ties
/// break towards the earlier-seen value.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ValueVotes {
    value: String,
    count: u32,
}

/// The per-session extraction consensus state.
///
/// Each observed `(label, value)` pair casts a vote. A value is committed
/// for its label once it is the plurality winner and its count has reached
/// the consensus threshold; committed entries are only ever replaced by a
/// competing plurality winner, never removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractionConsensus {
    /// label -> candidate values in first-seen order. The tallies are engine
    /// internals and are never sent to clients.
    votes: Vec<(String, Vec<ValueVotes>)>,
    /// Committed pairs, distinct labels, in first-commit order.
    committed: Vec<ExtractedField>,
}

impl ExtractionConsensus {
    /// Rebuilds the committed list from persisted metadata after a
    /// reconnect. Vote tallies are deliberately not restored.
    pub fn rehydrate(recovered: Vec<ExtractedField>) -> Self {
        let mut committed: Vec<ExtractedField> = Vec::with_capacity(recovered.len());
        for field in recovered {
            if field.label.is_empty() || field.value.is_empty() {
                continue;
            }
            if !committed.iter().any(|c| c.label == field.label) {
                committed.push(field);
            }
        }
        Self {
            votes: Vec::new(),
            committed,
        }
    }

    /// Feeds one frame's extracted pairs into the tally.
    ///
    /// Pairs with an empty label or empty (post-trim) value are dropped
    /// before voting. Returns `true` iff the committed list changed.
    pub fn observe(&mut self, fields: &[ExtractedField], threshold: u32) -> bool {
        let mut changed = false;
        for field in fields {
            let value = field.value.trim();
            if field.label.is_empty() || value.is_empty() {
                continue;
            }
            let tally = self.vote(&field.label, value);
            let winner = plurality_winner(tally);
            if winner.count >= threshold {
                let value = winner.value.clone();
                changed |= self.commit(&field.label, value);
            }
        }
        changed
    }

    /// The committed `(label, value)` pairs.
    pub fn committed(&self) -> &[ExtractedField] {
        &self.committed
    }

    /// Returns `true` iff a value is committed for `label`.
    pub fn has_committed(&self, label: &str) -> bool {
        self.committed.iter().any(|field| field.label == label)
    }

    fn vote<'a>(&'a mut self, label: &str, value: &str) -> &'a [ValueVotes] {
        let tally = match self.votes.iter().position(|(l, _)| l == label) {
            Some(idx) => &mut self.votes[idx].1,
            None => {
                self.votes.push((label.to_owned(), Vec::new()));
                &mut self.votes.last_mut().expect("just pushed").1
            }
        };
        match tally.iter_mut().find(|votes| votes.value == value) {
            Some(votes) => votes.count += 1,
            None => tally.push(ValueVotes {
                value: value.to_owned(),
                count: 1,
            }),
        }
        tally
    }

    fn commit(&mut self, label: &str, value: String) -> bool {
        match self.committed.iter_mut().find(|field| field.label == label) {
            Some(existing) if existing.value == value => false,
            Some(existing) => {
                existing.value = value;
                true
            }
            None => {
                self.committed.push(ExtractedField::new(label, value));
                true
            }
        }
    }
}

/// The plurality winner; ties break towards the first-inserted value.
fn plurality_winner(tally: &[ValueVotes]) -> &ValueVotes {
    tally
        .iter()
        .reduce(|best, candidate| {
            if candidate.count > best.count {
                candidate
            } else {
                best
            }
        })
        .expect("tally is non-empty after a vote")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CONSENSUS_THRESHOLD;

    fn fields(pairs: &[(&str, &str)]) -> Vec<ExtractedField> {
        pairs
            .iter()
            .map(|(label, value)| ExtractedField::new(*label, *value))
            .collect()
    }

    #[test]
    fn single_reading_does_not_commit() {
        let mut consensus = ExtractionConsensus::default();
        let changed = consensus.observe(&fields(&[("Handle", "@alice")]), CONSENSUS_THRESHOLD);
        assert!(!changed);
        assert!(consensus.committed().is_empty());
    }

    #[test]
    fn two_agreeing_readings_commit_once() {
        let mut consensus = ExtractionConsensus::default();
        consensus.observe(&fields(&[("Handle", "@alice")]), CONSENSUS_THRESHOLD);
        let changed = consensus.observe(&fields(&[("Handle", "@alice")]), CONSENSUS_THRESHOLD);
        assert!(changed);
        assert_eq!(consensus.committed(), fields(&[("Handle", "@alice")]));
        // further identical readings are idempotent
        let changed = consensus.observe(&fields(&[("Handle", "@alice")]), CONSENSUS_THRESHOLD);
        assert!(!changed);
        assert_eq!(consensus.committed().len(), 1);
    }

    #[test]
    fn plurality_filters_transient_misreads() {
        // readings @a, @b, @a: nothing commits until @a reaches two votes
        let mut consensus = ExtractionConsensus::default();
        consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        assert!(consensus.committed().is_empty());
        consensus.observe(&fields(&[("Handle", "@b")]), CONSENSUS_THRESHOLD);
        assert!(consensus.committed().is_empty());
        let changed = consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        assert!(changed);
        assert_eq!(consensus.committed(), fields(&[("Handle", "@a")]));
    }

    #[test]
    fn tie_breaks_towards_first_seen_value() {
        let mut consensus = ExtractionConsensus::default();
        consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        consensus.observe(&fields(&[("Handle", "@b")]), CONSENSUS_THRESHOLD);
        consensus.observe(&fields(&[("Handle", "@b")]), CONSENSUS_THRESHOLD);
        // 2:2 tie, @a was seen first and stays committed
        assert_eq!(consensus.committed(), fields(&[("Handle", "@a")]));
    }

    #[test]
    fn higher_plurality_replaces_committed_value() {
        let mut consensus = ExtractionConsensus::default();
        for _ in 0..2 {
            consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        }
        for _ in 0..3 {
            consensus.observe(&fields(&[("Handle", "@b")]), CONSENSUS_THRESHOLD);
        }
        assert_eq!(consensus.committed(), fields(&[("Handle", "@b")]));
        // still a single entry for the label
        assert_eq!(consensus.committed().len(), 1);
    }

    #[test]
    fn labels_stay_distinct() {
        let mut consensus = ExtractionConsensus::default();
        for _ in 0..2 {
            consensus.observe(
                &fields(&[("Handle", "@a"), ("Reach", "1200")]),
                CONSENSUS_THRESHOLD,
            );
        }
        assert_eq!(consensus.committed().len(), 2);
        assert!(consensus.has_committed("Handle"));
        assert!(consensus.has_committed("Reach"));
    }

    #[test]
    fn empty_labels_and_values_are_dropped() {
        let mut consensus = ExtractionConsensus::default();
        for _ in 0..3 {
            consensus.observe(
                &fields(&[("", "@a"), ("Handle", ""), ("Handle", "   ")]),
                CONSENSUS_THRESHOLD,
            );
        }
        assert!(consensus.committed().is_empty());
    }

    #[test]
    fn values_are_trimmed_before_voting() {
        let mut consensus = ExtractionConsensus::default();
        consensus.observe(&fields(&[("Handle", " @a ")]), CONSENSUS_THRESHOLD);
        consensus.observe(&fields(&[("Handle", "@a")]), CONSENSUS_THRESHOLD);
        assert_eq!(consensus.committed(), fields(&[("Handle", "@a")]));
    }

    #[test]
    fn rehydrate_restores_committed_without_votes() {
        let consensus = ExtractionConsensus::rehydrate(fields(&[
            ("Handle", "@a"),
            ("Handle", "@dup"),
            ("", "x"),
            ("Reach", "1200"),
        ]));
        assert_eq!(
            consensus.committed(),
            fields(&[("Handle", "@a"), ("Reach", "1200")])
        );
        // tallies start empty: a single fresh reading must not commit
        let mut consensus = consensus;
        consensus.observe(&fields(&[("Followers", "10")]), CONSENSUS_THRESHOLD);
        assert!(!consensus.has_committed("Followers"));
    }
}
