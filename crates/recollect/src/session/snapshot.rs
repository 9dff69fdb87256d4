//! Round-keyed snapshots of the narrowable session state.
//!
//! A snapshot is captured at the top of each clustering round and owns deep
//! copies: later mutation of the live pool never reaches a stored snapshot.

use std::collections::BTreeMap;

use crate::types::{QaTurn, ScoredChunk};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub points: Vec<ScoredChunk>,
    pub conversation: Vec<QaTurn>,
    pub followup_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    by_round: BTreeMap<u32, Snapshot>,
}

impl SnapshotStore {
    pub fn capture(
        &mut self,
        round: u32,
        points: &[ScoredChunk],
        conversation: &[QaTurn],
        followup_count: u32,
    ) {
        self.by_round.insert(
            round,
            Snapshot {
                points: points.to_vec(),
                conversation: conversation.to_vec(),
                followup_count,
            },
        );
    }

    pub fn restore(&self, round: u32) -> Option<Snapshot> {
        self.by_round.get(&round).cloned()
    }

    /// The earliest capture: the pool as it was before any narrowing.
    pub fn earliest(&self) -> Option<Snapshot> {
        self.by_round.values().next().cloned()
    }

    pub fn discard_after(&mut self, round: u32) {
        self.by_round.retain(|&r, _| r <= round);
    }

    pub fn clear(&mut self) {
        self.by_round.clear();
    }

    pub fn contains(&self, round: u32) -> bool {
        self.by_round.contains_key(&round)
    }

    pub fn rounds(&self) -> Vec<u32> {
        self.by_round.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkType;

    fn chunk(id: &str) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            file: "a.pdf".to_string(),
            chunk_text: "text".to_string(),
            chunk_type: ChunkType::Content,
            dense_vector: vec![1.0, 2.0],
            score: 0.5,
        }
    }

    #[test]
    fn snapshots_do_not_alias_live_state() {
        let mut store = SnapshotStore::default();
        let mut points = vec![chunk("a"), chunk("b")];
        store.capture(1, &points, &[], 0);

        points.remove(0);
        points[0].dense_vector[0] = 99.0;

        let snap = store.restore(1).unwrap();
        assert_eq!(snap.points.len(), 2);
        assert_eq!(snap.points[0].dense_vector[0], 1.0);
    }

    #[test]
    fn discard_after_keeps_earlier_rounds() {
        let mut store = SnapshotStore::default();
        store.capture(1, &[chunk("a")], &[], 0);
        store.capture(2, &[chunk("b")], &[], 1);
        store.capture(3, &[chunk("c")], &[], 2);

        store.discard_after(1);
        assert_eq!(store.rounds(), vec![1]);
        assert!(store.contains(1));
        assert!(!store.contains(2));
    }

    #[test]
    fn earliest_returns_the_first_capture() {
        let mut store = SnapshotStore::default();
        store.capture(2, &[chunk("b")], &[], 1);
        store.capture(1, &[chunk("a")], &[], 0);
        let snap = store.earliest().unwrap();
        assert_eq!(snap.points[0].id, "a");
    }

    #[test]
    fn recapture_overwrites() {
        let mut store = SnapshotStore::default();
        store.capture(1, &[chunk("a"), chunk("b")], &[], 0);
        store.capture(1, &[chunk("c")], &[], 0);
        assert_eq!(store.restore(1).unwrap().points.len(), 1);
    }
}
