use std::collections::BTreeMap;

use crate::entry::Direction;

/// `{seq_num -> (segment_id, offset)}`, one map per direction, rebuilt by
/// scanning the stream's segments on open.
#[derive(Default)]
pub struct StreamIndex {
    inbound: BTreeMap<u32, (u32, u64)>,
    outbound: BTreeMap<u32, (u32, u64)>,
}

impl StreamIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, direction: Direction) -> &BTreeMap<u32, (u32, u64)> {
        match direction {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        }
    }

    fn map_mut(&mut self, direction: Direction) -> &mut BTreeMap<u32, (u32, u64)> {
        match direction {
            Direction::In => &mut self.inbound,
            Direction::Out => &mut self.outbound,
        }
    }

    pub fn insert(&mut self, direction: Direction, seq_num: u32, segment_id: u32, offset: u64) {
        self.map_mut(direction).insert(seq_num, (segment_id, offset));
    }

    pub fn get(&self, direction: Direction, seq_num: u32) -> Option<(u32, u64)> {
        self.map(direction).get(&seq_num).copied()
    }

    pub fn latest(&self, direction: Direction) -> Option<(u32, (u32, u64))> {
        self.map(direction).iter().next_back().map(|(&seq, &loc)| (seq, loc))
    }

    /// Sequence numbers in `[from, to]` (inclusive), in order. `to == None`
    /// means "through the current latest".
    pub fn range(&self, direction: Direction, from: u32, to: Option<u32>) -> Vec<(u32, u32, u64)> {
        let map = self.map(direction);
        let upper = to.unwrap_or(u32::MAX);
        map.range(from..=upper).map(|(&seq, &(seg, off))| (seq, seg, off)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_latest_and_ranges_independently_per_direction() {
        let mut idx = StreamIndex::new();
        for s in 1..=5u32 {
            idx.insert(Direction::Out, s, 1, (s * 10) as u64);
        }
        idx.insert(Direction::In, 1, 1, 0);

        assert_eq!(idx.latest(Direction::Out), Some((5, (1, 50))));
        assert_eq!(idx.latest(Direction::In), Some((1, (1, 0))));
        assert_eq!(idx.range(Direction::Out, 2, Some(4)).len(), 3);
        assert_eq!(idx.range(Direction::Out, 2, None).len(), 4);
    }
}
