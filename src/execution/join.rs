use std::collections::{HashMap, VecDeque};

use crate::common::{RecordId, Result};
use crate::tuple::Tuple;

use super::Executor;

/// Inner hash join on one column from each side.
///
/// The left (build) side is drained into a hash table during `init`;
/// `next` streams the right (probe) side and emits the concatenation
/// of each matching build row with the probe row. The emitted record
/// id is the probe row's.
pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_key: usize,
    right_key: usize,
    build: HashMap<i32, Vec<Tuple>>,
    pending: VecDeque<(Tuple, RecordId)>,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_key: usize,
        right_key: usize,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            build: HashMap::new(),
            pending: VecDeque::new(),
        }
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.build.clear();
        self.pending.clear();

        while let Some((tuple, _rid)) = self.left.next()? {
            self.build
                .entry(tuple.value(self.left_key))
                .or_default()
                .push(tuple);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }

            let Some((probe, rid)) = self.right.next()? else {
                return Ok(None);
            };
            if let Some(matches) = self.build.get(&probe.value(self.right_key)) {
                for build_row in matches {
                    self.pending.push_back((build_row.join(&probe), rid));
                }
            }
        }
    }
}
