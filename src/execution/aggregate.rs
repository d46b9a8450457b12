use std::collections::{HashMap, HashSet};

use crate::common::{RecordId, Result, INVALID_PAGE_ID, SlotId};
use crate::tuple::Tuple;

use super::Executor;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: i32,
    sum: i64,
    min: i32,
    max: i32,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    fn fold(&mut self, value: i32) {
        self.count += 1;
        self.sum += value as i64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

fn synthetic_rid() -> RecordId {
    RecordId::new(INVALID_PAGE_ID, SlotId::new(0))
}

/// Hash aggregation over one column, optionally grouped by another.
///
/// Materializes during `init`: the child is drained into per-group
/// accumulators and `next` replays the finished groups. Output rows
/// are `[group, count, sum, min, max]` (group column omitted for the
/// global aggregate), ordered by group key for determinism.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by: Option<usize>,
    agg_column: usize,
    results: Vec<Tuple>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(child: Box<dyn Executor>, group_by: Option<usize>, agg_column: usize) -> Self {
        Self {
            child,
            group_by,
            agg_column,
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.results.clear();
        self.cursor = 0;

        let mut groups: HashMap<Option<i32>, Accumulator> = HashMap::new();
        while let Some((tuple, _rid)) = self.child.next()? {
            let key = self.group_by.map(|column| tuple.value(column));
            groups
                .entry(key)
                .or_insert_with(Accumulator::new)
                .fold(tuple.value(self.agg_column));
        }

        let mut entries: Vec<_> = groups.into_iter().collect();
        entries.sort_by_key(|(key, _)| *key);

        for (key, acc) in entries {
            let mut values = Vec::new();
            if let Some(group) = key {
                values.push(group);
            }
            values.push(acc.count);
            values.push(acc.sum as i32);
            values.push(acc.min);
            values.push(acc.max);
            self.results.push(Tuple::new(values));
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.cursor >= self.results.len() {
            return Ok(None);
        }
        let tuple = self.results[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, synthetic_rid())))
    }
}

/// Emits each distinct row once, in first-seen order. Materializes
/// during `init`.
pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    results: Vec<(Tuple, RecordId)>,
    cursor: usize,
}

impl DistinctExecutor {
    pub fn new(child: Box<dyn Executor>) -> Self {
        Self {
            child,
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.results.clear();
        self.cursor = 0;

        let mut seen: HashSet<Tuple> = HashSet::new();
        while let Some((tuple, rid)) = self.child.next()? {
            if seen.insert(tuple.clone()) {
                self.results.push((tuple, rid));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.cursor >= self.results.len() {
            return Ok(None);
        }
        let row = self.results[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }
}
