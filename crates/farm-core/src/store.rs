//! Ordered result store kept by the collector.

use std::io::{self, Write};

/// One reported result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub value: i64,
    pub source_id: String,
}

/// Records in non-decreasing `value` order; equal values keep arrival order.
#[derive(Debug, Default)]
pub struct OrderedResultStore {
    records: Vec<ResultRecord>,
}

impl OrderedResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every record whose value is `<=` the new one
    pub fn insert(&mut self, value: i64, source_id: impl Into<String>) {
        let at = self.records.partition_point(|r| r.value <= value);
        self.records.insert(
            at,
            ResultRecord {
                value,
                source_id: source_id.into(),
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write one `"<value> <source_id>"` line per record and flush
    pub fn print<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for r in &self.records {
            writeln!(out, "{} {}", r.value, r.source_id)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(store: &OrderedResultStore) -> Vec<(i64, &str)> {
        store.iter().map(|r| (r.value, r.source_id.as_str())).collect()
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut s = OrderedResultStore::new();
        for (v, id) in [(5, "a"), (1, "b"), (3, "c"), (1, "d")] {
            s.insert(v, id);
        }
        assert_eq!(pairs(&s), vec![(1, "b"), (1, "d"), (3, "c"), (5, "a")]);
    }

    #[test]
    fn test_negative_and_extreme_values() {
        let mut s = OrderedResultStore::new();
        s.insert(0, "zero");
        s.insert(i64::MIN, "min");
        s.insert(i64::MAX, "max");
        s.insert(-1, "neg");
        assert_eq!(
            pairs(&s),
            vec![(i64::MIN, "min"), (-1, "neg"), (0, "zero"), (i64::MAX, "max")]
        );
    }

    #[test]
    fn test_print_format() {
        let mut s = OrderedResultStore::new();
        s.insert(20, "dir/b.dat");
        s.insert(10, "a.dat");
        let mut out = Vec::new();
        s.print(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "10 a.dat\n20 dir/b.dat\n");
    }

    #[test]
    fn test_empty_print_writes_nothing() {
        let s = OrderedResultStore::new();
        let mut out = Vec::new();
        s.print(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(s.is_empty());
    }
}
