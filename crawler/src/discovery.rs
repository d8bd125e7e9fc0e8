//! Discovery contract.
//!
//! Discovery is a lazy, possibly endless, sequence of node records. The
//! crawler only pulls from it, so anything that can hand over records one at
//! a time qualifies: a discv5 iterator, a channel fed by another task, or a
//! fixed list of bootstrap records.

use crate::record::NodeRecord;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::mpsc;

/// Source of discovered node records.
pub trait Discovery: Send + 'static {
    /// Next discovered record, `None` once discovery is exhausted.
    fn next(&mut self) -> impl Future<Output = Option<NodeRecord>> + Send;
}

/// Records fed by another task.
impl Discovery for mpsc::Receiver<NodeRecord> {
    async fn next(&mut self) -> Option<NodeRecord> {
        self.recv().await
    }
}

/// A fixed list of records, handed out in order.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    records: VecDeque<NodeRecord>,
}

impl StaticDiscovery {
    pub fn new(records: impl IntoIterator<Item = NodeRecord>) -> Self {
        StaticDiscovery {
            records: records.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Discovery for StaticDiscovery {
    async fn next(&mut self) -> Option<NodeRecord> {
        self.records.pop_front()
    }
}
