//! Tree Walker
//!
//! One scan is a depth-first pre-order traversal of the namespace from the
//! configured root. Every node is checked against the ignore filter before
//! any query, so a pruned subtree costs nothing regardless of its real
//! size. Container results are split into child names once; child paths
//! are formed by appending a name to the parent path. Leaf values lose
//! their leading padding and go to the publisher in traversal order.
//!
//! A failed read abandons that branch for the current scan only. A failed
//! publish unwinds the whole scan; the scheduler tears the session down.

use tracing::debug;

use crate::filter::IgnoreList;
use crate::namespace::{is_container, join_child, split_children, Namespace};
use crate::publish::{MessageSink, PublishError, Publisher};

/// Counters for one completed scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Nodes queried
    pub visited: u64,
    /// Leaf values published
    pub published: u64,
    /// Subtrees pruned by the ignore filter
    pub ignored: u64,
    /// Nodes whose query failed
    pub failed: u64,
}

/// Walks the namespace and publishes every reachable leaf.
pub struct Scanner<N, S> {
    namespace: N,
    filter: IgnoreList,
    publisher: Publisher<S>,
}

impl<N: Namespace, S: MessageSink> Scanner<N, S> {
    pub fn new(namespace: N, filter: IgnoreList, publisher: Publisher<S>) -> Self {
        Self {
            namespace,
            filter,
            publisher,
        }
    }

    /// Run one scan from `root`.
    pub async fn scan(&self, root: &str) -> Result<ScanStats, PublishError> {
        let mut stats = ScanStats::default();
        let mut stack = vec![root.to_string()];

        while let Some(path) = stack.pop() {
            if self.filter.should_ignore(&path) {
                stats.ignored += 1;
                continue;
            }

            stats.visited += 1;
            let raw = match self.namespace.get(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Skipping {}: {}", path, e);
                    stats.failed += 1;
                    continue;
                }
            };

            if is_container(&path) {
                let listing = String::from_utf8_lossy(&raw).into_owned();
                let children: Vec<&str> = split_children(&listing).collect();
                // Pushed in reverse so the first child is popped first,
                // keeping the traversal pre-order.
                for child in children.into_iter().rev() {
                    stack.push(join_child(&path, child));
                }
            } else {
                let text = String::from_utf8_lossy(&raw);
                self.publisher.publish(&path, text.trim_start())?;
                stats.published += 1;
            }
        }

        Ok(stats)
    }
}
