//! Quota monitoring
//!
//! Directory sizes are maintained incrementally by propagation; this module
//! reads them back to find quota violations and can recount them from
//! scratch when the incremental numbers have drifted.

use crate::error::FsError;
use crate::store::Transaction;
use crate::tree::nodes;
use crate::tree::path::{Scope, VirtualPath};
use crate::types::NodeId;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// A node whose aggregate size exceeds its quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaViolation {
    pub node_id: NodeId,
    pub path: String,
    pub size: u64,
    pub quota: u64,
    /// Account owning the personal scope the node lives in, if any.
    pub owner: Option<String>,
}

impl QuotaViolation {
    pub fn message(&self) -> String {
        format!("{} exceeded quota", self.path)
    }
}

/// Outcome of a size recount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecountReport {
    pub directories: usize,
    pub corrected: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaMonitor;

impl QuotaMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Every reachable node with a quota below its aggregate size.
    pub fn violations(&self, txn: &mut Transaction<'_>) -> Result<Vec<QuotaViolation>, FsError> {
        let mut out = Vec::new();
        for node in nodes::all(txn)? {
            let Some(quota) = node.quota else { continue };
            if node.size <= quota {
                continue;
            }
            let Some(path) = nodes::live_path_of(txn, node.id)? else {
                continue;
            };
            let owner = VirtualPath::parse(&path).ok().and_then(|p| match p.scope() {
                Some(Scope::Personal { account_id }) => account_id,
                _ => None,
            });
            out.push(QuotaViolation {
                node_id: node.id,
                path,
                size: node.size,
                quota,
                owner,
            });
        }
        debug!(violations = out.len(), "Scanned quotas");
        Ok(out)
    }

    /// Recompute every live directory's aggregate size bottom-up.
    pub fn recalculate_folder_sizes(&self, txn: &mut Transaction<'_>) -> Result<RecountReport, FsError> {
        // Breadth-first order; processed in reverse so children come first.
        let mut order = Vec::new();
        let mut queue: VecDeque<Option<NodeId>> = VecDeque::from([None]);
        while let Some(parent) = queue.pop_front() {
            for child in nodes::children(txn, parent)? {
                if child.is_dir() {
                    queue.push_back(Some(child.id));
                    order.push(child.id);
                }
            }
        }

        let mut totals: HashMap<NodeId, u64> = HashMap::new();
        let mut report = RecountReport::default();
        for id in order.into_iter().rev() {
            let mut total = 0u64;
            for child in nodes::children(txn, Some(id))? {
                let size = if child.is_dir() {
                    totals.get(&child.id).copied().unwrap_or(0)
                } else {
                    child.size
                };
                total = total.saturating_add(size);
            }
            totals.insert(id, total);
            report.directories += 1;

            let mut node = nodes::load(txn, id)?;
            if node.size != total {
                warn!(
                    node_id = %id,
                    recorded = node.size,
                    counted = total,
                    "Directory size drifted, correcting"
                );
                node.size = total;
                nodes::put(txn, &node)?;
                report.corrected += 1;
            }
        }
        Ok(report)
    }
}
