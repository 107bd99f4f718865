// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::common::error::{ExecError, ExecResult};

/// Tracks logical memory usage for a component and its ancestors.
///
/// This is a lightweight accounting utility that only records bytes explicitly
/// reported by the caller. It does NOT reflect real process RSS or allocator
/// statistics.
#[derive(Debug)]
pub struct MemTracker {
    label: String,
    limit: i64,
    parent: Option<Arc<MemTracker>>,
    current: AtomicI64,
    peak: AtomicI64,
    allocated: AtomicI64,
    deallocated: AtomicI64,
}

impl MemTracker {
    /// Create a root tracker with no parent and no limit.
    pub fn new_root(label: impl Into<String>) -> Arc<Self> {
        Self::build(label.into(), -1, None)
    }

    /// Create a root tracker that rejects `try_consume` beyond `limit` bytes.
    pub fn new_root_with_limit(label: impl Into<String>, limit: i64) -> Arc<Self> {
        Self::build(label.into(), limit, None)
    }

    /// Create a child tracker with the provided parent.
    pub fn new_child(label: impl Into<String>, parent: &Arc<MemTracker>) -> Arc<Self> {
        Self::build(label.into(), -1, Some(Arc::clone(parent)))
    }

    fn build(label: String, limit: i64, parent: Option<Arc<MemTracker>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            limit,
            parent,
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            allocated: AtomicI64::new(0),
            deallocated: AtomicI64::new(0),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Byte limit, or a negative value when unlimited.
    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn allocated(&self) -> i64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn deallocated(&self) -> i64 {
        self.deallocated.load(Ordering::Relaxed)
    }

    /// Increase consumption for this tracker and all ancestors.
    pub fn consume(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let new_value = current.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            current.allocated.fetch_add(bytes, Ordering::AcqRel);
            current.update_peak(new_value);
            tracker = current.parent.as_deref();
        }
    }

    /// Like [`consume`](Self::consume), but fails without consuming anything when this
    /// tracker or any ancestor would exceed its limit.
    pub fn try_consume(&self, bytes: i64) -> ExecResult<()> {
        if bytes <= 0 {
            return Ok(());
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let used = current.current();
            if current.limit >= 0 && used.saturating_add(bytes) > current.limit {
                return Err(ExecError::MemLimitExceeded {
                    label: current.label.clone(),
                    limit: current.limit,
                    current: used,
                    requested: bytes,
                });
            }
            tracker = current.parent.as_deref();
        }
        self.consume(bytes);
        Ok(())
    }

    /// Decrease consumption for this tracker and all ancestors.
    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            current.current.fetch_sub(bytes, Ordering::AcqRel);
            current.deallocated.fetch_add(bytes, Ordering::AcqRel);
            tracker = current.parent.as_deref();
        }
    }

    fn update_peak(&self, value: i64) {
        let mut prev = self.peak.load(Ordering::Relaxed);
        while value > prev {
            match self
                .peak
                .compare_exchange(prev, value, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_propagates_to_ancestors() {
        let root = MemTracker::new_root("root");
        let child = MemTracker::new_child("child", &root);
        child.consume(100);
        child.release(40);
        assert_eq!(child.current(), 60);
        assert_eq!(root.current(), 60);
        assert_eq!(root.peak(), 100);
        assert_eq!(child.allocated(), 100);
        assert_eq!(child.deallocated(), 40);
    }

    #[test]
    fn try_consume_respects_ancestor_limit() {
        let root = MemTracker::new_root_with_limit("fragment", 64);
        let child = MemTracker::new_child("agg", &root);
        child.try_consume(48).expect("within limit");
        let err = child.try_consume(32).expect_err("over limit");
        match err {
            ExecError::MemLimitExceeded {
                label,
                limit,
                current,
                requested,
            } => {
                assert_eq!(label, "fragment");
                assert_eq!(limit, 64);
                assert_eq!(current, 48);
                assert_eq!(requested, 32);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(child.current(), 48);
        assert_eq!(root.current(), 48);
    }
}
