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
use crate::exec::row_container::GroupHandle;

/// Ordered group handles: `[0, open)` are open groups in first-seen order, the rest are
/// emitted rows waiting to be reused.
#[derive(Debug, Default)]
pub(crate) struct GroupBuffer {
    groups: Vec<GroupHandle>,
    open: usize,
}

impl GroupBuffer {
    pub(crate) fn open_count(&self) -> usize {
        self.open
    }

    /// Rows ever allocated through this buffer, open or free.
    pub(crate) fn capacity(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn open_groups(&self) -> &[GroupHandle] {
        &self.groups[..self.open]
    }

    /// Opens the next free slot, if any. The caller reinitializes the row.
    pub(crate) fn take_free(&mut self) -> Option<GroupHandle> {
        let group = self.groups.get(self.open).copied()?;
        self.open += 1;
        Some(group)
    }

    /// Appends a freshly allocated row as the newest open group.
    pub(crate) fn push_new(&mut self, group: GroupHandle) {
        debug_assert_eq!(self.open, self.groups.len());
        self.groups.push(group);
        self.open += 1;
    }

    /// Groups opened since the open count was `start`.
    pub(crate) fn opened_since(&self, start: usize) -> &[GroupHandle] {
        &self.groups[start.min(self.open)..self.open]
    }

    /// Moves the `n` oldest open groups behind the remaining open ones, making them free.
    pub(crate) fn release_front(&mut self, n: usize) {
        let n = n.min(self.open);
        self.groups[..self.open].rotate_left(n);
        self.open -= n;
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
        self.open = 0;
    }
}
