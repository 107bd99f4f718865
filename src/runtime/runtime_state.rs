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
use std::sync::{Arc, Mutex};

use crate::common::config;
use crate::runtime::mem_tracker::MemTracker;

/// Per-fragment execution context shared by the operators of one pipeline.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    mem_tracker: Arc<MemTracker>,
    error_state: Arc<RuntimeErrorState>,
}

#[derive(Debug, Default)]
pub struct RuntimeErrorState {
    error: Mutex<Option<String>>,
}

impl RuntimeErrorState {
    /// Records the first error only.
    pub fn set_error(&self, err: String) {
        let mut guard = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for RuntimeState {
    /// The fragment memory limit comes from the loaded config, if any.
    fn default() -> Self {
        let mem_tracker = match config::mem_limit_bytes() {
            Some(limit) => MemTracker::new_root_with_limit("fragment", limit),
            None => MemTracker::new_root("fragment"),
        };
        Self::new(mem_tracker)
    }
}

impl RuntimeState {
    pub fn new(mem_tracker: Arc<MemTracker>) -> Self {
        Self {
            mem_tracker,
            error_state: Arc::new(RuntimeErrorState::default()),
        }
    }

    pub fn mem_tracker(&self) -> Arc<MemTracker> {
        Arc::clone(&self.mem_tracker)
    }

    pub fn error_state(&self) -> Arc<RuntimeErrorState> {
        Arc::clone(&self.error_state)
    }

    pub fn error(&self) -> Option<String> {
        self.error_state.error()
    }
}
