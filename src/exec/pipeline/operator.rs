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
//! Core operator traits.
//!
//! Responsibilities:
//! - Defines the processor execution contract (push input, pull output, finish).
//! - Used by the driver loop to move chunks through an operator until it reports finished.
//!
//! Key exported interfaces:
//! - Types: `Operator`, `ProcessorOperator`.
//!
//! Current limitations:
//! - Only processor operators exist; sources and sinks are the caller's chunk iterator and
//!   result vector.

use crate::common::error::ExecResult;
use crate::exec::chunk::Chunk;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::runtime_state::RuntimeState;
use std::sync::Arc;

/// Base operator contract.
pub trait Operator: Send {
    fn name(&self) -> &str;

    fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        let _ = tracker;
    }

    fn prepare(&mut self) -> ExecResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ExecResult<()> {
        Ok(())
    }

    fn is_finished(&self) -> bool {
        false
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        None
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        None
    }
}

/// Extended operator contract for processor stages with push/pull semantics.
pub trait ProcessorOperator: Operator {
    fn need_input(&self) -> bool;

    fn has_output(&self) -> bool;

    fn push_chunk(&mut self, state: &RuntimeState, chunk: Chunk) -> ExecResult<()>;

    /// May return `None` even when `has_output` was true, e.g. when buffered input was
    /// consumed without closing any group.
    fn pull_chunk(&mut self, state: &RuntimeState) -> ExecResult<Option<Chunk>>;

    fn set_finishing(&mut self, state: &RuntimeState) -> ExecResult<()>;
}
