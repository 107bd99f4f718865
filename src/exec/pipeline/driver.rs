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
//! Synchronous driver loop for a single processor operator.
//!
//! Responsibilities:
//! - Attaches an operator to the fragment's memory tracker, prepares it, feeds it input
//!   chunks, pulls every output chunk, signals end of input and drains until finished.
//! - Always closes the operator and records the first failure in the runtime error state.
//!
//! Key exported interfaces:
//! - Functions: `drive_processor`.
//!
//! Current limitations:
//! - Runs on the caller's thread with no time slicing; there is no blocking or rescheduling.

use arrow::util::pretty::pretty_format_batches;

use super::operator::{Operator, ProcessorOperator};
use crate::common::config::debug_exec_node_output;
use crate::common::error::{ExecError, ExecResult};
use crate::exec::chunk::Chunk;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::runtime_state::RuntimeState;
use crate::streamagg_logging::{debug, error, info};

/// Runs `operator` over `input` and returns its output chunks in emission order.
pub fn drive_processor<I>(
    operator: &mut dyn Operator,
    state: &RuntimeState,
    input: I,
) -> ExecResult<Vec<Chunk>>
where
    I: IntoIterator<Item = Chunk>,
{
    let name = operator.name().to_string();
    let tracker = MemTracker::new_child(name.clone(), &state.mem_tracker());
    operator.set_mem_tracker(tracker);

    let result = operator.prepare().and_then(|_| {
        let processor = operator
            .as_processor_mut()
            .ok_or_else(|| ExecError::internal(format!("{} is not a processor operator", name)))?;
        run_processor(processor, state, input)
    });
    let close_result = operator.close();
    let result = result.and_then(|outputs| close_result.map(|_| outputs));

    match &result {
        Ok(outputs) => debug!(
            "driver finished: operator={} output_chunks={} output_rows={}",
            name,
            outputs.len(),
            outputs.iter().map(Chunk::len).sum::<usize>()
        ),
        Err(err) => {
            error!("driver failed: operator={} error={}", name, err);
            state.error_state().set_error(err.to_string());
        }
    }
    result
}

fn run_processor<I>(
    processor: &mut dyn ProcessorOperator,
    state: &RuntimeState,
    input: I,
) -> ExecResult<Vec<Chunk>>
where
    I: IntoIterator<Item = Chunk>,
{
    let debug_output = debug_exec_node_output();
    let mut outputs = Vec::new();
    for chunk in input {
        if !processor.need_input() {
            return Err(ExecError::internal(format!(
                "{} does not accept input",
                processor.name()
            )));
        }
        processor.push_chunk(state, chunk)?;
        while processor.has_output() {
            pull_into(processor, state, debug_output, &mut outputs)?;
        }
    }

    processor.set_finishing(state)?;
    while !processor.is_finished() {
        if !processor.has_output() {
            return Err(ExecError::internal(format!(
                "{} stalled: not finished and no output after finishing",
                processor.name()
            )));
        }
        pull_into(processor, state, debug_output, &mut outputs)?;
    }
    Ok(outputs)
}

fn pull_into(
    processor: &mut dyn ProcessorOperator,
    state: &RuntimeState,
    debug_output: bool,
    outputs: &mut Vec<Chunk>,
) -> ExecResult<()> {
    let Some(chunk) = processor.pull_chunk(state)? else {
        return Ok(());
    };
    if debug_output {
        let rendered = pretty_format_batches(std::slice::from_ref(&chunk.batch))?;
        info!("{} output chunk:\n{}", processor.name(), rendered);
    }
    outputs.push(chunk);
    Ok(())
}
