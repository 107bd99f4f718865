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
//! Streaming aggregation over input already clustered by the grouping keys.
//!
//! Responsibilities:
//! - Detects group boundaries by comparing each row with the row that opened the current
//!   group, and the first rows of a chunk with the last key of the previous chunk.
//! - Keeps per-group keys and accumulators in a `RowContainer`, recycling the rows of emitted
//!   groups instead of allocating new ones.
//! - Emits the oldest open groups once more than one output batch worth is open, and drains
//!   the rest in capped batches after the last input.
//!
//! Key exported interfaces:
//! - Types: `StreamingAggregateProcessorFactory`.
//!
//! Current limitations:
//! - Input that is not clustered by key produces one output row per key run; this is not
//!   detected.
//! - Aggregates with sorting keys or DISTINCT, and null-key filtering, are rejected at setup.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::config;
use crate::common::error::{ExecError, ExecResult};
use crate::common::ids::SlotId;
use crate::exec::chunk::{Chunk, field_with_slot_id, slot_id_to_index_from_schema};
use crate::exec::expr::agg::{self, AggKernelEntry, AggKernelSet};
use crate::exec::expr::{ExprArena, ExprId, ExprNode, LiteralValue, eval_literal};
use crate::exec::node::aggregate::{AggregationStep, StreamingAggregateNode};
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::exec::row_container::{
    GroupHandle, GroupKeyArrayView, RowContainer, build_group_key_views, decode_key_array,
    decoded_key_type, key_storage_for_type, keys_equal,
};
use crate::exec::selectivity::SelectivityVector;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::runtime_state::RuntimeState;
use crate::streamagg_logging::{debug, trace};

use super::group_buffer::GroupBuffer;
use super::masks::AggregationMasks;

/// Where an aggregate's argument comes from.
#[derive(Clone, Debug)]
enum AggArgument {
    /// COUNT(*).
    None,
    Column(usize),
    Constant {
        value: LiteralValue,
        data_type: DataType,
    },
}

/// Plan resolved against the input schema once, shared by every operator instance.
struct StreamingAggregatePlan {
    key_channels: Vec<usize>,
    key_types: Vec<DataType>,
    arguments: Vec<AggArgument>,
    mask_channels: Vec<Option<usize>>,
    kernels: AggKernelSet,
    step: AggregationStep,
    output_schema: SchemaRef,
    output_batch_rows: usize,
    function_names: Vec<String>,
}

/// Factory that validates a streaming aggregation node and creates its operators.
pub struct StreamingAggregateProcessorFactory {
    name: String,
    plan: Arc<StreamingAggregatePlan>,
}

fn resolve_slot(
    slot_index: &HashMap<SlotId, usize>,
    slot_id: SlotId,
    what: &str,
) -> ExecResult<usize> {
    slot_index.get(&slot_id).copied().ok_or_else(|| {
        ExecError::invalid_plan(format!("{} slot {} not found in input schema", what, slot_id))
    })
}

impl StreamingAggregateProcessorFactory {
    pub fn try_new(node: &StreamingAggregateNode, arena: &ExprArena) -> ExecResult<Self> {
        let name = if node.node_id >= 0 {
            format!("STREAMING_AGGREGATE (id={})", node.node_id)
        } else {
            "STREAMING_AGGREGATE".to_string()
        };

        for call in &node.aggregates {
            if !call.sorting_keys.is_empty() {
                return Err(ExecError::unsupported(format!(
                    "streaming aggregation does not support aggregates with sorting keys: {}",
                    call.function.name
                )));
            }
            if call.distinct {
                return Err(ExecError::unsupported(format!(
                    "streaming aggregation does not support distinct aggregates: {}",
                    call.function.name
                )));
            }
        }
        if node.ignore_null_keys {
            return Err(ExecError::unsupported(
                "streaming aggregation does not support ignoring null keys",
            ));
        }

        let schema = node.input_schema.as_ref();
        let slot_index = slot_id_to_index_from_schema(schema).map_err(ExecError::InvalidPlan)?;

        let mut key_channels = Vec::with_capacity(node.group_by.len());
        let mut key_types = Vec::with_capacity(node.group_by.len());
        let mut key_fields = Vec::with_capacity(node.group_by.len());
        for expr in &node.group_by {
            let slot_id = match arena.node(*expr) {
                Some(ExprNode::SlotId(slot_id)) => *slot_id,
                Some(ExprNode::Literal(_)) => {
                    return Err(ExecError::invalid_plan(
                        "grouping key must reference an input column",
                    ));
                }
                None => {
                    return Err(ExecError::invalid_plan(format!(
                        "grouping key expression {:?} not found",
                        expr
                    )));
                }
            };
            let channel = resolve_slot(&slot_index, slot_id, "grouping key")?;
            let field = schema.field(channel);
            let data_type = decoded_key_type(field.data_type());
            key_storage_for_type(&data_type).map_err(ExecError::InvalidPlan)?;
            key_channels.push(channel);
            key_fields.push(Field::new(field.name(), data_type.clone(), true));
            key_types.push(data_type);
        }

        let mut arguments = Vec::with_capacity(node.aggregates.len());
        let mut input_types = Vec::with_capacity(node.aggregates.len());
        let mut mask_channels = Vec::with_capacity(node.aggregates.len());
        for call in &node.aggregates {
            let func = &call.function;
            let (argument, input_type) = match func.inputs.as_slice() {
                [] => (AggArgument::None, None),
                [expr] => resolve_argument(arena, &slot_index, schema, *expr)?,
                _ => {
                    return Err(ExecError::invalid_plan(format!(
                        "aggregate {} takes at most one argument, got {}",
                        func.name,
                        func.inputs.len()
                    )));
                }
            };
            arguments.push(argument);
            input_types.push(input_type);

            let mask = match call.mask {
                Some(slot_id) => {
                    let channel = resolve_slot(&slot_index, slot_id, "aggregate mask")?;
                    let mask_type = schema.field(channel).data_type();
                    if mask_type != &DataType::Boolean {
                        return Err(ExecError::invalid_plan(format!(
                            "aggregate mask slot {} must be Boolean, got {:?}",
                            slot_id, mask_type
                        )));
                    }
                    Some(channel)
                }
                None => None,
            };
            mask_channels.push(mask);
        }

        let functions = node
            .aggregates
            .iter()
            .map(|call| call.function.clone())
            .collect::<Vec<_>>();
        let kernels = agg::build_kernel_set(&functions, &input_types, !node.step.is_raw_input())
            .map_err(ExecError::InvalidPlan)?;

        let expected_slots = node.group_by.len() + node.aggregates.len();
        if node.output_slots.len() != expected_slots {
            return Err(ExecError::invalid_plan(format!(
                "streaming aggregation expects {} output slots, got {}",
                expected_slots,
                node.output_slots.len()
            )));
        }
        let output_intermediate = node.step.is_partial_output();
        let mut fields = key_fields;
        for (idx, func) in functions.iter().enumerate() {
            fields.push(Field::new(
                func.name.as_str(),
                kernels.output_type(idx, output_intermediate),
                true,
            ));
        }
        let fields = fields
            .into_iter()
            .zip(node.output_slots.iter())
            .map(|(field, slot_id)| field_with_slot_id(field, *slot_id))
            .collect::<Vec<_>>();

        let output_batch_rows = node
            .output_batch_rows
            .unwrap_or_else(config::streaming_agg_output_batch_rows)
            .max(1);

        let plan = StreamingAggregatePlan {
            key_channels,
            key_types,
            arguments,
            mask_channels,
            kernels,
            step: node.step,
            output_schema: Arc::new(Schema::new(fields)),
            output_batch_rows,
            function_names: functions.into_iter().map(|f| f.name).collect(),
        };
        debug!(
            "{} created: keys={:?} functions={:?} step={:?} output_batch_rows={}",
            name, plan.key_types, plan.function_names, plan.step, plan.output_batch_rows
        );
        Ok(Self {
            name,
            plan: Arc::new(plan),
        })
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.output_schema)
    }
}

fn resolve_argument(
    arena: &ExprArena,
    slot_index: &HashMap<SlotId, usize>,
    schema: &Schema,
    expr: ExprId,
) -> ExecResult<(AggArgument, Option<DataType>)> {
    match arena.node(expr) {
        Some(ExprNode::SlotId(slot_id)) => {
            let channel = resolve_slot(slot_index, *slot_id, "aggregate argument")?;
            let data_type = decoded_key_type(schema.field(channel).data_type());
            Ok((AggArgument::Column(channel), Some(data_type)))
        }
        Some(ExprNode::Literal(value)) => {
            let data_type = match arena.data_type(expr) {
                Some(DataType::Null) | None => value.data_type(),
                Some(declared) => declared.clone(),
            };
            if data_type == DataType::Null {
                return Err(ExecError::invalid_plan(
                    "aggregate argument literal NULL needs a declared type",
                ));
            }
            Ok((
                AggArgument::Constant {
                    value: value.clone(),
                    data_type: data_type.clone(),
                },
                Some(data_type),
            ))
        }
        None => Err(ExecError::invalid_plan(format!(
            "aggregate argument expression {:?} not found",
            expr
        ))),
    }
}

impl OperatorFactory for StreamingAggregateProcessorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, _driver_id: i32) -> Box<dyn Operator> {
        Box::new(self.new_operator())
    }
}

impl StreamingAggregateProcessorFactory {
    fn new_operator(&self) -> StreamingAggregateOperator {
        StreamingAggregateOperator {
            name: self.name.clone(),
            masks: AggregationMasks::new(self.plan.mask_channels.clone()),
            constants: vec![None; self.plan.arguments.len()],
            plan: Arc::clone(&self.plan),
            rows: None,
            kernels: Vec::new(),
            mem_tracker: None,
            groups: GroupBuffer::default(),
            row_groups: Vec::new(),
            carry: None,
            input: None,
            no_more_input: false,
            batches_emitted: 0,
            rows_emitted: 0,
        }
    }
}

/// Last key of the previous chunk and the group it belongs to, still open.
struct CarryOver {
    /// One-row slices of the decoded key columns.
    last_key: Vec<ArrayRef>,
    group: GroupHandle,
}

struct StreamingAggregateOperator {
    name: String,
    plan: Arc<StreamingAggregatePlan>,
    rows: Option<RowContainer>,
    kernels: Vec<AggKernelEntry>,
    mem_tracker: Option<Arc<MemTracker>>,
    masks: AggregationMasks,
    groups: GroupBuffer,
    /// Group of each row of the chunk being processed.
    row_groups: Vec<GroupHandle>,
    carry: Option<CarryOver>,
    /// Materialized constant arguments, by aggregate position.
    constants: Vec<Option<ArrayRef>>,
    input: Option<Chunk>,
    no_more_input: bool,
    batches_emitted: usize,
    rows_emitted: usize,
}

impl Operator for StreamingAggregateOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        let rows_tracker = MemTracker::new_child("RowContainer", &tracker);
        if let Some(rows) = self.rows.as_mut() {
            rows.set_mem_tracker(Arc::clone(&rows_tracker));
        }
        self.mem_tracker = Some(rows_tracker);
    }

    fn prepare(&mut self) -> ExecResult<()> {
        if self.rows.is_some() {
            return Ok(());
        }
        let mut rows = RowContainer::new(
            &self.plan.key_types,
            &self.plan.kernels.accumulator_storages(),
        )?;
        if let Some(tracker) = self.mem_tracker.as_ref() {
            rows.set_mem_tracker(Arc::clone(tracker));
        }
        self.kernels = self.plan.kernels.bind(&rows);
        self.rows = Some(rows);
        Ok(())
    }

    fn close(&mut self) -> ExecResult<()> {
        let allocated = self.groups.capacity();
        let accounted = self.rows.as_ref().map_or(0, RowContainer::accounted_bytes);
        if let Some(rows) = self.rows.as_mut() {
            rows.clear();
        }
        self.groups.clear();
        self.row_groups.clear();
        self.carry = None;
        self.input = None;
        debug!(
            "{} closed: rows_allocated={} bytes_accounted={} batches_emitted={} rows_emitted={}",
            self.name, allocated, accounted, self.batches_emitted, self.rows_emitted
        );
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.no_more_input && self.input.is_none() && self.groups.open_count() == 0
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for StreamingAggregateOperator {
    fn need_input(&self) -> bool {
        !self.no_more_input && self.input.is_none()
    }

    fn has_output(&self) -> bool {
        self.input.is_some() || (self.no_more_input && self.groups.open_count() > 0)
    }

    fn push_chunk(&mut self, _state: &RuntimeState, chunk: Chunk) -> ExecResult<()> {
        if self.no_more_input {
            return Err(ExecError::internal(format!(
                "{} received input after set_finishing",
                self.name
            )));
        }
        if self.input.is_some() {
            return Err(ExecError::internal(format!(
                "{} received input while a chunk is still buffered",
                self.name
            )));
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.input = Some(chunk);
        Ok(())
    }

    fn pull_chunk(&mut self, _state: &RuntimeState) -> ExecResult<Option<Chunk>> {
        let batch_rows = self.plan.output_batch_rows;
        if let Some(chunk) = self.input.take() {
            self.add_input(&chunk)?;
            if self.groups.open_count() > batch_rows {
                return self.create_output(batch_rows).map(Some);
            }
            return Ok(None);
        }
        let open = self.groups.open_count();
        if self.no_more_input && open > 0 {
            return self.create_output(open.min(batch_rows)).map(Some);
        }
        Ok(None)
    }

    fn set_finishing(&mut self, _state: &RuntimeState) -> ExecResult<()> {
        self.no_more_input = true;
        Ok(())
    }
}

impl StreamingAggregateOperator {
    fn add_input(&mut self, chunk: &Chunk) -> ExecResult<()> {
        let num_rows = chunk.len();
        self.masks.add_input(chunk, num_rows)?;

        let mut keys = Vec::with_capacity(self.plan.key_channels.len());
        for channel in &self.plan.key_channels {
            keys.push(decode_key_array(input_column(chunk, *channel)?)?);
        }

        let num_prev_groups = self.groups.open_count();
        self.assign_groups(&keys, num_rows)?;

        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| ExecError::internal("streaming aggregate not prepared"))?;
        let new_groups = self.groups.opened_since(num_prev_groups);
        for entry in &self.kernels {
            entry.initialize_new_groups(rows, new_groups);
        }

        self.evaluate_aggregates(chunk)?;

        let last = num_rows - 1;
        self.carry = Some(CarryOver {
            last_key: keys.iter().map(|key| key.slice(last, 1)).collect(),
            group: self.row_groups[last],
        });
        trace!(
            "{} consumed chunk: rows={} new_groups={} open_groups={}",
            self.name,
            num_rows,
            self.groups.open_count() - num_prev_groups,
            self.groups.open_count()
        );
        Ok(())
    }

    fn assign_groups(&mut self, keys: &[ArrayRef], num_rows: usize) -> ExecResult<()> {
        let views = build_group_key_views(keys)?;
        self.row_groups.clear();
        self.row_groups.reserve(num_rows);

        let mut start = 0;
        if let Some(carry) = self.carry.as_ref().filter(|_| self.groups.open_count() > 0) {
            let prev_views = build_group_key_views(&carry.last_key)?;
            while start < num_rows && keys_equal(&prev_views, 0, &views, start) {
                self.row_groups.push(carry.group);
                start += 1;
            }
        }
        if start == num_rows {
            return Ok(());
        }

        let mut group = self.open_group(&views, start)?;
        let mut group_start = start;
        self.row_groups.push(group);
        for row in start + 1..num_rows {
            if !keys_equal(&views, group_start, &views, row) {
                group = self.open_group(&views, row)?;
                group_start = row;
            }
            self.row_groups.push(group);
        }
        Ok(())
    }

    /// Opens a group for the key at `row`, reusing an emitted row when one is free.
    fn open_group(
        &mut self,
        keys: &[GroupKeyArrayView<'_>],
        row: usize,
    ) -> ExecResult<GroupHandle> {
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| ExecError::internal("streaming aggregate not prepared"))?;
        let group = match self.groups.take_free() {
            Some(group) => {
                rows.initialize_row(group);
                group
            }
            None => {
                let group = rows.new_row()?;
                self.groups.push_new(group);
                group
            }
        };
        for (key_index, key) in keys.iter().enumerate() {
            rows.store(key, row, group, key_index);
        }
        Ok(group)
    }

    fn evaluate_aggregates(&mut self, chunk: &Chunk) -> ExecResult<()> {
        let arguments = self.eval_agg_arrays(chunk)?;
        let all_rows = SelectivityVector::new_all(chunk.len());
        let raw_input = self.plan.step.is_raw_input();
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| ExecError::internal("streaming aggregate not prepared"))?;
        for (idx, (entry, argument)) in self.kernels.iter().zip(arguments.iter()).enumerate() {
            let active = self.masks.active_rows(idx).unwrap_or(&all_rows);
            if raw_input {
                let view = entry.build_input_view(argument)?;
                entry.add_raw_input(rows, &self.row_groups, active, &view)?;
            } else {
                let view = entry.build_merge_view(argument)?;
                entry.add_intermediate_results(rows, &self.row_groups, active, &view)?;
            }
        }
        Ok(())
    }

    fn eval_agg_arrays(&mut self, chunk: &Chunk) -> ExecResult<Vec<Option<ArrayRef>>> {
        let num_rows = chunk.len();
        let mut arrays = Vec::with_capacity(self.plan.arguments.len());
        for (argument, cached) in self.plan.arguments.iter().zip(self.constants.iter_mut()) {
            let array = match argument {
                AggArgument::None => None,
                AggArgument::Column(channel) => {
                    Some(decode_key_array(input_column(chunk, *channel)?)?)
                }
                AggArgument::Constant { value, data_type } => match cached {
                    Some(array) if array.len() >= num_rows => Some(array.slice(0, num_rows)),
                    _ => {
                        let array = eval_literal(value, data_type, num_rows)?;
                        *cached = Some(Arc::clone(&array));
                        Some(array)
                    }
                },
            };
            arrays.push(array);
        }
        Ok(arrays)
    }

    /// Emits the `num_groups` oldest open groups and frees their rows for reuse.
    fn create_output(&mut self, num_groups: usize) -> ExecResult<Chunk> {
        let rows = self
            .rows
            .as_ref()
            .ok_or_else(|| ExecError::internal("streaming aggregate not prepared"))?;
        let groups = &self.groups.open_groups()[..num_groups];
        let mut columns = Vec::with_capacity(self.plan.output_schema.fields().len());
        for key_index in 0..self.plan.key_types.len() {
            columns.push(rows.extract_column(groups, key_index)?);
        }
        let output_intermediate = self.plan.step.is_partial_output();
        for entry in &self.kernels {
            let column = if output_intermediate {
                entry.extract_accumulators(rows, groups)?
            } else {
                entry.extract_values(rows, groups)?
            };
            columns.push(column);
        }

        let schema = Arc::clone(&self.plan.output_schema);
        let batch = if columns.is_empty() {
            let options = RecordBatchOptions::new().with_row_count(Some(num_groups));
            RecordBatch::try_new_with_options(schema, columns, &options)?
        } else {
            RecordBatch::try_new(schema, columns)?
        };
        self.groups.release_front(num_groups);
        self.batches_emitted += 1;
        self.rows_emitted += num_groups;
        trace!(
            "{} emitted batch: rows={} open_groups={}",
            self.name,
            num_groups,
            self.groups.open_count()
        );
        Ok(Chunk::try_new(batch)?)
    }
}

fn input_column(chunk: &Chunk, channel: usize) -> ExecResult<&ArrayRef> {
    chunk.columns().get(channel).ok_or_else(|| {
        ExecError::internal(format!(
            "input column {} out of range (num_columns={})",
            channel,
            chunk.columns().len()
        ))
    })
}
