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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tempfile::TempDir;

use streamagg::common::error::ExecResult;
use streamagg::common::ids::SlotId;
use streamagg::exec::chunk::{Chunk, field_with_slot_id};
use streamagg::exec::expr::{ExprArena, ExprId, ExprNode, LiteralValue};
use streamagg::exec::node::aggregate::{
    AggFunction, AggregateCall, AggregationStep, StreamingAggregateNode,
};
use streamagg::exec::operators::StreamingAggregateProcessorFactory;
use streamagg::exec::pipeline::driver::drive_processor;
use streamagg::exec::pipeline::operator_factory::OperatorFactory;
use streamagg::runtime::mem_tracker::MemTracker;
use streamagg::runtime::runtime_state::RuntimeState;
use streamagg::streamagg_config;

pub const KEY_SLOT: SlotId = SlotId::new(1);
pub const VALUE_SLOT: SlotId = SlotId::new(2);
pub const MASK_SLOT: SlotId = SlotId::new(3);

/// Test configuration written to a temporary directory.
pub struct TestConfig {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestConfig {
    pub fn new(content: &str) -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("test_streamagg.toml");
        std::fs::write(&config_path, content)?;
        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    pub fn load_config(&self) -> anyhow::Result<&'static streamagg_config::StreamAggConfig> {
        streamagg_config::init_from_path(&self.config_path)
    }
}

/// `(key Int64, value Int64, mask Boolean)` input schema.
pub fn key_value_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("k", DataType::Int64, true), KEY_SLOT),
        field_with_slot_id(Field::new("v", DataType::Int64, true), VALUE_SLOT),
        field_with_slot_id(Field::new("m", DataType::Boolean, true), MASK_SLOT),
    ]))
}

/// One input chunk; the mask column defaults to all true.
pub fn key_value_chunk(
    keys: Vec<Option<i64>>,
    values: Vec<Option<i64>>,
    mask: Option<Vec<Option<bool>>>,
) -> Chunk {
    let mask = mask.unwrap_or_else(|| vec![Some(true); keys.len()]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(keys)),
        Arc::new(Int64Array::from(values)),
        Arc::new(BooleanArray::from(mask)),
    ];
    let batch = RecordBatch::try_new(key_value_schema(), columns).expect("record batch");
    Chunk::try_new(batch).expect("chunk")
}

/// Splits `(key, value)` pairs into chunks at the given row offsets.
pub fn split_into_chunks(rows: &[(i64, i64)], cuts: &[usize]) -> Vec<Chunk> {
    let mut bounds = vec![0];
    bounds.extend(cuts.iter().copied().filter(|c| *c > 0 && *c < rows.len()));
    bounds.push(rows.len());
    bounds.dedup();
    bounds
        .windows(2)
        .map(|w| {
            let part = &rows[w[0]..w[1]];
            key_value_chunk(
                part.iter().map(|(k, _)| Some(*k)).collect(),
                part.iter().map(|(_, v)| Some(*v)).collect(),
                None,
            )
        })
        .collect()
}

/// Builds a streaming aggregation node grouped by [`KEY_SLOT`].
pub struct PlanBuilder {
    arena: ExprArena,
    node: StreamingAggregateNode,
}

impl PlanBuilder {
    pub fn new(step: AggregationStep) -> Self {
        Self::with_schema(key_value_schema(), step)
    }

    pub fn with_schema(input_schema: SchemaRef, step: AggregationStep) -> Self {
        let mut arena = ExprArena::default();
        let key = arena.push(ExprNode::SlotId(KEY_SLOT));
        Self {
            arena,
            node: StreamingAggregateNode {
                node_id: 7,
                input_schema,
                group_by: vec![key],
                aggregates: Vec::new(),
                step,
                ignore_null_keys: false,
                output_slots: Vec::new(),
                output_batch_rows: None,
            },
        }
    }

    pub fn column(&mut self, slot_id: SlotId) -> ExprId {
        self.arena.push(ExprNode::SlotId(slot_id))
    }

    pub fn literal(&mut self, value: LiteralValue, data_type: DataType) -> ExprId {
        self.arena.push_typed(ExprNode::Literal(value), data_type)
    }

    pub fn no_group_by(mut self) -> Self {
        self.node.group_by.clear();
        self
    }

    /// Aggregate over the value column, or COUNT(*) when `name` is `count_star`.
    pub fn agg(mut self, name: &str) -> Self {
        let (name, inputs) = if name == "count_star" {
            ("count", Vec::new())
        } else {
            (name, vec![self.column(VALUE_SLOT)])
        };
        self.call(AggregateCall::new(function(name, inputs)))
    }

    pub fn call(mut self, call: AggregateCall) -> Self {
        self.node.aggregates.push(call);
        self
    }

    pub fn batch_rows(mut self, rows: usize) -> Self {
        self.node.output_batch_rows = Some(rows);
        self
    }

    pub fn node_mut(&mut self) -> &mut StreamingAggregateNode {
        &mut self.node
    }

    pub fn build(mut self) -> (StreamingAggregateNode, ExprArena) {
        let num_outputs = self.node.group_by.len() + self.node.aggregates.len();
        if self.node.output_slots.is_empty() {
            self.node.output_slots = (0..num_outputs as u32)
                .map(|i| SlotId::new(100 + i))
                .collect();
        }
        (self.node, self.arena)
    }

    pub fn factory(self) -> ExecResult<StreamingAggregateProcessorFactory> {
        let (node, arena) = self.build();
        StreamingAggregateProcessorFactory::try_new(&node, &arena)
    }

    pub fn run(self, input: Vec<Chunk>) -> ExecResult<Vec<Chunk>> {
        let state = RuntimeState::new(MemTracker::new_root("test"));
        self.run_with_state(&state, input)
    }

    pub fn run_with_state(self, state: &RuntimeState, input: Vec<Chunk>) -> ExecResult<Vec<Chunk>> {
        let factory = self.factory()?;
        let mut operator = factory.create(1, 0);
        drive_processor(operator.as_mut(), state, input)
    }
}

pub fn function(name: &str, inputs: Vec<ExprId>) -> AggFunction {
    AggFunction {
        name: name.to_string(),
        inputs,
        types: None,
    }
}

/// Column `idx` of every output chunk, concatenated, as nullable i64s.
pub fn int_column(outputs: &[Chunk], idx: usize) -> Vec<Option<i64>> {
    outputs
        .iter()
        .flat_map(|chunk| {
            let array = chunk.columns()[idx]
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("int64 column");
            (0..array.len())
                .map(|row| (!array.is_null(row)).then(|| array.value(row)))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn float_column(outputs: &[Chunk], idx: usize) -> Vec<Option<f64>> {
    outputs
        .iter()
        .flat_map(|chunk| {
            let array = chunk.columns()[idx]
                .as_any()
                .downcast_ref::<Float64Array>()
                .expect("float64 column");
            (0..array.len())
                .map(|row| (!array.is_null(row)).then(|| array.value(row)))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn string_column(outputs: &[Chunk], idx: usize) -> Vec<Option<String>> {
    outputs
        .iter()
        .flat_map(|chunk| {
            let array = chunk.columns()[idx]
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("utf8 column");
            (0..array.len())
                .map(|row| (!array.is_null(row)).then(|| array.value(row).to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Chunk over an arbitrary slot-tagged schema.
pub fn chunk_from_columns(schema: SchemaRef, columns: Vec<ArrayRef>) -> Chunk {
    let batch = RecordBatch::try_new(schema, columns).expect("record batch");
    Chunk::try_new(batch).expect("chunk")
}

pub fn chunk_sizes(outputs: &[Chunk]) -> Vec<usize> {
    outputs.iter().map(Chunk::len).collect()
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}
