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
use crate::common::ids::SlotId;
use crate::exec::expr::ExprId;
use arrow::datatypes::{DataType, SchemaRef};

/// Position of an aggregation in a multi-stage plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationStep {
    /// Raw rows in, accumulator states out.
    Partial,
    /// Accumulator states in, merged accumulator states out.
    Intermediate,
    /// Accumulator states in, final values out.
    Final,
    /// Raw rows in, final values out.
    Single,
}

impl AggregationStep {
    /// Whether output columns hold accumulator states rather than final values.
    pub fn is_partial_output(self) -> bool {
        matches!(self, Self::Partial | Self::Intermediate)
    }

    /// Whether aggregate arguments are raw input rather than accumulator states.
    pub fn is_raw_input(self) -> bool {
        matches!(self, Self::Partial | Self::Single)
    }
}

#[derive(Clone, Debug)]
pub struct AggTypeSignature {
    pub intermediate_type: Option<DataType>,
    pub output_type: Option<DataType>,
}

#[derive(Clone, Debug)]
pub struct AggFunction {
    /// Lowercased function name (e.g. "sum", "count").
    pub name: String,
    /// Input expressions for aggregate arguments; empty means COUNT(*)-style aggregate.
    pub inputs: Vec<ExprId>,
    pub types: Option<AggTypeSignature>,
}

#[derive(Clone, Debug)]
pub struct SortingKey {
    pub expr: ExprId,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// One aggregate of a streaming aggregation node.
#[derive(Clone, Debug)]
pub struct AggregateCall {
    pub function: AggFunction,
    /// Boolean input slot selecting which rows feed this aggregate; nulls count as false.
    pub mask: Option<SlotId>,
    /// Ordering of arguments within a group. Not executable by streaming aggregation.
    pub sorting_keys: Vec<SortingKey>,
    /// DISTINCT arguments. Not executable by streaming aggregation.
    pub distinct: bool,
}

impl AggregateCall {
    pub fn new(function: AggFunction) -> Self {
        Self {
            function,
            mask: None,
            sorting_keys: Vec::new(),
            distinct: false,
        }
    }

    pub fn with_mask(mut self, mask: SlotId) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// Aggregation over input already clustered by `group_by`.
#[derive(Clone, Debug)]
pub struct StreamingAggregateNode {
    pub node_id: i32,
    pub input_schema: SchemaRef,
    pub group_by: Vec<ExprId>,
    pub aggregates: Vec<AggregateCall>,
    pub step: AggregationStep,
    /// Drop rows whose grouping key contains a null. Not executable by streaming aggregation.
    pub ignore_null_keys: bool,
    /// Grouping-key slots followed by one slot per aggregate.
    pub output_slots: Vec<SlotId>,
    /// Maximum rows per output chunk; falls back to the configured default.
    pub output_batch_rows: Option<usize>,
}
