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

use arrow::array::{ArrayRef, Float64Array, Int64Array, StructArray};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, Fields};

use crate::exec::node::aggregate::AggFunction;
use crate::exec::row_container::{ColumnStorage, GroupHandle, RowColumn, RowContainer};
use crate::exec::selectivity::SelectivityVector;

use super::super::*;
use super::{AggKind, AggregateFunction};

pub(super) struct AvgAgg;

// Accumulator slot: f64 running sum, then i64 count.
const SUM_DELTA: usize = 0;
const COUNT_DELTA: usize = 8;

fn avg_intermediate_fields() -> Fields {
    Fields::from(vec![
        Field::new("sum", DataType::Float64, true),
        Field::new("count", DataType::Int64, true),
    ])
}

pub(super) fn avg_intermediate_type() -> DataType {
    DataType::Struct(avg_intermediate_fields())
}

fn is_avg_intermediate(data_type: &DataType) -> bool {
    let DataType::Struct(fields) = data_type else {
        return false;
    };
    fields.len() == 2
        && matches!(
            fields[0].data_type(),
            DataType::Float64 | DataType::Float32
        )
        && matches!(
            fields[1].data_type(),
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
}

fn avg_spec() -> AggSpec {
    AggSpec {
        kind: AggKind::Avg,
        output_type: DataType::Float64,
        intermediate_type: avg_intermediate_type(),
        count_all: false,
    }
}

fn accumulate(
    rows: &mut RowContainer,
    column: &RowColumn,
    group: GroupHandle,
    sum: f64,
    count: i64,
) -> Result<(), String> {
    let current_sum = rows.read::<f64>(group, column, SUM_DELTA);
    let current_count = rows.read::<i64>(group, column, COUNT_DELTA);
    let next_count = current_count
        .checked_add(count)
        .ok_or_else(|| "avg count overflow".to_string())?;
    rows.write::<f64>(group, column, SUM_DELTA, current_sum + sum);
    rows.write::<i64>(group, column, COUNT_DELTA, next_count);
    Ok(())
}

impl AggregateFunction for AvgAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "avg input type missing".to_string())?;
        if input_is_intermediate {
            if !is_avg_intermediate(data_type) {
                return Err(format!(
                    "avg intermediate input must be Struct{{sum, count}}, got {:?}",
                    data_type
                ));
            }
            return Ok(avg_spec());
        }
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64 => Ok(avg_spec()),
            other => Err(format!("avg unsupported input type: {:?}", other)),
        }
    }

    fn accumulator_storage(&self, kind: &AggKind) -> ColumnStorage {
        match kind {
            AggKind::Avg => ColumnStorage::Fixed(16),
            other => unreachable!("unexpected kind for avg: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "avg input missing".to_string())?;
        numeric_view(arr)
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "avg merge input missing".to_string())?;
        Ok(AggInputView::AvgState(AvgStateView::new(arr)?))
    }

    fn init_state(
        &self,
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        group: GroupHandle,
    ) {
        rows.write::<f64>(group, column, SUM_DELTA, 0.0);
        rows.write::<i64>(group, column, COUNT_DELTA, 0);
    }

    fn update_batch(
        &self,
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        match input {
            AggInputView::Int(view) => {
                for row in active.iter_selected() {
                    if let Some(v) = view.value_at(row) {
                        accumulate(rows, column, groups[row], v as f64, 1)?;
                    }
                }
            }
            AggInputView::Float(view) => {
                for row in active.iter_selected() {
                    if let Some(v) = view.value_at(row) {
                        accumulate(rows, column, groups[row], v, 1)?;
                    }
                }
            }
            _ => return Err("avg batch input type mismatch".to_string()),
        }
        Ok(())
    }

    fn merge_batch(
        &self,
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        let AggInputView::AvgState(view) = input else {
            return Err("avg merge input type mismatch".to_string());
        };
        for row in active.iter_selected() {
            if let Some((sum, count)) = view.value_at(row) {
                accumulate(rows, column, groups[row], sum, count)?;
            }
        }
        Ok(())
    }

    fn build_array(
        &self,
        spec: &AggSpec,
        rows: &RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        let states = groups
            .iter()
            .map(|g| {
                (
                    rows.read::<f64>(*g, column, SUM_DELTA),
                    rows.read::<i64>(*g, column, COUNT_DELTA),
                )
            })
            .collect::<Vec<_>>();
        if output_intermediate {
            let sums = states
                .iter()
                .map(|(sum, count)| (*count > 0).then_some(*sum))
                .collect::<Float64Array>();
            let counts = states
                .iter()
                .map(|(_, count)| (*count > 0).then_some(*count))
                .collect::<Int64Array>();
            let validity = NullBuffer::from(
                states
                    .iter()
                    .map(|(_, count)| *count > 0)
                    .collect::<Vec<_>>(),
            );
            let fields = match &spec.intermediate_type {
                DataType::Struct(fields) => fields.clone(),
                _ => avg_intermediate_fields(),
            };
            let array = StructArray::try_new(
                fields,
                vec![Arc::new(sums) as ArrayRef, Arc::new(counts) as ArrayRef],
                Some(validity),
            )
            .map_err(|e| format!("build avg intermediate failed: {}", e))?;
            return Ok(Arc::new(array));
        }
        let values = states
            .iter()
            .map(|(sum, count)| (*count > 0).then(|| *sum / *count as f64))
            .collect::<Float64Array>();
        Ok(Arc::new(values))
    }
}
