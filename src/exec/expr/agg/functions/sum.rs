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
use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;
use crate::exec::row_container::{ColumnStorage, GroupHandle, RowColumn, RowContainer};
use crate::exec::selectivity::SelectivityVector;

use super::super::*;
use super::common;
use super::{AggKind, AggregateFunction};

pub(super) struct SumAgg;

fn sum_spec_from_type(data_type: &DataType) -> Result<AggSpec, String> {
    match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Ok(AggSpec {
            kind: AggKind::SumInt,
            output_type: DataType::Int64,
            intermediate_type: DataType::Int64,
            count_all: false,
        }),
        DataType::Float32 | DataType::Float64 => Ok(AggSpec {
            kind: AggKind::SumFloat,
            output_type: DataType::Float64,
            intermediate_type: DataType::Float64,
            count_all: false,
        }),
        other => Err(format!("sum does not support input type {:?}", other)),
    }
}

fn sum_view<'a>(array: &'a Option<ArrayRef>) -> Result<AggInputView<'a>, String> {
    let arr = array
        .as_ref()
        .ok_or_else(|| "sum input missing".to_string())?;
    numeric_view(arr)
}

impl AggregateFunction for SumAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "sum input type missing".to_string())?;
        sum_spec_from_type(data_type)
    }

    fn accumulator_storage(&self, kind: &AggKind) -> ColumnStorage {
        match kind {
            AggKind::SumInt | AggKind::SumFloat => ColumnStorage::Fixed(8),
            other => unreachable!("unexpected kind for sum: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        sum_view(array)
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        sum_view(array)
    }

    fn init_state(
        &self,
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        group: GroupHandle,
    ) {
        rows.set_null(group, column, true);
    }

    fn update_batch(
        &self,
        spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        match (&spec.kind, input) {
            (AggKind::SumInt, AggInputView::Int(view)) => {
                for row in active.iter_selected() {
                    let Some(v) = view.value_at(row) else {
                        continue;
                    };
                    let group = groups[row];
                    let next = if rows.is_null(group, column) {
                        v
                    } else {
                        rows.read::<i64>(group, column, 0)
                            .checked_add(v)
                            .ok_or_else(|| "sum(int) overflow".to_string())?
                    };
                    rows.write::<i64>(group, column, 0, next);
                    rows.set_null(group, column, false);
                }
            }
            (AggKind::SumFloat, AggInputView::Float(view)) => {
                for row in active.iter_selected() {
                    let Some(v) = view.value_at(row) else {
                        continue;
                    };
                    let group = groups[row];
                    let next = if rows.is_null(group, column) {
                        v
                    } else {
                        rows.read::<f64>(group, column, 0) + v
                    };
                    rows.write::<f64>(group, column, 0, next);
                    rows.set_null(group, column, false);
                }
            }
            _ => return Err("sum batch input type mismatch".to_string()),
        }
        Ok(())
    }

    fn merge_batch(
        &self,
        spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        // partial sums merge the same way raw values accumulate
        self.update_batch(spec, rows, column, groups, active, input)
    }

    fn build_array(
        &self,
        spec: &AggSpec,
        rows: &RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        let data_type = if output_intermediate {
            &spec.intermediate_type
        } else {
            &spec.output_type
        };
        let present = |g: &GroupHandle| !rows.is_null(*g, column);
        match spec.kind {
            AggKind::SumInt => common::build_int_array(
                data_type,
                groups
                    .iter()
                    .map(|g| present(g).then(|| rows.read::<i64>(*g, column, 0)))
                    .collect(),
            ),
            AggKind::SumFloat => common::build_float_array(
                data_type,
                groups
                    .iter()
                    .map(|g| present(g).then(|| rows.read::<f64>(*g, column, 0)))
                    .collect(),
            ),
            ref other => Err(format!("unexpected kind for sum: {:?}", other)),
        }
    }
}
