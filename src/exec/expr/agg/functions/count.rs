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

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;
use crate::exec::row_container::{ColumnStorage, GroupHandle, RowColumn, RowContainer};
use crate::exec::selectivity::SelectivityVector;

use super::super::*;
use super::{AggKind, AggregateFunction};

pub(super) struct CountAgg;

fn count_fallback(count_all: bool) -> AggSpec {
    AggSpec {
        kind: AggKind::Count,
        output_type: DataType::Int64,
        intermediate_type: DataType::Int64,
        count_all,
    }
}

fn add_count(
    rows: &mut RowContainer,
    column: &RowColumn,
    group: GroupHandle,
    delta: i64,
) -> Result<(), String> {
    let current = rows.read::<i64>(group, column, 0);
    let next = current
        .checked_add(delta)
        .ok_or_else(|| "count overflow".to_string())?;
    rows.write::<i64>(group, column, 0, next);
    Ok(())
}

impl AggregateFunction for CountAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        if input_is_intermediate {
            match input_type {
                Some(DataType::Int64) => {}
                other => {
                    return Err(format!(
                        "count intermediate input must be Int64, got {:?}",
                        other
                    ));
                }
            }
        }
        Ok(count_fallback(input_type.is_none()))
    }

    fn accumulator_storage(&self, kind: &AggKind) -> ColumnStorage {
        match kind {
            AggKind::Count => ColumnStorage::Fixed(8),
            other => unreachable!("unexpected kind for count: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        if spec.count_all {
            Ok(AggInputView::None)
        } else {
            let arr = array
                .as_ref()
                .ok_or_else(|| "count input missing".to_string())?;
            Ok(AggInputView::Any(arr))
        }
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "count input missing".to_string())?;
        Ok(AggInputView::Int(IntArrayView::new(arr)?))
    }

    fn init_state(
        &self,
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        group: GroupHandle,
    ) {
        rows.write::<i64>(group, column, 0, 0);
        rows.set_null(group, column, false);
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
            AggInputView::None => {
                for row in active.iter_selected() {
                    add_count(rows, column, groups[row], 1)?;
                }
            }
            AggInputView::Any(array) => {
                for row in active.iter_selected() {
                    if !array.is_null(row) {
                        add_count(rows, column, groups[row], 1)?;
                    }
                }
            }
            _ => return Err("count batch input type mismatch".to_string()),
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
        let AggInputView::Int(view) = input else {
            return Err("count merge input type mismatch".to_string());
        };
        for row in active.iter_selected() {
            if let Some(v) = view.value_at(row) {
                add_count(rows, column, groups[row], v)?;
            }
        }
        Ok(())
    }

    fn build_array(
        &self,
        _spec: &AggSpec,
        rows: &RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        _output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        let values = groups
            .iter()
            .map(|g| rows.read::<i64>(*g, column, 0))
            .collect::<Vec<_>>();
        Ok(Arc::new(Int64Array::from(values)))
    }
}
