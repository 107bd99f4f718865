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
use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array,
    Int64Array, StringArray,
};
use arrow::datatypes::DataType;

use crate::exec::row_container::{ColumnStorage, GroupHandle, RowColumn, RowContainer};
use crate::exec::selectivity::SelectivityVector;

use super::super::*;
use super::{AggKind, ValueType};

pub(super) fn value_type_of(data_type: &DataType) -> Option<ValueType> {
    match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            Some(ValueType::Int)
        }
        DataType::Float32 | DataType::Float64 => Some(ValueType::Float),
        DataType::Boolean => Some(ValueType::Bool),
        DataType::Utf8 => Some(ValueType::Utf8),
        _ => None,
    }
}

/// Spec shared by min, max and any_value: state, intermediate and output all use the input type.
pub(super) fn value_spec(
    name: &str,
    input_type: Option<&DataType>,
    kind: fn(ValueType) -> AggKind,
) -> Result<AggSpec, String> {
    let data_type = input_type.ok_or_else(|| format!("{} input type missing", name))?;
    let value_type = value_type_of(data_type)
        .ok_or_else(|| format!("{} does not support input type {:?}", name, data_type))?;
    Ok(AggSpec {
        kind: kind(value_type),
        output_type: data_type.clone(),
        intermediate_type: data_type.clone(),
        count_all: false,
    })
}

pub(super) fn value_storage(value_type: ValueType) -> ColumnStorage {
    match value_type {
        ValueType::Int | ValueType::Float => ColumnStorage::Fixed(8),
        ValueType::Bool => ColumnStorage::Fixed(1),
        ValueType::Utf8 => ColumnStorage::VarLen,
    }
}

pub(super) fn value_view<'a>(
    name: &str,
    value_type: ValueType,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    let arr = array
        .as_ref()
        .ok_or_else(|| format!("{} input missing", name))?;
    match value_type {
        ValueType::Int => Ok(AggInputView::Int(IntArrayView::new(arr)?)),
        ValueType::Float => Ok(AggInputView::Float(FloatArrayView::new(arr)?)),
        ValueType::Bool => arr
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(AggInputView::Bool)
            .ok_or_else(|| "failed to downcast to BooleanArray".to_string()),
        ValueType::Utf8 => arr
            .as_any()
            .downcast_ref::<StringArray>()
            .map(AggInputView::Utf8)
            .ok_or_else(|| "failed to downcast to StringArray".to_string()),
    }
}

/// How a value-selecting aggregate treats a candidate once a value is stored.
#[derive(Clone, Copy, Debug)]
pub(super) enum ValuePick {
    Min,
    Max,
    First,
}

impl ValuePick {
    fn replaces(self, candidate_vs_stored: Ordering) -> bool {
        match self {
            ValuePick::Min => candidate_vs_stored == Ordering::Less,
            ValuePick::Max => candidate_vs_stored == Ordering::Greater,
            ValuePick::First => false,
        }
    }
}

/// Folds the active non-null input values into the value state of their groups.
///
/// A null accumulator bit means no value has been seen yet.
pub(super) fn fold_values(
    pick: ValuePick,
    rows: &mut RowContainer,
    column: &RowColumn,
    groups: &[GroupHandle],
    active: &SelectivityVector,
    input: &AggInputView,
) -> Result<(), String> {
    match input {
        AggInputView::Int(view) => {
            for row in active.iter_selected() {
                let Some(v) = view.value_at(row) else {
                    continue;
                };
                let group = groups[row];
                if rows.is_null(group, column)
                    || pick.replaces(v.cmp(&rows.read::<i64>(group, column, 0)))
                {
                    rows.write::<i64>(group, column, 0, v);
                    rows.set_null(group, column, false);
                }
            }
        }
        AggInputView::Float(view) => {
            for row in active.iter_selected() {
                let Some(v) = view.value_at(row) else {
                    continue;
                };
                let group = groups[row];
                if rows.is_null(group, column)
                    || pick.replaces(v.total_cmp(&rows.read::<f64>(group, column, 0)))
                {
                    rows.write::<f64>(group, column, 0, v);
                    rows.set_null(group, column, false);
                }
            }
        }
        AggInputView::Bool(arr) => {
            for row in active.iter_selected() {
                if arr.is_null(row) {
                    continue;
                }
                let v = arr.value(row);
                let group = groups[row];
                if rows.is_null(group, column)
                    || pick.replaces(v.cmp(&(rows.read::<u8>(group, column, 0) != 0)))
                {
                    rows.write::<u8>(group, column, 0, u8::from(v));
                    rows.set_null(group, column, false);
                }
            }
        }
        AggInputView::Utf8(arr) => {
            for row in active.iter_selected() {
                if arr.is_null(row) {
                    continue;
                }
                let v = arr.value(row).as_bytes();
                let group = groups[row];
                if rows.is_null(group, column) || pick.replaces(v.cmp(rows.varlen(group, column)))
                {
                    rows.set_varlen(group, column, v);
                    rows.set_null(group, column, false);
                }
            }
        }
        _ => return Err("value aggregate input type mismatch".to_string()),
    }
    Ok(())
}

pub(super) fn build_value_array(
    value_type: ValueType,
    data_type: &DataType,
    rows: &RowContainer,
    column: &RowColumn,
    groups: &[GroupHandle],
) -> Result<ArrayRef, String> {
    let present = |g: &GroupHandle| !rows.is_null(*g, column);
    match value_type {
        ValueType::Int => build_int_array(
            data_type,
            groups
                .iter()
                .map(|g| present(g).then(|| rows.read::<i64>(*g, column, 0)))
                .collect(),
        ),
        ValueType::Float => build_float_array(
            data_type,
            groups
                .iter()
                .map(|g| present(g).then(|| rows.read::<f64>(*g, column, 0)))
                .collect(),
        ),
        ValueType::Bool => Ok(Arc::new(
            groups
                .iter()
                .map(|g| present(g).then(|| rows.read::<u8>(*g, column, 0) != 0))
                .collect::<BooleanArray>(),
        )),
        ValueType::Utf8 => {
            let values = groups
                .iter()
                .map(|g| {
                    present(g)
                        .then(|| std::str::from_utf8(rows.varlen(*g, column)))
                        .transpose()
                })
                .collect::<Result<Vec<Option<&str>>, _>>()
                .map_err(|e| format!("invalid utf8 in aggregate state: {}", e))?;
            Ok(Arc::new(StringArray::from(values)))
        }
    }
}

/// Narrows widened integer values back to `data_type`.
pub(super) fn build_int_array(
    data_type: &DataType,
    values: Vec<Option<i64>>,
) -> Result<ArrayRef, String> {
    let array: ArrayRef = match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(values)),
        DataType::Int32 => Arc::new(
            values
                .into_iter()
                .map(|v| v.map(|v| v as i32))
                .collect::<Int32Array>(),
        ),
        DataType::Int16 => Arc::new(
            values
                .into_iter()
                .map(|v| v.map(|v| v as i16))
                .collect::<Int16Array>(),
        ),
        DataType::Int8 => Arc::new(
            values
                .into_iter()
                .map(|v| v.map(|v| v as i8))
                .collect::<Int8Array>(),
        ),
        other => return Err(format!("unsupported int output type: {:?}", other)),
    };
    Ok(array)
}

pub(super) fn build_float_array(
    data_type: &DataType,
    values: Vec<Option<f64>>,
) -> Result<ArrayRef, String> {
    let array: ArrayRef = match data_type {
        DataType::Float64 => Arc::new(Float64Array::from(values)),
        DataType::Float32 => Arc::new(
            values
                .into_iter()
                .map(|v| v.map(|v| v as f32))
                .collect::<Float32Array>(),
        ),
        other => return Err(format!("unsupported float output type: {:?}", other)),
    };
    Ok(array)
}
