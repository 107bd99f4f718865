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
use arrow::array::{
    Array, ArrayAccessor, ArrayRef, BinaryArray, BooleanArray, Date32Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::DataType;

use crate::exec::expr::agg::{FloatArrayView, IntArrayView};

/// Typed, read-only view of one decoded grouping-key column.
pub(crate) enum GroupKeyArrayView<'a> {
    Int(IntArrayView<'a>),
    Float(FloatArrayView<'a>),
    Boolean(&'a BooleanArray),
    Utf8(&'a StringArray),
    Binary(&'a BinaryArray),
    Date32(&'a Date32Array),
}

/// Unpacks dictionary-encoded arrays to their value type; other arrays are returned as is.
pub(crate) fn decode_key_array(array: &ArrayRef) -> Result<ArrayRef, String> {
    match array.data_type() {
        DataType::Dictionary(_, value_type) => cast(array, value_type)
            .map_err(|e| format!("decode dictionary group key failed: {}", e)),
        _ => Ok(array.clone()),
    }
}

/// Type a key column has after [`decode_key_array`].
pub(crate) fn decoded_key_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Dictionary(_, value_type) => value_type.as_ref().clone(),
        other => other.clone(),
    }
}

pub(crate) fn build_group_key_views<'a>(
    arrays: &'a [ArrayRef],
) -> Result<Vec<GroupKeyArrayView<'a>>, String> {
    let mut views = Vec::with_capacity(arrays.len());
    for array in arrays {
        let view = match array.data_type() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                GroupKeyArrayView::Int(IntArrayView::new(array)?)
            }
            DataType::Float32 | DataType::Float64 => {
                GroupKeyArrayView::Float(FloatArrayView::new(array)?)
            }
            DataType::Boolean => {
                let arr = array
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| "failed to downcast to BooleanArray".to_string())?;
                GroupKeyArrayView::Boolean(arr)
            }
            DataType::Utf8 => {
                let arr = array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| "failed to downcast to StringArray".to_string())?;
                GroupKeyArrayView::Utf8(arr)
            }
            DataType::Binary => {
                let arr = array
                    .as_any()
                    .downcast_ref::<BinaryArray>()
                    .ok_or_else(|| "failed to downcast to BinaryArray".to_string())?;
                GroupKeyArrayView::Binary(arr)
            }
            DataType::Date32 => {
                let arr = array
                    .as_any()
                    .downcast_ref::<Date32Array>()
                    .ok_or_else(|| "failed to downcast to Date32Array".to_string())?;
                GroupKeyArrayView::Date32(arr)
            }
            other => return Err(format!("group by type {:?} is not supported", other)),
        };
        views.push(view);
    }
    Ok(views)
}

fn float64_key_equal(left: f64, right: f64) -> bool {
    (left.is_nan() && right.is_nan()) || left == right
}

fn nullable_value<A: ArrayAccessor>(array: A, row: usize) -> Option<A::Item> {
    (!array.is_null(row)).then(|| array.value(row))
}

impl GroupKeyArrayView<'_> {
    /// Key equality: nulls equal nulls, NaN equals NaN.
    pub(crate) fn value_equals(
        &self,
        row: usize,
        other: &GroupKeyArrayView<'_>,
        other_row: usize,
    ) -> bool {
        match (self, other) {
            (GroupKeyArrayView::Int(a), GroupKeyArrayView::Int(b)) => {
                a.value_at(row) == b.value_at(other_row)
            }
            (GroupKeyArrayView::Float(a), GroupKeyArrayView::Float(b)) => {
                match (a.value_at(row), b.value_at(other_row)) {
                    (Some(l), Some(r)) => float64_key_equal(l, r),
                    (None, None) => true,
                    _ => false,
                }
            }
            (GroupKeyArrayView::Boolean(a), GroupKeyArrayView::Boolean(b)) => {
                nullable_value(*a, row) == nullable_value(*b, other_row)
            }
            (GroupKeyArrayView::Utf8(a), GroupKeyArrayView::Utf8(b)) => {
                nullable_value(*a, row) == nullable_value(*b, other_row)
            }
            (GroupKeyArrayView::Binary(a), GroupKeyArrayView::Binary(b)) => {
                nullable_value(*a, row) == nullable_value(*b, other_row)
            }
            (GroupKeyArrayView::Date32(a), GroupKeyArrayView::Date32(b)) => {
                nullable_value(*a, row) == nullable_value(*b, other_row)
            }
            _ => false,
        }
    }
}

/// Compares the full key tuple of `left[left_row]` and `right[right_row]`.
pub(crate) fn keys_equal(
    left: &[GroupKeyArrayView<'_>],
    left_row: usize,
    right: &[GroupKeyArrayView<'_>],
    right_row: usize,
) -> bool {
    left.iter()
        .zip(right.iter())
        .all(|(l, r)| l.value_equals(left_row, r, right_row))
}
