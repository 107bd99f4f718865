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
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array,
    Int64Array, StringArray, StructArray,
};
use arrow::datatypes::DataType;

/// Argument column of one aggregate, downcast once per chunk.
pub enum AggInputView<'a> {
    /// COUNT(*): no argument.
    None,
    Any(&'a ArrayRef),
    Int(IntArrayView<'a>),
    Float(FloatArrayView<'a>),
    Bool(&'a BooleanArray),
    Utf8(&'a StringArray),
    AvgState(AvgStateView<'a>),
}

pub struct AvgStateView<'a> {
    /// A null state slot hides whatever its children hold.
    states: &'a StructArray,
    pub(crate) sums: FloatArrayView<'a>,
    pub(crate) counts: IntArrayView<'a>,
}

impl<'a> AvgStateView<'a> {
    /// Reads a `Struct{sum, count}` intermediate column.
    pub(crate) fn new(array: &'a ArrayRef) -> Result<Self, String> {
        let struct_arr = array
            .as_any()
            .downcast_ref::<StructArray>()
            .ok_or_else(|| "failed to downcast to StructArray".to_string())?;
        if struct_arr.num_columns() != 2 {
            return Err("avg intermediate expects 2 fields".to_string());
        }
        Ok(Self {
            states: struct_arr,
            sums: FloatArrayView::new(struct_arr.column(0))?,
            counts: IntArrayView::new(struct_arr.column(1))?,
        })
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<(f64, i64)> {
        if self.states.is_null(row) {
            return None;
        }
        let sum = self.sums.value_at(row)?;
        let count = self.counts.value_at(row)?;
        Some((sum, count))
    }
}

#[derive(Clone, Debug)]
pub enum IntArrayView<'a> {
    Int64(&'a Int64Array),
    Int32(&'a Int32Array),
    Int16(&'a Int16Array),
    Int8(&'a Int8Array),
}

impl<'a> IntArrayView<'a> {
    pub fn new(array: &'a ArrayRef) -> Result<Self, String> {
        match array.data_type() {
            DataType::Int64 => array
                .as_any()
                .downcast_ref::<Int64Array>()
                .map(Self::Int64)
                .ok_or_else(|| "failed to downcast to Int64Array".to_string()),
            DataType::Int32 => array
                .as_any()
                .downcast_ref::<Int32Array>()
                .map(Self::Int32)
                .ok_or_else(|| "failed to downcast to Int32Array".to_string()),
            DataType::Int16 => array
                .as_any()
                .downcast_ref::<Int16Array>()
                .map(Self::Int16)
                .ok_or_else(|| "failed to downcast to Int16Array".to_string()),
            DataType::Int8 => array
                .as_any()
                .downcast_ref::<Int8Array>()
                .map(Self::Int8)
                .ok_or_else(|| "failed to downcast to Int8Array".to_string()),
            other => Err(format!("unsupported int input type: {:?}", other)),
        }
    }

    pub fn value_at(&self, row: usize) -> Option<i64> {
        match self {
            IntArrayView::Int64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            IntArrayView::Int32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            IntArrayView::Int16(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            IntArrayView::Int8(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
        }
    }
}

#[derive(Clone, Debug)]
pub enum FloatArrayView<'a> {
    Float64(&'a Float64Array),
    Float32(&'a Float32Array),
}

impl<'a> FloatArrayView<'a> {
    pub fn new(array: &'a ArrayRef) -> Result<Self, String> {
        match array.data_type() {
            DataType::Float64 => array
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(Self::Float64)
                .ok_or_else(|| "failed to downcast to Float64Array".to_string()),
            DataType::Float32 => array
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(Self::Float32)
                .ok_or_else(|| "failed to downcast to Float32Array".to_string()),
            other => Err(format!("unsupported float input type: {:?}", other)),
        }
    }

    pub fn value_at(&self, row: usize) -> Option<f64> {
        match self {
            FloatArrayView::Float64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            FloatArrayView::Float32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as f64),
        }
    }
}

/// Int or float view depending on the column type; used by numeric aggregates.
pub(crate) fn numeric_view(array: &ArrayRef) -> Result<AggInputView<'_>, String> {
    match array.data_type() {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            Ok(AggInputView::Int(IntArrayView::new(array)?))
        }
        DataType::Float32 | DataType::Float64 => {
            Ok(AggInputView::Float(FloatArrayView::new(array)?))
        }
        other => Err(format!("unsupported numeric input type: {:?}", other)),
    }
}
