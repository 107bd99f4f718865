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
//! Packed-row storage for per-group state.
//!
//! Responsibilities:
//! - Owns one fixed-size row per group: null bitmap, grouping-key slots and accumulator slots.
//! - Keeps out-of-line bytes (string keys, string accumulators) in per-row buffers that survive
//!   row reinitialization, so recycled rows reuse their allocations.
//! - Stores grouping keys from decoded input columns and extracts them back into Arrow arrays.
//!
//! Key exported interfaces:
//! - Types: `RowContainer`, `GroupHandle`, `RowColumn`, `ColumnStorage`, `FixedWidth`.
//!
//! Current limitations:
//! - Rows are never freed individually; callers recycle them through `initialize_row`.
//! - Only row allocation is checked against the memory limit; out-of-line growth is accounted
//!   but never rejected.

mod key_views;
mod layout;

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int8Array,
    Int16Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;

use crate::common::error::ExecResult;
use crate::runtime::mem_tracker::MemTracker;

pub(crate) use key_views::{
    GroupKeyArrayView, build_group_key_views, decode_key_array, decoded_key_type, keys_equal,
};
pub use layout::{ColumnStorage, RowColumn, key_storage_for_type};

use layout::{RowLayout, build_row_layout};

/// Opaque reference to one row of a [`RowContainer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupHandle(u32);

impl GroupHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Plain value that can be copied in and out of an inline row slot.
pub trait FixedWidth: Copy {
    const WIDTH: usize;

    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_fixed_width {
    ($($t:ty),*) => {
        $(
            impl FixedWidth for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$t>::from_le_bytes(buf)
                }

                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_fixed_width!(u8, i64, f64);

pub struct RowContainer {
    key_types: Vec<DataType>,
    layout: RowLayout,
    data: Vec<u8>,
    varlen: Vec<Vec<u8>>,
    num_rows: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl RowContainer {
    /// Columns are the grouping keys (in order) followed by one column per accumulator.
    pub fn new(key_types: &[DataType], accumulators: &[ColumnStorage]) -> Result<Self, String> {
        let mut storages = Vec::with_capacity(key_types.len() + accumulators.len());
        for data_type in key_types {
            storages.push(key_storage_for_type(data_type)?);
        }
        storages.extend_from_slice(accumulators);
        Ok(Self {
            key_types: key_types.to_vec(),
            layout: build_row_layout(&storages),
            data: Vec::new(),
            varlen: Vec::new(),
            num_rows: 0,
            mem_tracker: None,
            accounted_bytes: 0,
        })
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        tracker.consume(self.accounted_bytes);
        self.mem_tracker = Some(tracker);
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_keys(&self) -> usize {
        self.key_types.len()
    }

    pub fn row_size(&self) -> usize {
        self.layout.row_size
    }

    pub fn column_at(&self, index: usize) -> &RowColumn {
        &self.layout.columns[index]
    }

    /// Bytes currently reported to the memory tracker.
    pub fn accounted_bytes(&self) -> i64 {
        self.accounted_bytes
    }

    /// Appends a zeroed row with all columns non-null.
    pub fn new_row(&mut self) -> ExecResult<GroupHandle> {
        let index = u32::try_from(self.num_rows)
            .map_err(|_| format!("row container overflow at {} rows", self.num_rows))?;
        let bytes = self.layout.row_size + self.layout.num_varlen * std::mem::size_of::<Vec<u8>>();
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.try_consume(bytes)?;
        }
        self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
        self.data.resize(self.data.len() + self.layout.row_size, 0);
        self.varlen
            .resize_with(self.varlen.len() + self.layout.num_varlen, Vec::new);
        self.num_rows += 1;
        Ok(GroupHandle(index))
    }

    /// Resets a row to the state `new_row` returns. Out-of-line buffers keep their capacity.
    pub fn initialize_row(&mut self, row: GroupHandle) {
        self.row_bytes_mut(row).fill(0);
        let start = row.index() * self.layout.num_varlen;
        for buf in &mut self.varlen[start..start + self.layout.num_varlen] {
            buf.clear();
        }
    }

    fn row_bytes(&self, row: GroupHandle) -> &[u8] {
        let start = row.index() * self.layout.row_size;
        &self.data[start..start + self.layout.row_size]
    }

    fn row_bytes_mut(&mut self, row: GroupHandle) -> &mut [u8] {
        let start = row.index() * self.layout.row_size;
        &mut self.data[start..start + self.layout.row_size]
    }

    pub fn is_null(&self, row: GroupHandle, column: &RowColumn) -> bool {
        self.row_bytes(row)[column.null_byte] & column.null_mask != 0
    }

    pub fn set_null(&mut self, row: GroupHandle, column: &RowColumn, null: bool) {
        let byte = &mut self.row_bytes_mut(row)[column.null_byte];
        if null {
            *byte |= column.null_mask;
        } else {
            *byte &= !column.null_mask;
        }
    }

    /// Reads a value `delta` bytes into the column's inline slot.
    pub fn read<T: FixedWidth>(&self, row: GroupHandle, column: &RowColumn, delta: usize) -> T {
        debug_assert!(delta + T::WIDTH <= column.width);
        let start = column.offset + delta;
        T::read_le(&self.row_bytes(row)[start..start + T::WIDTH])
    }

    pub fn write<T: FixedWidth>(
        &mut self,
        row: GroupHandle,
        column: &RowColumn,
        delta: usize,
        value: T,
    ) {
        debug_assert!(delta + T::WIDTH <= column.width);
        let start = column.offset + delta;
        value.write_le(&mut self.row_bytes_mut(row)[start..start + T::WIDTH]);
    }

    fn varlen_index(&self, row: GroupHandle, column: &RowColumn) -> usize {
        let slot = column
            .varlen_slot
            .unwrap_or_else(|| panic!("column at offset {} has no varlen slot", column.offset));
        row.index() * self.layout.num_varlen + slot
    }

    pub fn varlen(&self, row: GroupHandle, column: &RowColumn) -> &[u8] {
        &self.varlen[self.varlen_index(row, column)]
    }

    pub fn set_varlen(&mut self, row: GroupHandle, column: &RowColumn, value: &[u8]) {
        let index = self.varlen_index(row, column);
        let buf = &mut self.varlen[index];
        let before = buf.capacity();
        buf.clear();
        buf.extend_from_slice(value);
        let grown = buf.capacity().saturating_sub(before);
        if grown > 0 {
            let grown = i64::try_from(grown).unwrap_or(i64::MAX);
            if let Some(tracker) = self.mem_tracker.as_ref() {
                tracker.consume(grown);
            }
            self.accounted_bytes = self.accounted_bytes.saturating_add(grown);
        }
    }

    /// Copies row `index` of a decoded key column into key column `key_index` of `row`.
    pub(crate) fn store(
        &mut self,
        key: &GroupKeyArrayView<'_>,
        index: usize,
        row: GroupHandle,
        key_index: usize,
    ) {
        let column = self.layout.columns[key_index].clone();
        match key {
            GroupKeyArrayView::Int(view) => match view.value_at(index) {
                Some(v) => self.write::<i64>(row, &column, 0, v),
                None => self.set_null(row, &column, true),
            },
            GroupKeyArrayView::Float(view) => match view.value_at(index) {
                Some(v) => self.write::<f64>(row, &column, 0, v),
                None => self.set_null(row, &column, true),
            },
            GroupKeyArrayView::Boolean(arr) => match key_value(*arr, index) {
                Some(v) => self.write::<i64>(row, &column, 0, i64::from(v)),
                None => self.set_null(row, &column, true),
            },
            GroupKeyArrayView::Date32(arr) => match key_value(*arr, index) {
                Some(v) => self.write::<i64>(row, &column, 0, i64::from(v)),
                None => self.set_null(row, &column, true),
            },
            GroupKeyArrayView::Utf8(arr) => match key_value(*arr, index) {
                Some(v) => self.set_varlen(row, &column, v.as_bytes()),
                None => self.set_null(row, &column, true),
            },
            GroupKeyArrayView::Binary(arr) => match key_value(*arr, index) {
                Some(v) => self.set_varlen(row, &column, v),
                None => self.set_null(row, &column, true),
            },
        }
    }

    /// Builds the Arrow array of key column `key_index` for `groups`, in order.
    pub fn extract_column(
        &self,
        groups: &[GroupHandle],
        key_index: usize,
    ) -> Result<ArrayRef, String> {
        let data_type = self
            .key_types
            .get(key_index)
            .ok_or_else(|| format!("key column {} out of range", key_index))?;
        let column = &self.layout.columns[key_index];
        let ints = move || {
            groups
                .iter()
                .map(move |g| {
                    let null = self.is_null(*g, column);
                    (!null).then(|| self.read::<i64>(*g, column, 0))
                })
        };
        let floats = move || {
            groups
                .iter()
                .map(move |g| {
                    let null = self.is_null(*g, column);
                    (!null).then(|| self.read::<f64>(*g, column, 0))
                })
        };
        let bytes = move || {
            groups
                .iter()
                .map(move |g| {
                    let null = self.is_null(*g, column);
                    (!null).then(|| self.varlen(*g, column))
                })
        };
        let array: ArrayRef = match data_type {
            DataType::Int8 => Arc::new(ints().map(|v| v.map(|v| v as i8)).collect::<Int8Array>()),
            DataType::Int16 => {
                Arc::new(ints().map(|v| v.map(|v| v as i16)).collect::<Int16Array>())
            }
            DataType::Int32 => {
                Arc::new(ints().map(|v| v.map(|v| v as i32)).collect::<Int32Array>())
            }
            DataType::Int64 => Arc::new(ints().collect::<Int64Array>()),
            DataType::Date32 => {
                Arc::new(ints().map(|v| v.map(|v| v as i32)).collect::<Date32Array>())
            }
            DataType::Boolean => {
                Arc::new(ints().map(|v| v.map(|v| v != 0)).collect::<BooleanArray>())
            }
            DataType::Float32 => {
                Arc::new(floats().map(|v| v.map(|v| v as f32)).collect::<Float32Array>())
            }
            DataType::Float64 => Arc::new(floats().collect::<Float64Array>()),
            DataType::Utf8 => {
                let values = bytes()
                    .map(|v| v.map(std::str::from_utf8).transpose())
                    .collect::<Result<Vec<Option<&str>>, _>>()
                    .map_err(|e| format!("invalid utf8 in stored group key: {}", e))?;
                Arc::new(StringArray::from(values))
            }
            DataType::Binary => Arc::new(BinaryArray::from(bytes().collect::<Vec<_>>())),
            other => return Err(format!("group by type {:?} is not supported", other)),
        };
        Ok(array)
    }

    /// Drops every row and returns all accounted memory.
    pub fn clear(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
        self.accounted_bytes = 0;
        self.data = Vec::new();
        self.varlen = Vec::new();
        self.num_rows = 0;
    }
}

fn key_value<A: arrow::array::ArrayAccessor>(array: A, row: usize) -> Option<A::Item> {
    (!array.is_null(row)).then(|| array.value(row))
}

impl Drop for RowContainer {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}
