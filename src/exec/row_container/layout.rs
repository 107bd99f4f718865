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
use arrow::datatypes::DataType;

/// Width of every fixed-width key slot; narrower key types are widened on store.
pub(crate) const KEY_SLOT_WIDTH: usize = 8;

/// Physical storage of one row-container column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnStorage {
    /// Inline bytes at a fixed offset within the row.
    Fixed(usize),
    /// Out-of-line bytes owned by the row (strings, binary).
    VarLen,
}

/// Location of one column inside a packed row.
///
/// Every column owns one bit of the row's null bitmap, whether or not it has inline bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowColumn {
    pub offset: usize,
    pub width: usize,
    pub null_byte: usize,
    pub null_mask: u8,
    pub varlen_slot: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct RowLayout {
    pub columns: Vec<RowColumn>,
    pub row_size: usize,
    pub num_varlen: usize,
}

/// Null bitmap first, then inline slots in column order.
pub fn build_row_layout(storages: &[ColumnStorage]) -> RowLayout {
    let null_bytes = storages.len().div_ceil(8);
    let mut offset = null_bytes;
    let mut num_varlen = 0usize;
    let mut columns = Vec::with_capacity(storages.len());
    for (idx, storage) in storages.iter().enumerate() {
        let (width, varlen_slot) = match storage {
            ColumnStorage::Fixed(width) => (*width, None),
            ColumnStorage::VarLen => {
                num_varlen += 1;
                (0, Some(num_varlen - 1))
            }
        };
        columns.push(RowColumn {
            offset,
            width,
            null_byte: idx / 8,
            null_mask: 1u8 << (idx % 8),
            varlen_slot,
        });
        offset += width;
    }
    RowLayout {
        columns,
        row_size: offset.max(1),
        num_varlen,
    }
}

/// Storage for a grouping-key column of `data_type`.
pub fn key_storage_for_type(data_type: &DataType) -> Result<ColumnStorage, String> {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::Float32
        | DataType::Float64
        | DataType::Boolean
        | DataType::Date32 => Ok(ColumnStorage::Fixed(KEY_SLOT_WIDTH)),
        DataType::Utf8 | DataType::Binary => Ok(ColumnStorage::VarLen),
        other => Err(format!("group by type {:?} is not supported", other)),
    }
}
