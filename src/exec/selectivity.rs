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
use arrow::array::{Array, BooleanArray};
use arrow::buffer::BooleanBuffer;

/// Set of active row positions within one chunk.
#[derive(Clone, Debug)]
pub struct SelectivityVector {
    bits: BooleanBuffer,
    selected: usize,
}

impl SelectivityVector {
    pub fn new_all(len: usize) -> Self {
        Self {
            bits: BooleanBuffer::new_set(len),
            selected: len,
        }
    }

    /// Rows where `filter` is true; null filter values deselect the row.
    pub fn from_filter(filter: &BooleanArray) -> Self {
        let bits = match filter.nulls() {
            Some(nulls) => filter.values() & nulls.inner(),
            None => filter.values().clone(),
        };
        Self::from_bits(bits)
    }

    fn from_bits(bits: BooleanBuffer) -> Self {
        let selected = bits.count_set_bits();
        Self { bits, selected }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count_selected(&self) -> usize {
        self.selected
    }

    pub fn is_all_selected(&self) -> bool {
        self.selected == self.bits.len()
    }

    pub fn iter_selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.set_indices()
    }
}
