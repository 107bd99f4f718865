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
//! Per-aggregate row filters.
//!
//! Several aggregates may share one mask column; each distinct column is evaluated once per
//! chunk and the result shared by every aggregate that names it.

use std::collections::HashMap;

use arrow::array::{Array, BooleanArray};

use crate::exec::chunk::Chunk;
use crate::exec::selectivity::SelectivityVector;

pub(crate) struct AggregationMasks {
    /// Input column index of each aggregate's mask, by aggregate position.
    channels: Vec<Option<usize>>,
    cache: HashMap<usize, SelectivityVector>,
}

impl AggregationMasks {
    pub(crate) fn new(channels: Vec<Option<usize>>) -> Self {
        Self {
            channels,
            cache: HashMap::new(),
        }
    }

    /// Evaluates every distinct mask column over the first `rows` rows of `chunk`.
    pub(crate) fn add_input(&mut self, chunk: &Chunk, rows: usize) -> Result<(), String> {
        self.cache.clear();
        for channel in self.channels.iter().flatten() {
            if self.cache.contains_key(channel) {
                continue;
            }
            let column = chunk
                .columns()
                .get(*channel)
                .ok_or_else(|| format!("mask column {} out of range", channel))?;
            let filter = column
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| {
                    format!(
                        "mask column {} must be Boolean, got {:?}",
                        channel,
                        column.data_type()
                    )
                })?;
            if filter.len() < rows {
                return Err(format!(
                    "mask column {} has {} rows, expected {}",
                    channel,
                    filter.len(),
                    rows
                ));
            }
            let filter = filter.slice(0, rows);
            self.cache
                .insert(*channel, SelectivityVector::from_filter(&filter));
        }
        Ok(())
    }

    /// Rows feeding aggregate `aggregate_index`, or `None` when it has no mask.
    pub(crate) fn active_rows(&self, aggregate_index: usize) -> Option<&SelectivityVector> {
        let channel = self.channels.get(aggregate_index).copied().flatten()?;
        self.cache.get(&channel)
    }
}
