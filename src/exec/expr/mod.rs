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
//! Expression arena for operator inputs.
//!
//! Operators in this crate only reference input columns (slot ids) and constants, so the
//! arena carries exactly those two node kinds. Nodes are addressed by [`ExprId`] and carry
//! their declared output type.

pub mod agg;
mod literal;

use crate::common::ids::SlotId;
use arrow::array::{Array, ArrayRef, new_null_array};
use arrow::compute::cast;
use arrow::datatypes::DataType;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Utf8(String),
    Date32(i32),
}

impl LiteralValue {
    /// Natural Arrow type of the value; `Null` maps to `DataType::Null`.
    pub fn data_type(&self) -> DataType {
        match self {
            LiteralValue::Null => DataType::Null,
            LiteralValue::Int8(_) => DataType::Int8,
            LiteralValue::Int16(_) => DataType::Int16,
            LiteralValue::Int32(_) => DataType::Int32,
            LiteralValue::Int64(_) => DataType::Int64,
            LiteralValue::Float32(_) => DataType::Float32,
            LiteralValue::Float64(_) => DataType::Float64,
            LiteralValue::Bool(_) => DataType::Boolean,
            LiteralValue::Utf8(_) => DataType::Utf8,
            LiteralValue::Date32(_) => DataType::Date32,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    /// Column of the input chunk.
    SlotId(SlotId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    types: Vec<DataType>,
}

impl ExprArena {
    pub fn push(&mut self, node: ExprNode) -> ExprId {
        let data_type = match &node {
            ExprNode::Literal(v) => v.data_type(),
            ExprNode::SlotId(_) => DataType::Null,
        };
        self.push_typed(node, data_type)
    }

    pub fn push_typed(&mut self, node: ExprNode, data_type: DataType) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        self.types.push(data_type);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn data_type(&self, id: ExprId) -> Option<&DataType> {
        self.types.get(id.0)
    }
}

/// Materializes `value` as a `len`-row array of `target_type`.
///
/// A `Null` literal keeps its declared type instead of becoming a `NullArray`.
pub fn eval_literal(
    value: &LiteralValue,
    target_type: &DataType,
    len: usize,
) -> Result<ArrayRef, String> {
    if matches!(value, LiteralValue::Null) && !matches!(target_type, DataType::Null) {
        return Ok(new_null_array(target_type, len));
    }
    let out = literal::eval(value, len)?;
    if matches!(target_type, DataType::Null) || out.data_type() == target_type {
        return Ok(out);
    }
    cast(&out, target_type).map_err(|e| {
        format!(
            "literal cast failed from {:?} to {:?}: {}",
            out.data_type(),
            target_type,
            e
        )
    })
}
