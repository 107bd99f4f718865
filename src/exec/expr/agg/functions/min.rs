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
use super::common::{
    ValuePick, build_value_array, fold_values, value_spec, value_storage, value_view,
};
use super::{AggKind, AggregateFunction, ValueType};

pub(super) struct MinAgg;

fn value_type(kind: &AggKind) -> ValueType {
    match kind {
        AggKind::Min(value_type) => *value_type,
        other => unreachable!("unexpected kind for min: {:?}", other),
    }
}

impl AggregateFunction for MinAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        value_spec("min", input_type, AggKind::Min)
    }

    fn accumulator_storage(&self, kind: &AggKind) -> ColumnStorage {
        value_storage(value_type(kind))
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        value_view("min", value_type(&spec.kind), array)
    }

    fn build_merge_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        value_view("min", value_type(&spec.kind), array)
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
        _spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        fold_values(ValuePick::Min, rows, column, groups, active, input)
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
        build_value_array(value_type(&spec.kind), data_type, rows, column, groups)
    }
}
