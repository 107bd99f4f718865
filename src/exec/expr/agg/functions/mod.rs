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

use super::{AggInputView, AggSpec};

/// Physical value family handled by the value-selecting aggregates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ValueType {
    Int,
    Float,
    Bool,
    Utf8,
}

#[derive(Clone, Debug)]
pub(super) enum AggKind {
    Count,
    SumInt,
    SumFloat,
    Avg,
    Min(ValueType),
    Max(ValueType),
    AnyValue(ValueType),
}

mod any_value;
mod avg;
mod common;
mod count;
mod max;
mod min;
mod sum;

use any_value::AnyValueAgg;
use avg::AvgAgg;
use count::CountAgg;
use max::MaxAgg;
use min::MinAgg;
use sum::SumAgg;

pub(super) trait AggregateFunction {
    fn build_spec_from_type(
        &self,
        func: &AggFunction,
        input_type: Option<&DataType>,
        input_is_intermediate: bool,
    ) -> Result<AggSpec, String>;

    fn accumulator_storage(&self, kind: &AggKind) -> ColumnStorage;

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String>;

    fn build_merge_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String>;

    fn init_state(
        &self,
        spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        group: GroupHandle,
    );

    /// `groups[row]` is the group of input row `row`; only `active` rows are folded in.
    fn update_batch(
        &self,
        spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String>;

    fn merge_batch(
        &self,
        spec: &AggSpec,
        rows: &mut RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String>;

    fn build_array(
        &self,
        spec: &AggSpec,
        rows: &RowContainer,
        column: &RowColumn,
        groups: &[GroupHandle],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String>;
}

static COUNT: CountAgg = CountAgg;
static SUM: SumAgg = SumAgg;
static MIN: MinAgg = MinAgg;
static MAX: MaxAgg = MaxAgg;
static AVG: AvgAgg = AvgAgg;
static ANY_VALUE: AnyValueAgg = AnyValueAgg;

fn resolve_by_func(func: &AggFunction) -> Result<&'static dyn AggregateFunction, String> {
    match canonical_agg_name(func.name.as_str()) {
        "count" => Ok(&COUNT),
        "sum" => Ok(&SUM),
        "min" => Ok(&MIN),
        "max" => Ok(&MAX),
        "avg" => Ok(&AVG),
        "any_value" | "arbitrary" => Ok(&ANY_VALUE),
        other => Err(format!("unsupported agg function: {}", other)),
    }
}

fn resolve_by_kind(kind: &AggKind) -> &'static dyn AggregateFunction {
    match kind {
        AggKind::Count => &COUNT,
        AggKind::SumInt | AggKind::SumFloat => &SUM,
        AggKind::Avg => &AVG,
        AggKind::Min(_) => &MIN,
        AggKind::Max(_) => &MAX,
        AggKind::AnyValue(_) => &ANY_VALUE,
    }
}

fn canonical_agg_name(name: &str) -> &str {
    name.split_once('|').map(|(base, _)| base).unwrap_or(name)
}

pub(super) fn build_spec_from_type(
    func: &AggFunction,
    input_type: Option<&DataType>,
    input_is_intermediate: bool,
) -> Result<AggSpec, String> {
    resolve_by_func(func)?.build_spec_from_type(func, input_type, input_is_intermediate)
}

pub(in crate::exec::expr::agg) fn accumulator_storage_for_kind(kind: &AggKind) -> ColumnStorage {
    resolve_by_kind(kind).accumulator_storage(kind)
}

pub(in crate::exec::expr::agg) fn build_input_view<'a>(
    spec: &AggSpec,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    resolve_by_kind(&spec.kind).build_input_view(spec, array)
}

pub(in crate::exec::expr::agg) fn build_merge_view<'a>(
    spec: &AggSpec,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    resolve_by_kind(&spec.kind).build_merge_view(spec, array)
}

pub(in crate::exec::expr::agg) fn init_state(
    spec: &AggSpec,
    rows: &mut RowContainer,
    column: &RowColumn,
    group: GroupHandle,
) {
    resolve_by_kind(&spec.kind).init_state(spec, rows, column, group)
}

pub(in crate::exec::expr::agg) fn update_batch(
    spec: &AggSpec,
    rows: &mut RowContainer,
    column: &RowColumn,
    groups: &[GroupHandle],
    active: &SelectivityVector,
    input: &AggInputView,
) -> Result<(), String> {
    resolve_by_kind(&spec.kind).update_batch(spec, rows, column, groups, active, input)
}

pub(in crate::exec::expr::agg) fn merge_batch(
    spec: &AggSpec,
    rows: &mut RowContainer,
    column: &RowColumn,
    groups: &[GroupHandle],
    active: &SelectivityVector,
    input: &AggInputView,
) -> Result<(), String> {
    resolve_by_kind(&spec.kind).merge_batch(spec, rows, column, groups, active, input)
}

pub(in crate::exec::expr::agg) fn build_array(
    spec: &AggSpec,
    rows: &RowContainer,
    column: &RowColumn,
    groups: &[GroupHandle],
    output_intermediate: bool,
) -> Result<ArrayRef, String> {
    resolve_by_kind(&spec.kind).build_array(spec, rows, column, groups, output_intermediate)
}
