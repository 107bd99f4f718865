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

use super::functions;
use super::*;

/// Resolved aggregates of one operator, before their accumulator columns are known.
#[derive(Clone, Debug)]
pub struct AggKernelSet {
    specs: Vec<AggSpec>,
}

/// One aggregate bound to its accumulator column in a [`RowContainer`].
#[derive(Clone, Debug)]
pub struct AggKernelEntry {
    pub(super) spec: AggSpec,
    pub(super) column: RowColumn,
}

pub fn build_kernel_set(
    functions: &[AggFunction],
    input_types: &[Option<DataType>],
    input_is_intermediate: bool,
) -> Result<AggKernelSet, String> {
    if input_types.len() != functions.len() {
        return Err("aggregate input type length mismatch".to_string());
    }
    let specs = functions
        .iter()
        .zip(input_types.iter())
        .map(|(func, input_type)| {
            build_spec_from_type(func, input_type.as_ref(), input_is_intermediate)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AggKernelSet { specs })
}

impl AggKernelSet {
    pub fn accumulator_storages(&self) -> Vec<ColumnStorage> {
        self.specs
            .iter()
            .map(|spec| functions::accumulator_storage_for_kind(&spec.kind))
            .collect()
    }

    pub fn output_type(&self, index: usize, output_intermediate: bool) -> DataType {
        let spec = &self.specs[index];
        if output_intermediate {
            spec.intermediate_type.clone()
        } else {
            spec.output_type.clone()
        }
    }

    /// Accumulators follow the key columns, one column per aggregate in order.
    pub fn bind(&self, rows: &RowContainer) -> Vec<AggKernelEntry> {
        let first = rows.num_keys();
        self.specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| AggKernelEntry {
                spec: spec.clone(),
                column: rows.column_at(first + idx).clone(),
            })
            .collect()
    }
}

impl AggKernelEntry {
    pub fn build_input_view<'a>(
        &self,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        functions::build_input_view(&self.spec, array)
    }

    pub fn build_merge_view<'a>(
        &self,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        functions::build_merge_view(&self.spec, array)
    }

    /// Writes the empty accumulator state into each of `groups`.
    pub fn initialize_new_groups(&self, rows: &mut RowContainer, groups: &[GroupHandle]) {
        for group in groups {
            functions::init_state(&self.spec, rows, &self.column, *group);
        }
    }

    pub fn add_raw_input(
        &self,
        rows: &mut RowContainer,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        functions::update_batch(&self.spec, rows, &self.column, groups, active, input)
    }

    pub fn add_intermediate_results(
        &self,
        rows: &mut RowContainer,
        groups: &[GroupHandle],
        active: &SelectivityVector,
        input: &AggInputView,
    ) -> Result<(), String> {
        functions::merge_batch(&self.spec, rows, &self.column, groups, active, input)
    }

    /// Final values of `groups`, in order.
    pub fn extract_values(
        &self,
        rows: &RowContainer,
        groups: &[GroupHandle],
    ) -> Result<ArrayRef, String> {
        functions::build_array(&self.spec, rows, &self.column, groups, false)
    }

    /// Accumulator states of `groups` in the intermediate type, for a later merge.
    pub fn extract_accumulators(
        &self,
        rows: &RowContainer,
        groups: &[GroupHandle],
    ) -> Result<ArrayRef, String> {
        functions::build_array(&self.spec, rows, &self.column, groups, true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};

    use super::*;
    use crate::exec::expr::ExprId;
    use crate::exec::node::aggregate::AggTypeSignature;

    fn func(name: &str) -> AggFunction {
        AggFunction {
            name: name.to_string(),
            inputs: vec![ExprId(0)],
            types: None,
        }
    }

    struct Harness {
        rows: RowContainer,
        entries: Vec<AggKernelEntry>,
        groups: Vec<GroupHandle>,
    }

    fn harness(
        functions: &[AggFunction],
        input_types: &[Option<DataType>],
        input_is_intermediate: bool,
        num_groups: usize,
    ) -> Harness {
        let set = build_kernel_set(functions, input_types, input_is_intermediate)
            .expect("kernel set");
        let mut rows =
            RowContainer::new(&[], &set.accumulator_storages()).expect("row container");
        let groups = (0..num_groups)
            .map(|_| rows.new_row().expect("new row"))
            .collect::<Vec<_>>();
        let entries = set.bind(&rows);
        for entry in &entries {
            entry.initialize_new_groups(&mut rows, &groups);
        }
        Harness {
            rows,
            entries,
            groups,
        }
    }

    #[test]
    fn sum_and_count_skip_nulls_and_inactive_rows() {
        let mut h = harness(
            &[func("sum"), func("count")],
            &[Some(DataType::Int32), Some(DataType::Int32)],
            false,
            2,
        );
        let input: Option<ArrayRef> =
            Some(Arc::new(Int32Array::from(vec![Some(1), None, Some(5), Some(7)])));
        let row_groups = vec![h.groups[0], h.groups[0], h.groups[1], h.groups[1]];
        let mask = BooleanArray::from(vec![true, true, true, false]);
        let active = SelectivityVector::from_filter(&mask);
        for entry in &h.entries {
            let view = entry.build_input_view(&input).expect("view");
            entry
                .add_raw_input(&mut h.rows, &row_groups, &active, &view)
                .expect("update");
        }
        let sums = h.entries[0]
            .extract_values(&h.rows, &h.groups)
            .expect("sums");
        let sums = sums.as_any().downcast_ref::<Int64Array>().expect("int64");
        assert_eq!(sums.values().as_ref(), &[1, 5]);
        let counts = h.entries[1]
            .extract_values(&h.rows, &h.groups)
            .expect("counts");
        let counts = counts.as_any().downcast_ref::<Int64Array>().expect("int64");
        assert_eq!(counts.values().as_ref(), &[1, 1]);
    }

    #[test]
    fn untouched_groups_emit_identity_values() {
        let h = harness(
            &[func("sum"), func("count"), func("max"), func("avg")],
            &[
                Some(DataType::Float64),
                Some(DataType::Float64),
                Some(DataType::Float64),
                Some(DataType::Float64),
            ],
            false,
            1,
        );
        let sum = h.entries[0].extract_values(&h.rows, &h.groups).expect("sum");
        assert!(sum.is_null(0));
        let count = h.entries[1]
            .extract_values(&h.rows, &h.groups)
            .expect("count");
        let count = count.as_any().downcast_ref::<Int64Array>().expect("int64");
        assert_eq!(count.value(0), 0);
        let max = h.entries[2].extract_values(&h.rows, &h.groups).expect("max");
        assert!(max.is_null(0));
        let avg = h.entries[3]
            .extract_accumulators(&h.rows, &h.groups)
            .expect("avg");
        assert!(avg.is_null(0));
    }

    #[test]
    fn min_max_any_value_on_strings() {
        let mut h = harness(
            &[func("min"), func("max"), func("any_value")],
            &[
                Some(DataType::Utf8),
                Some(DataType::Utf8),
                Some(DataType::Utf8),
            ],
            false,
            1,
        );
        let input: Option<ArrayRef> = Some(Arc::new(StringArray::from(vec![
            None,
            Some("pear"),
            Some("apple"),
            Some("zucchini"),
        ])));
        let row_groups = vec![h.groups[0]; 4];
        let active = SelectivityVector::new_all(4);
        for entry in &h.entries {
            let view = entry.build_input_view(&input).expect("view");
            entry
                .add_raw_input(&mut h.rows, &row_groups, &active, &view)
                .expect("update");
        }
        let value = |idx: usize| {
            let array = h.entries[idx]
                .extract_values(&h.rows, &h.groups)
                .expect("array");
            array
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("utf8")
                .value(0)
                .to_string()
        };
        assert_eq!(value(0), "apple");
        assert_eq!(value(1), "zucchini");
        assert_eq!(value(2), "pear");
    }

    #[test]
    fn avg_partial_state_merges_into_final() {
        let mut partial = harness(&[func("avg")], &[Some(DataType::Int64)], false, 2);
        let input: Option<ArrayRef> = Some(Arc::new(Int64Array::from(vec![2, 4, 9])));
        let row_groups = vec![partial.groups[0], partial.groups[0], partial.groups[1]];
        let entry = &partial.entries[0];
        let view = entry.build_input_view(&input).expect("view");
        entry
            .add_raw_input(
                &mut partial.rows,
                &row_groups,
                &SelectivityVector::new_all(3),
                &view,
            )
            .expect("update");
        let state = entry
            .extract_accumulators(&partial.rows, &partial.groups)
            .expect("state");
        assert!(matches!(state.data_type(), DataType::Struct(fields) if fields.len() == 2));

        let mut fin = harness(&[func("avg")], &[Some(state.data_type().clone())], true, 1);
        let merged: Option<ArrayRef> = Some(state);
        let entry = &fin.entries[0];
        let view = entry.build_merge_view(&merged).expect("merge view");
        let row_groups = vec![fin.groups[0]; 2];
        entry
            .add_intermediate_results(
                &mut fin.rows,
                &row_groups,
                &SelectivityVector::new_all(2),
                &view,
            )
            .expect("merge");
        let out = entry.extract_values(&fin.rows, &fin.groups).expect("avg");
        let out = out.as_any().downcast_ref::<Float64Array>().expect("float64");
        assert_eq!(out.value(0), 5.0);
    }

    #[test]
    fn sum_int_overflow_is_an_error() {
        let mut h = harness(&[func("sum")], &[Some(DataType::Int64)], false, 1);
        let input: Option<ArrayRef> = Some(Arc::new(Int64Array::from(vec![i64::MAX, 1])));
        let row_groups = vec![h.groups[0]; 2];
        let entry = &h.entries[0];
        let view = entry.build_input_view(&input).expect("view");
        let err = entry
            .add_raw_input(
                &mut h.rows,
                &row_groups,
                &SelectivityVector::new_all(2),
                &view,
            )
            .expect_err("overflow");
        assert!(err.contains("overflow"));
    }

    #[test]
    fn count_merge_overflow_is_an_error() {
        let mut h = harness(&[func("count")], &[Some(DataType::Int64)], true, 1);
        let partials: Option<ArrayRef> = Some(Arc::new(Int64Array::from(vec![i64::MAX, 1])));
        let row_groups = vec![h.groups[0]; 2];
        let entry = &h.entries[0];
        let view = entry.build_merge_view(&partials).expect("merge view");
        let err = entry
            .add_intermediate_results(
                &mut h.rows,
                &row_groups,
                &SelectivityVector::new_all(2),
                &view,
            )
            .expect_err("overflow");
        assert_eq!(err, "count overflow");
    }

    #[test]
    fn rejects_unknown_functions_and_signature_mismatch() {
        let err = build_kernel_set(&[func("median")], &[Some(DataType::Int64)], false)
            .expect_err("unknown function");
        assert!(err.contains("unsupported agg function"));

        let mut sum = func("sum");
        sum.types = Some(AggTypeSignature {
            intermediate_type: None,
            output_type: Some(DataType::Float64),
        });
        let err = build_kernel_set(&[sum], &[Some(DataType::Int64)], false)
            .expect_err("signature mismatch");
        assert!(err.contains("signature mismatch"));

        assert!(build_kernel_set(&[func("sum")], &[Some(DataType::Utf8)], false).is_err());
    }
}
