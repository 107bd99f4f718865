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
//! End-to-end tests of the streaming aggregation operator driven through `drive_processor`.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, DictionaryArray, Float64Array, Int64Array, StringArray, StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, Fields, Int32Type, Schema, SchemaRef};
use proptest::prelude::*;

use common::*;
use streamagg::common::error::ExecError;
use streamagg::common::ids::SlotId;
use streamagg::exec::chunk::{Chunk, field_with_slot_id};
use streamagg::exec::expr::LiteralValue;
use streamagg::exec::node::aggregate::{AggregateCall, AggregationStep, SortingKey};
use streamagg::runtime::mem_tracker::MemTracker;
use streamagg::runtime::runtime_state::RuntimeState;

const SAMPLE: [(i64, i64); 5] = [(1, 10), (1, 20), (2, 5), (2, 7), (3, 100)];

fn sum_count_plan() -> PlanBuilder {
    PlanBuilder::new(AggregationStep::Single)
        .agg("sum")
        .agg("count_star")
}

#[test]
fn test_sum_and_count_per_run() {
    let outputs = sum_count_plan()
        .run(split_into_chunks(&SAMPLE, &[]))
        .expect("run");
    assert_eq!(int_column(&outputs, 0), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(int_column(&outputs, 1), vec![Some(30), Some(12), Some(100)]);
    assert_eq!(int_column(&outputs, 2), vec![Some(2), Some(2), Some(1)]);
}

#[test]
fn test_result_independent_of_chunk_boundaries() {
    let positions = 1..SAMPLE.len();
    for bits in 0u32..(1 << positions.len()) {
        let cuts = positions
            .clone()
            .filter(|p| bits & (1 << (p - 1)) != 0)
            .collect::<Vec<_>>();
        for batch_rows in [1, 2, 3, 16] {
            let outputs = sum_count_plan()
                .batch_rows(batch_rows)
                .run(split_into_chunks(&SAMPLE, &cuts))
                .expect("run");
            assert_eq!(
                int_column(&outputs, 1),
                vec![Some(30), Some(12), Some(100)],
                "cuts={:?} batch_rows={}",
                cuts,
                batch_rows
            );
            assert!(chunk_sizes(&outputs).iter().all(|n| *n > 0 && *n <= batch_rows));
        }
    }
}

#[test]
fn test_output_chunks_are_capped() {
    let rows = (0..10).map(|k| (k, 1)).collect::<Vec<_>>();
    let outputs = sum_count_plan()
        .batch_rows(3)
        .run(split_into_chunks(&rows, &[]))
        .expect("run");
    assert_eq!(chunk_sizes(&outputs), vec![3, 3, 3, 1]);
    assert_eq!(
        int_column(&outputs, 0),
        (0..10).map(Some).collect::<Vec<_>>()
    );
}

#[test]
fn test_one_group_per_output_with_single_row_batches() {
    let outputs = sum_count_plan()
        .batch_rows(1)
        .run(split_into_chunks(&[(1, 1), (2, 2), (3, 3)], &[]))
        .expect("run");
    assert_eq!(chunk_sizes(&outputs), vec![1, 1, 1]);
    assert_eq!(int_column(&outputs, 1), vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_groups_emitted_in_first_seen_order() {
    let rows = [(5, 1), (5, 1), (2, 1), (2, 1), (9, 1)];
    let outputs = sum_count_plan()
        .run(split_into_chunks(&rows, &[1, 3]))
        .expect("run");
    assert_eq!(int_column(&outputs, 0), vec![Some(5), Some(2), Some(9)]);
    assert_eq!(int_column(&outputs, 2), vec![Some(2), Some(2), Some(1)]);
}

#[test]
fn test_unclustered_input_yields_one_row_per_run() {
    let rows = [(1, 1), (2, 1), (1, 1)];
    let outputs = sum_count_plan()
        .run(split_into_chunks(&rows, &[]))
        .expect("run");
    assert_eq!(int_column(&outputs, 0), vec![Some(1), Some(2), Some(1)]);
}

#[test]
fn test_null_keys_form_a_group() {
    let chunk = key_value_chunk(
        vec![None, None, Some(1)],
        vec![Some(4), None, Some(6)],
        None,
    );
    let outputs = PlanBuilder::new(AggregationStep::Single)
        .agg("sum")
        .agg("count")
        .run(vec![chunk])
        .expect("run");
    assert_eq!(int_column(&outputs, 0), vec![None, Some(1)]);
    assert_eq!(int_column(&outputs, 1), vec![Some(4), Some(6)]);
    assert_eq!(int_column(&outputs, 2), vec![Some(1), Some(1)]);
}

#[test]
fn test_masked_out_group_keeps_identity_state() {
    let chunk = key_value_chunk(
        vec![Some(1), Some(1), Some(2), Some(2)],
        vec![Some(10), Some(20), Some(30), Some(40)],
        Some(vec![Some(false), None, Some(true), Some(false)]),
    );
    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let value = plan.column(VALUE_SLOT);
    let masked_sum = AggregateCall::new(function("sum", vec![value])).with_mask(MASK_SLOT);
    let value = plan.column(VALUE_SLOT);
    let masked_count = AggregateCall::new(function("count", vec![value])).with_mask(MASK_SLOT);
    let outputs = plan
        .call(masked_sum)
        .call(masked_count)
        .agg("count_star")
        .run(vec![chunk])
        .expect("run");
    assert_eq!(int_column(&outputs, 1), vec![None, Some(30)]);
    assert_eq!(int_column(&outputs, 2), vec![Some(0), Some(1)]);
    assert_eq!(int_column(&outputs, 3), vec![Some(2), Some(2)]);
}

#[test]
fn test_constant_argument_across_chunk_sizes() {
    let rows = [(1, 0), (1, 0), (1, 0), (2, 0), (3, 0), (3, 0), (3, 0), (3, 0)];
    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let two = plan.literal(LiteralValue::Int64(2), DataType::Int64);
    let null_int = plan.literal(LiteralValue::Null, DataType::Int64);
    let outputs = plan
        .call(AggregateCall::new(function("sum", vec![two])))
        .call(AggregateCall::new(function("count", vec![null_int])))
        .run(split_into_chunks(&rows, &[3, 4]))
        .expect("run");
    assert_eq!(int_column(&outputs, 1), vec![Some(6), Some(2), Some(8)]);
    assert_eq!(int_column(&outputs, 2), vec![Some(0), Some(0), Some(0)]);
}

#[test]
fn test_without_grouping_keys_aggregates_everything() {
    let outputs = PlanBuilder::new(AggregationStep::Single)
        .no_group_by()
        .agg("sum")
        .agg("max")
        .run(split_into_chunks(&SAMPLE, &[2]))
        .expect("run");
    assert_eq!(chunk_sizes(&outputs), vec![1]);
    assert_eq!(int_column(&outputs, 0), vec![Some(142)]);
    assert_eq!(int_column(&outputs, 1), vec![Some(100)]);
}

#[test]
fn test_empty_input_produces_nothing() {
    let empty = key_value_chunk(Vec::new(), Vec::new(), None);
    let outputs = sum_count_plan().run(vec![empty]).expect("run");
    assert!(outputs.is_empty());
}

#[test]
fn test_partial_intermediate_final_chain() {
    let partial = || {
        PlanBuilder::new(AggregationStep::Partial)
            .agg("avg")
            .agg("count")
            .agg("sum")
    };
    let partial_schema = partial().factory().expect("factory").output_schema();

    // The two partial runs share key 2 at their boundary.
    let mut partials = partial()
        .run(split_into_chunks(&SAMPLE[..3], &[]))
        .expect("partial run");
    partials.extend(
        partial()
            .run(split_into_chunks(&SAMPLE[3..], &[]))
            .expect("partial run"),
    );
    assert_eq!(int_column(&partials, 0), vec![Some(1), Some(2), Some(2), Some(3)]);

    let merge_plan = |step: AggregationStep| {
        let mut plan = PlanBuilder::with_schema(Arc::clone(&partial_schema), step);
        let key = plan.column(SlotId::new(100));
        plan.node_mut().group_by = vec![key];
        let avg = plan.column(SlotId::new(101));
        let count = plan.column(SlotId::new(102));
        let sum = plan.column(SlotId::new(103));
        plan.call(AggregateCall::new(function("avg", vec![avg])))
            .call(AggregateCall::new(function("count", vec![count])))
            .call(AggregateCall::new(function("sum", vec![sum])))
    };

    let merged = merge_plan(AggregationStep::Intermediate)
        .run(partials)
        .expect("intermediate run");
    assert_eq!(int_column(&merged, 0), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(int_column(&merged, 2), vec![Some(2), Some(2), Some(1)]);

    let outputs = merge_plan(AggregationStep::Final)
        .run(merged)
        .expect("final run");
    assert_eq!(
        float_column(&outputs, 1),
        vec![Some(15.0), Some(6.0), Some(100.0)]
    );
    assert_eq!(int_column(&outputs, 2), vec![Some(2), Some(2), Some(1)]);
    assert_eq!(int_column(&outputs, 3), vec![Some(30), Some(12), Some(100)]);
}

fn avg_state_fields() -> Fields {
    Fields::from(vec![
        Field::new("sum", DataType::Float64, true),
        Field::new("count", DataType::Int64, true),
    ])
}

#[test]
fn test_null_avg_state_is_skipped_on_merge() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("k", DataType::Int64, true), KEY_SLOT),
        field_with_slot_id(
            Field::new("state", DataType::Struct(avg_state_fields()), true),
            VALUE_SLOT,
        ),
    ]));
    // The second slot is null at the struct level while its children still hold values.
    let states = StructArray::try_new(
        avg_state_fields(),
        vec![
            Arc::new(Float64Array::from(vec![10.0, 100.0])),
            Arc::new(Int64Array::from(vec![2, 5])),
        ],
        Some(NullBuffer::from(vec![true, false])),
    )
    .expect("struct array");
    let input = || {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![1, 1])),
            Arc::new(states.clone()),
        ];
        vec![chunk_from_columns(Arc::clone(&schema), columns)]
    };

    let outputs = PlanBuilder::with_schema(Arc::clone(&schema), AggregationStep::Final)
        .agg("avg")
        .run(input())
        .expect("final run");
    assert_eq!(float_column(&outputs, 1), vec![Some(5.0)]);

    let merged = PlanBuilder::with_schema(Arc::clone(&schema), AggregationStep::Intermediate)
        .agg("avg")
        .run(input())
        .expect("intermediate run");
    let merged = merged[0].columns()[1]
        .as_any()
        .downcast_ref::<StructArray>()
        .expect("struct state");
    let counts = merged
        .column(1)
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("int64 counts");
    assert_eq!(counts.value(0), 2);
}

#[test]
fn test_dictionary_string_keys_with_single_row_batches() {
    let dict_type = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("k", dict_type, true), KEY_SLOT),
        field_with_slot_id(Field::new("v", DataType::Utf8, true), VALUE_SLOT),
    ]));
    let chunk = |keys: Vec<&str>, values: Vec<&str>| {
        let keys: DictionaryArray<Int32Type> = keys.into_iter().collect();
        let columns: Vec<ArrayRef> = vec![Arc::new(keys), Arc::new(StringArray::from(values))];
        chunk_from_columns(Arc::clone(&schema), columns)
    };
    let input = vec![
        chunk(
            vec!["longlonglong", "longlonglong", "b"],
            vec!["zz", "aa", "q"],
        ),
        chunk(vec!["b", "c"], vec!["a", "xyzxyz"]),
        chunk(vec!["dd", "dd"], vec!["m", "n"]),
    ];
    let outputs = PlanBuilder::with_schema(Arc::clone(&schema), AggregationStep::Single)
        .agg("min")
        .agg("max")
        .batch_rows(1)
        .run(input)
        .expect("run");

    let owned = |values: &[&str]| {
        values
            .iter()
            .map(|v| Some(v.to_string()))
            .collect::<Vec<_>>()
    };
    assert_eq!(chunk_sizes(&outputs), vec![1, 1, 1, 1]);
    assert_eq!(
        string_column(&outputs, 0),
        owned(&["longlonglong", "b", "c", "dd"])
    );
    assert_eq!(string_column(&outputs, 1), owned(&["aa", "a", "xyzxyz", "m"]));
    assert_eq!(string_column(&outputs, 2), owned(&["zz", "q", "xyzxyz", "n"]));
}

#[test]
fn test_unsupported_aggregate_shapes_are_rejected() {
    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let value = plan.column(VALUE_SLOT);
    let mut call = AggregateCall::new(function("sum", vec![value]));
    call.distinct = true;
    let err = plan.call(call).factory().err().expect("distinct rejected");
    assert!(matches!(err, ExecError::Unsupported(_)), "err={}", err);

    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let value = plan.column(VALUE_SLOT);
    let mut call = AggregateCall::new(function("sum", vec![value]));
    call.sorting_keys.push(SortingKey {
        expr: value,
        ascending: true,
        nulls_first: false,
    });
    let err = plan.call(call).factory().err().expect("sorting keys rejected");
    assert!(matches!(err, ExecError::Unsupported(_)), "err={}", err);

    let mut plan = sum_count_plan();
    plan.node_mut().ignore_null_keys = true;
    let err = plan.factory().err().expect("ignore_null_keys rejected");
    assert!(matches!(err, ExecError::Unsupported(_)), "err={}", err);
}

#[test]
fn test_invalid_plans_are_rejected() {
    let err = PlanBuilder::new(AggregationStep::Single)
        .agg("median")
        .factory()
        .err()
        .expect("unknown function rejected");
    assert!(matches!(err, ExecError::InvalidPlan(_)), "err={}", err);

    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let missing = plan.column(SlotId::new(42));
    let err = plan
        .call(AggregateCall::new(function("sum", vec![missing])))
        .factory()
        .err()
        .expect("unknown slot rejected");
    assert!(err.to_string().contains("slot 42"), "err={}", err);

    let mut plan = PlanBuilder::new(AggregationStep::Single);
    let value = plan.column(VALUE_SLOT);
    let err = plan
        .call(AggregateCall::new(function("sum", vec![value])).with_mask(VALUE_SLOT))
        .factory()
        .err()
        .expect("non-boolean mask rejected");
    assert!(err.to_string().contains("Boolean"), "err={}", err);

    let mut plan = sum_count_plan();
    plan.node_mut().output_slots = vec![SlotId::new(100)];
    let err = plan.factory().err().expect("output slot mismatch rejected");
    assert!(matches!(err, ExecError::InvalidPlan(_)), "err={}", err);
}

#[test]
fn test_memory_limit_fails_the_run() {
    let state = RuntimeState::new(MemTracker::new_root_with_limit("fragment", 256));
    let rows = (0..100).map(|k| (k, k)).collect::<Vec<_>>();
    let err = sum_count_plan()
        .batch_rows(1000)
        .run_with_state(&state, split_into_chunks(&rows, &[]))
        .expect_err("memory limit");
    assert!(
        matches!(err, ExecError::MemLimitExceeded { .. }),
        "err={}",
        err
    );
    assert!(state.error().is_some());
    assert_eq!(state.mem_tracker().current(), 0);
}

fn reference(rows: &[(i64, i64)]) -> Vec<(i64, i64, i64)> {
    let mut order = Vec::new();
    let mut totals: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
    for (key, value) in rows {
        let entry = totals.entry(*key).or_insert_with(|| {
            order.push(*key);
            (0, 0)
        });
        entry.0 += value;
        entry.1 += 1;
    }
    order
        .into_iter()
        .map(|key| (key, totals[&key].0, totals[&key].1))
        .collect()
}

fn clustered_rows() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((1usize..5, prop::collection::vec(-100i64..100, 4)), 0..20).prop_map(
        |runs| {
            runs.into_iter()
                .enumerate()
                .flat_map(|(key, (len, values))| {
                    values
                        .into_iter()
                        .take(len)
                        .map(move |v| (key as i64 * 3, v))
                })
                .collect()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, ..ProptestConfig::default() })]

    #[test]
    fn prop_matches_reference_for_any_chunking(
        rows in clustered_rows(),
        cuts in prop::collection::vec(0usize..80, 0..6),
        batch_rows in 1usize..6,
    ) {
        let mut cuts = cuts;
        cuts.sort_unstable();
        let chunks: Vec<Chunk> = split_into_chunks(&rows, &cuts);
        let outputs = sum_count_plan()
            .batch_rows(batch_rows)
            .run(chunks)
            .expect("run");
        let expected = reference(&rows);
        prop_assert_eq!(
            int_column(&outputs, 0),
            expected.iter().map(|r| Some(r.0)).collect::<Vec<_>>()
        );
        prop_assert_eq!(
            int_column(&outputs, 1),
            expected.iter().map(|r| Some(r.1)).collect::<Vec<_>>()
        );
        prop_assert_eq!(
            int_column(&outputs, 2),
            expected.iter().map(|r| Some(r.2)).collect::<Vec<_>>()
        );
        prop_assert!(chunk_sizes(&outputs).iter().all(|n| *n > 0 && *n <= batch_rows));
    }
}
