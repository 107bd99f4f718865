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

use crate::exec::node::aggregate::AggFunction;

use super::functions;
use super::functions::AggKind;

pub(super) fn build_spec_from_type(
    func: &AggFunction,
    input_type: Option<&DataType>,
    input_is_intermediate: bool,
) -> Result<AggSpec, String> {
    let spec = functions::build_spec_from_type(func, input_type, input_is_intermediate)?;
    apply_type_signature(spec, func)
}

fn is_compatible_signature_type(expected: &DataType, sig_type: &DataType) -> bool {
    match (expected, sig_type) {
        (DataType::Struct(expected_fields), DataType::Struct(sig_fields)) => {
            if expected_fields.len() != sig_fields.len() {
                return false;
            }
            expected_fields
                .iter()
                .zip(sig_fields.iter())
                .all(|(expected, sig)| {
                    is_compatible_signature_type(expected.data_type(), sig.data_type())
                })
        }
        _ => expected == sig_type,
    }
}

/// Checks planner-declared types, when present, against the resolved function.
fn apply_type_signature(spec: AggSpec, func: &AggFunction) -> Result<AggSpec, String> {
    let Some(sig) = func.types.as_ref() else {
        return Ok(spec);
    };

    let mut out = spec;
    if let Some(output_type) = sig.output_type.as_ref() {
        if !is_compatible_signature_type(&out.output_type, output_type) {
            return Err(format!(
                "aggregate output type signature mismatch for {}: expected {:?}, got {:?}",
                func.name, out.output_type, output_type
            ));
        }
        out.output_type = output_type.clone();
    }

    if let Some(intermediate_type) = sig.intermediate_type.as_ref() {
        if !is_compatible_signature_type(&out.intermediate_type, intermediate_type) {
            return Err(format!(
                "aggregate intermediate type signature mismatch for {}: expected {:?}, got {:?}",
                func.name, out.intermediate_type, intermediate_type
            ));
        }
        out.intermediate_type = intermediate_type.clone();
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub(super) struct AggSpec {
    pub(super) kind: AggKind,
    pub(super) output_type: DataType,
    pub(super) intermediate_type: DataType,
    pub(super) count_all: bool,
}
