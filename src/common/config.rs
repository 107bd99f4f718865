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
use crate::streamagg_config::config as streamagg_app_config;

pub(crate) fn debug_exec_node_output() -> bool {
    streamagg_app_config()
        .ok()
        .map(|c| c.debug.exec_node_output)
        .unwrap_or(false)
}

pub(crate) fn log_filter() -> String {
    streamagg_app_config()
        .ok()
        .map(|c| c.log_filter.clone().unwrap_or_else(|| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string())
}

pub(crate) fn chunk_size() -> usize {
    streamagg_app_config()
        .ok()
        .map(|c| c.runtime.chunk_size)
        .unwrap_or(4096)
}

pub(crate) fn streaming_agg_output_batch_rows() -> usize {
    streamagg_app_config()
        .ok()
        .map(|c| c.runtime.actual_streaming_agg_output_batch_rows())
        .unwrap_or_else(chunk_size)
}

pub(crate) fn mem_limit_bytes() -> Option<i64> {
    streamagg_app_config()
        .ok()
        .and_then(|c| c.runtime.mem_limit_bytes)
}
