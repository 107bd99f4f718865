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
//! Error type surfaced at operator and pipeline boundaries.
//!
//! Kernel and expression internals keep returning `Result<_, String>`; those messages are
//! lifted into [`ExecError::Internal`] when they cross an operator call.

use arrow::error::ArrowError;
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Plan shape the engine recognizes but does not execute.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Plan that cannot be resolved against its input (unknown slot, bad type, ...).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error(
        "memory limit exceeded: tracker={label} limit={limit} current={current} requested={requested}"
    )]
    MemLimitExceeded {
        label: String,
        limit: i64,
        current: i64,
        requested: i64,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("{0}")]
    Internal(String),
}

impl ExecError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<String> for ExecError {
    fn from(value: String) -> Self {
        Self::Internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_errors_become_internal() {
        let err: ExecError = "bad state".to_string().into();
        assert!(matches!(err, ExecError::Internal(ref m) if m == "bad state"));
        assert_eq!(err.to_string(), "bad state");
    }

    #[test]
    fn mem_limit_message_names_tracker() {
        let err = ExecError::MemLimitExceeded {
            label: "agg".to_string(),
            limit: 10,
            current: 8,
            requested: 4,
        };
        assert!(err.to_string().contains("tracker=agg"), "err={}", err);
    }
}
