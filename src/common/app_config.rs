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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<StreamAggConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static StreamAggConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = StreamAggConfig::load_from_file(path.as_ref())?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static StreamAggConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = StreamAggConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static StreamAggConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("STREAMAGG_CONFIG")
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    let candidates = [PathBuf::from("streamagg.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $STREAMAGG_CONFIG or create ./streamagg.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct StreamAggConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "streamagg=debug,streamagg::exec::pipeline=trace"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

impl StreamAggConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: StreamAggConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        cfg.runtime.validate()?;
        Ok(cfg)
    }
}

impl Default for StreamAggConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Rows per chunk produced by scans; also the default streaming aggregation output size.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overrides `chunk_size` as the maximum rows per streaming aggregation output chunk.
    #[serde(default)]
    pub streaming_agg_output_batch_rows: Option<usize>,
    /// Byte limit of the per-fragment memory tracker; unset means unlimited.
    #[serde(default)]
    pub mem_limit_bytes: Option<i64>,
}

fn default_chunk_size() -> usize {
    4096
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("runtime.chunk_size must be positive"));
        }
        if self.streaming_agg_output_batch_rows == Some(0) {
            return Err(anyhow!(
                "runtime.streaming_agg_output_batch_rows must be positive"
            ));
        }
        if let Some(limit) = self.mem_limit_bytes
            && limit <= 0
        {
            return Err(anyhow!("runtime.mem_limit_bytes must be positive, got {limit}"));
        }
        Ok(())
    }

    pub fn actual_streaming_agg_output_batch_rows(&self) -> usize {
        self.streaming_agg_output_batch_rows
            .unwrap_or(self.chunk_size)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            streaming_agg_output_batch_rows: None,
            mem_limit_bytes: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DebugConfig {
    /// Log every chunk an aggregation operator emits.
    #[serde(default)]
    pub exec_node_output: bool,
}
