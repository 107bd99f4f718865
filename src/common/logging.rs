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
//! Process-wide `tracing` setup.
//!
//! Lines follow the glog layout, `Lyyyymmdd hh:mm:ss.uuuuuu thread file:line] msg`, and go to
//! `$STREAMAGG_LOG_FILE`, else `$STREAMAGG_LOG_DIR/streamagg.log`, else stderr.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

static INIT: OnceLock<()> = OnceLock::new();

struct GlogFormatter;

fn level_letter(level: &Level) -> char {
    level.as_str().chars().next().unwrap_or('?')
}

/// Thread name when set, otherwise the numeric part of its id.
fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id())
            .chars()
            .filter(char::is_ascii_digit)
            .collect(),
    }
}

impl<S, N> FormatEvent<S, N> for GlogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{}{} {} {}:{}] ",
            level_letter(meta.level()),
            Local::now().format("%Y%m%d %H:%M:%S%.6f"),
            thread_label(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn log_file_path() -> Option<PathBuf> {
    env_path("STREAMAGG_LOG_FILE")
        .or_else(|| env_path("STREAMAGG_LOG_DIR").map(|dir| dir.join("streamagg.log")))
}

/// Opens the configured log file for appending; `None` means stderr.
fn open_log_file() -> Option<File> {
    let path = log_file_path()?;
    let opened = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
    match opened {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!(
                "cannot log to {}: {}, using stderr",
                path.display(),
                err
            );
            None
        }
    }
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_with_level(level: &str) {
    INIT.get_or_init(|| {
        let (writer, ansi) = match open_log_file() {
            Some(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
            None => (
                BoxMakeWriter::new(std::io::stderr),
                atty::is(atty::Stream::Stderr),
            ),
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(level))
            .with_writer(writer)
            .with_ansi(ansi)
            .event_format(GlogFormatter)
            .try_init();
    });
}

pub fn init() {
    init_with_level("info");
}

/// Uses `log_filter`, else `log_level`, of the loaded config; `info` without one.
pub fn init_from_config() {
    init_with_level(&crate::common::config::log_filter());
}

pub use tracing::instrument;
pub use tracing::{debug, error, info, trace, warn};
