// Copyright 2025 the portrelay authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

/// Error taxonomy of the relay.
///
/// `Bind` is fatal for the listener it occurred on and is surfaced at
/// startup. `Connection` and `SocketClosed` are scoped to a single handler
/// and never reach the accept loop. An expired read/write deadline is not an
/// error at all; bounded socket operations return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bind error: {0}")]
    Bind(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("socket already closed")]
    SocketClosed,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}
