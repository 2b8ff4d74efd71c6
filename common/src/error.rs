use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// 瞬时故障，按重试策略处理，耗尽前不向上报告
    Recoverable,
    /// 立即上报，当前加载中止
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Network,
    Text,
    Media,
    Manifest,
    Streaming,
    Player,
}

/// 具体错误码，按类别分段编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // ========== NETWORK ==========
    UnsupportedScheme = 1000,
    BadHttpStatus = 1001,
    HttpError = 1002,
    Timeout = 1003,

    // ========== TEXT ==========
    InvalidTextTrack = 2000,

    // ========== MEDIA ==========
    SinkAttachFailed = 3000,
    SinkPrimeFailed = 3001,

    // ========== MANIFEST ==========
    NoVariants = 4000,
    InvalidManifest = 4001,

    // ========== STREAMING ==========
    StreamingStartFailed = 5000,

    // ========== PLAYER ==========
    LoadInterrupted = 7000,
    OperationAborted = 7001,
    NoSinkAttached = 7002,
    PlayerDestroyed = 7003,
    NoContentLoaded = 7004,
    TrackNotFound = 7005,
}

impl ErrorCode {
    pub fn number(&self) -> u16 {
        *self as u16
    }

    /// 错误码所属类别
    pub fn category(&self) -> Category {
        match self.number() {
            1000..=1999 => Category::Network,
            2000..=2999 => Category::Text,
            3000..=3999 => Category::Media,
            4000..=4999 => Category::Manifest,
            5000..=5999 => Category::Streaming,
            _ => Category::Player,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Recoverable => write!(f, "RECOVERABLE"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Network => "NETWORK",
            Category::Text => "TEXT",
            Category::Media => "MEDIA",
            Category::Manifest => "MANIFEST",
            Category::Streaming => "STREAMING",
            Category::Player => "PLAYER",
        };
        f.write_str(name)
    }
}

/// 播放器错误，携带严重程度、类别与错误码
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{severity} {category} error {}: {message}", .code.number())]
pub struct PlayerError {
    pub severity: Severity,
    pub category: Category,
    pub code: ErrorCode,
    pub message: String,
}

impl PlayerError {
    pub fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: code.category(),
            code,
            message: message.into(),
        }
    }

    pub fn recoverable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Recoverable, code, message)
    }

    pub fn critical(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, code, message)
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity == Severity::Recoverable
    }

    pub fn load_interrupted() -> Self {
        Self::critical(ErrorCode::LoadInterrupted, "load superseded by a newer request")
    }

    pub fn destroyed() -> Self {
        Self::critical(ErrorCode::PlayerDestroyed, "player has been destroyed")
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
