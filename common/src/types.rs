use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TrackId = u64;

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Variant,
    Text,
}

/// 可播放轨道：码率档位（音视频组合）或字幕轨道
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub track_type: TrackType,
    pub language: String,
    pub roles: Vec<String>,
    pub active: bool,
    /// 仅 variant 有效
    pub bandwidth: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// 字幕种类，例如 "subtitles" / "captions"
    pub kind: Option<String>,
    pub mime_type: Option<String>,
    /// 通过 add_text_track 外挂的字幕
    pub external: bool,
    /// 外挂字幕的来源地址
    pub uri: Option<String>,
}

impl Track {
    pub fn variant(id: TrackId, language: impl Into<String>, bandwidth: u64) -> Self {
        Self {
            id,
            track_type: TrackType::Variant,
            language: language.into(),
            roles: Vec::new(),
            active: false,
            bandwidth: Some(bandwidth),
            width: None,
            height: None,
            kind: None,
            mime_type: None,
            external: false,
            uri: None,
        }
    }

    pub fn text(id: TrackId, language: impl Into<String>) -> Self {
        Self {
            id,
            track_type: TrackType::Text,
            language: language.into(),
            roles: Vec::new(),
            active: false,
            bandwidth: None,
            width: None,
            height: None,
            kind: Some("subtitles".to_string()),
            mime_type: None,
            external: false,
            uri: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// 已解析的清单。解析本身由外部协作者完成，这里只保留轨道集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub uri: String,
    pub variants: Vec<Track>,
    pub text_tracks: Vec<Track>,
}

impl Manifest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            variants: Vec::new(),
            text_tracks: Vec::new(),
        }
    }

    pub fn with_variant(mut self, track: Track) -> Self {
        self.variants.push(track);
        self
    }

    pub fn with_text_track(mut self, track: Track) -> Self {
        self.text_tracks.push(track);
        self
    }
}

/// 字幕语言与角色
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageRole {
    pub language: String,
    pub role: String,
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Detached,
    Attaching,
    Attached,
    Loading,
    Loaded,
    Unloading,
    Destroyed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Destroyed)
    }

    /// 是否已有内容（轨道集合可用）
    pub fn has_content(&self) -> bool {
        matches!(self, SessionState::Loading | SessionState::Loaded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Detached => "detached",
            SessionState::Attaching => "attaching",
            SessionState::Attached => "attached",
            SessionState::Loading => "loading",
            SessionState::Loaded => "loaded",
            SessionState::Unloading => "unloading",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// 轨道切换记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackChoice {
    pub timestamp: DateTime<Utc>,
    pub id: TrackId,
    pub track_type: TrackType,
    /// true 表示由播放器自动选择，false 表示调用方显式选择
    pub from_adaptation: bool,
    pub bandwidth: Option<u64>,
}

/// 状态历史条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: SessionState,
    pub timestamp: DateTime<Utc>,
    /// 在该状态停留的秒数，当前状态持续累计
    pub duration: f64,
}

/// 会话统计
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub stream_bandwidth: Option<u64>,
    /// 最近一次加载耗时（秒）
    pub load_latency: Option<f64>,
    pub manifest_attempts: u32,
    pub switch_history: Vec<TrackChoice>,
    pub state_history: Vec<StateChange>,
}
