use crate::error::PlayerError;
use crate::types::{SessionState, Track};
use serde::{Deserialize, Serialize};

/// 事件类型，用于监听器注册
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Attach,
    Detach,
    Loading,
    Streaming,
    Loaded,
    Unloading,
    VariantChanged,
    TextChanged,
    TextTrackVisibility,
    StateChanged,
    Error,
}

/// 播放器对外派发的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    Attach,
    Detach,
    Loading { uri: String },
    /// 清单已就绪，轨道可查询，流式协作者即将启动
    Streaming,
    Loaded { uri: String },
    Unloading,
    VariantChanged { track: Track },
    TextChanged { track: Track },
    TextTrackVisibility { visible: bool },
    StateChanged { from: SessionState, to: SessionState },
    Error { error: PlayerError },
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Attach => EventKind::Attach,
            PlayerEvent::Detach => EventKind::Detach,
            PlayerEvent::Loading { .. } => EventKind::Loading,
            PlayerEvent::Streaming => EventKind::Streaming,
            PlayerEvent::Loaded { .. } => EventKind::Loaded,
            PlayerEvent::Unloading => EventKind::Unloading,
            PlayerEvent::VariantChanged { .. } => EventKind::VariantChanged,
            PlayerEvent::TextChanged { .. } => EventKind::TextChanged,
            PlayerEvent::TextTrackVisibility { .. } => EventKind::TextTrackVisibility,
            PlayerEvent::StateChanged { .. } => EventKind::StateChanged,
            PlayerEvent::Error { .. } => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_event_kind_mapping() {
        let event = PlayerEvent::Error {
            error: PlayerError::critical(ErrorCode::HttpError, "boom"),
        };
        assert_eq!(event.kind(), EventKind::Error);
        assert_eq!(PlayerEvent::Streaming.kind(), EventKind::Streaming);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&EventKind::TextTrackVisibility).unwrap();
        assert_eq!(json, "\"text_track_visibility\"");
    }
}
