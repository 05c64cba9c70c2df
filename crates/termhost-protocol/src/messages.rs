use serde::{Deserialize, Serialize};

/// Pushed by a backend when another window wants to take over one of this
/// window's terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachRequest {
    pub request_id: u64,
    /// Workspace that currently owns the instance.
    pub workspace_id: String,
    /// Instance id in the owning window.
    pub instance_id: u32,
}

/// One chunk of buffered output, recorded at the dimensions it was written at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub cols: u16,
    pub rows: u16,
    pub data: String,
}

/// Buffered output a reattached process replays into its instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub events: Vec<ReplayEntry>,
}

impl ReplayEvent {
    /// Dimensions of the last chunk, which is what the instance ends up at.
    pub fn final_dimensions(&self) -> Option<(u16, u16)> {
        self.events.last().map(|e| (e.cols, e.rows))
    }

    pub fn byte_len(&self) -> usize {
        self.events.iter().map(|e| e.data.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMark {
    pub name: String,
    pub start_time: f64,
}

impl PerformanceMark {
    pub fn new(name: impl Into<String>, start_time: f64) -> Self {
        Self {
            name: name.into(),
            start_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detach_request_wire_format() {
        let req = DetachRequest {
            request_id: 9,
            workspace_id: "ws-a".to_string(),
            instance_id: 3,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"requestId":9,"workspaceId":"ws-a","instanceId":3}"#);
    }

    #[test]
    fn test_replay_final_dimensions() {
        let replay = ReplayEvent {
            events: vec![
                ReplayEntry {
                    cols: 80,
                    rows: 24,
                    data: "$ ls\r\n".to_string(),
                },
                ReplayEntry {
                    cols: 120,
                    rows: 40,
                    data: "Cargo.toml\r\n".to_string(),
                },
            ],
        };
        assert_eq!(replay.final_dimensions(), Some((120, 40)));
        assert_eq!(replay.byte_len(), 18);
        assert_eq!(ReplayEvent::default().final_dimensions(), None);
    }

    #[test]
    fn test_performance_mark_camel_case() {
        let mark = PerformanceMark::new("code/didConnect", 12.5);
        let json = serde_json::to_string(&mark).unwrap();
        assert_eq!(json, r#"{"name":"code/didConnect","startTime":12.5}"#);
    }
}
