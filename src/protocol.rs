// Viewer-facing wire protocol.
//
// Every server-to-viewer frame is a UTF-8 JSON object with a `status` field.
// A processing cycle always produces exactly two frames: `Processing` when a
// new clipboard image is detected, then one `Success` or `Error` result.

use serde_json::json;

/// One message broadcast to all connected viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleMessage {
    /// A new image was detected and the solve call is underway.
    Processing,
    /// The solve call returned an answer.
    Success { content: String },
    /// The solve call failed; `content` is a display-ready message.
    Error { content: String },
}

impl CycleMessage {
    /// Serialize to the JSON text frame sent over the viewer channel.
    pub fn to_frame(&self) -> String {
        match self {
            CycleMessage::Processing => json!({ "status": "processing" }),
            CycleMessage::Success { content } => {
                json!({ "status": "success", "content": content })
            }
            CycleMessage::Error { content } => {
                json!({ "status": "error", "content": content })
            }
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).expect("frame should be valid JSON")
    }

    #[test]
    fn processing_frame_has_status_only() {
        let v = parse(&CycleMessage::Processing.to_frame());
        assert_eq!(v["status"], "processing");
        assert!(v.get("content").is_none());
    }

    #[test]
    fn success_frame_carries_content() {
        let msg = CycleMessage::Success {
            content: "answer-1".to_string(),
        };
        let v = parse(&msg.to_frame());
        assert_eq!(v["status"], "success");
        assert_eq!(v["content"], "answer-1");
    }

    #[test]
    fn error_frame_carries_content() {
        let msg = CycleMessage::Error {
            content: "API credentials are not configured".to_string(),
        };
        let v = parse(&msg.to_frame());
        assert_eq!(v["status"], "error");
        assert_eq!(v["content"], "API credentials are not configured");
    }

    #[test]
    fn content_with_quotes_and_unicode_survives_serialization() {
        let msg = CycleMessage::Success {
            content: "答案：\"B\"。\nMarkdown **bold**".to_string(),
        };
        let v = parse(&msg.to_frame());
        assert_eq!(v["content"], "答案：\"B\"。\nMarkdown **bold**");
    }
}
