use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

/// One frame of the server-push progress stream. Serialized as a single
/// JSON object per SSE `data:` line, discriminated by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress {
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        product: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        filename: String,
        product_name: String,
        color_name: String,
        product_number: String,
        gender_code: String,
        color_code: String,
        prompt: String,
        /// Base64-encoded image bytes.
        data: String,
    },
    Brand {
        data: Value,
    },
    Products {
        data: Value,
    },
    ProductCreated {
        title: String,
        handle: String,
        current: usize,
        total: usize,
    },
    Error {
        message: String,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        created: Option<usize>,
    },
}

impl StreamEvent {
    pub fn item_progress(
        current: usize,
        total: usize,
        product: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self::Progress {
            current: Some(current),
            total: Some(total),
            product: Some(product.into()),
            filename: Some(filename.into()),
            stage: None,
            message: None,
        }
    }

    pub fn stage_progress(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Progress {
            current: None,
            total: None,
            product: None,
            filename: None,
            stage: Some(stage),
            message: Some(message.into()),
        }
    }

    pub fn push_progress(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self::Progress {
            current: Some(current),
            total: Some(total),
            product: None,
            filename: None,
            stage: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn generation_complete(total: usize) -> Self {
        Self::Complete {
            total: Some(total),
            created: None,
        }
    }

    pub fn push_complete(created: usize, total: usize) -> Self {
        Self::Complete {
            total: Some(total),
            created: Some(created),
        }
    }

    pub fn bare_complete() -> Self {
        Self::Complete {
            total: None,
            created: None,
        }
    }
}

/// Channel an orchestrator writes events into while the SSE layer drains
/// the receiving end. Bounded so a slow consumer applies backpressure to
/// the run instead of buffering image payloads without limit.
pub fn channel() -> (mpsc::Sender<StreamEvent>, mpsc::Receiver<StreamEvent>) {
    mpsc::channel(16)
}

/// Sends one event, reporting whether the consumer is still listening.
/// Orchestrators stop early once the stream is gone.
pub async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Wraps the receiving end of an event channel as an SSE response.
pub fn sse_response(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_progress_serializes_flat() {
        let event = StreamEvent::item_progress(1, 4, "Trail Jacket", "CNCP001MBLK");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["current"], 1);
        assert_eq!(json["total"], 4);
        assert_eq!(json["product"], "Trail Jacket");
        assert_eq!(json["filename"], "CNCP001MBLK");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn image_event_uses_camel_case_metadata() {
        let event = StreamEvent::Image {
            filename: "CNCP001MBLK".into(),
            product_name: "Trail Jacket".into(),
            color_name: "Black".into(),
            product_number: "CNC-P001".into(),
            gender_code: "M".into(),
            color_code: "BLK".into(),
            prompt: "flat-lay".into(),
            data: "aGVsbG8=".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["productName"], "Trail Jacket");
        assert_eq!(json["colorCode"], "BLK");
        assert_eq!(json["data"], "aGVsbG8=");
    }

    #[test]
    fn complete_variants_carry_their_counts() {
        let generation = serde_json::to_value(StreamEvent::generation_complete(3)).unwrap();
        assert_eq!(generation["total"], 3);
        assert!(generation.get("created").is_none());

        let push = serde_json::to_value(StreamEvent::push_complete(2, 5)).unwrap();
        assert_eq!(push["created"], 2);
        assert_eq!(push["total"], 5);

        let bare = serde_json::to_value(StreamEvent::bare_complete()).unwrap();
        assert!(bare.get("total").is_none());
    }

    #[tokio::test]
    async fn emit_reports_closed_consumer() {
        let (tx, rx) = channel();
        assert!(emit(&tx, StreamEvent::bare_complete()).await);
        drop(rx);
        assert!(!emit(&tx, StreamEvent::bare_complete()).await);
    }
}
