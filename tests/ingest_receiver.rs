//! Tests for the HTTP ingest receiver

mod test_utils;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures::future::BoxFuture;
use reso_helper::data::UNKNOWN_HOST;
use reso_helper::integrations::ingest::{router, Broadcaster, IngestState, ACK_BODY};
use std::sync::{Arc, Mutex};
use test_utils::RecordingSink;
use tower::ServiceExt;

async fn call(state: IngestState, method: Method, path: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn state_with(sink: Arc<RecordingSink>) -> IngestState {
    IngestState {
        sink,
        broadcaster: None,
    }
}

mod ingest {
    use super::*;

    #[tokio::test]
    async fn forwards_decoded_table_and_acknowledges() {
        let sink = Arc::new(RecordingSink::default());
        let body = r#"{"[fp] Forest": {"ActiveUserCount": 3}, "Lobby": {"ActiveUserCount": 0}}"#;

        let (status, text) = call(state_with(sink.clone()), Method::POST, "/ingest/hostA", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, ACK_BODY);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        let (host, table) = &reports[0];
        assert_eq!(host, "hostA");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("[fp] Forest").unwrap().active_users, 3);
    }

    #[tokio::test]
    async fn malformed_body_is_an_empty_table() {
        let sink = Arc::new(RecordingSink::default());

        let (status, text) = call(state_with(sink.clone()), Method::POST, "/ingest/hostA", "{oops").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, ACK_BODY);
        let reports = sink.reports();
        assert_eq!(reports[0].0, "hostA");
        assert!(reports[0].1.is_empty());
    }

    #[tokio::test]
    async fn any_method_is_accepted() {
        let sink = Arc::new(RecordingSink::default());

        let (status, _) = call(state_with(sink.clone()), Method::PUT, "/ingest/hostA", "{}").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn uses_last_path_segment_as_host() {
        let sink = Arc::new(RecordingSink::default());

        call(state_with(sink.clone()), Method::POST, "/ingest/eu/headless-2", "{}").await;

        assert_eq!(sink.reports()[0].0, "headless-2");
    }

    #[tokio::test]
    async fn missing_host_falls_back_to_unknown() {
        let sink = Arc::new(RecordingSink::default());

        call(state_with(sink.clone()), Method::POST, "/ingest/", "{}").await;
        call(state_with(sink.clone()), Method::POST, "/ingest", "{}").await;

        let hosts: Vec<String> = sink.reports().into_iter().map(|(h, _)| h).collect();
        assert_eq!(hosts, vec![UNKNOWN_HOST.to_string(), UNKNOWN_HOST.to_string()]);
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let sink = Arc::new(RecordingSink::default());

        let (status, _) = call(state_with(sink.clone()), Method::POST, "/other/hostA", "{}").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(sink.reports().is_empty());
    }
}

mod broadcast {
    use super::*;

    #[derive(Default)]
    struct RecordingBroadcaster {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast(&self, message: String) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if self.fail {
                    anyhow::bail!("channel unavailable");
                }
                self.messages.lock().unwrap().push(message);
                Ok(())
            })
        }
    }

    fn state_with_broadcaster(broadcaster: Arc<RecordingBroadcaster>) -> IngestState {
        IngestState {
            sink: Arc::new(RecordingSink::default()),
            broadcaster: Some(broadcaster),
        }
    }

    #[tokio::test]
    async fn sends_trimmed_message() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());

        let (status, text) = call(
            state_with_broadcaster(broadcaster.clone()),
            Method::POST,
            "/broadcast",
            "  Session restarted  \n",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, ACK_BODY);
        assert_eq!(*broadcaster.messages.lock().unwrap(), vec!["Session restarted"]);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());

        let (status, _) = call(
            state_with_broadcaster(broadcaster.clone()),
            Method::POST,
            "/broadcast",
            "   ",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(broadcaster.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_is_reported_as_bad_gateway() {
        let broadcaster = Arc::new(RecordingBroadcaster {
            fail: true,
            ..Default::default()
        });

        let (status, text) = call(
            state_with_broadcaster(broadcaster),
            Method::POST,
            "/broadcast",
            "hello",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(text.contains("channel unavailable"));
    }

    #[tokio::test]
    async fn unavailable_without_broadcaster() {
        let (status, _) = call(
            state_with(Arc::new(RecordingSink::default())),
            Method::POST,
            "/broadcast",
            "hello",
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
