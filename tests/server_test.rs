//! Integration tests for the early-warning HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use hana_early_warning::server::{run, ServerConfig};
    use hana_early_warning::EngineConfig;
    use std::time::Duration;

    async fn start() -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let config = ServerConfig::new(0, EngineConfig::default());
        let started = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        started
    }

    fn frame(session: &str, hr: f64, hrv: f64, stress: f64, timestamp: &str) -> serde_json::Value {
        serde_json::json!({
            "sessionId": session,
            "sample": {
                "heartRate": hr,
                "hrv": hrv,
                "stressLevel": stress,
                "timestamp": timestamp
            }
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
        assert_eq!(body["active_sessions"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_ingest_returns_assessment() {
        let (addr, shutdown_tx) = start().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/ingest", addr))
            .json(&frame("band-1", 180.0, 15.0, 90.0, "2024-01-22T12:00:00Z"))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["warning_level"], "alert");
        assert_eq!(body["session_id"], "band-1");
        assert!(!body["detected_patterns"].as_array().unwrap().is_empty());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_out_of_order_rejected() {
        let (addr, shutdown_tx) = start().await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/ingest", addr);

        let first = client
            .post(&url)
            .json(&frame("band-2", 72.0, 50.0, 20.0, "2024-01-22T12:00:10Z"))
            .send()
            .await
            .expect("Failed to send request");
        assert!(first.status().is_success());

        let late = client
            .post(&url)
            .json(&frame("band-2", 72.0, 50.0, 20.0, "2024-01-22T12:00:00Z"))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(late.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = late.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "OUT_OF_ORDER");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_malformed_frame_rejected() {
        let (addr, shutdown_tx) = start().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/ingest", addr))
            .json(&serde_json::json!({"sessionId": "band-3", "sample": {"heartRate": 70}}))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_client_error());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (addr, shutdown_tx) = start().await;
        let client = reqwest::Client::new();
        let session_url = format!("http://{}/sessions/band-4", addr);

        let missing = client
            .get(&session_url)
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        client
            .post(format!("http://{}/ingest", addr))
            .json(&frame("band-4", 72.0, 50.0, 20.0, "2024-01-22T12:00:00Z"))
            .send()
            .await
            .expect("Failed to send request");

        let latest = client
            .get(&session_url)
            .send()
            .await
            .expect("Failed to send request");
        assert!(latest.status().is_success());
        let body: serde_json::Value = latest.json().await.expect("Failed to parse JSON");
        assert_eq!(body["warning_level"], "normal");
        assert_eq!(body["sample_count"], 1);

        let ended = client
            .delete(&session_url)
            .send()
            .await
            .expect("Failed to send request");
        assert!(ended.status().is_success());
        let summary: serde_json::Value = ended.json().await.expect("Failed to parse JSON");
        assert_eq!(summary["samples_accepted"], 1);

        let gone = client
            .get(&session_url)
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_idle_session_is_ended() {
        let config = ServerConfig::new(0, EngineConfig::default())
            .with_idle_timeout(Some(Duration::from_millis(200)));
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        let client = reqwest::Client::new();

        client
            .post(format!("http://{}/ingest", addr))
            .json(&frame("band-5", 72.0, 50.0, 20.0, "2024-01-22T12:00:00Z"))
            .send()
            .await
            .expect("Failed to send request");

        let health: serde_json::Value = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(health["active_sessions"], 1);

        tokio::time::sleep(Duration::from_millis(800)).await;

        let gone = client
            .get(format!("http://{}/sessions/band-5", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_invalid_engine_config_refused() {
        let mut engine = EngineConfig::default();
        engine.detector.confidence_floor = 2.0;

        let result = run(ServerConfig::new(0, engine)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start().await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/ingest", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
