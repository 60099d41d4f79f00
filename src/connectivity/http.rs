// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! HTTP polling and WebSocket streaming against the sensor board

use std::time::Duration;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::transport::{SampleSource, Transport, TransportError};
use crate::telemetry::Sample;

const HEALTH_PATH: &str = "/health";
const POLL_PATH: &str = "/csi";
const STREAM_PATH: &str = "/ws";

/// Samples buffered between the socket reader and the link task
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Talks to the board's web server: `GET /health`, `GET /csi` and a
/// WebSocket at `/ws` carrying newline-delimited JSON samples.
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            request_timeout,
            connect_timeout,
        })
    }

    fn http_url(host: &str, port: u16, path: &str) -> String {
        format!("http://{}:{}{}", host, port, path)
    }

    fn ws_url(host: &str, port: u16) -> String {
        format!("ws://{}:{}{}", host, port, STREAM_PATH)
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Malformed(format!("HTTP {} from {}", status, url)));
        }
        Ok(response)
    }
}

fn request_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn health_check(&self, host: &str, port: u16, timeout: Duration) -> Result<(), TransportError> {
        let url = Self::http_url(host, port, HEALTH_PATH);
        self.get(&url, timeout).await?;
        Ok(())
    }

    async fn open_stream(&self, host: &str, port: u16) -> Result<SampleSource, TransportError> {
        let url = Self::ws_url(host, port);

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!("WebSocket stream open at {}", url);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let pump = tokio::spawn(async move {
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if !forward_frame(&tx, &text).await {
                            break;
                        }
                    }
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            if !forward_frame(&tx, text).await {
                                break;
                            }
                        }
                        Err(_) => debug!("Dropping non-UTF-8 binary frame"),
                    },
                    Ok(Message::Ping(data)) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket closed by device");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(SampleSource::new(rx, pump))
    }

    async fn poll_once(&self, host: &str, port: u16) -> Result<Sample, TransportError> {
        let url = Self::http_url(host, port, POLL_PATH);
        let body = self
            .get(&url, self.request_timeout)
            .await?
            .text()
            .await
            .map_err(|e| request_error(e, self.request_timeout))?;

        Sample::decode(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

/// Returns false once the receiving side is gone.
async fn forward_frame(tx: &mpsc::Sender<Sample>, text: &str) -> bool {
    let samples = match Sample::decode_frame(text) {
        Ok(samples) => samples,
        Err(e) => {
            debug!("Dropping frame: {}", e);
            return true;
        }
    };

    for sample in samples {
        if tx.send(sample).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(HttpTransport::http_url("192.168.1.50", 8080, HEALTH_PATH), "http://192.168.1.50:8080/health");
        assert_eq!(HttpTransport::ws_url("esp32.local", 81), "ws://esp32.local:81/ws");
    }

    #[tokio::test]
    async fn test_forward_frame_skips_malformed() {
        let (tx, mut rx) = mpsc::channel(8);
        assert!(forward_frame(&tx, "garbage").await);
        assert!(forward_frame(&tx, "{\"value\": 4.0}\n{\"value\": 5.0}").await);
        drop(tx);

        let mut values = vec![];
        while let Some(sample) = rx.recv().await {
            values.push(sample.value);
        }
        assert_eq!(values, vec![4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let transport = HttpTransport::new(Duration::from_millis(200), Duration::from_millis(200)).unwrap();
        let result = transport
            .health_check("256.256.256.256", 8080, Duration::from_millis(200))
            .await;
        assert!(result.is_err());
    }
}
