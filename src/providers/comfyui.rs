//! Client for a local ComfyUI server.
//!
//! The engine is a black box: prompts go in over HTTP, completion is observed
//! on the websocket, and results land in the shared output directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::constants::WEIGHT_EXTENSIONS;
use crate::core::comfyui_workflow::{
    media_file_inputs, parse_workflow, randomise_seeds, remote_inputs, set_workflow_input,
    summarize_nodes, weight_references,
};
use crate::error::{AdapterError, AdapterResult};
use crate::weights::WeightsDownloader;

type EngineSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A decoded websocket frame, relative to one prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress { value: u64, max: u64 },
    NodeStarted { node: String },
    Finished,
    Failed { message: String },
    Other,
}

/// Decode one websocket text frame for `prompt_id`. Frames for other prompts
/// decode as `Other`.
pub fn interpret_message(text: &str, prompt_id: &str) -> EngineEvent {
    let Ok(message) = serde_json::from_str::<Value>(text) else {
        return EngineEvent::Other;
    };
    let kind = message.get("type").and_then(Value::as_str).unwrap_or("");
    let data = message.get("data").cloned().unwrap_or(Value::Null);
    let for_prompt = match data.get("prompt_id").and_then(Value::as_str) {
        Some(id) => id == prompt_id,
        None => true,
    };
    if !for_prompt {
        return EngineEvent::Other;
    }

    match kind {
        "executing" => match data.get("node") {
            Some(Value::Null) | None => EngineEvent::Finished,
            Some(node) => EngineEvent::NodeStarted {
                node: node
                    .as_str()
                    .map(|node| node.to_string())
                    .unwrap_or_else(|| node.to_string()),
            },
        },
        "progress" => EngineEvent::Progress {
            value: data.get("value").and_then(Value::as_u64).unwrap_or(0),
            max: data.get("max").and_then(Value::as_u64).unwrap_or(0),
        },
        "execution_error" => {
            let node_type = data
                .get("node_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown node");
            let exception = data
                .get("exception_message")
                .and_then(Value::as_str)
                .unwrap_or("no details");
            EngineEvent::Failed {
                message: format!("{} failed: {}", node_type, exception.trim()),
            }
        }
        "execution_interrupted" => EngineEvent::Failed {
            message: "Execution interrupted".to_string(),
        },
        _ => EngineEvent::Other,
    }
}

struct ConnectedSocket {
    client_id: String,
    stream: EngineSocket,
}

pub struct ComfyUiClient {
    config: AdapterConfig,
    http: reqwest::Client,
    downloader: WeightsDownloader,
    engine: Option<Child>,
    socket: Option<ConnectedSocket>,
}

impl ComfyUiClient {
    pub fn new(config: AdapterConfig, downloader: WeightsDownloader) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            downloader,
            engine: None,
            socket: None,
        }
    }

    /// Launch the engine when configured to, then wait until it answers.
    pub async fn start_server(&mut self, output_dir: &Path, input_dir: &Path) -> AdapterResult<()> {
        if self.config.launch_engine && self.engine.is_none() {
            let main_script = self.config.comfyui_root.join("main.py");
            info!(
                "Starting ComfyUI: {} {}",
                self.config.python,
                main_script.display()
            );
            let child = Command::new(&self.config.python)
                .arg(&main_script)
                .arg("--output-directory")
                .arg(output_dir)
                .arg("--input-directory")
                .arg(input_dir)
                .arg("--disable-metadata")
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| AdapterError::io(&main_script, err))?;
            self.engine = Some(child);
        }
        self.wait_for_server().await
    }

    pub async fn wait_for_server(&mut self) -> AdapterResult<()> {
        let url = format!("{}/history/123", self.config.server_url());
        let timeout = self.config.startup_timeout();
        let start = Instant::now();
        loop {
            if let Some(child) = self.engine.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(AdapterError::engine(format!(
                        "ComfyUI exited during startup ({})",
                        status
                    )));
                }
            }

            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Server running at {}", self.config.server_address);
                    return Ok(());
                }
                Ok(response) => debug!("Server not ready yet ({})", response.status()),
                Err(err) => debug!("Server not ready yet: {}", err),
            }

            if start.elapsed() >= timeout {
                return Err(AdapterError::EngineUnavailable {
                    address: self.config.server_address.clone(),
                    waited: start.elapsed(),
                });
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    pub async fn load_workflow(&self, json: &str) -> AdapterResult<Value> {
        let mut parsed = parse_workflow(json)?;
        self.prepare_workflow(&mut parsed).await?;
        Ok(parsed)
    }

    /// Fetch referenced weights and remote inputs so the engine finds them on disk.
    pub async fn prepare_workflow(&self, workflow: &mut Value) -> AdapterResult<()> {
        for node in summarize_nodes(workflow)? {
            debug!(
                "node {} {} {:?} inputs={:?}",
                node.id, node.class_type, node.title, node.inputs
            );
        }

        info!("Checking weights");
        for weight in weight_references(workflow, WEIGHT_EXTENSIONS) {
            self.downloader.download_weights(&weight).await?;
        }

        info!("Checking inputs");
        self.handle_remote_inputs(workflow).await?;
        let input_dir = &self.config.input_dir;
        for file in media_file_inputs(workflow) {
            if input_dir.join(&file).exists() {
                info!("✅ {}", file);
            } else {
                warn!("❌ {} not provided in {}", file, input_dir.display());
            }
        }
        Ok(())
    }

    pub fn randomise_seeds(&self, workflow: &mut Value) {
        for change in randomise_seeds(workflow) {
            info!(
                "Randomising {} on node {} to {}",
                change.input_key, change.node_id, change.value
            );
        }
    }

    pub async fn connect(&mut self) -> AdapterResult<()> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = self.config.websocket_url(&client_id);
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!("Connected to {}", url);
        self.socket = Some(ConnectedSocket { client_id, stream });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Queue `workflow` and block until the engine reports it finished.
    pub async fn run_workflow(&mut self, workflow: &Value) -> AdapterResult<()> {
        let client_id = self
            .socket
            .as_ref()
            .map(|socket| socket.client_id.clone())
            .ok_or(AdapterError::NotConnected)?;

        let prompt_id = self.queue_prompt(workflow, &client_id).await?;
        info!("Queued prompt {}", prompt_id);
        self.wait_for_prompt(&prompt_id).await?;

        let history = self.get_history(&prompt_id).await?;
        if let Some(outputs) = extract_outputs(&history, &prompt_id) {
            info!("Prompt {} produced {} file(s)", prompt_id, count_output_files(outputs));
        }
        Ok(())
    }

    pub async fn queue_prompt(&self, workflow: &Value, client_id: &str) -> AdapterResult<String> {
        let url = format!("{}/prompt", self.config.server_url());
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "prompt": workflow, "client_id": client_id }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AdapterError::engine(format!(
                "ComfyUI rejected prompt ({}): {}",
                status, body
            )));
        }
        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            AdapterError::engine(format!("Failed to parse prompt response: {}", err))
        })?;
        payload
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(|value| value.to_string())
            .ok_or_else(|| AdapterError::engine("ComfyUI response missing prompt_id"))
    }

    pub async fn get_history(&self, prompt_id: &str) -> AdapterResult<Value> {
        let url = format!(
            "{}/history/{}",
            self.config.server_url(),
            urlencoding::encode(prompt_id)
        );
        let payload: Value = self.http.get(url).send().await?.json().await?;
        let status = payload
            .get(prompt_id)
            .and_then(|entry| entry.get("status"))
            .and_then(|status| status.get("status_str"))
            .and_then(Value::as_str);
        if status == Some("error") {
            return Err(AdapterError::engine(format!(
                "Prompt {} finished with an error",
                prompt_id
            )));
        }
        Ok(payload)
    }

    async fn wait_for_prompt(&mut self, prompt_id: &str) -> AdapterResult<()> {
        let socket = self.socket.as_mut().ok_or(AdapterError::NotConnected)?;
        while let Some(message) = socket.stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match interpret_message(&text, prompt_id) {
                EngineEvent::Finished => return Ok(()),
                EngineEvent::Failed { message } => return Err(AdapterError::engine(message)),
                EngineEvent::NodeStarted { node } => info!("Executing node {}", node),
                EngineEvent::Progress { value, max } => debug!("Progress {}/{}", value, max),
                EngineEvent::Other => {}
            }
        }
        self.socket = None;
        Err(AdapterError::engine(
            "ComfyUI closed the connection before the prompt finished",
        ))
    }

    async fn handle_remote_inputs(&self, workflow: &mut Value) -> AdapterResult<()> {
        let remote = remote_inputs(workflow);
        // file name -> URL it was fetched from during this run
        let mut fetched: BTreeMap<String, String> = BTreeMap::new();
        for input in remote {
            match fetched.get(&input.file_name) {
                Some(url) if *url == input.url => {}
                Some(url) => warn!(
                    "{} from {} clashes with the file already fetched from {}; node {} keeps that file",
                    input.file_name, input.url, url, input.node_id
                ),
                None => {
                    let target = self.config.input_dir.join(&input.file_name);
                    if target.exists() {
                        info!("✅ {} already in inputs", input.file_name);
                    } else {
                        self.fetch_remote_input(&input.url, &target).await?;
                    }
                    fetched.insert(input.file_name.clone(), input.url.clone());
                }
            }
            set_workflow_input(
                workflow,
                &input.node_id,
                &input.input_key,
                Value::String(input.file_name),
            )?;
        }
        Ok(())
    }

    async fn fetch_remote_input(&self, url: &str, target: &Path) -> AdapterResult<()> {
        info!("Downloading {} to {}", url, target.display());
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Download {
                name: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(&self.config.input_dir)
            .await
            .map_err(|err| AdapterError::io(&self.config.input_dir, err))?;
        tokio::fs::write(target, &bytes)
            .await
            .map_err(|err| AdapterError::io(target, err))
    }
}

fn extract_outputs<'a>(payload: &'a Value, prompt_id: &str) -> Option<&'a Value> {
    if let Some(outputs) = payload.get("outputs") {
        return Some(outputs);
    }
    payload.get(prompt_id)?.get("outputs")
}

fn count_output_files(outputs: &Value) -> usize {
    let Some(map) = outputs.as_object() else {
        return 0;
    };
    map.values()
        .filter_map(Value::as_object)
        .flat_map(|node| node.values())
        .filter_map(Value::as_array)
        .flat_map(|items| items.iter())
        .filter(|item| item.get("filename").is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightsManifest;
    use futures_util::SinkExt;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, root: &Path) -> AdapterConfig {
        AdapterConfig {
            server_address: server.uri().trim_start_matches("http://").to_string(),
            input_dir: root.join("inputs"),
            output_dir: root.join("outputs"),
            comfyui_root: root.join("ComfyUI"),
            weights_base_url: server.uri(),
            startup_timeout_secs: 0,
            poll_interval_ms: 10,
            ..AdapterConfig::default()
        }
    }

    fn client_with(config: AdapterConfig, server: &MockServer) -> ComfyUiClient {
        let manifest = WeightsManifest::from_json(
            r#"{ "categories": { "CHECKPOINTS": {
                "dest": "models/checkpoints", "url_path": "checkpoints",
                "weights": ["present.safetensors"] } } }"#,
            &server.uri(),
        )
        .unwrap();
        let downloader = WeightsDownloader::with_manifest(&config, manifest);
        ComfyUiClient::new(config, downloader)
    }

    fn client_for(server: &MockServer, root: &Path) -> ComfyUiClient {
        client_with(test_config(server, root), server)
    }

    /// Accept one websocket client, send it `frames`, then hold the connection
    /// until the client hangs up. Returns the listener's `host:port`.
    async fn scripted_socket(frames: Vec<Message>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                if socket.send(frame).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = socket.next().await {}
        });
        address
    }

    fn text(value: Value) -> Message {
        Message::Text(value.to_string())
    }

    async fn mount_prompt_routes(server: &MockServer, history_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "p1", "number": 0 })),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/history/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "p1": {
                    "status": { "status_str": "success", "completed": true },
                    "outputs": { "9": { "images": [ { "filename": "out.png" } ] } }
                }
            })))
            .expect(history_calls)
            .mount(server)
            .await;
    }

    async fn connected_client(
        server: &MockServer,
        root: &Path,
        frames: Vec<Message>,
    ) -> ComfyUiClient {
        let config = AdapterConfig {
            websocket_address: Some(scripted_socket(frames).await),
            ..test_config(server, root)
        };
        let mut client = client_with(config, server);
        client.connect().await.unwrap();
        assert!(client.is_connected());
        client
    }

    #[test]
    fn test_interpret_executing_frames() {
        let started = r#"{"type":"executing","data":{"node":"57","prompt_id":"p1"}}"#;
        let done = r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#;
        let other = r#"{"type":"executing","data":{"node":null,"prompt_id":"p2"}}"#;

        assert_eq!(
            interpret_message(started, "p1"),
            EngineEvent::NodeStarted {
                node: "57".to_string()
            }
        );
        assert_eq!(interpret_message(done, "p1"), EngineEvent::Finished);
        assert_eq!(interpret_message(other, "p1"), EngineEvent::Other);
    }

    #[test]
    fn test_interpret_error_and_progress() {
        let error = r#"{"type":"execution_error","data":{"prompt_id":"p1",
            "node_type":"FaceDetailer","exception_message":"CUDA out of memory\n"}}"#;
        assert_eq!(
            interpret_message(error, "p1"),
            EngineEvent::Failed {
                message: "FaceDetailer failed: CUDA out of memory".to_string()
            }
        );
        let progress = r#"{"type":"progress","data":{"value":3,"max":20}}"#;
        assert_eq!(
            interpret_message(progress, "p1"),
            EngineEvent::Progress { value: 3, max: 20 }
        );
        assert_eq!(interpret_message("not json", "p1"), EngineEvent::Other);
        assert_eq!(
            interpret_message(r#"{"type":"status","data":{}}"#, "p1"),
            EngineEvent::Other
        );
    }

    #[test]
    fn test_count_output_files() {
        let outputs = json!({
            "70": { "images": [ { "filename": "a.png" }, { "filename": "b.png" } ] },
            "71": { "gifs": [ { "filename": "c.gif" } ], "text": ["ignored"] }
        });
        assert_eq!(count_output_files(&outputs), 3);
    }

    #[tokio::test]
    async fn test_queue_prompt_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_partial_json(json!({ "client_id": "client-1" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "abc", "number": 1 })),
            )
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        let id = client.queue_prompt(&json!({}), "client-1").await.unwrap();
        assert_eq!(id, "abc");
    }

    #[tokio::test]
    async fn test_queue_prompt_rejection_carries_node_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "type": "prompt_outputs_failed_validation" },
                "node_errors": { "57": "Invalid image file" }
            })))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        let err = client.queue_prompt(&json!({}), "c").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("rejected prompt"));
        assert!(text.contains("Invalid image file"));
    }

    #[tokio::test]
    async fn test_history_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/p9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "p9": { "status": { "status_str": "error", "completed": false }, "outputs": {} }
            })))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        assert!(matches!(
            client.get_history("p9").await,
            Err(AdapterError::Engine { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let mut client = client_for(&server, root.path());

        client.wait_for_server().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let mut client = client_for(&server, root.path());

        let err = client.wait_for_server().await.unwrap_err();
        match err {
            AdapterError::EngineUnavailable { waited, .. } => {
                assert!(waited < Duration::from_secs(5))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_requires_connection() {
        let server = MockServer::start().await;
        let root = tempfile::tempdir().unwrap();
        let mut client = client_for(&server, root.path());

        assert!(!client.is_connected());
        assert!(matches!(
            client.run_workflow(&json!({})).await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_run_workflow_finishes_on_executing_null() {
        let server = MockServer::start().await;
        mount_prompt_routes(&server, 1).await;
        let root = tempfile::tempdir().unwrap();
        let frames = vec![
            Message::Binary(vec![1, 2, 3]),
            text(json!({ "type": "status", "data": { "status": {} } })),
            text(json!({ "type": "executing", "data": { "node": null, "prompt_id": "other" } })),
            text(json!({ "type": "executing", "data": { "node": "57", "prompt_id": "p1" } })),
            text(json!({ "type": "progress", "data": { "value": 1, "max": 2 } })),
            text(json!({ "type": "executing", "data": { "node": null, "prompt_id": "p1" } })),
        ];
        let mut client = connected_client(&server, root.path(), frames).await;

        client.run_workflow(&json!({})).await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_run_workflow_fails_on_execution_error() {
        let server = MockServer::start().await;
        mount_prompt_routes(&server, 0).await;
        let root = tempfile::tempdir().unwrap();
        let frames = vec![
            text(json!({ "type": "executing", "data": { "node": "62", "prompt_id": "p1" } })),
            text(json!({ "type": "execution_error", "data": {
                "prompt_id": "p1", "node_type": "FaceDetailer",
                "exception_message": "CUDA out of memory" } })),
        ];
        let mut client = connected_client(&server, root.path(), frames).await;

        let err = client.run_workflow(&json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::Engine { .. }));
        assert!(err.to_string().contains("FaceDetailer failed: CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_run_workflow_fails_when_socket_closes_early() {
        let server = MockServer::start().await;
        mount_prompt_routes(&server, 0).await;
        let root = tempfile::tempdir().unwrap();
        let frames = vec![
            text(json!({ "type": "executing", "data": { "node": "57", "prompt_id": "p1" } })),
            Message::Close(None),
        ];
        let mut client = connected_client(&server, root.path(), frames).await;

        let err = client.run_workflow(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("closed the connection"));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_same_file_name_from_two_urls_fetches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/hand.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/hand.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        let json = json!({
            "57": { "class_type": "LoadImage",
                    "inputs": { "image": format!("{}/a/hand.png", server.uri()) } },
            "58": { "class_type": "LoadImage",
                    "inputs": { "image": format!("{}/b/hand.png", server.uri()) } }
        })
        .to_string();

        let workflow = client.load_workflow(&json).await.unwrap();

        assert_eq!(workflow["57"]["inputs"]["image"], json!("hand.png"));
        assert_eq!(workflow["58"]["inputs"]["image"], json!("hand.png"));
        assert_eq!(
            std::fs::read(root.path().join("inputs/hand.png")).unwrap(),
            b"first"
        );
    }

    #[tokio::test]
    async fn test_remote_input_cannot_escape_input_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        let url = format!("{}/x/..%2F..%2Fescaped.png", server.uri());
        let json = json!({ "57": { "class_type": "LoadImage", "inputs": { "image": url } } })
            .to_string();

        let workflow = client.load_workflow(&json).await.unwrap();

        assert_eq!(workflow["57"]["inputs"]["image"], json!("escaped.png"));
        assert!(root.path().join("inputs/escaped.png").exists());
        assert!(!root.path().join("escaped.png").exists());
    }

    #[tokio::test]
    async fn test_load_workflow_fetches_remote_inputs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/hand%20photo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());
        let checkpoint = root.path().join("ComfyUI/models/checkpoints/present.safetensors");
        std::fs::create_dir_all(checkpoint.parent().unwrap()).unwrap();
        std::fs::write(&checkpoint, b"ckpt").unwrap();

        let url = format!("{}/images/hand%20photo.png", server.uri());
        let json = json!({
            "4": { "class_type": "CheckpointLoaderSimple",
                   "inputs": { "ckpt_name": "present.safetensors" } },
            "57": { "class_type": "LoadImage", "inputs": { "image": url.clone() } },
            "58": { "class_type": "LoadImage", "inputs": { "image": url } }
        })
        .to_string();

        let workflow = client.load_workflow(&json).await.unwrap();

        assert_eq!(workflow["57"]["inputs"]["image"], json!("hand photo.png"));
        assert_eq!(workflow["58"]["inputs"]["image"], json!("hand photo.png"));
        assert_eq!(
            std::fs::read(root.path().join("inputs/hand photo.png")).unwrap(),
            b"png"
        );
    }

    #[tokio::test]
    async fn test_load_workflow_unknown_weight_fails() {
        let server = MockServer::start().await;
        let root = tempfile::tempdir().unwrap();
        let client = client_for(&server, root.path());

        let json = r#"{ "4": { "class_type": "CheckpointLoaderSimple",
                               "inputs": { "ckpt_name": "mystery.safetensors" } } }"#;
        assert!(matches!(
            client.load_workflow(json).await,
            Err(AdapterError::UnknownWeight { .. })
        ));
    }
}
