use scriptorium::llm::{
    CallRequest, CallResult, LLMError, LLMProvider, ProviderClient, ProviderConfig,
    ProviderRegistry, ResponseFormat, StreamCallback,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Raw request captured by the stub server
struct Captured {
    head: String,
    body: Value,
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = socket.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + length {
                let body = serde_json::from_slice(&buf[pos + 4..pos + 4 + length]).unwrap();
                return Captured { head, body };
            }
        }
    }
    panic!("connection closed before the request was complete");
}

/// Answer exactly one request with `status` and `body`
async fn serve_once(status: u16, content_type: &'static str, body: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {} Stub\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        captured
    });
    (format!("http://{}", addr), handle)
}

fn client(provider_id: &str, model: &str, base_url: String) -> ProviderClient {
    ProviderClient::new(
        ProviderConfig {
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url),
            ..Default::default()
        },
        ProviderRegistry::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_openai_compatible_round_trip() {
    let reply = json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Paris."},
            "finish_reason": "stop"
        }]
    });
    let (base, server) = serve_once(200, "application/json", reply.to_string()).await;

    let result = client("openai", "gpt-4.1-mini", base)
        .complete(
            CallRequest::prompt("Capital of France?").with_system("Be brief."),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.text, "Paris.");

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("post /chat/completions"));
    assert!(captured.head.contains("authorization: bearer test-key"));
    assert_eq!(captured.body["model"], "gpt-4.1-mini");
    assert_eq!(captured.body["messages"][0]["role"], "system");
    assert!(captured.body.get("max_tokens").is_some());
    assert!(captured.body.get("reasoning_effort").is_none());
}

#[tokio::test]
async fn test_reasoning_model_gets_effort_fields() {
    let reply = json!({
        "choices": [{"message": {"content": "42", "reasoning_content": "thinking hard"}}]
    });
    let (base, server) = serve_once(200, "application/json", reply.to_string()).await;

    let result = client("openai", "o3-mini", base)
        .complete(CallRequest::prompt("Answer?"), None)
        .await
        .unwrap();
    assert_eq!(result.text, "42");
    assert_eq!(result.thinking.len(), 1);

    let captured = server.await.unwrap();
    assert!(captured.body.get("reasoning_effort").is_some());
    assert!(captured.body.get("max_completion_tokens").is_some());
    assert!(captured.body.get("temperature").is_none());
}

#[tokio::test]
async fn test_anthropic_round_trip() {
    let reply = json!({
        "id": "msg_1",
        "type": "message",
        "content": [
            {"type": "thinking", "thinking": "Consider the question."},
            {"type": "text", "text": "Hello from Claude."}
        ],
        "stop_reason": "end_turn"
    });
    let (base, server) = serve_once(200, "application/json", reply.to_string()).await;

    let result = client("anthropic", "", base)
        .complete(
            CallRequest::prompt("Hi").with_system("You are terse."),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.text, "Hello from Claude.");
    assert_eq!(result.thinking.len(), 1);

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("post /v1/messages"));
    assert!(captured.head.contains("x-api-key: test-key"));
    assert_eq!(captured.body["system"], "You are terse.");
    assert_eq!(captured.body["model"], "claude-sonnet-4-20250514");
}

#[tokio::test]
async fn test_local_inference_json_mode() {
    let reply = json!({
        "model": "llama3.1",
        "response": "<think>plan</think>{\"ok\":true}",
        "done": true
    });
    let (base, server) = serve_once(200, "application/json", reply.to_string()).await;

    let result = client("ollama", "llama3.1", base)
        .complete(
            CallRequest::prompt("Return JSON").with_response_format(ResponseFormat::Json),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.text, "{\"ok\":true}");
    assert_eq!(result.thinking.len(), 1);

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("post /api/generate"));
    assert_eq!(captured.body["format"], "json");
    assert_eq!(captured.body["stream"], false);
}

#[tokio::test]
async fn test_http_error_status_surfaces() {
    let (base, _server) = serve_once(
        429,
        "application/json",
        r#"{"error":{"message":"slow down"}}"#.to_string(),
    )
    .await;

    let err = client("groq", "llama-3.3-70b-versatile", base)
        .complete(CallRequest::prompt("Hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Http { status: 429, ref body, .. } if body.contains("slow down")));
}

#[tokio::test]
async fn test_empty_reply_is_an_error() {
    let reply = json!({"choices": [{"message": {"content": ""}}]});
    let (base, _server) = serve_once(200, "application/json", reply.to_string()).await;

    let err = client("openai", "gpt-4.1-mini", base)
        .complete(CallRequest::prompt("Hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::EmptyResponse(_)));
}

#[tokio::test]
async fn test_reasoning_without_answer_is_an_error() {
    let reply = json!({
        "choices": [{"message": {"content": "", "reasoning_content": "ran out of budget"}}]
    });
    let (base, _server) = serve_once(200, "application/json", reply.to_string()).await;

    let err = client("openai", "o4-mini", base)
        .complete(CallRequest::prompt("Hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::EmptyResponse(_)));
}

#[tokio::test]
async fn test_streaming_snapshots_converge() {
    let mut sse = String::new();
    for piece in ["Stream", "ing ", "works"] {
        sse.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": piece}}]})
        ));
    }
    sse.push_str("data: [DONE]\n\n");
    let (base, server) = serve_once(200, "text/event-stream", sse).await;

    let snapshots = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&snapshots);
    let callback: StreamCallback = Arc::new(move |snapshot: &CallResult| {
        sink.lock().unwrap().push(snapshot.text.clone());
    });

    let result = client("openai", "gpt-4.1-mini", base)
        .complete(CallRequest::prompt("Stream please"), Some(callback))
        .await
        .unwrap();
    assert_eq!(result.text, "Streaming works");
    assert_eq!(snapshots.lock().unwrap().last().unwrap(), "Streaming works");
    assert_eq!(server.await.unwrap().body["stream"], true);
}
