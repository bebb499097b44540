//! End-to-end scenarios over the in-memory transport and the HTTP router

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use strom::client::{TasksClient, ToolCallEvent};
use strom::error::{Error, ErrorCode};
use strom::session::RequestOptions;
use strom::transport::memory;
use strom::types::{
    CallToolResponse, ElicitRequestParams, ElicitResult, Json, Schema, TaskStatus,
};
use strom::{App, Client, Context};

#[derive(serde::Deserialize)]
struct AddArgs {
    a: f64,
    b: f64,
}

/// Connects a client to the given app over an in-memory duplex.
async fn connect(app: App) -> Client {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();

    let (server_side, client_side) = memory::duplex();
    tokio::spawn(app.serve(server_side));

    let mut client = Client::new()
        .with_options(|opt| opt
            .with_name("scenario-client")
            .with_transport(client_side));
    client.connect().await.expect("client connects");
    client
}

#[tokio::test]
async fn it_calls_a_simple_tool() {
    let mut app = App::new();
    let _ = app.map_tool("add", |args: Json<AddArgs>| async move {
        format!("{}", args.a + args.b)
    })
    .with_description("Adds two numbers")
    .with_schema(|schema| schema
        .with_required_property("a", "number", "left operand")
        .with_required_property("b", "number", "right operand"));

    let client = connect(app).await;

    let result = client
        .call_tool("add", Some([("a", 5.0), ("b", 3.0)]))
        .await
        .unwrap();

    assert!(!result.is_error);
    assert_eq!(result.content[0].as_text(), Some("8"));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn it_rejects_arguments_violating_the_schema() {
    let mut app = App::new();
    let _ = app.map_tool("add", |args: Json<AddArgs>| async move {
        format!("{}", args.a + args.b)
    })
    .with_schema(|schema| schema
        .with_required_property("a", "number", "")
        .with_required_property("b", "number", ""));

    let client = connect(app).await;

    let err = client
        .call_tool("add", Some([("a", "five")]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParams);
}

#[tokio::test]
async fn it_cancels_a_long_tool_call() {
    let mut app = App::new();
    let _ = app.map_tool("slow", |ctx: Context, _args: Json<Value>| async move {
        let mut step = 0u32;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    step += 1;
                    let _ = ctx.report_progress(step as f64, None).await;
                }
            }
        }
        "never observed"
    });

    let client = connect(app).await;

    let progress_events = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        }
    });

    let options = RequestOptions::new()
        .with_cancellation(cancel)
        .with_progress({
            let progress_events = progress_events.clone();
            move |_event| { progress_events.fetch_add(1, Ordering::Relaxed); }
        });

    let err = client
        .call_tool_with("slow", Some([("x", 1)]), options)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RequestCancelled);
    assert!(progress_events.load(Ordering::Relaxed) >= 1);
}

#[tokio::test]
async fn it_runs_a_required_task_tool() {
    let mut app = App::new();
    let _ = app.map_task_tool("train", |_session, _args: Json<Value>| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok("model ready")
    })
    .with_required_task();

    let client = connect(app).await;

    // A plain call is refused by the server.
    let err = client.call_tool("train", Some([("epochs", 1)])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MethodNotFound);

    // The augmented call yields a working task, then the result.
    let tasks = client.tasks().unwrap();
    let mut stream = tasks.call_tool_stream("train", Some([("epochs", 1)]), None);

    let created = match stream.next_event().await.unwrap().unwrap() {
        ToolCallEvent::TaskCreated(task) => task,
        other => panic!("expected a task handle, got {other:?}"),
    };
    assert_eq!(created.status, TaskStatus::Working);

    let mut result = None;
    while let Some(event) = stream.next_event().await {
        if let ToolCallEvent::Result(response) = event.unwrap() {
            result = Some(response);
        }
    }

    let result = result.expect("task produced a result");
    assert_eq!(result.content[0].as_text(), Some("model ready"));
}

#[tokio::test]
async fn it_short_circuits_required_task_tools_after_listing() {
    let mut app = App::new();
    let _ = app.map_task_tool("train", |_session, _args: Json<Value>| async move {
        Ok("done")
    })
    .with_required_task();

    let client = connect(app).await;
    client.list_tools(None).await.unwrap();

    let err = client.call_tool("train", Some([("x", 1)])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(err.to_string().contains("task"));
}

#[tokio::test]
async fn it_drives_nested_elicitation_through_a_task() {
    let mut app = App::new();
    let _ = app.map_task_tool("greeter", |session, _args: Json<Value>| async move {
        let answer = session
            .elicit(ElicitRequestParams::new("What is your name?")
                .with_required("name", Schema::string()))
            .await?;

        let name = answer
            .content
            .as_ref()
            .and_then(|c| c.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("stranger")
            .to_string();
        Ok(format!("Hello, {name}!"))
    });

    let (server_side, client_side) = memory::duplex();
    tokio::spawn(app.serve(server_side));

    let mut client = Client::new().with_options(|opt| opt
        .with_transport(client_side)
        .with_elicitation_handler(|_params| async {
            Ok(ElicitResult::accept(HashMap::from([
                ("name".to_string(), json!("Ada")),
            ])))
        }));
    client.connect().await.unwrap();

    let tasks = client.tasks().unwrap();
    let mut stream = tasks.call_tool_stream(
        "greeter",
        Some([("ignored", 0)]),
        Some(strom::types::TaskAugmentation { ttl: Some(60_000) }));

    let created = match stream.next_event().await.unwrap().unwrap() {
        ToolCallEvent::TaskCreated(task) => task,
        other => panic!("expected a task handle, got {other:?}"),
    };

    let mut result = None;
    while let Some(event) = stream.next_event().await {
        if let ToolCallEvent::Result(response) = event.unwrap() {
            result = Some(response);
        }
    }
    assert_eq!(result.unwrap().content[0].as_text(), Some("Hello, Ada!"));

    // The task settled in the completed state.
    let task = tasks.get(&created.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn it_reports_task_output_schema_violations_as_invalid_params() {
    #[derive(serde::Serialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Out {
        value: f64,
    }

    let mut app = App::new();
    let _ = app.map_task_tool("broken", |_session, _args: Json<Value>| async move {
        Ok(CallToolResponse::json(json!({ "value": "not a number" })))
    })
    .with_output_schema::<Out>();

    let client = connect(app).await;

    // Optional task support without augmentation runs through the local
    // poll; the schema violation must still surface as invalid params.
    let err = client.call_tool("broken", Some([("x", 1)])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParams);
    assert!(err.to_string().contains("structuredContent"));
}

#[tokio::test]
async fn it_preserves_handler_error_codes_through_the_result_channel() {
    let mut app = App::new();
    let _ = app.map_task_tool("lookup", |_session, _args: Json<Value>| async move {
        Err::<CallToolResponse, _>(Error::new(
            ErrorCode::ResourceNotFound,
            "no such dataset"))
    })
    .with_required_task();

    let client = connect(app).await;
    let tasks = client.tasks().unwrap();

    let mut stream = tasks.call_tool_stream(
        "lookup",
        Some([("name", "x")]),
        Some(Default::default()));

    let mut failure = None;
    while let Some(event) = stream.next_event().await {
        match event {
            Ok(ToolCallEvent::StatusChanged(task)) if task.status == TaskStatus::Failed => {
                assert_eq!(task.status_msg.as_deref(), Some("no such dataset"));
            }
            Ok(_) => {}
            Err(err) => failure = Some(err),
        }
    }

    let failure = failure.expect("the failed task surfaced an error");
    assert_eq!(failure.code(), ErrorCode::ResourceNotFound);
    assert_eq!(failure.to_string(), "no such dataset");
}

#[tokio::test]
async fn it_makes_task_cancellation_idempotent() {
    let mut app = App::new();
    let _ = app.map_task_tool("forever", |session, _args: Json<Value>| async move {
        session.cancelled().await;
        Ok("unreachable")
    });

    let client = connect(app).await;
    let tasks: TasksClient = client.tasks().unwrap();

    let mut stream = tasks.call_tool_stream(
        "forever",
        None::<[(&'static str, i32); 0]>,
        Some(Default::default()));
    let created = match stream.next_event().await.unwrap().unwrap() {
        ToolCallEvent::TaskCreated(task) => task,
        other => panic!("expected a task handle, got {other:?}"),
    };

    let first = tasks.cancel(&created.id).await.unwrap();
    assert_eq!(first.status, TaskStatus::Cancelled);

    let second = tasks.cancel(&created.id).await.unwrap();
    assert_eq!(second.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn it_refuses_methods_the_server_lacks_capabilities_for() {
    // No tools registered, so the server never advertises the tools
    // capability and the client refuses to send tools/list.
    let mut app = App::new();
    let _ = app.map_prompt("greet", |_params: strom::types::GetPromptRequestParams| async {
        Ok::<_, strom::error::Error>(strom::types::GetPromptResult::from(
            strom::types::PromptMessage::user("hi")))
    });

    let client = connect(app).await;

    let err = client.list_tools(None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(err.to_string().contains("tools"));
}

#[tokio::test]
async fn it_reads_resources_through_templates() {
    let mut app = App::new();
    app.map_resource("res://{name}", "named", |params: strom::types::ReadResourceRequestParams| async move {
        let name = params.vars.get("name").cloned().unwrap_or_default();
        (params.uri.clone(), format!("Resource {name}"))
    })
    .with_description("Named resources")
    .with_completion("name", |value| async move {
        ["alpha", "beta", "gamma"]
            .into_iter()
            .filter(|v| v.starts_with(&value))
            .map(ToString::to_string)
            .collect()
    });

    let client = connect(app).await;

    let result = client.read_resource("res://alpha").await.unwrap();
    match &result.contents[0] {
        strom::types::ResourceContents::Text(text) => {
            assert_eq!(text.text, "Resource alpha");
        }
        other => panic!("expected text contents, got {other:?}"),
    }

    let err = client.read_resource("other://alpha").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);

    let completion = client
        .complete(strom::types::Reference::resource("res://{name}"), "name", "a")
        .await
        .unwrap();
    assert_eq!(completion.completion.values, vec!["alpha"]);
}

#[tokio::test]
async fn it_validates_prompt_arguments() {
    let mut app = App::new();
    app.map_prompt("review", |params: strom::types::GetPromptRequestParams| async move {
        let lang = params
            .args
            .as_ref()
            .and_then(|args| args.get("lang"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        (format!("Review this {lang} code"), strom::types::Role::User)
    })
    .with_args([strom::types::PromptArgument::required("lang")]);

    let client = connect(app).await;

    let err = client
        .get_prompt("review", None::<[(&'static str, &str); 0]>)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParams);

    let prompt = client
        .get_prompt("review", Some([("lang", "rust")]))
        .await
        .unwrap();
    assert_eq!(
        prompt.messages[0].content.as_text(),
        Some("Review this rust code"));
}

#[tokio::test]
async fn it_paginates_tool_listings() {
    let mut app = App::new();
    for i in 0..25 {
        let _ = app.map_tool(&format!("tool_{i:02}"), || async { "" });
    }

    let client = connect(app).await;

    let mut names = Vec::new();
    let mut cursor = None;
    loop {
        let page = client.list_tools(cursor).await.unwrap();
        names.extend(page.tools.into_iter().map(|t| t.name));
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    assert_eq!(names.len(), 25);
    assert_eq!(names[0], "tool_00");
    assert_eq!(names[24], "tool_24");
}

#[tokio::test]
async fn it_validates_structured_output_against_the_schema() {
    #[derive(serde::Serialize, schemars::JsonSchema)]
    struct Weather {
        temperature: f64,
    }

    let mut app = App::new();
    let _ = app.map_tool("weather", |_args: Json<Value>| async move {
        Json(Weather { temperature: 21.5 })
    })
    .with_output_schema::<Weather>();

    let client = connect(app).await;
    client.list_tools(None).await.unwrap();

    let result = client.call_tool("weather", Some([("city", "Berlin")])).await.unwrap();
    assert_eq!(result.struct_content.unwrap()["temperature"], json!(21.5));
}

mod http {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    fn sample_app() -> App {
        let mut app = App::new();
        let _ = app.map_tool("echo", |args: Json<Value>| async move {
            args.0.to_string()
        });
        app
    }

    fn initialize_body() -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "http-test", "version": "0.0.0" }
            }
        })
        .to_string()
    }

    async fn initialize(router: &axum::Router) -> String {
        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .body(Body::from(initialize_body()))
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get("mcp-session-id")
            .expect("session id header")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn it_allocates_a_session_on_initialize() {
        let router = sample_app().into_streamable_http_router();
        let session = initialize(&router).await;
        assert!(!session.is_empty());
    }

    #[tokio::test]
    async fn it_answers_requests_within_a_session() {
        let router = sample_app().into_streamable_http_router();
        let session = initialize(&router).await;

        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .header("mcp-session-id", &session)
                .body(Body::from(json!({
                    "jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}
                }).to_string()))
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["result"]["tools"][0]["name"], "echo");
    }

    #[tokio::test]
    async fn it_requires_the_session_header() {
        let router = sample_app().into_streamable_http_router();

        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({
                    "jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}
                }).to_string()))
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn it_rejects_unknown_sessions() {
        let router = sample_app().into_streamable_http_router();

        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header("mcp-session-id", "does-not-exist")
                .body(Body::from(json!({
                    "jsonrpc": "2.0", "id": 2, "method": "ping"
                }).to_string()))
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn it_terminates_sessions_on_delete() {
        let router = sample_app().into_streamable_http_router();
        let session = initialize(&router).await;

        let response = router
            .clone()
            .oneshot(Request::delete("/mcp")
                .header("mcp-session-id", &session)
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header("mcp-session-id", &session)
                .body(Body::from(json!({
                    "jsonrpc": "2.0", "id": 3, "method": "ping"
                }).to_string()))
                .unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn it_serves_cors_preflight() {
        let router = sample_app().into_streamable_http_router();

        let response = router
            .clone()
            .oneshot(Request::builder()
                .method("OPTIONS")
                .uri("/mcp")
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*");
    }

    #[tokio::test]
    async fn it_rejects_unsupported_methods() {
        let router = sample_app().into_streamable_http_router();

        let response = router
            .clone()
            .oneshot(Request::builder()
                .method("PUT")
                .uri("/mcp")
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn it_refuses_get_without_event_stream_accept() {
        let router = sample_app().into_streamable_http_router();
        let session = initialize(&router).await;

        let response = router
            .clone()
            .oneshot(Request::get("/mcp")
                .header("mcp-session-id", &session)
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    /// An app whose `announce` tool pushes a server-initiated notification,
    /// which lands on the session's SSE stream.
    fn announcing_app() -> App {
        let mut app = App::new();
        let _ = app.map_tool("announce", |ctx: Context, args: Json<Value>| async move {
            let _ = ctx
                .notify(strom::types::Notification::new(
                    "notifications/demo",
                    Some(args.0.clone())))
                .await;
            "sent"
        });
        app
    }

    async fn announce(router: &axum::Router, session: &str, n: u64) {
        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .header("mcp-session-id", session)
                .body(Body::from(json!({
                    "jsonrpc": "2.0", "id": n + 100, "method": "tools/call",
                    "params": { "name": "announce", "arguments": { "n": n } }
                }).to_string()))
                .unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn open_stream(
        router: &axum::Router,
        session: &str,
        last_event_id: Option<&str>,
    ) -> Body {
        let mut request = Request::get("/mcp")
            .header("mcp-session-id", session)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(cursor) = last_event_id {
            request = request.header("last-event-id", cursor);
        }

        let response = router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.into_body()
    }

    async fn next_frame(body: &mut Body) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .expect("stream frame timed out")
            .expect("stream ended")
            .expect("stream errored");
        match frame.into_data() {
            Ok(data) => String::from_utf8_lossy(&data).to_string(),
            Err(_) => String::new(),
        }
    }

    fn frame_field(frame: &str, field: &str) -> Option<String> {
        frame
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{field}: ")))
            .map(ToString::to_string)
    }

    #[tokio::test]
    async fn it_resumes_the_stream_after_the_cursor() {
        let router = announcing_app().into_streamable_http_router();
        let session = initialize(&router).await;

        let mut body = open_stream(&router, &session, None).await;
        for n in 1..=3 {
            announce(&router, &session, n).await;
        }

        let mut delivered = Vec::new();
        while delivered.len() < 3 {
            let frame = next_frame(&mut body).await;
            if let Some(id) = frame_field(&frame, "id") {
                delivered.push(id);
            }
        }
        assert_eq!(delivered, ["1", "2", "3"]);
        drop(body); // the connection drops

        // Produced while nothing is connected; still replayable.
        announce(&router, &session, 4).await;

        // Resuming after event 2 yields exactly 3 and 4, no duplicates.
        let mut body = open_stream(&router, &session, Some("2")).await;
        let mut replayed = Vec::new();
        while replayed.len() < 2 {
            let frame = next_frame(&mut body).await;
            if let Some(id) = frame_field(&frame, "id") {
                replayed.push(id);
            }
        }
        assert_eq!(replayed, ["3", "4"]);

        // Live delivery continues on the new stream after the replay.
        announce(&router, &session, 5).await;
        let mut live = None;
        while live.is_none() {
            let frame = next_frame(&mut body).await;
            live = frame_field(&frame, "id");
        }
        assert_eq!(live.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn it_rejects_the_authenticator_refusals() {
        let mut app = sample_app();
        app = app.with_options(|opt| opt.with_streamable_http(|http| http
            .with_authenticator(|headers| headers.contains_key("x-api-key"))));
        let router = app.into_streamable_http_router();

        let response = router
            .clone()
            .oneshot(Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(initialize_body()))
                .unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
