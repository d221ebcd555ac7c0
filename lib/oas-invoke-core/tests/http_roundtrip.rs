use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use oas_invoke_core::{
    AuthType, ClientLifecycle, Credentials, InvocationRequest, InvokeError, ResultPayload,
};

const SWAGGER: &str = r#"{
    "swagger": "2.0",
    "info": { "title": "Pets", "version": "1.0.0" },
    "basePath": "/api",
    "paths": {
        "/pets": {
            "post": {
                "tags": ["pet"],
                "operationId": "addPet",
                "consumes": ["application/json"],
                "parameters": [{ "name": "pet", "in": "body", "schema": { "type": "object" } }]
            }
        },
        "/pets/{petId}": {
            "get": {
                "tags": ["pet"],
                "operationId": "getPet",
                "parameters": [{ "name": "petId", "in": "path", "required": true, "type": "integer" }]
            }
        },
        "/whoami": {
            "get": { "tags": ["user"], "operationId": "whoAmI" }
        }
    }
}"#;

const OPENAPI_YAML: &str = "
openapi: 3.0.3
info:
  title: Pets YAML
  version: '1.0.0'
servers:
  - url: /api
paths:
  /pets/{petId}:
    get:
      operationId: getPet
      parameters:
        - name: petId
          in: path
          required: true
";

async fn add_pet(Json(pet): Json<Value>) -> impl IntoResponse {
    if pet == json!({"id": 42}) {
        (StatusCode::OK, Json(json!({"ok": true}))).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"received": pet}))).into_response()
    }
}

async fn get_pet(Path(pet_id): Path<u32>) -> impl IntoResponse {
    if pet_id == 0 {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    } else {
        Json(json!({"id": pet_id, "name": "Rex"})).into_response()
    }
}

async fn who_am_i(headers: HeaderMap) -> impl IntoResponse {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(json!({ "authorization": authorization }))
}

async fn start_server() -> anyhow::Result<SocketAddr> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let app = Router::new()
        .route(
            "/swagger.json",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], SWAGGER) }),
        )
        .route("/openapi.yaml", get(|| async { OPENAPI_YAML }))
        .route("/api/pets", axum::routing::post(add_pet))
        .route("/api/pets/{petId}", get(get_pet))
        .route("/api/whoami", get(who_am_i));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(addr)
}

#[tokio::test]
async fn should_invoke_operation_over_http() -> anyhow::Result<()> {
    let addr = start_server().await?;
    let lifecycle = ClientLifecycle::builder().build();

    let handle = lifecycle.open(&format!("http://{addr}/swagger.json")).await;
    assert!(handle.is_ready(), "{:?}", handle.state());

    let result = lifecycle
        .invoker()
        .invoke(
            &handle,
            InvocationRequest::new("pet", "addPet").with_payload(r#"{"id":42}"#),
        )
        .await?;

    assert_eq!(result.status, 200);
    assert_eq!(result.payload, ResultPayload::Json(json!({"ok": true})));
    Ok(())
}

#[tokio::test]
async fn should_deliver_server_errors_on_error_channel() -> anyhow::Result<()> {
    let addr = start_server().await?;
    let lifecycle = ClientLifecycle::builder().build();
    let handle = lifecycle.open(&format!("http://{addr}/swagger.json")).await;

    let error = lifecycle
        .invoker()
        .invoke(
            &handle,
            InvocationRequest::new("pet", "getPet").with_payload(json!({"petId": 0})),
        )
        .await
        .expect_err("500 goes to the error channel");

    let InvokeError::Rejected { result, .. } = error else {
        panic!("expected a rejected invocation, got {error:?}");
    };
    assert_eq!(result.status, 500);
    assert_eq!(result.payload, ResultPayload::Text("internal error".to_string()));
    Ok(())
}

#[tokio::test]
async fn should_fail_handle_when_spec_is_missing() -> anyhow::Result<()> {
    let addr = start_server().await?;
    let lifecycle = ClientLifecycle::builder().build();

    let handle = lifecycle.open(&format!("http://{addr}/missing.json")).await;

    assert_eq!(handle.state().name(), "failed");
    let error = lifecycle
        .invoker()
        .invoke(&handle, InvocationRequest::new("pet", "getPet"))
        .await
        .expect_err("not ready");
    assert!(matches!(error, InvokeError::NotReady { .. }), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn should_load_yaml_spec_and_send_credentials() -> anyhow::Result<()> {
    let addr = start_server().await?;
    let lifecycle = ClientLifecycle::builder()
        .with_credentials(Credentials {
            auth_type: AuthType::Bearer,
            user: String::new(),
            password: Some("t0k3n".into()),
        })
        .build();

    let yaml = lifecycle.open(&format!("http://{addr}/openapi.yaml")).await;
    let pet = lifecycle
        .invoker()
        .invoke(
            &yaml,
            InvocationRequest::new("default", "getPet").with_payload(json!({"petId": 3})),
        )
        .await?;
    assert_eq!(pet.payload.as_json(), Some(&json!({"id": 3, "name": "Rex"})));

    let swagger = lifecycle.open(&format!("http://{addr}/swagger.json")).await;
    let whoami = lifecycle
        .invoker()
        .invoke(&swagger, InvocationRequest::new("user", "whoAmI"))
        .await?;
    assert_eq!(
        whoami.payload.as_json(),
        Some(&json!({"authorization": "Bearer t0k3n"}))
    );
    Ok(())
}

#[tokio::test]
async fn should_report_transport_errors() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    let lifecycle = ClientLifecycle::builder().build();

    let handle = lifecycle.open(&format!("http://{addr}/swagger.json")).await;

    let error = handle.error().expect("connection refused");
    assert!(error.to_string().contains(&addr.to_string()), "{error}");
    Ok(())
}
