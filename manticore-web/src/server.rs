//! Web 服务器模块
//!
//! 基于 Axum 的传输层适配：所有请求都交给 fallback 处理器，转换成 [`Request`]
//! 后在阻塞线程池上运行 [`Application::handle`]。

use crate::application::Application;
use crate::constants::{
    SERVER_ENABLE_REQUEST_ID, SERVER_ENABLE_REQUEST_LOGGING, SERVER_HOST, SERVER_MAX_BODY_SIZE,
    SERVER_PORT,
};
use crate::middleware::{request_id, request_logging};
use crate::request::Request;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{middleware, Router};
use manticore_core::config::Environment;
use manticore_core::error::{ApplicationError, ApplicationResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Web 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用请求日志
    pub enable_request_logging: bool,

    /// 是否启用请求 ID
    pub enable_request_id: bool,

    /// 请求体大小上限（字节）
    pub max_body_size: usize,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_request_logging: true,
            enable_request_id: false,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string(SERVER_HOST).unwrap_or(defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(defaults.port),
            enable_request_logging: env
                .get_bool(SERVER_ENABLE_REQUEST_LOGGING)
                .unwrap_or(defaults.enable_request_logging),
            enable_request_id: env
                .get_bool(SERVER_ENABLE_REQUEST_ID)
                .unwrap_or(defaults.enable_request_id),
            max_body_size: env
                .get_i64(SERVER_MAX_BODY_SIZE)
                .and_then(|size| usize::try_from(size).ok())
                .unwrap_or(defaults.max_body_size),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
struct ServerState {
    application: Arc<Application>,
    max_body_size: usize,
}

/// Manticore Web 服务器
pub struct WebServer {
    config: ServerProperties,
    application: Arc<Application>,
}

impl WebServer {
    pub fn new(application: Arc<Application>, config: ServerProperties) -> Self {
        Self {
            config,
            application,
        }
    }

    pub fn config(&self) -> &ServerProperties {
        &self.config
    }

    /// 构建路由
    pub fn router(&self) -> Router {
        let state = ServerState {
            application: Arc::clone(&self.application),
            max_body_size: self.config.max_body_size,
        };

        let mut router = Router::new().fallback(dispatch).with_state(state);

        if self.config.enable_request_id {
            router = router.layer(middleware::from_fn(request_id));
        }
        if self.config.enable_request_logging {
            router = router.layer(middleware::from_fn(request_logging));
        }

        router
    }

    /// 启动服务器
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.config.address();
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!("Starting Manticore Web Server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Other(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ApplicationError::Other(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn status_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

async fn dispatch(
    State(state): State<ServerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: axum::extract::Request,
) -> Response {
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read request body");
            return status_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
    };

    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let request = Request::from_parts(parts, body).with_remote_addr(remote_addr);

    let application = state.application;
    match tokio::task::spawn_blocking(move || application.handle(request)).await {
        Ok(response) => response.map(Body::from),
        Err(err) => {
            tracing::error!(error = %err, "Dispatch task failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerType;
    use crate::member::Member;
    use crate::middleware::REQUEST_ID_HEADER;
    use axum::http::header::{ACCEPT, CONTENT_TYPE};
    use manticore_core::config::MapPropertySource;
    use manticore_core::translator::{
        DeserializerTranslator, JsonDeserializer, JsonSerializer, SerializerTranslator,
        TranslatorRegistry,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn application() -> Arc<Application> {
        let mut registry = TranslatorRegistry::new();
        registry.register("json", ["application/json"]);

        let widgets = ControllerType::builder("widgets")
            .serializer("json", SerializerTranslator::of::<JsonSerializer>())
            .deserializer("json", DeserializerTranslator::of::<JsonDeserializer>())
            .member(
                Member::action("show", "/widgets/{id}", |_, params| {
                    Ok(json!({ "id": params["id"] }).into())
                })
                .methods(["GET"]),
            )
            .member(
                Member::action("create", "/widgets", |_, params| {
                    Ok(params.get("body").cloned().unwrap_or_default().into())
                })
                .methods(["POST"])
                .code(StatusCode::CREATED),
            )
            .build();

        let mut application = Application::new(Arc::new(registry));
        application.add_resource("widgets", &widgets).unwrap();
        Arc::new(application)
    }

    fn server(config: ServerProperties) -> WebServer {
        WebServer::new(application(), config)
    }

    #[test]
    fn test_server_properties_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_string(SERVER_PORT, "9090")
                .with_string(SERVER_ENABLE_REQUEST_ID, "true"),
        ));

        let props = ServerProperties::from_environment(&env);
        assert_eq!(props.port, 9090);
        assert_eq!(props.host, "0.0.0.0");
        assert!(props.enable_request_id);
        assert!(props.enable_request_logging);
        assert_eq!(props.address(), "0.0.0.0:9090");
    }

    #[tokio::test]
    async fn test_router_dispatches_requests() {
        let app = server(ServerProperties::default()).router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/widgets/7")
                    .header(ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), br#"{"id":"7"}"#);
    }

    #[tokio::test]
    async fn test_router_reads_request_body() {
        let app = server(ServerProperties::default()).router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/widgets")
                    .header(ACCEPT, "application/json")
                    .header(CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(Body::from(r#"{"name":"sprocket"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), br#"{"name":"sprocket"}"#);
    }

    #[tokio::test]
    async fn test_router_rejects_oversized_body() {
        let config = ServerProperties {
            max_body_size: 4,
            ..ServerProperties::default()
        };
        let app = server(config).router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/widgets")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"sprocket"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_router_unknown_path_and_request_id() {
        let config = ServerProperties {
            enable_request_id: true,
            ..ServerProperties::default()
        };
        let app = server(config).router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/gizmos")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
