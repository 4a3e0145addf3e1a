//! 应用装配与分发边界
//!
//! [`Application`] 持有所有资源控制器和路由表。它可以从配置装配：
//!
//! ```toml
//! [resource]
//! widgets = "widgets"
//!
//! [extend]
//! widgets = "audit tags"
//! ```
//!
//! `resource.<资源名>` 指定资源使用的控制器类型，`extend.<资源名>` 按顺序列出用于
//! 扩展该资源的控制器类型。
//!
//! [`Application::handle`] 是分发边界：HTTP 映射错误转换为对应状态码，其他错误和
//! panic 记录日志后转换为不带细节的 500。

use crate::constants::{EXTEND_PREFIX, RESOURCE_PREFIX};
use crate::controller::{Controller, ControllerCatalog, ControllerType};
use crate::request::Request;
use crate::response::RawResponse;
use crate::routing::Mapper;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use manticore_core::config::Environment;
use manticore_core::error::{ApplicationError, ApplicationResult, HttpError};
use manticore_core::translator::TranslatorRegistry;
use manticore_core::utils::list::split_unique;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// 资源控制器集合和路由表
#[derive(Debug)]
pub struct Application {
    resources: BTreeMap<String, Controller>,
    mapper: Mapper,
    registry: Arc<TranslatorRegistry>,
}

impl Application {
    pub fn new(registry: Arc<TranslatorRegistry>) -> Self {
        Self {
            resources: BTreeMap::new(),
            mapper: Mapper::new(),
            registry,
        }
    }

    /// 从配置装配应用
    ///
    /// 先创建所有 `resource.*` 资源，再按键的字典序应用 `extend.*`。
    pub fn from_environment(
        env: &Environment,
        catalog: &ControllerCatalog,
        registry: Arc<TranslatorRegistry>,
    ) -> ApplicationResult<Self> {
        let mut application = Self::new(registry);

        for key in env.keys_with_prefix(RESOURCE_PREFIX) {
            let name = &key[RESOURCE_PREFIX.len()..];
            let type_name = Self::read_string(env, &key)?;
            let controller_type = catalog.resolve(type_name.trim())?;
            application.add_resource(name, &controller_type)?;
        }

        for key in env.keys_with_prefix(EXTEND_PREFIX) {
            let name = &key[EXTEND_PREFIX.len()..];
            if !application.resources.contains_key(name) {
                return Err(ApplicationError::NoSuchResource(name.to_string()));
            }

            let value = Self::read_string(env, &key)?;
            for type_name in split_unique(&value) {
                let controller_type = catalog.resolve(type_name)?;
                application.extend_resource(name, &controller_type)?;
            }
        }

        tracing::info!(
            resources = application.resources.len(),
            routes = application.mapper.len(),
            "Application assembled"
        );

        Ok(application)
    }

    fn read_string(env: &Environment, key: &str) -> ApplicationResult<String> {
        env.get_string(key)
            .ok_or_else(|| ApplicationError::Config(format!("{} must be a string", key)))
    }

    /// 注册资源，同名资源会被替换
    pub fn add_resource(&mut self, name: &str, controller_type: &ControllerType) -> ApplicationResult<()> {
        let controller =
            controller_type.instantiate(name, Arc::clone(&self.registry), Some(&mut self.mapper))?;

        tracing::debug!(resource = name, controller = controller.name(), "Resource registered");
        self.resources.insert(name.to_string(), controller);
        Ok(())
    }

    /// 用控制器类型扩展已注册的资源
    pub fn extend_resource(&mut self, name: &str, controller_type: &ControllerType) -> ApplicationResult<()> {
        let controller = self
            .resources
            .get_mut(name)
            .ok_or_else(|| ApplicationError::NoSuchResource(name.to_string()))?;

        let extension = controller_type.instantiate(name, Arc::clone(&self.registry), None)?;
        controller.extend(&extension, Some(&mut self.mapper))
    }

    pub fn resource(&self, name: &str) -> Option<&Controller> {
        self.resources.get(name)
    }

    pub fn resources(&self) -> &BTreeMap<String, Controller> {
        &self.resources
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn registry(&self) -> &Arc<TranslatorRegistry> {
        &self.registry
    }

    /// 处理一个请求
    pub fn handle(&self, request: Request) -> RawResponse {
        let Some(matched) = self.mapper.route(&request) else {
            tracing::debug!(method = %request.method(), path = request.path(), "No route matched");
            return error_response(HttpError::NotFound);
        };

        let mut params = matched.params;
        let controller = match params.remove("controller") {
            Some(Value::String(resource)) => self.resources.get(&resource),
            _ => None,
        };
        let Some(controller) = controller else {
            tracing::warn!(route = %matched.name, "Route refers to an unknown resource");
            return error_response(HttpError::NotFound);
        };

        tracing::info!(
            "{} {} {} (controller {:?})",
            request.origin(),
            request.method(),
            request.url(),
            controller.name()
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| controller.dispatch(&request, params)));

        match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => match err.downcast_ref::<HttpError>() {
                Some(http_error) => error_response(*http_error),
                None => {
                    tracing::error!(
                        controller = controller.name(),
                        resource = controller.resource(),
                        error = ?err,
                        "Exception while dispatching request"
                    );
                    internal_error()
                }
            },
            Err(payload) => {
                let message = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "Unknown panic occurred".to_string());
                tracing::error!(
                    controller = controller.name(),
                    resource = controller.resource(),
                    error = %message,
                    "Handler panicked"
                );
                internal_error()
            }
        }
    }
}

/// HTTP 映射错误的响应，响应体为错误描述
fn error_response(err: HttpError) -> RawResponse {
    let mut response = RawResponse::new(Bytes::from(err.to_string()));
    *response.status_mut() = err.status_code();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn internal_error() -> RawResponse {
    let mut response = RawResponse::new(Bytes::new());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
