//! 统一的错误类型
//!
//! 框架内部的错误分为三类：
//!
//! 1. **HTTP 映射错误** - [`HttpError`]，在分发边界原样转换为 404 / 415 / 406
//! 2. **编程错误** - [`RegistryError`]、[`ResponseError`]，分发边界不会特殊处理，统一按 500 返回
//! 3. **装配错误** - [`ApplicationError`]，只在启动阶段出现
//!
//! Action 和扩展方法本身返回 `anyhow::Result`，通过 `.context()` 添加上下文，
//! 分发边界通过 `downcast_ref::<HttpError>()` 识别需要透传的错误。

use http::StatusCode;
use thiserror::Error;

pub use anyhow::Result;

/// 可以直接映射为 HTTP 状态码的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HttpError {
    /// 控制器上不存在请求的 action - 404 Not Found
    #[error("The resource could not be found")]
    NotFound,

    /// 请求体的媒体类型没有对应的反序列化器 - 415 Unsupported Media Type
    #[error("The request media type is not supported by this resource")]
    UnsupportedMediaType,

    /// 没有序列化器能满足客户端的 Accept 要求 - 406 Not Acceptable
    #[error("No acceptable representation of this resource is available")]
    NotAcceptable,
}

impl HttpError {
    /// 获取错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HttpError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
        }
    }
}

/// 翻译器注册表错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// 媒体类型没有注册到任何短名称
    #[error("Media type {media_type:?} is not registered")]
    NotRegistered { media_type: String },

    /// 方法没有为该短名称声明翻译器
    #[error("No translator declared for type name {type_name:?}")]
    MissingTranslator { type_name: String },

    /// 进程级注册表只能安装一次
    #[error("The process-wide translator registry is already installed")]
    AlreadyInstalled,
}

/// 响应对象错误
#[derive(Debug, Error)]
pub enum ResponseError {
    /// 响应对象在序列化前必须绑定到 action 描述符
    #[error("Response object must be bound before it can be serialized")]
    Unbound,

    /// 响应头名称或值不合法
    #[error("Invalid response header {name:?}")]
    InvalidHeader { name: String },

    /// 序列化器执行失败
    #[error("Failed to serialize response body: {0}")]
    Serialize(anyhow::Error),
}

/// 应用装配阶段的错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 控制器类型没有设置名称
    #[error("Cannot instantiate an incomplete controller")]
    IncompleteController,

    /// extend 配置引用了不存在的资源
    #[error("No such resource {0:?}")]
    NoSuchResource(String),

    /// 配置引用了未注册的控制器类型
    #[error("Unknown controller type {0:?}")]
    UnknownController(String),

    /// 路由模板无法编译
    #[error("Invalid route {name:?}: {reason}")]
    InvalidRoute { name: String, reason: String },

    /// 配置读取或解析失败
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志系统初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("{0}")]
    Other(String),
}

/// 装配阶段的结果类型
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_status_codes() {
        assert_eq!(HttpError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::UnsupportedMediaType.status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(HttpError::NotAcceptable.status_code(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_http_error_survives_anyhow() {
        let err: anyhow::Error = HttpError::NotAcceptable.into();
        assert_eq!(err.downcast_ref::<HttpError>(), Some(&HttpError::NotAcceptable));
    }

    #[test]
    fn test_application_error_messages() {
        assert_eq!(
            ApplicationError::NoSuchResource("widgets".to_string()).to_string(),
            "No such resource \"widgets\""
        );
        assert_eq!(
            ApplicationError::IncompleteController.to_string(),
            "Cannot instantiate an incomplete controller"
        );
    }
}
