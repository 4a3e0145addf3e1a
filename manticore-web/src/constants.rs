//! 框架配置常量定义
//!
//! 定义所有框架使用的配置键名称

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

/// 是否为每个请求生成 `X-Request-ID`
pub const SERVER_ENABLE_REQUEST_ID: &str = "server.enable-request-id";

/// 请求体大小上限（字节）
pub const SERVER_MAX_BODY_SIZE: &str = "server.max-body-size";

// ==================== 资源配置 ====================

/// `resource.<资源名> = "<控制器类型名>"`
pub const RESOURCE_PREFIX: &str = "resource.";

/// `extend.<资源名> = "<控制器类型名> ..."`，以空白分隔
pub const EXTEND_PREFIX: &str = "extend.";
