// manticore-core: 资源控制器分发框架的基础设施
//
// 提供：
// - 翻译器注册表（短名称 ↔ 媒体类型）和序列化器 / 反序列化器
// - Accept 内容协商
// - 分层配置（Environment + 配置源）
// - 日志初始化
// - 统一的错误类型

pub mod config;
pub mod error;
pub mod logging;
pub mod negotiation;
pub mod translator;
pub mod utils;

// 重新导出常用类型
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{ApplicationError, ApplicationResult, HttpError, RegistryError, ResponseError, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use negotiation::Accept;
pub use translator::{
    Attachable, Deserializer, DeserializerTranslator, FromMediaType, JsonDeserializer,
    JsonSerializer, Serializer, SerializerTranslator, Translator, TranslatorRegistry,
    TranslatorTable, Translators,
};

// 导出 inventory，供控制器注册使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::error::{
        ApplicationError, ApplicationResult, HttpError, RegistryError, ResponseError, Result,
    };
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::translator::{
        Attachable, Deserializer, DeserializerTranslator, FromMediaType, JsonDeserializer,
        JsonSerializer, Serializer, SerializerTranslator, TranslatorRegistry, TranslatorTable,
    };
}
