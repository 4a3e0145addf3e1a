//! 翻译器（序列化器 / 反序列化器）
//!
//! 翻译器按“短名称”声明，例如 `json`。短名称和具体媒体类型之间的映射由
//! [`TranslatorRegistry`] 维护：
//!
//! ```
//! use manticore_core::translator::TranslatorRegistry;
//!
//! let mut registry = TranslatorRegistry::new();
//! registry.register("json", ["application/json", "text/json"]);
//!
//! assert_eq!(registry.resolve_short_name("text/json").unwrap(), "json");
//! assert!(registry.resolve_media_types("json").contains("application/json"));
//! ```
//!
//! 控制器类型和 action 方法各自声明一张 [`TranslatorTable`]，方法级声明覆盖类型级声明，
//! 合并结果是 [`Translators`] 快照。

use crate::error::RegistryError;
use crate::negotiation::essence;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

// ============================================================================
// 媒体类型注册表
// ============================================================================

/// 短名称与媒体类型的双向映射
///
/// 每个媒体类型同一时刻只属于一个短名称；把媒体类型重新注册到另一个短名称时，
/// 它会先从原短名称的集合中移除。
#[derive(Debug, Clone, Default)]
pub struct TranslatorRegistry {
    media_types: HashMap<String, String>,
    type_names: HashMap<String, BTreeSet<String>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<TranslatorRegistry>> = OnceLock::new();

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把一个或多个媒体类型注册到短名称下，重复注册不会报错
    pub fn register<I, S>(&mut self, type_name: &str, media_types: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.type_names.entry(type_name.to_string()).or_default();

        for media_type in media_types {
            let media_type = essence(media_type.as_ref());

            // 媒体类型改投其他短名称
            if let Some(previous) = self.media_types.get(&media_type) {
                if let Some(types) = self.type_names.get_mut(previous) {
                    types.remove(&media_type);
                }
            }

            self.media_types
                .insert(media_type.clone(), type_name.to_string());
            self.type_names
                .entry(type_name.to_string())
                .or_default()
                .insert(media_type);
        }

        self
    }

    /// 获取短名称对应的所有媒体类型，未知短名称返回空集合
    pub fn resolve_media_types(&self, type_name: &str) -> BTreeSet<String> {
        self.type_names.get(type_name).cloned().unwrap_or_default()
    }

    /// 获取媒体类型对应的短名称
    pub fn resolve_short_name(&self, media_type: &str) -> Result<&str, RegistryError> {
        let media_type = essence(media_type);
        self.media_types
            .get(&media_type)
            .map(String::as_str)
            .ok_or(RegistryError::NotRegistered { media_type })
    }

    /// 安装为进程级注册表
    ///
    /// 只能安装一次；安装之后注册表只读，请求处理代码通过返回的 `Arc` 或
    /// [`TranslatorRegistry::global`] 访问。
    pub fn install(self) -> Result<Arc<Self>, RegistryError> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        tracing::debug!(
            type_names = registry.type_names.len(),
            media_types = registry.media_types.len(),
            "Translator registry installed"
        );
        Ok(registry)
    }

    /// 获取进程级注册表
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}

// ============================================================================
// 翻译器接口
// ============================================================================

/// 可附加能力
///
/// 主翻译器实现此接口后，描述符会把扩展方法为同一媒体类型声明的翻译器附加上来。
/// 附加顺序通常决定扩展贡献字段的优先级或嵌套关系。
pub trait Attachable<T: ?Sized> {
    fn attach(&mut self, other: Box<T>);
}

/// 响应序列化器
pub trait Serializer: Send {
    /// 把结果序列化为响应体
    fn serialize(&self, value: &Value) -> anyhow::Result<Vec<u8>>;

    /// 如果支持附加扩展序列化器，返回 `Some`
    fn as_attachable(&mut self) -> Option<&mut dyn Attachable<dyn Serializer>> {
        None
    }
}

/// 请求反序列化器
pub trait Deserializer: Send {
    /// 把请求体反序列化为结构化的值
    fn deserialize(&self, body: &[u8]) -> anyhow::Result<Value>;

    /// 如果支持附加扩展反序列化器，返回 `Some`
    fn as_attachable(&mut self) -> Option<&mut dyn Attachable<dyn Deserializer>> {
        None
    }
}

/// 由短名称和媒体类型构造的翻译器类型
pub trait FromMediaType {
    fn from_media_type(type_name: &str, content_type: &str) -> Self;
}

/// 翻译器工厂
///
/// 每次选择翻译器都会生成一个新实例，附加扩展翻译器不会影响其他请求。
pub struct Translator<T: ?Sized> {
    factory: Arc<dyn Fn(&str, &str) -> Box<T> + Send + Sync>,
}

impl<T: ?Sized> Clone for Translator<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Translator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Translator")
    }
}

impl<T: ?Sized> Translator<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str, &str) -> Box<T> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// 为给定的短名称和媒体类型创建翻译器实例
    pub fn instantiate(&self, type_name: &str, content_type: &str) -> Box<T> {
        (self.factory)(type_name, content_type)
    }
}

impl Translator<dyn Serializer> {
    /// 使用实现了 [`FromMediaType`] 的序列化器类型
    pub fn of<S>() -> Self
    where
        S: Serializer + FromMediaType + 'static,
    {
        Self::new(|type_name: &str, content_type: &str| -> Box<dyn Serializer> {
            Box::new(S::from_media_type(type_name, content_type))
        })
    }

    /// 使用函数作为序列化器，函数参数为 (短名称, 媒体类型, 结果)
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(&str, &str, &Value) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(move |type_name: &str, content_type: &str| -> Box<dyn Serializer> {
            Box::new(FnSerializer {
                type_name: type_name.to_string(),
                content_type: content_type.to_string(),
                func: Arc::clone(&func),
            })
        })
    }
}

impl Translator<dyn Deserializer> {
    /// 使用实现了 [`FromMediaType`] 的反序列化器类型
    pub fn of<D>() -> Self
    where
        D: Deserializer + FromMediaType + 'static,
    {
        Self::new(|type_name: &str, content_type: &str| -> Box<dyn Deserializer> {
            Box::new(D::from_media_type(type_name, content_type))
        })
    }

    /// 使用函数作为反序列化器，函数参数为 (短名称, 媒体类型, 请求体)
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(&str, &str, &[u8]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(move |type_name: &str, content_type: &str| -> Box<dyn Deserializer> {
            Box::new(FnDeserializer {
                type_name: type_name.to_string(),
                content_type: content_type.to_string(),
                func: Arc::clone(&func),
            })
        })
    }
}

struct FnSerializer<F> {
    type_name: String,
    content_type: String,
    func: Arc<F>,
}

impl<F> Serializer for FnSerializer<F>
where
    F: Fn(&str, &str, &Value) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn serialize(&self, value: &Value) -> anyhow::Result<Vec<u8>> {
        (self.func)(&self.type_name, &self.content_type, value)
    }
}

struct FnDeserializer<F> {
    type_name: String,
    content_type: String,
    func: Arc<F>,
}

impl<F> Deserializer for FnDeserializer<F>
where
    F: Fn(&str, &str, &[u8]) -> anyhow::Result<Value> + Send + Sync,
{
    fn deserialize(&self, body: &[u8]) -> anyhow::Result<Value> {
        (self.func)(&self.type_name, &self.content_type, body)
    }
}

/// 基于 serde_json 的序列化器
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl FromMediaType for JsonSerializer {
    fn from_media_type(_type_name: &str, _content_type: &str) -> Self {
        JsonSerializer
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

/// 基于 serde_json 的反序列化器
#[derive(Debug, Clone, Default)]
pub struct JsonDeserializer;

impl FromMediaType for JsonDeserializer {
    fn from_media_type(_type_name: &str, _content_type: &str) -> Self {
        JsonDeserializer
    }
}

impl Deserializer for JsonDeserializer {
    fn deserialize(&self, body: &[u8]) -> anyhow::Result<Value> {
        Ok(serde_json::from_slice(body)?)
    }
}

// ============================================================================
// 翻译器表
// ============================================================================

/// 序列化器工厂
pub type SerializerTranslator = Translator<dyn Serializer>;

/// 反序列化器工厂
pub type DeserializerTranslator = Translator<dyn Deserializer>;

/// 短名称 → 翻译器
pub struct TranslatorTable<T: ?Sized> {
    entries: HashMap<String, Translator<T>>,
}

impl<T: ?Sized> Clone for TranslatorTable<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> Default for TranslatorTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for TranslatorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

impl<T: ?Sized> TranslatorTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: impl Into<String>, translator: Translator<T>) {
        self.entries.insert(type_name.into(), translator);
    }

    pub fn with(mut self, type_name: impl Into<String>, translator: Translator<T>) -> Self {
        self.insert(type_name, translator);
        self
    }

    /// 用 `other` 的条目覆盖当前表的同名条目
    pub fn overlay(&mut self, other: &TranslatorTable<T>) {
        for (name, translator) in &other.entries {
            self.entries.insert(name.clone(), translator.clone());
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&Translator<T>> {
        self.entries.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 单个方法的翻译器快照
///
/// 由类型级翻译器表复制后叠加方法级翻译器表得到，方法级声明总是优先。
pub struct Translators<T: ?Sized> {
    table: TranslatorTable<T>,
    registry: Arc<TranslatorRegistry>,
}

impl<T: ?Sized> fmt::Debug for Translators<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translators").field("table", &self.table).finish()
    }
}

impl<T: ?Sized> Translators<T> {
    pub fn new(
        registry: Arc<TranslatorRegistry>,
        type_level: &TranslatorTable<T>,
        method_level: &TranslatorTable<T>,
    ) -> Self {
        let mut table = type_level.clone();
        table.overlay(method_level);
        Self { table, registry }
    }

    /// 选择媒体类型对应的翻译器并实例化
    pub fn select(&self, content_type: &str) -> Result<Box<T>, RegistryError> {
        let media_type = essence(content_type);
        let type_name = self.registry.resolve_short_name(&media_type)?;
        let translator =
            self.table
                .get(type_name)
                .ok_or_else(|| RegistryError::MissingTranslator {
                    type_name: type_name.to_string(),
                })?;
        Ok(translator.instantiate(type_name, &media_type))
    }

    /// 所有可识别的媒体类型
    pub fn content_types(&self) -> BTreeSet<String> {
        self.table
            .type_names()
            .flat_map(|name| self.registry.resolve_media_types(name))
            .collect()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.table.get(type_name).is_some()
    }

    pub fn registry(&self) -> &Arc<TranslatorRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<TranslatorRegistry> {
        let mut registry = TranslatorRegistry::new();
        registry
            .register("json", ["application/json", "text/json"])
            .register("xml", ["text/xml"]);
        Arc::new(registry)
    }

    fn tagged(tag: &'static str) -> SerializerTranslator {
        SerializerTranslator::function(move |_, _, _| Ok(tag.as_bytes().to_vec()))
    }

    #[test]
    fn test_registry_round_trip() {
        let mut registry = TranslatorRegistry::new();
        registry.register("xml", ["text/xml"]);

        assert_eq!(registry.resolve_short_name("text/xml").unwrap(), "xml");
        assert!(registry.resolve_media_types("xml").contains("text/xml"));
    }

    #[test]
    fn test_registry_redirects_media_type() {
        let mut registry = TranslatorRegistry::new();
        registry.register("xml", ["text/xml", "application/xml"]);
        registry.register("other", ["text/xml"]);

        assert_eq!(registry.resolve_short_name("text/xml").unwrap(), "other");
        assert!(!registry.resolve_media_types("xml").contains("text/xml"));
        assert!(registry.resolve_media_types("xml").contains("application/xml"));
        assert!(registry.resolve_media_types("other").contains("text/xml"));
    }

    #[test]
    fn test_registry_unknown_names() {
        let registry = TranslatorRegistry::new();

        assert!(registry.resolve_media_types("yaml").is_empty());
        assert_eq!(
            registry.resolve_short_name("text/yaml"),
            Err(RegistryError::NotRegistered {
                media_type: "text/yaml".to_string()
            })
        );
    }

    #[test]
    fn test_registry_ignores_media_type_parameters() {
        let registry = registry();
        assert_eq!(
            registry
                .resolve_short_name("Application/JSON; charset=utf-8")
                .unwrap(),
            "json"
        );
    }

    #[test]
    fn test_translators_method_level_wins() {
        let type_level = TranslatorTable::new()
            .with("json", tagged("class-json"))
            .with("xml", tagged("class-xml"));
        let method_level = TranslatorTable::new().with("json", tagged("method-json"));

        let translators = Translators::new(registry(), &type_level, &method_level);

        let json = translators.select("text/json").unwrap();
        assert_eq!(json.serialize(&Value::Null).unwrap(), b"method-json");
        let xml = translators.select("text/xml").unwrap();
        assert_eq!(xml.serialize(&Value::Null).unwrap(), b"class-xml");
    }

    #[test]
    fn test_translators_content_types() {
        let table = TranslatorTable::new().with("json", tagged("json"));
        let translators = Translators::new(registry(), &table, &TranslatorTable::new());

        let types: Vec<_> = translators.content_types().into_iter().collect();
        assert_eq!(types, vec!["application/json", "text/json"]);
    }

    #[test]
    fn test_translators_missing_translator() {
        let table = TranslatorTable::new().with("json", tagged("json"));
        let translators = Translators::new(registry(), &table, &TranslatorTable::new());

        assert!(matches!(
            translators.select("text/xml"),
            Err(RegistryError::MissingTranslator { .. })
        ));
        assert!(matches!(
            translators.select("text/plain"),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_function_translator_receives_names() {
        let translator = SerializerTranslator::function(|name, content_type, _| {
            Ok(format!("{name}|{content_type}").into_bytes())
        });
        let serializer = translator.instantiate("json", "text/json");
        assert_eq!(serializer.serialize(&Value::Null).unwrap(), b"json|text/json");
    }

    #[test]
    fn test_json_translators() {
        let serializer =
            SerializerTranslator::of::<JsonSerializer>().instantiate("json", "application/json");
        assert_eq!(
            serializer.serialize(&serde_json::json!({"id": 7})).unwrap(),
            br#"{"id":7}"#
        );

        let deserializer =
            DeserializerTranslator::of::<JsonDeserializer>().instantiate("json", "application/json");
        assert_eq!(
            deserializer.deserialize(br#"{"name":"sprocket"}"#).unwrap(),
            serde_json::json!({"name": "sprocket"})
        );
        assert!(deserializer.deserialize(b"{not json").is_err());
    }
}
