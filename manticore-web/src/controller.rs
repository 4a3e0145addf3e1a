//! 资源控制器
//!
//! [`ControllerType`] 是控制器的静态声明：名称、路径前缀、action 和扩展成员，
//! 以及类型级的翻译器表。它通过 [`ControllerTypeBuilder`] 一次性构建，可以继承
//! 其他控制器类型的声明。
//!
//! [`Controller`] 是控制器类型的实例，持有 action 表、扩展表和描述符缓存，负责
//! 单个请求从反序列化到序列化的完整分发。
//!
//! # 示例
//!
//! ```
//! use manticore_web::controller::ControllerType;
//! use manticore_web::member::{Member, Outcome};
//! use manticore_core::translator::{JsonSerializer, SerializerTranslator};
//!
//! let widgets = ControllerType::builder("widgets")
//!     .prefix("/api")
//!     .serializer("json", SerializerTranslator::of::<JsonSerializer>())
//!     .member(Member::action("index", "/widgets", |_, _| Ok(Outcome::Empty)).methods(["GET"]))
//!     .build();
//!
//! assert_eq!(widgets.prefix(), "/api");
//! assert!(widgets.actions().contains_key("index"));
//! ```

use crate::action::{ActionDescriptor, ActionMethod, DispatchResult, Halt};
use crate::member::{Member, MemberKind, Params};
use crate::request::Request;
use crate::response::RawResponse;
use crate::routing::{Mapper, RouteDefinition};
use manticore_core::error::{ApplicationError, ApplicationResult, HttpError};
use manticore_core::translator::{
    Deserializer, DeserializerTranslator, Serializer, SerializerTranslator, TranslatorRegistry,
    TranslatorTable,
};
use manticore_core::utils::path::{join, norm_path};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// 控制器类型
// ============================================================================

/// 控制器类型声明
#[derive(Clone)]
pub struct ControllerType {
    name: Option<String>,
    prefix: String,
    actions: BTreeMap<String, Arc<Member>>,
    extensions: BTreeMap<String, Arc<Member>>,
    serializers: TranslatorTable<dyn Serializer>,
    deserializers: TranslatorTable<dyn Deserializer>,
}

impl fmt::Debug for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerType")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("serializers", &self.serializers)
            .field("deserializers", &self.deserializers)
            .finish()
    }
}

impl ControllerType {
    /// 开始声明一个命名的控制器类型
    pub fn builder(name: impl Into<String>) -> ControllerTypeBuilder {
        ControllerTypeBuilder {
            name: Some(name.into()),
            ..ControllerTypeBuilder::default()
        }
    }

    /// 开始声明一个未命名的控制器类型
    ///
    /// 未命名的类型可以作为其他类型的父类型；它自己不能实例化，除非从父类型继承了名称。
    pub fn abstract_builder() -> ControllerTypeBuilder {
        ControllerTypeBuilder::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn actions(&self) -> &BTreeMap<String, Arc<Member>> {
        &self.actions
    }

    pub fn extensions(&self) -> &BTreeMap<String, Arc<Member>> {
        &self.extensions
    }

    pub fn serializers(&self) -> &TranslatorTable<dyn Serializer> {
        &self.serializers
    }

    pub fn deserializers(&self) -> &TranslatorTable<dyn Deserializer> {
        &self.deserializers
    }

    /// 实例化控制器
    ///
    /// 提供 `mapper` 时为每个 action 注册路由，路由的 `controller` 参数为 `resource`。
    pub fn instantiate(
        &self,
        resource: &str,
        registry: Arc<TranslatorRegistry>,
        mapper: Option<&mut Mapper>,
    ) -> ApplicationResult<Controller> {
        let name = self
            .name
            .clone()
            .ok_or(ApplicationError::IncompleteController)?;

        let bind = |member: &Arc<Member>| {
            Arc::new(ActionMethod::new(
                Arc::clone(member),
                &self.serializers,
                &self.deserializers,
                Arc::clone(&registry),
            ))
        };

        let actions = self
            .actions
            .iter()
            .map(|(key, member)| (key.clone(), bind(member)))
            .collect();
        let extensions = self
            .extensions
            .iter()
            .map(|(key, member)| (key.clone(), vec![bind(member)]))
            .collect();

        let controller = Controller {
            name,
            resource: resource.to_string(),
            prefix: self.prefix.clone(),
            actions,
            extensions,
            descriptors: RwLock::new(HashMap::new()),
        };

        if let Some(mapper) = mapper {
            for (action, method) in &controller.actions {
                controller.route(action, method, mapper)?;
            }
        }

        tracing::debug!(
            controller = %controller.name,
            resource = %controller.resource,
            actions = controller.actions.len(),
            extensions = controller.extensions.len(),
            "Controller instantiated"
        );

        Ok(controller)
    }
}

/// 控制器类型构建器
#[derive(Default)]
pub struct ControllerTypeBuilder {
    name: Option<String>,
    prefix: Option<String>,
    members: Vec<Member>,
    parents: Vec<ControllerType>,
    serializers: TranslatorTable<dyn Serializer>,
    deserializers: TranslatorTable<dyn Deserializer>,
}

impl ControllerTypeBuilder {
    /// 路径前缀，构建时规范化并去掉末尾的 `/`
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// 继承父类型的声明，先继承的父类型优先
    pub fn inherit(mut self, parent: &ControllerType) -> Self {
        self.parents.push(parent.clone());
        self
    }

    pub fn serializer(mut self, type_name: impl Into<String>, translator: SerializerTranslator) -> Self {
        self.serializers.insert(type_name, translator);
        self
    }

    pub fn deserializer(
        mut self,
        type_name: impl Into<String>,
        translator: DeserializerTranslator,
    ) -> Self {
        self.deserializers.insert(type_name, translator);
        self
    }

    pub fn build(self) -> ControllerType {
        let mut actions = BTreeMap::new();
        let mut extensions = BTreeMap::new();

        for member in self.members {
            match member.kind() {
                MemberKind::Action => {
                    actions.insert(member.name().to_string(), Arc::new(member));
                }
                MemberKind::Extension => {
                    extensions.insert(member.name().to_string(), Arc::new(member));
                }
                MemberKind::Plain => {
                    tracing::trace!(member = member.name(), "Skipping plain member");
                }
            }
        }

        // 自己的声明优先，其次按继承顺序
        let mut serializers = self.serializers;
        let mut deserializers = self.deserializers;
        for parent in &self.parents {
            for (key, member) in &parent.actions {
                actions.entry(key.clone()).or_insert_with(|| Arc::clone(member));
            }
            for (key, member) in &parent.extensions {
                extensions
                    .entry(key.clone())
                    .or_insert_with(|| Arc::clone(member));
            }

            let mut inherited = parent.serializers.clone();
            inherited.overlay(&serializers);
            serializers = inherited;

            let mut inherited = parent.deserializers.clone();
            inherited.overlay(&deserializers);
            deserializers = inherited;
        }

        // 继承第一个声明了前缀的父类型
        let parent_prefix = self
            .parents
            .iter()
            .find(|parent| !parent.prefix.is_empty())
            .map(|parent| parent.prefix.clone());
        let prefix = match (self.prefix, parent_prefix) {
            (Some(own), Some(inherited)) => format!("{}{}", inherited, norm_path(&own, false)),
            (Some(own), None) => norm_path(&own, false),
            (None, Some(inherited)) => inherited,
            (None, None) => String::new(),
        };

        let name = self
            .name
            .or_else(|| self.parents.iter().find_map(|parent| parent.name.clone()));

        ControllerType {
            name,
            prefix,
            actions,
            extensions,
            serializers,
            deserializers,
        }
    }
}

// ============================================================================
// 控制器实例
// ============================================================================

/// 控制器实例
pub struct Controller {
    name: String,
    resource: String,
    prefix: String,
    actions: BTreeMap<String, Arc<ActionMethod>>,
    extensions: BTreeMap<String, Vec<Arc<ActionMethod>>>,
    descriptors: RwLock<HashMap<String, Arc<ActionDescriptor>>>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("prefix", &self.prefix)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Controller {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn actions(&self) -> &BTreeMap<String, Arc<ActionMethod>> {
        &self.actions
    }

    pub fn extensions(&self) -> &BTreeMap<String, Vec<Arc<ActionMethod>>> {
        &self.extensions
    }

    /// 描述符是否已缓存
    pub fn is_cached(&self, action: &str) -> bool {
        self.descriptors.read().contains_key(action)
    }

    /// 为 action 生成路由
    fn route(&self, action: &str, method: &ActionMethod, mapper: &mut Mapper) -> ApplicationResult<()> {
        let name = format!("{}_{}", self.name, action);
        let route = method.member().route();
        let path = join(&self.prefix, route.path());

        mapper
            .connect(RouteDefinition {
                name: name.clone(),
                path,
                controller: &self.resource,
                action,
                methods: route.methods(),
                condition: route.condition(),
                keywords: route.keywords(),
            })
            .map_err(|err| ApplicationError::InvalidRoute {
                name,
                reason: err.to_string(),
            })
    }

    /// 获取 action 的描述符，未注册的 action 返回 `None`
    ///
    /// 描述符在首次使用时创建并缓存；并发请求可能重复创建，后写入者生效。
    pub fn descriptor(&self, action: &str) -> Option<Arc<ActionDescriptor>> {
        if let Some(descriptor) = self.descriptors.read().get(action) {
            return Some(Arc::clone(descriptor));
        }

        let method = self.actions.get(action)?;
        let extensions = self.extensions.get(action).cloned().unwrap_or_default();
        let descriptor = Arc::new(ActionDescriptor::new(Arc::clone(method), extensions));

        tracing::debug!(
            controller = %self.name,
            action = action,
            extensions = descriptor.extensions().len(),
            "Action descriptor created"
        );

        self.descriptors
            .write()
            .insert(action.to_string(), Arc::clone(&descriptor));
        Some(descriptor)
    }

    fn evict(&mut self, action: &str) {
        if self.descriptors.get_mut().remove(action).is_some() {
            tracing::debug!(controller = %self.name, action = action, "Action descriptor evicted");
        }
    }

    /// 注册或替换一个 action
    ///
    /// 新的 action 在提供 `mapper` 时生成路由。
    pub fn add_action(
        &mut self,
        action: &str,
        method: Arc<ActionMethod>,
        mapper: Option<&mut Mapper>,
    ) -> ApplicationResult<()> {
        if let Some(mapper) = mapper {
            if !self.actions.contains_key(action) {
                self.route(action, &method, mapper)?;
            }
        }

        self.actions.insert(action.to_string(), method);
        self.evict(action);
        Ok(())
    }

    /// 追加扩展方法
    pub fn add_extensions(&mut self, action: &str, methods: &[Arc<ActionMethod>]) {
        if methods.is_empty() {
            return;
        }

        self.extensions
            .entry(action.to_string())
            .or_default()
            .extend(methods.iter().cloned());
        self.evict(action);
    }

    /// 用另一个控制器扩展当前控制器
    ///
    /// 扩展控制器的 action 替换同名 action（新 action 会生成路由），扩展方法追加到
    /// 现有扩展列表之后。
    pub fn extend(&mut self, other: &Controller, mut mapper: Option<&mut Mapper>) -> ApplicationResult<()> {
        for (action, method) in &other.actions {
            self.add_action(action, Arc::clone(method), mapper.as_deref_mut())?;
        }

        for (action, methods) in &other.extensions {
            self.add_extensions(action, methods);
        }

        tracing::debug!(
            controller = %self.name,
            extension = %other.name,
            "Controller extended"
        );
        Ok(())
    }

    /// 分发请求
    ///
    /// `params` 必须包含 `action`；`action` 和 `controller` 不会传给方法。
    /// 方法返回的传输层响应会原样返回。
    pub fn dispatch(&self, request: &Request, params: Params) -> anyhow::Result<RawResponse> {
        match self.run(request, params) {
            Ok(response) | Err(Halt::Respond(response)) => Ok(response),
            Err(Halt::Error(err)) => Err(err),
        }
    }

    fn run(&self, request: &Request, mut params: Params) -> DispatchResult<RawResponse> {
        let action = match params.remove("action") {
            Some(Value::String(action)) => action,
            _ => return Err(HttpError::NotFound.into()),
        };
        params.remove("controller");

        let descriptor = self.descriptor(&action).ok_or(HttpError::NotFound)?;

        if let Some(body) = descriptor.deserialize_request(request)? {
            params.insert("body".to_string(), body);
        }

        let (response, post_list) = descriptor.pre_process(request, &params)?;

        let response = match response {
            Some(response) => response,
            None => descriptor.invoke(request, &params)?,
        };

        let response = descriptor.post_process(post_list, request, response, &params)?;

        Ok(response.serialize()?)
    }
}

// ============================================================================
// 控制器注册
// ============================================================================

/// 控制器注册信息
///
/// 用于通过 `inventory` 自动发现控制器类型：
///
/// ```ignore
/// manticore_web::inventory::submit! {
///     ControllerRegistration { name: "widgets", factory: widgets_controller }
/// }
/// ```
pub struct ControllerRegistration {
    /// 配置中引用控制器类型使用的名称
    pub name: &'static str,

    /// 构造控制器类型声明
    pub factory: fn() -> ControllerType,
}

// 使用 inventory 收集所有控制器
manticore_core::inventory::collect!(ControllerRegistration);

/// 获取所有注册的控制器
pub fn get_all_controllers() -> impl Iterator<Item = &'static ControllerRegistration> {
    manticore_core::inventory::iter::<ControllerRegistration>()
}

/// 控制器类型目录：名称 → 构造函数
#[derive(Clone, Default)]
pub struct ControllerCatalog {
    factories: HashMap<String, Arc<dyn Fn() -> ControllerType + Send + Sync>>,
}

impl fmt::Debug for ControllerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ControllerCatalog").field("names", &names).finish()
    }
}

impl ControllerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收集所有通过 `inventory` 提交的控制器
    pub fn discover() -> Self {
        let mut catalog = Self::new();
        for registration in get_all_controllers() {
            tracing::debug!(name = registration.name, "Discovered controller type");
            catalog.register(registration.name, registration.factory);
        }
        catalog
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> ControllerType + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 按名称构造控制器类型
    pub fn resolve(&self, name: &str) -> ApplicationResult<ControllerType> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ApplicationError::UnknownController(name.to_string()))
    }
}
