//! 控制器成员声明
//!
//! 一个控制器类型由若干 [`Member`] 组成。成员按 [`MemberKind`] 分类：
//!
//! - **Action** - 可路由的资源操作，例如 `show`、`create`
//! - **Extension** - 与某个 action 同名的扩展方法，在 action 前后运行
//! - **Plain** - 普通辅助方法，不参与路由和分发
//!
//! # 示例
//!
//! ```
//! use manticore_web::member::{Member, Outcome, Signature};
//! use manticore_core::translator::{JsonSerializer, SerializerTranslator};
//! use http::StatusCode;
//! use serde_json::json;
//!
//! let show = Member::action("show", "/widgets/{id}", |_request, params| {
//!     Ok(json!({ "id": params.get("id") }).into())
//! })
//! .methods(["get"])
//! .code(StatusCode::OK)
//! .signature(Signature::new(["request", "id"]))
//! .serializer("json", SerializerTranslator::of::<JsonSerializer>());
//!
//! assert_eq!(show.route().path(), "/widgets/{id}");
//! ```

use crate::request::Request;
use crate::response::{is_truthy, RawResponse, ResponseObject};
use http::StatusCode;
use manticore_core::translator::{
    Deserializer, DeserializerTranslator, Serializer, SerializerTranslator, TranslatorTable,
};
use manticore_core::utils::path::norm_path;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 关键字参数：路由参数、静态关键字以及反序列化后的 `body`
pub type Params = HashMap<String, Value>;

/// action 或扩展方法的返回值
#[derive(Debug, Default)]
pub enum Outcome {
    /// 没有结果
    #[default]
    Empty,
    /// 普通结果值，由描述符包装成响应对象
    Value(Value),
    /// 现成的响应对象，会被重新绑定到当前描述符
    Response(ResponseObject),
    /// 传输层响应，立即终止分发并原样返回
    Raw(RawResponse),
}

impl Outcome {
    /// 响应对象和传输层响应总是为真
    pub fn is_truthy(&self) -> bool {
        match self {
            Outcome::Empty => false,
            Outcome::Value(value) => is_truthy(value),
            Outcome::Response(_) | Outcome::Raw(_) => true,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<ResponseObject> for Outcome {
    fn from(response: ResponseObject) -> Self {
        Outcome::Response(response)
    }
}

impl From<RawResponse> for Outcome {
    fn from(response: RawResponse) -> Self {
        Outcome::Raw(response)
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Empty
    }
}

/// action 处理函数：`(request, params)`
pub type Handler = Arc<dyn Fn(&Request, Params) -> anyhow::Result<Outcome> + Send + Sync>;

/// 扩展的后处理函数：`(request, response, params)`
pub type PostHandler =
    Arc<dyn Fn(&Request, &mut ResponseObject, Params) -> anyhow::Result<Outcome> + Send + Sync>;

/// 两阶段扩展的前处理函数
pub type PreHandler = Arc<dyn Fn(&Request, Params) -> anyhow::Result<Phase> + Send + Sync>;

/// 挂起的两阶段扩展，恰好恢复一次
pub type Resume =
    Box<dyn FnOnce(&Request, &mut ResponseObject) -> anyhow::Result<Outcome> + Send>;

/// 两阶段扩展前处理的结果
pub enum Phase {
    /// 结果为真时短路：跳过 action 和后续扩展的前处理；结果为假时等同于 `Complete`
    Respond(Outcome),
    /// 挂起，等待 action 完成后以当前响应恢复
    Suspend(Resume),
    /// 只做前处理，不参与后处理
    Complete,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Respond(outcome) => f.debug_tuple("Respond").field(outcome).finish(),
            Phase::Suspend(_) => f.write_str("Suspend"),
            Phase::Complete => f.write_str("Complete"),
        }
    }
}

/// 扩展方法
#[derive(Clone)]
pub enum Extension {
    /// 只在后处理阶段运行
    Simple(PostHandler),
    /// 前处理决定短路、挂起或结束
    TwoPhase(PreHandler),
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Simple(_) => f.write_str("Extension::Simple"),
            Extension::TwoPhase(_) => f.write_str("Extension::TwoPhase"),
        }
    }
}

impl Extension {
    pub fn simple<F>(post: F) -> Self
    where
        F: Fn(&Request, &mut ResponseObject, Params) -> anyhow::Result<Outcome>
            + Send
            + Sync
            + 'static,
    {
        Extension::Simple(Arc::new(post))
    }

    pub fn two_phase<F>(pre: F) -> Self
    where
        F: Fn(&Request, Params) -> anyhow::Result<Phase> + Send + Sync + 'static,
    {
        Extension::TwoPhase(Arc::new(pre))
    }

    /// 固定的前后处理组合
    ///
    /// `pre` 返回真值时短路；否则挂起，action 完成后以同一组参数调用 `post`。
    pub fn around<P, Q>(pre: P, post: Q) -> Self
    where
        P: Fn(&Request, &Params) -> anyhow::Result<Outcome> + Send + Sync + 'static,
        Q: Fn(&Request, &mut ResponseObject, &Params) -> anyhow::Result<Outcome>
            + Send
            + Sync
            + 'static,
    {
        let post = Arc::new(post);
        Self::two_phase(move |request, params| {
            let outcome = pre(request, &params)?;
            if outcome.is_truthy() {
                return Ok(Phase::Respond(outcome));
            }
            let post = Arc::clone(&post);
            Ok(Phase::Suspend(Box::new(
                move |request: &Request, response: &mut ResponseObject| {
                    post(request, response, &params)
                },
            )))
        })
    }

    pub fn is_two_phase(&self) -> bool {
        matches!(self, Extension::TwoPhase(_))
    }
}

/// 成员的可调用部分
#[derive(Clone)]
pub enum Callable {
    Handler(Handler),
    Extension(Extension),
}

/// 形式参数信息，用于裁剪多余的关键字参数
///
/// 参数列表包含位置参数（请求、响应）在内的全部形参名；`offset` 为 1 表示
/// 第一个形参是隐式接收者。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<String>,
    accepts_extra: bool,
    offset: usize,
}

impl Default for Signature {
    fn default() -> Self {
        Self::any()
    }
}

impl Signature {
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            accepts_extra: false,
            offset: 0,
        }
    }

    /// 接受任意关键字参数
    pub fn any() -> Self {
        Self {
            params: Vec::new(),
            accepts_extra: true,
            offset: 0,
        }
    }

    pub fn accept_extra(mut self) -> Self {
        self.accepts_extra = true;
        self
    }

    /// 第一个形参是隐式接收者
    pub fn with_receiver(mut self) -> Self {
        self.offset = 1;
        self
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn accepts_extra(&self) -> bool {
        self.accepts_extra
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 丢弃形参列表中（位于接收者和已提供的位置参数之后）不存在的关键字参数
    pub fn trim(&self, positional: usize, named: &Params) -> Params {
        if self.accepts_extra {
            return named.clone();
        }

        let start = (self.offset + positional).min(self.params.len());
        self.params[start..]
            .iter()
            .filter_map(|name| named.get(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }
}

/// 路由条件：`(request, 匹配参数) → 是否匹配`
pub type Condition = Arc<dyn Fn(&Request, &Params) -> bool + Send + Sync>;

/// action 的路由声明
#[derive(Clone, Default)]
pub struct RouteSpec {
    path: String,
    methods: Vec<String>,
    condition: Option<Condition>,
    keywords: Params,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("condition", &self.condition.is_some())
            .field("keywords", &self.keywords)
            .finish()
    }
}

impl RouteSpec {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 允许的 HTTP 方法（大写），为空表示不限制
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// 静态传给 action 的关键字参数
    pub fn keywords(&self) -> &Params {
        &self.keywords
    }
}

/// 成员分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Action,
    Extension,
    Plain,
}

/// 控制器成员声明
#[derive(Clone)]
pub struct Member {
    name: String,
    kind: MemberKind,
    callable: Callable,
    signature: Signature,
    route: RouteSpec,
    code: Option<StatusCode>,
    serializers: TranslatorTable<dyn Serializer>,
    deserializers: TranslatorTable<dyn Deserializer>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("route", &self.route)
            .field("code", &self.code)
            .field("serializers", &self.serializers)
            .field("deserializers", &self.deserializers)
            .finish()
    }
}

impl Member {
    fn with_callable(name: impl Into<String>, kind: MemberKind, callable: Callable) -> Self {
        Self {
            name: name.into(),
            kind,
            callable,
            signature: Signature::any(),
            route: RouteSpec::default(),
            code: None,
            serializers: TranslatorTable::new(),
            deserializers: TranslatorTable::new(),
        }
    }

    /// 声明一个 action，路径会被规范化
    pub fn action<F>(name: impl Into<String>, path: &str, handler: F) -> Self
    where
        F: Fn(&Request, Params) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        let mut member = Self::with_callable(
            name,
            MemberKind::Action,
            Callable::Handler(Arc::new(handler)),
        );
        member.route.path = norm_path(path, true);
        member
    }

    /// 声明一个扩展方法，名称与被扩展的 action 相同
    pub fn extension(name: impl Into<String>, extension: Extension) -> Self {
        Self::with_callable(name, MemberKind::Extension, Callable::Extension(extension))
    }

    /// 声明一个普通方法
    pub fn plain<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request, Params) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self::with_callable(name, MemberKind::Plain, Callable::Handler(Arc::new(handler)))
    }

    /// 限制允许的 HTTP 方法
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.route.methods = methods
            .into_iter()
            .map(|method| method.as_ref().to_ascii_uppercase())
            .collect();
        self
    }

    /// 路由条件
    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Request, &Params) -> bool + Send + Sync + 'static,
    {
        self.route.condition = Some(Arc::new(condition));
        self
    }

    /// 默认状态码
    pub fn code(mut self, code: StatusCode) -> Self {
        self.code = Some(code);
        self
    }

    /// 静态关键字参数；`action` 和 `controller` 是保留名称，会被忽略
    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if name != "action" && name != "controller" {
            self.route.keywords.insert(name, value.into());
        }
        self
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
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

    // ========== 访问器 ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn get_signature(&self) -> &Signature {
        &self.signature
    }

    pub fn route(&self) -> &RouteSpec {
        &self.route
    }

    pub fn default_code(&self) -> Option<StatusCode> {
        self.code
    }

    pub fn serializers(&self) -> &TranslatorTable<dyn Serializer> {
        &self.serializers
    }

    pub fn deserializers(&self) -> &TranslatorTable<dyn Deserializer> {
        &self.deserializers
    }
}
