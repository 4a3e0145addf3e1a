//! Action 方法与描述符
//!
//! [`ActionMethod`] 包装一个控制器成员，提供合并后的翻译器和裁剪参数后的调用。
//! [`ActionDescriptor`] 把一个 action 方法和它的扩展列表绑定在一起，负责：
//!
//! - 反序列化请求体（扩展的反序列化器按声明顺序附加）
//! - 按 `Accept` 协商序列化器（扩展的序列化器按声明的逆序附加）
//! - 扩展前处理 / 后处理
//! - 把方法返回值包装成 [`ResponseObject`]
//!
//! 处理流程：
//!
//! ```text
//! pre_process(E1, E2, E3) → invoke(action) → post_process(E3, E2, E1)
//! ```
//!
//! 前处理中任何两阶段扩展返回真值都会短路，跳过 action 和其余扩展的前处理，
//! 但已经开始的扩展仍然执行后处理。

use crate::member::{Callable, Extension, Member, Outcome, Params, Phase, Resume, Signature};
use crate::request::Request;
use crate::response::{RawResponse, ResponseObject};
use http::StatusCode;
use manticore_core::error::{HttpError, ResponseError};
use manticore_core::translator::{
    Deserializer, Serializer, TranslatorRegistry, TranslatorTable, Translators,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 分发管线的提前终止
#[derive(Debug)]
pub enum Halt {
    /// 方法返回了传输层响应，跳过剩余处理直接返回
    Respond(RawResponse),
    /// 处理失败
    Error(anyhow::Error),
}

impl From<anyhow::Error> for Halt {
    fn from(err: anyhow::Error) -> Self {
        Halt::Error(err)
    }
}

impl From<HttpError> for Halt {
    fn from(err: HttpError) -> Self {
        Halt::Error(err.into())
    }
}

impl From<ResponseError> for Halt {
    fn from(err: ResponseError) -> Self {
        Halt::Error(err.into())
    }
}

/// 分发管线的结果类型
pub type DispatchResult<T> = Result<T, Halt>;

/// 包装后的 action 或扩展方法
pub struct ActionMethod {
    member: Arc<Member>,
    serializers: Translators<dyn Serializer>,
    deserializers: Translators<dyn Deserializer>,
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMethod")
            .field("name", &self.member.name())
            .field("kind", &self.member.kind())
            .field("serializers", &self.serializers)
            .field("deserializers", &self.deserializers)
            .finish()
    }
}

impl ActionMethod {
    /// 以所属控制器类型的翻译器表为基础，叠加成员自己声明的翻译器
    pub fn new(
        member: Arc<Member>,
        type_serializers: &TranslatorTable<dyn Serializer>,
        type_deserializers: &TranslatorTable<dyn Deserializer>,
        registry: Arc<TranslatorRegistry>,
    ) -> Self {
        let serializers =
            Translators::new(Arc::clone(&registry), type_serializers, member.serializers());
        let deserializers = Translators::new(registry, type_deserializers, member.deserializers());
        Self {
            member,
            serializers,
            deserializers,
        }
    }

    pub fn name(&self) -> &str {
        self.member.name()
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    /// 声明的默认状态码
    pub fn code(&self) -> Option<StatusCode> {
        self.member.default_code()
    }

    pub fn signature(&self) -> &Signature {
        self.member.get_signature()
    }

    pub fn is_two_phase(&self) -> bool {
        matches!(self.member.callable(), Callable::Extension(ext) if ext.is_two_phase())
    }

    pub fn serializers(&self) -> &Translators<dyn Serializer> {
        &self.serializers
    }

    pub fn deserializers(&self) -> &Translators<dyn Deserializer> {
        &self.deserializers
    }

    /// 裁剪关键字参数
    pub fn trim_params(&self, positional: usize, named: &Params) -> Params {
        self.signature().trim(positional, named)
    }

    /// 以 `(request, **params)` 调用 action 或普通方法
    pub fn call(&self, request: &Request, params: &Params) -> anyhow::Result<Outcome> {
        match self.member.callable() {
            Callable::Handler(handler) => handler(request, self.trim_params(1, params)),
            Callable::Extension(_) => {
                anyhow::bail!("Extension {:?} cannot be called as an action", self.name())
            }
        }
    }

    /// 运行两阶段扩展的前处理
    pub fn call_pre(&self, request: &Request, params: &Params) -> anyhow::Result<Phase> {
        match self.member.callable() {
            Callable::Extension(Extension::TwoPhase(pre)) => pre(request, self.trim_params(1, params)),
            _ => anyhow::bail!("{:?} is not a two-phase extension", self.name()),
        }
    }

    /// 以 `(request, response, **params)` 调用简单扩展
    pub fn call_post(
        &self,
        request: &Request,
        response: &mut ResponseObject,
        params: &Params,
    ) -> anyhow::Result<Outcome> {
        match self.member.callable() {
            Callable::Extension(Extension::Simple(post)) => {
                post(request, response, self.trim_params(2, params))
            }
            _ => anyhow::bail!("{:?} is not a simple extension", self.name()),
        }
    }
}

/// 后处理列表中的一项
pub enum PostStep {
    /// 挂起的两阶段扩展
    Resume(Resume),
    /// 简单扩展
    Call(Arc<ActionMethod>),
}

impl fmt::Debug for PostStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStep::Resume(_) => f.write_str("Resume"),
            PostStep::Call(method) => f.debug_tuple("Call").field(&method.name()).finish(),
        }
    }
}

/// Action 描述符
#[derive(Debug)]
pub struct ActionDescriptor {
    method: Arc<ActionMethod>,
    extensions: Vec<Arc<ActionMethod>>,
}

impl ActionDescriptor {
    pub fn new(method: Arc<ActionMethod>, extensions: Vec<Arc<ActionMethod>>) -> Self {
        Self { method, extensions }
    }

    pub fn method(&self) -> &ActionMethod {
        &self.method
    }

    pub fn extensions(&self) -> &[Arc<ActionMethod>] {
        &self.extensions
    }

    /// 反序列化请求体
    ///
    /// 没有请求体时返回 `None`，不检查媒体类型。
    pub fn deserialize_request(&self, request: &Request) -> DispatchResult<Option<Value>> {
        if !request.has_body() {
            return Ok(None);
        }

        let content_type = request.content_type().unwrap_or_default();
        let mut deserializer = self
            .method
            .deserializers()
            .select(&content_type)
            .map_err(|err| {
                tracing::debug!(content_type = %content_type, error = %err, "No deserializer for request");
                HttpError::UnsupportedMediaType
            })?;

        if let Some(attachable) = deserializer.as_attachable() {
            for ext in &self.extensions {
                match ext.deserializers().select(&content_type) {
                    Ok(other) => attachable.attach(other),
                    Err(err) => {
                        tracing::trace!(extension = ext.name(), error = %err, "Skipping extension deserializer")
                    }
                }
            }
        }

        let body = deserializer.deserialize(request.body())?;
        Ok(Some(body))
    }

    /// 按 `Accept` 选择响应的内容类型和序列化器
    pub fn select_serializer(
        &self,
        request: &Request,
    ) -> Result<(String, Box<dyn Serializer>), HttpError> {
        let content_types = self.method.serializers().content_types();
        let content_type = request
            .accept()
            .best_match(content_types.iter().map(String::as_str))
            .map(str::to_string)
            .ok_or(HttpError::NotAcceptable)?;

        let mut serializer = self
            .method
            .serializers()
            .select(&content_type)
            .map_err(|_| HttpError::NotAcceptable)?;

        if let Some(attachable) = serializer.as_attachable() {
            for ext in self.extensions.iter().rev() {
                match ext.serializers().select(&content_type) {
                    Ok(other) => attachable.attach(other),
                    Err(err) => {
                        tracing::trace!(extension = ext.name(), error = %err, "Skipping extension serializer")
                    }
                }
            }
        }

        Ok((content_type, serializer))
    }

    /// 扩展前处理
    ///
    /// 返回短路响应（如果有）和后处理列表；后处理列表是已处理扩展的逆序。
    pub fn pre_process(
        &self,
        request: &Request,
        params: &Params,
    ) -> DispatchResult<(Option<ResponseObject>, Vec<PostStep>)> {
        let mut post_list = Vec::with_capacity(self.extensions.len());

        for ext in &self.extensions {
            if ext.is_two_phase() {
                match ext.call_pre(request, params)? {
                    Phase::Respond(outcome) if outcome.is_truthy() => {
                        tracing::debug!(extension = ext.name(), "Extension short-circuited the action");
                        let response = self.wrap(request, outcome)?;
                        return Ok((Some(response), post_list));
                    }
                    Phase::Respond(_) | Phase::Complete => continue,
                    Phase::Suspend(resume) => post_list.insert(0, PostStep::Resume(resume)),
                }
            } else {
                post_list.insert(0, PostStep::Call(Arc::clone(ext)));
            }
        }

        Ok((None, post_list))
    }

    /// 扩展后处理，按给定顺序执行
    ///
    /// 扩展返回真值时，用包装后的值替换当前响应。
    pub fn post_process(
        &self,
        post_list: Vec<PostStep>,
        request: &Request,
        mut response: ResponseObject,
        params: &Params,
    ) -> DispatchResult<ResponseObject> {
        for step in post_list {
            let outcome = match step {
                PostStep::Resume(resume) => resume(request, &mut response)?,
                PostStep::Call(ext) => ext.call_post(request, &mut response, params)?,
            };

            if outcome.is_truthy() {
                response = self.wrap(request, outcome)?;
            }
        }

        Ok(response)
    }

    /// 调用 action 方法并包装返回值
    pub fn invoke(&self, request: &Request, params: &Params) -> DispatchResult<ResponseObject> {
        let outcome = self.method.call(request, params)?;
        self.wrap(request, outcome)
    }

    /// 包装方法返回值
    ///
    /// 传输层响应立即终止分发；响应对象重新绑定到当前描述符；其他值包装成新的响应对象。
    pub fn wrap(&self, request: &Request, outcome: Outcome) -> DispatchResult<ResponseObject> {
        let mut response = match outcome {
            Outcome::Raw(raw) => return Err(Halt::Respond(raw)),
            Outcome::Response(response) => response,
            Outcome::Value(value) => ResponseObject::new(value),
            Outcome::Empty => ResponseObject::empty(),
        };
        response.bind(self, request)?;
        Ok(response)
    }
}
