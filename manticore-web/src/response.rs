//! 响应对象
//!
//! [`ResponseObject`] 是 action 和扩展方法之间传递的中间结果：一个结果值、
//! 一组大小写不敏感的响应头、可选的显式状态码。它在分发结束时被序列化一次，
//! 生成传输层使用的 [`RawResponse`]。

use crate::action::ActionDescriptor;
use crate::request::Request;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use manticore_core::error::{HttpError, ResponseError};
use manticore_core::translator::Serializer;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 传输层响应
pub type RawResponse = http::Response<Bytes>;

/// 判断结果值是否为“真”
///
/// `null`、`false`、`0`、空字符串、空数组和空对象为假，其余为真。
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// 绑定到描述符后确定的内容类型和序列化器
struct Binding {
    content_type: String,
    serializer: Box<dyn Serializer>,
}

/// 响应对象
pub struct ResponseObject {
    result: Value,
    code: Option<StatusCode>,
    default_code: Option<StatusCode>,
    /// 小写名称 → (最近一次设置时的名称, 值)
    headers: HashMap<String, (String, String)>,
    binding: Option<Binding>,
}

impl fmt::Debug for ResponseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseObject")
            .field("result", &self.result)
            .field("code", &self.code())
            .field("headers", &self.headers.values().collect::<Vec<_>>())
            .field("content_type", &self.content_type())
            .finish()
    }
}

impl Default for ResponseObject {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResponseObject {
    pub fn new(result: impl Into<Value>) -> Self {
        Self {
            result: result.into(),
            code: None,
            default_code: None,
            headers: HashMap::new(),
            binding: None,
        }
    }

    /// 没有结果的响应
    pub fn empty() -> Self {
        Self::new(Value::Null)
    }

    pub fn with_code(mut self, code: StatusCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut Value {
        &mut self.result
    }

    pub fn set_result(&mut self, result: impl Into<Value>) {
        self.result = result.into();
    }

    // ========== 响应头 ==========

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .insert(name.to_ascii_lowercase(), (name, value.into()));
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// 遍历响应头，每个名称只出现一次
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// 遍历响应头名称，使用最后一次设置时的写法
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.values().map(|(name, _)| name.as_str())
    }

    // ========== 状态码 ==========

    /// 显式状态码优先，其次是 action 声明的默认状态码，最后是 200
    pub fn code(&self) -> StatusCode {
        self.code.or(self.default_code).unwrap_or(StatusCode::OK)
    }

    pub fn set_code(&mut self, code: StatusCode) {
        self.code = Some(code);
    }

    /// 清除显式状态码，恢复默认值
    pub fn restore_default_code(&mut self) {
        self.code = None;
    }

    // ========== 绑定与序列化 ==========

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.binding
            .as_ref()
            .map(|binding| binding.content_type.as_str())
    }

    /// 绑定到描述符：更新默认状态码，并按 `Accept` 选择序列化器
    ///
    /// 已绑定的响应对象会被重新绑定到新的描述符。
    pub fn bind(&mut self, descriptor: &ActionDescriptor, request: &Request) -> Result<(), HttpError> {
        self.default_code = Some(descriptor.method().code().unwrap_or(StatusCode::OK));
        let (content_type, serializer) = descriptor.select_serializer(request)?;
        self.binding = Some(Binding {
            content_type,
            serializer,
        });
        Ok(())
    }

    /// 生成传输层响应
    ///
    /// 结果为真时设置 `Content-Type` 并调用序列化器生成响应体。
    pub fn serialize(self) -> Result<RawResponse, ResponseError> {
        let binding = self.binding.as_ref().ok_or(ResponseError::Unbound)?;

        let mut response = RawResponse::new(Bytes::new());
        *response.status_mut() = self.code();

        let headers = response.headers_mut();
        for (name, value) in self.headers.values() {
            let invalid = || ResponseError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }

        if is_truthy(&self.result) {
            let content_type = HeaderValue::from_str(&binding.content_type).map_err(|_| {
                ResponseError::InvalidHeader {
                    name: CONTENT_TYPE.to_string(),
                }
            })?;
            headers.insert(CONTENT_TYPE, content_type);

            let body = binding
                .serializer
                .serialize(&self.result)
                .map_err(ResponseError::Serialize)?;
            *response.body_mut() = Bytes::from(body);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&value), "{value} should be falsy");
        }
        for value in [json!(true), json!(1), json!("x"), json!([0]), json!({"id": 7})] {
            assert!(is_truthy(&value), "{value} should be truthy");
        }
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut response = ResponseObject::empty();
        response.set_header("X-Widget-Count", "3");

        assert_eq!(response.header("x-widget-count"), Some("3"));
        assert_eq!(response.header("X-WIDGET-COUNT"), Some("3"));
        assert!(response.contains_header("x-WiDgEt-CoUnT"));
        assert!(!response.contains_header("x-other"));
    }

    #[test]
    fn test_header_name_follows_last_set() {
        let mut response = ResponseObject::empty();
        response.set_header("etag", "a");
        response.set_header("ETag", "b");

        let headers: Vec<_> = response.headers().collect();
        assert_eq!(headers, vec![("ETag", "b")]);

        assert_eq!(response.remove_header("ETAG").as_deref(), Some("b"));
        assert_eq!(response.headers().count(), 0);
    }

    #[test]
    fn test_header_names_are_distinct() {
        let mut response = ResponseObject::empty();
        response.set_header("x-widget-count", "3");
        response.set_header("X-Widget-Count", "4");
        response.set_header("Location", "/widgets/7");

        let mut names: Vec<_> = response.header_names().collect();
        names.sort();
        assert_eq!(names, vec!["Location", "X-Widget-Count"]);
    }

    #[test]
    fn test_status_code_precedence() {
        let mut response = ResponseObject::empty();
        assert_eq!(response.code(), StatusCode::OK);

        response.default_code = Some(StatusCode::NO_CONTENT);
        assert_eq!(response.code(), StatusCode::NO_CONTENT);

        response.set_code(StatusCode::ACCEPTED);
        assert_eq!(response.code(), StatusCode::ACCEPTED);

        response.restore_default_code();
        assert_eq!(response.code(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_serialize_requires_binding() {
        let response = ResponseObject::new(json!({"id": 7}));
        assert!(!response.is_bound());
        assert!(matches!(response.serialize(), Err(ResponseError::Unbound)));
    }
}
