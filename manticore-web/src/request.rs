//! 入站请求
//!
//! 分发管线只依赖请求的少量信息：方法、URL、请求头、请求体，以及用于日志的
//! 来源地址和认证用户。传输层（见 [`crate::server`]）负责把 axum 请求转换成
//! [`Request`]。

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, HOST};
use http::{Method, Uri};
use manticore_core::negotiation::{essence, Accept};

/// 上游认证中间件写入请求扩展的用户名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser(pub String);

/// 一次 HTTP 请求
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<String>,
    remote_user: Option<String>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            remote_user: None,
        }
    }

    /// 从 `http::request::Parts` 和已读取的请求体构造
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let remote_user = parts
            .extensions
            .get::<RemoteUser>()
            .map(|user| user.0.clone());

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: None,
            remote_user,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: Option<String>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn with_remote_user(mut self, user: Option<String>) -> Self {
        self.remote_user = user;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// 完整 URL；URI 不含主机部分时用 `Host` 头补全
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        match self.header(HOST.as_str()) {
            Some(host) => format!("http://{}{}", host, self.uri),
            None => self.uri.to_string(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取请求头的字符串值，非 ASCII 值视为不存在
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// 请求体为空时视为没有请求体
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// 声明的媒体类型（不含参数）
    pub fn content_type(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str()).map(essence)
    }

    /// 客户端的 `Accept` 偏好
    pub fn accept(&self) -> Accept {
        Accept::parse(self.header(ACCEPT.as_str()))
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    /// 日志中使用的请求来源：`地址 (用户)`，没有地址时为 `[local]`
    pub fn origin(&self) -> String {
        let addr = self.remote_addr().unwrap_or("[local]");
        match self.remote_user() {
            Some(user) => format!("{} ({})", addr, user),
            None => addr.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &'static str) -> Request {
        Request::new(Method::GET, Uri::from_static(uri))
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let request = get("/widgets").with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert_eq!(request.content_type().as_deref(), Some("application/json"));
        assert_eq!(get("/widgets").content_type(), None);
    }

    #[test]
    fn test_body_presence() {
        assert!(!get("/widgets").has_body());
        let request = get("/widgets").with_body("{}");
        assert!(request.has_body());
        assert_eq!(request.content_length(), 2);
    }

    #[test]
    fn test_origin() {
        assert_eq!(get("/").origin(), "[local]");

        let request = get("/")
            .with_remote_addr(Some("10.0.0.1".to_string()))
            .with_remote_user(Some("alice".to_string()));
        assert_eq!(request.origin(), "10.0.0.1 (alice)");
    }

    #[test]
    fn test_url_uses_host_header() {
        let request = get("/widgets/7?full=1")
            .with_header(HOST, HeaderValue::from_static("api.example.com"));
        assert_eq!(request.url(), "http://api.example.com/widgets/7?full=1");
        assert_eq!(get("/widgets").url(), "/widgets");
    }

    #[test]
    fn test_from_parts_reads_remote_user() {
        let (mut parts, _) = http::Request::builder()
            .method(Method::POST)
            .uri("/widgets")
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(RemoteUser("bob".to_string()));

        let request = Request::from_parts(parts, Bytes::from_static(b"{}"));
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.remote_user(), Some("bob"));
        assert!(request.has_body());
    }
}
