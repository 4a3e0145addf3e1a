//! 路由映射
//!
//! 控制器为每个 action 生成一条路由，名称为 `{控制器名}_{action}`。路径模板中的
//! `{name}` 段匹配一个不含 `/` 的片段，匹配结果作为关键字参数传给 action。

use crate::member::{Condition, Params};
use crate::request::Request;
use regex::Regex;
use serde_json::Value;
use std::fmt;

/// 一条已编译的路由
pub struct Route {
    name: String,
    template: String,
    pattern: Regex,
    controller: String,
    action: String,
    methods: Vec<String>,
    condition: Option<Condition>,
    keywords: Params,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("controller", &self.controller)
            .field("action", &self.action)
            .field("methods", &self.methods)
            .finish()
    }
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    fn matches(&self, request: &Request) -> Option<Params> {
        if !self.methods.is_empty()
            && !self
                .methods
                .iter()
                .any(|method| method == request.method().as_str())
        {
            return None;
        }

        let captures = self.pattern.captures(request.path())?;

        let mut params = self.keywords.clone();
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                params.insert(name.to_string(), Value::String(value.as_str().to_string()));
            }
        }
        params.insert("controller".to_string(), Value::String(self.controller.clone()));
        params.insert("action".to_string(), Value::String(self.action.clone()));

        if let Some(condition) = &self.condition {
            if !condition(request, &params) {
                return None;
            }
        }

        Some(params)
    }
}

/// 路由匹配结果
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    /// 路由名称
    pub name: String,
    /// 关键字参数，总是包含 `controller` 和 `action`
    pub params: Params,
}

/// 路由定义
pub struct RouteDefinition<'a> {
    pub name: String,
    pub path: String,
    pub controller: &'a str,
    pub action: &'a str,
    pub methods: &'a [String],
    pub condition: Option<&'a Condition>,
    pub keywords: &'a Params,
}

/// 路由表，按注册顺序匹配，第一条匹配的路由生效
#[derive(Debug, Default)]
pub struct Mapper {
    routes: Vec<Route>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把路径模板编译成锚定的正则表达式
    fn compile(template: &str) -> Result<Regex, regex::Error> {
        let mut pattern = String::from("^");
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            pattern.push_str(&regex::escape(&rest[..start]));
            let name = &rest[start + 1..start + len];
            pattern.push_str(&format!("(?P<{}>[^/]+)", name));
            rest = &rest[start + len + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        Regex::new(&pattern)
    }

    /// 注册一条路由
    pub fn connect(&mut self, definition: RouteDefinition<'_>) -> Result<(), regex::Error> {
        let pattern = Self::compile(&definition.path)?;

        tracing::debug!(
            name = %definition.name,
            path = %definition.path,
            methods = ?definition.methods,
            "Route connected"
        );

        self.routes.push(Route {
            name: definition.name,
            template: definition.path,
            pattern,
            controller: definition.controller.to_string(),
            action: definition.action.to_string(),
            methods: definition.methods.to_vec(),
            condition: definition.condition.cloned(),
            keywords: definition.keywords.clone(),
        });
        Ok(())
    }

    /// 为请求查找路由
    pub fn route(&self, request: &Request) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            route.matches(request).map(|params| RouteMatch {
                name: route.name.clone(),
                params,
            })
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};
    use serde_json::json;
    use std::sync::Arc;

    fn connect(mapper: &mut Mapper, action: &str, path: &str, methods: &[String]) {
        mapper
            .connect(RouteDefinition {
                name: format!("widgets_{}", action),
                path: path.to_string(),
                controller: "widgets",
                action,
                methods,
                condition: None,
                keywords: &Params::new(),
            })
            .unwrap();
    }

    fn request(method: Method, uri: &'static str) -> Request {
        Request::new(method, Uri::from_static(uri))
    }

    #[test]
    fn test_route_extracts_path_parameters() {
        let mut mapper = Mapper::new();
        connect(&mut mapper, "show", "/widgets/{id}", &[]);

        let matched = mapper.route(&request(Method::GET, "/widgets/7")).unwrap();
        assert_eq!(matched.name, "widgets_show");
        assert_eq!(matched.params["id"], json!("7"));
        assert_eq!(matched.params["action"], json!("show"));
        assert_eq!(matched.params["controller"], json!("widgets"));

        assert!(mapper.route(&request(Method::GET, "/widgets/7/parts")).is_none());
        assert!(mapper.route(&request(Method::GET, "/widgets")).is_none());
    }

    #[test]
    fn test_route_filters_methods() {
        let mut mapper = Mapper::new();
        connect(&mut mapper, "index", "/widgets", &["GET".to_string()]);
        connect(&mut mapper, "create", "/widgets", &["POST".to_string()]);

        let matched = mapper.route(&request(Method::POST, "/widgets")).unwrap();
        assert_eq!(matched.params["action"], json!("create"));
        assert!(mapper.route(&request(Method::DELETE, "/widgets")).is_none());
    }

    #[test]
    fn test_route_literal_segments_are_escaped() {
        let mut mapper = Mapper::new();
        connect(&mut mapper, "export", "/widgets.json", &[]);

        assert!(mapper.route(&request(Method::GET, "/widgets.json")).is_some());
        assert!(mapper.route(&request(Method::GET, "/widgetsxjson")).is_none());
    }

    #[test]
    fn test_route_condition_and_keywords() {
        let mut mapper = Mapper::new();
        let condition: Condition = Arc::new(|_: &Request, params: &Params| params["id"] != json!("0"));
        let keywords: Params = [("format".to_string(), json!("json"))].into_iter().collect();
        mapper
            .connect(RouteDefinition {
                name: "widgets_show".to_string(),
                path: "/widgets/{id}".to_string(),
                controller: "widgets",
                action: "show",
                methods: &[],
                condition: Some(&condition),
                keywords: &keywords,
            })
            .unwrap();

        let matched = mapper.route(&request(Method::GET, "/widgets/3")).unwrap();
        assert_eq!(matched.params["format"], json!("json"));
        assert!(mapper.route(&request(Method::GET, "/widgets/0")).is_none());
    }

    #[test]
    fn test_invalid_parameter_name_is_rejected() {
        let mut mapper = Mapper::new();
        let result = mapper.connect(RouteDefinition {
            name: "widgets_show".to_string(),
            path: "/widgets/{bad name}".to_string(),
            controller: "widgets",
            action: "show",
            methods: &[],
            condition: None,
            keywords: &Params::new(),
        });
        assert!(result.is_err());
        assert!(mapper.is_empty());
    }
}
