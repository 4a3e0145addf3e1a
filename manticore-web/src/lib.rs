//! # Manticore Web
//!
//! 资源控制器风格的请求分发框架，基于 Axum 提供传输层
//!
//! ## 核心特性
//!
//! - **声明式控制器** - action 和扩展方法以成员声明，控制器类型可继承
//! - **扩展协议** - 扩展控制器按顺序参与前处理和后处理，两阶段扩展可以短路 action
//! - **内容协商** - 按 `Content-Type` 选择反序列化器，按 `Accept` 选择序列化器
//! - **配置装配** - 通过 `resource.*` / `extend.*` 配置组合资源
//! - **控制器发现** - 使用 `inventory` 在编译期注册控制器类型

pub mod action;
pub mod application;
pub mod constants;
pub mod controller;
pub mod member;
pub mod middleware;
pub mod request;
pub mod response;
pub mod routing;
pub mod server;

pub use action::{ActionDescriptor, ActionMethod, DispatchResult, Halt, PostStep};
pub use application::Application;
pub use controller::{
    Controller, ControllerCatalog, ControllerRegistration, ControllerType, ControllerTypeBuilder,
};
pub use member::{
    Condition, Extension, Member, MemberKind, Outcome, Params, Phase, Resume, Signature,
};
pub use request::{RemoteUser, Request};
pub use response::{RawResponse, ResponseObject};
pub use routing::{Mapper, RouteMatch};
pub use server::{ServerProperties, WebServer};

// 控制器注册使用
pub use manticore_core::inventory;

pub mod prelude {
    //! 预导入模块

    pub use crate::action::{ActionDescriptor, ActionMethod, Halt};
    pub use crate::application::Application;
    pub use crate::controller::{ControllerCatalog, ControllerRegistration, ControllerType};
    pub use crate::member::{Extension, Member, Outcome, Params, Phase, Signature};
    pub use crate::request::Request;
    pub use crate::response::{RawResponse, ResponseObject};
    pub use crate::server::{ServerProperties, WebServer};

    pub use http::StatusCode;
    pub use manticore_core::prelude::*;
    pub use serde_json::{json, Value};
}
