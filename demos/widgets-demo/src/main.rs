use manticore_web::prelude::*;
use manticore_web::response::is_truthy;
use manticore_web::RawResponse;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ==================== 数据模型 ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Widget {
    id: u64,
    name: String,
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewWidget {
    name: String,
    color: Option<String>,
}

struct WidgetStore {
    next_id: u64,
    widgets: Vec<Widget>,
}

static STORE: Lazy<RwLock<WidgetStore>> = Lazy::new(|| {
    RwLock::new(WidgetStore {
        next_id: 3,
        widgets: vec![
            Widget {
                id: 1,
                name: "sprocket".to_string(),
                color: Some("red".to_string()),
            },
            Widget {
                id: 2,
                name: "gear".to_string(),
                color: None,
            },
        ],
    })
});

fn widget_id(params: &Params) -> Option<u64> {
    params.get("id")?.as_str()?.parse().ok()
}

fn find_widget(id: u64) -> Option<Widget> {
    STORE.read().widgets.iter().find(|w| w.id == id).cloned()
}

// ==================== 控制器 ====================

/// 资源控制器：widgets
fn widgets_controller() -> ControllerType {
    ControllerType::builder("widgets")
        .serializer("json", SerializerTranslator::of::<JsonSerializer>())
        .deserializer("json", DeserializerTranslator::of::<JsonDeserializer>())
        .member(
            Member::action("index", "/widgets", |_, _| {
                Ok(serde_json::to_value(&STORE.read().widgets)?.into())
            })
            .methods(["GET"]),
        )
        .member(
            Member::action("show", "/widgets/{id}", |_, params| {
                let widget = widget_id(&params)
                    .and_then(find_widget)
                    .ok_or(HttpError::NotFound)?;
                Ok(serde_json::to_value(widget)?.into())
            })
            .methods(["GET"])
            .condition(|_, params| widget_id(params).is_some()),
        )
        .member(
            Member::action("create", "/widgets", |_, params| {
                let Some(body) = params.get("body") else {
                    return Ok(ResponseObject::new(json!({ "error": "request body is required" }))
                        .with_code(StatusCode::BAD_REQUEST)
                        .into());
                };
                let new: NewWidget = serde_json::from_value(body.clone())?;

                let widget = {
                    let mut store = STORE.write();
                    let widget = Widget {
                        id: store.next_id,
                        name: new.name,
                        color: new.color,
                    };
                    store.next_id += 1;
                    store.widgets.push(widget.clone());
                    widget
                };

                Ok(ResponseObject::new(serde_json::to_value(&widget)?)
                    .with_header("Location", format!("/widgets/{}", widget.id))
                    .into())
            })
            .methods(["POST"])
            .code(StatusCode::CREATED),
        )
        .member(
            Member::action("delete", "/widgets/{id}", |_, params| {
                let id = widget_id(&params).ok_or(HttpError::NotFound)?;
                let mut store = STORE.write();
                let before = store.widgets.len();
                store.widgets.retain(|w| w.id != id);
                if store.widgets.len() == before {
                    return Err(HttpError::NotFound.into());
                }
                Ok(Outcome::Empty)
            })
            .methods(["DELETE"])
            .code(StatusCode::NO_CONTENT),
        )
        .build()
}

/// 扩展控制器：记录修改操作
fn audit_controller() -> ControllerType {
    let audit = |action: &'static str| {
        Extension::simple(move |request, response, params| {
            tracing::info!(
                action = action,
                origin = %request.origin(),
                id = ?params.get("id"),
                status = response.code().as_u16(),
                "Widget modified"
            );
            response.set_header("X-Audited", action);
            Ok(Outcome::Empty)
        })
    };

    ControllerType::builder("audit")
        .member(Member::extension("create", audit("create")))
        .member(
            Member::extension("delete", audit("delete"))
                .signature(Signature::new(["request", "response", "id"])),
        )
        .build()
}

fn etag_for(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

fn not_modified(etag: &str) -> anyhow::Result<Outcome> {
    let mut response = RawResponse::new(Default::default());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    response.headers_mut().insert("etag", etag.parse()?);
    Ok(response.into())
}

/// 扩展控制器：条件 GET
fn etag_controller() -> ControllerType {
    ControllerType::builder("etag")
        .member(Member::extension(
            "show",
            Extension::around(
                |request, params| {
                    let current = widget_id(params)
                        .and_then(find_widget)
                        .map(serde_json::to_value)
                        .transpose()?;
                    match (current, request.header("if-none-match")) {
                        (Some(value), Some(tag)) if etag_for(&value) == tag => {
                            not_modified(&etag_for(&value))
                        }
                        _ => Ok(Outcome::Empty),
                    }
                },
                |_, response, _| {
                    if is_truthy(response.result()) {
                        let etag = etag_for(response.result());
                        response.set_header("ETag", etag);
                    }
                    Ok(Outcome::Empty)
                },
            ),
        ))
        .build()
}

manticore_web::inventory::submit! {
    ControllerRegistration { name: "widgets", factory: widgets_controller }
}

manticore_web::inventory::submit! {
    ControllerRegistration { name: "audit", factory: audit_controller }
}

manticore_web::inventory::submit! {
    ControllerRegistration { name: "etag", factory: etag_controller }
}

fn translator_registry() -> TranslatorRegistry {
    let mut registry = TranslatorRegistry::new();
    registry.register("json", ["application/json", "text/json"]);
    registry
}

#[tokio::main]
async fn main() -> ApplicationResult<()> {
    let config_file = if std::path::Path::new("demos/widgets-demo/application.toml").exists() {
        "demos/widgets-demo/application.toml"
    } else {
        "application.toml"
    };

    let env = Environment::new();
    env.add_property_source(Box::new(TomlPropertySource::from_file(config_file)?));
    env.add_property_source(Box::new(EnvironmentPropertySource::new("WIDGETS_")));

    LoggingConfig::from_environment(&env)?.init()?;

    let registry = translator_registry()
        .install()
        .map_err(|e| ApplicationError::Other(e.to_string()))?;

    let catalog = ControllerCatalog::discover();
    let application = Application::from_environment(&env, &catalog, registry)?;

    for route in application.mapper().routes() {
        tracing::info!(name = route.name(), path = route.template(), "Route available");
    }

    WebServer::new(Arc::new(application), ServerProperties::from_environment(&env))
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use manticore_web::Request;

    fn application() -> Application {
        let env = Environment::new();
        env.add_property_source(Box::new(
            TomlPropertySource::parse(include_str!("../application.toml"), "application.toml")
                .unwrap(),
        ));
        Application::from_environment(&env, &ControllerCatalog::discover(), Arc::new(translator_registry()))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request {
        Request::new(method.parse().unwrap(), uri.parse().unwrap())
            .with_header("accept".parse().unwrap(), "application/json".parse().unwrap())
    }

    #[test]
    fn test_registered_controllers_are_discovered() {
        let catalog = ControllerCatalog::discover();
        for name in ["widgets", "audit", "etag"] {
            assert!(catalog.contains(name), "{name} should be registered");
        }
    }

    #[test]
    fn test_create_and_delete_widget() {
        let application = application();

        let create = request("POST", "/widgets")
            .with_header("content-type".parse().unwrap(), "application/json".parse().unwrap())
            .with_body(r#"{"name":"flange","color":"blue"}"#);
        let response = application.handle(create);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-audited"], "create");

        let location = response.headers()["location"].to_str().unwrap().to_string();
        let created: Widget = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(location, format!("/widgets/{}", created.id));
        assert_eq!(created.name, "flange");

        let response = application.handle(request("DELETE", &location));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-audited"], "delete");

        let response = application.handle(request("GET", &location));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_create_without_body() {
        let response = application().handle(request("POST", "/widgets"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conditional_get() {
        let application = application();

        let response = application.handle(request("GET", "/widgets/1"));
        assert_eq!(response.status(), StatusCode::OK);
        let etag = response.headers()["etag"].clone();

        let conditional = request("GET", "/widgets/1").with_header("if-none-match".parse().unwrap(), etag.clone());
        let response = application.handle(conditional);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()["etag"], etag);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_non_numeric_id_does_not_match() {
        let response = application().handle(request("GET", "/widgets/abc"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
