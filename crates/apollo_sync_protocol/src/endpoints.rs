//! Request builders for the configuration service endpoints.
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /notifications/v2` | long-poll for namespace changes |
//! | `GET /configs/{appId}/{cluster}/{namespace}` | full release of a namespace |
//! | `GET /configfiles/{format}/{appId}/{cluster}/{namespace}` | cached namespace content |

use crate::envelope::HttpRequest;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{decode_notifications, encode_notifications, Notification};

/// Path of the long-poll endpoint.
pub const NOTIFICATIONS_PATH: &str = "/notifications/v2";

/// Builds a long-poll request listing every tracked namespace.
pub fn notifications(
    app_id: &str,
    cluster: &str,
    notifications: &[Notification],
) -> ProtocolResult<HttpRequest> {
    Ok(HttpRequest::new(NOTIFICATIONS_PATH)
        .with_query("appId", app_id)
        .with_query("cluster", cluster)
        .with_query("notifications", encode_notifications(notifications)?))
}

/// Builds a request for the full release of a namespace.
pub fn configs(app_id: &str, cluster: &str, namespace: &str, ip: &str) -> HttpRequest {
    HttpRequest::new(format!("/configs/{app_id}/{cluster}/{namespace}")).with_query("ip", ip)
}

/// Builds a request for the cached content of a namespace.
pub fn configfiles(
    format: &str,
    app_id: &str,
    cluster: &str,
    namespace: &str,
    ip: &str,
) -> HttpRequest {
    HttpRequest::new(format!(
        "/configfiles/{format}/{app_id}/{cluster}/{namespace}"
    ))
    .with_query("ip", ip)
}

/// A request recognised by the service side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Long-poll notification check.
    Notifications {
        /// Application id.
        app_id: String,
        /// Cluster name.
        cluster: String,
        /// Client's view of each namespace.
        notifications: Vec<Notification>,
    },
    /// Full release fetch.
    Configs {
        /// Application id.
        app_id: String,
        /// Cluster name.
        cluster: String,
        /// Namespace name.
        namespace: String,
        /// Client IP, if sent.
        ip: Option<String>,
    },
    /// Cached content fetch.
    ConfigFiles {
        /// Content format (`json`).
        format: String,
        /// Application id.
        app_id: String,
        /// Cluster name.
        cluster: String,
        /// Namespace name.
        namespace: String,
        /// Client IP, if sent.
        ip: Option<String>,
    },
}

impl Route {
    /// Parses a request into a route.
    pub fn parse(request: &HttpRequest) -> ProtocolResult<Self> {
        let ip = request.query_param("ip").map(str::to_string);
        match request.segments().as_slice() {
            ["notifications", "v2"] => {
                let app_id = request
                    .query_param("appId")
                    .ok_or(ProtocolError::MissingParameter("appId"))?;
                let cluster = request
                    .query_param("cluster")
                    .ok_or(ProtocolError::MissingParameter("cluster"))?;
                let raw = request
                    .query_param("notifications")
                    .ok_or(ProtocolError::MissingParameter("notifications"))?;
                Ok(Route::Notifications {
                    app_id: app_id.to_string(),
                    cluster: cluster.to_string(),
                    notifications: decode_notifications(raw.as_bytes())?,
                })
            }
            ["configs", app_id, cluster, namespace] => Ok(Route::Configs {
                app_id: app_id.to_string(),
                cluster: cluster.to_string(),
                namespace: namespace.to_string(),
                ip,
            }),
            ["configfiles", format, app_id, cluster, namespace] => Ok(Route::ConfigFiles {
                format: format.to_string(),
                app_id: app_id.to_string(),
                cluster: cluster.to_string(),
                namespace: namespace.to_string(),
                ip,
            }),
            _ => Err(ProtocolError::UnknownRoute(request.path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_request_shape() {
        let request = notifications(
            "demo",
            "default",
            &[
                Notification::new("application", -1),
                Notification::new("db", 7),
            ],
        )
        .unwrap();

        assert_eq!(request.path, "/notifications/v2");
        assert_eq!(request.query_param("appId"), Some("demo"));
        assert_eq!(request.query_param("cluster"), Some("default"));
        assert_eq!(
            request.query_param("notifications"),
            Some(
                r#"[{"namespaceName":"application","notificationId":-1},{"namespaceName":"db","notificationId":7}]"#
            )
        );
    }

    #[test]
    fn configs_paths() {
        let request = configs("demo", "default", "application", "10.0.0.8");
        assert_eq!(request.path, "/configs/demo/default/application");
        assert_eq!(request.query_param("ip"), Some("10.0.0.8"));

        let request = configfiles("json", "demo", "default", "application", "10.0.0.8");
        assert_eq!(request.path, "/configfiles/json/demo/default/application");
    }

    #[test]
    fn parse_known_routes() {
        let request =
            notifications("demo", "gray", &[Notification::new("application", 3)]).unwrap();
        assert_eq!(
            Route::parse(&request).unwrap(),
            Route::Notifications {
                app_id: "demo".into(),
                cluster: "gray".into(),
                notifications: vec![Notification::new("application", 3)],
            }
        );

        let request = configs("demo", "default", "db", "1.2.3.4");
        assert_eq!(
            Route::parse(&request).unwrap(),
            Route::Configs {
                app_id: "demo".into(),
                cluster: "default".into(),
                namespace: "db".into(),
                ip: Some("1.2.3.4".into()),
            }
        );
    }

    #[test]
    fn parse_rejects_unknown_and_incomplete() {
        let err = Route::parse(&HttpRequest::new("/health")).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownRoute(_)));

        let request = HttpRequest::new(NOTIFICATIONS_PATH).with_query("appId", "demo");
        let err = Route::parse(&request).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingParameter("cluster")));
    }
}
