use actix_web::http::{Method, StatusCode};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One canned response of the test site. `{origin}` in the body is replaced
/// with the server's own origin, so sitemaps can carry absolute URLs.
#[derive(Clone)]
pub struct Route {
    status: u16,
    content_type: String,
    body: String,
    location: Option<String>,
    throttle_first: usize,
    forbid_head: bool,
    delay: Duration,
}

#[allow(dead_code)]
impl Route {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
            location: None,
            throttle_first: 0,
            forbid_head: false,
            delay: Duration::ZERO,
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::html("")
        }
    }

    pub fn redirect(to: &str) -> Self {
        Self {
            location: Some(to.to_string()),
            ..Self::with_status(301)
        }
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Answer the first `n` GETs with `429 Retry-After: 0`.
    pub fn throttled(mut self, n: usize) -> Self {
        self.throttle_first = n;
        self
    }

    /// Wait before answering GETs.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Answer HEAD with 403 regardless of the GET response.
    pub fn forbid_head(mut self) -> Self {
        self.forbid_head = true;
        self
    }
}

/// GET counts per path, shared with the running server.
#[derive(Clone, Default)]
pub struct Hits(Arc<Mutex<HashMap<String, usize>>>);

#[allow(dead_code)]
impl Hits {
    pub fn get(&self, path: &str) -> usize {
        self.0.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn record(&self, path: &str) -> usize {
        let mut hits = self.0.lock().unwrap();
        let count = hits.entry(path.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

#[derive(Clone)]
struct SiteState {
    routes: Arc<HashMap<String, Route>>,
    hits: Hits,
}

#[derive(Default)]
pub struct TestSite {
    routes: HashMap<String, Route>,
}

#[allow(dead_code)]
impl TestSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, route: Route) -> Self {
        self.routes.insert(path.to_string(), route);
        self
    }

    pub fn page(self, path: &str, html: impl Into<String>) -> Self {
        self.route(path, Route::html(html))
    }

    /// Starts the site on an ephemeral port and returns its base URL
    /// (without trailing slash) and the hit counter.
    pub async fn start(self) -> (String, Hits) {
        let state = SiteState {
            routes: Arc::new(self.routes),
            hits: Hits::default(),
        };
        let hits = state.hits.clone();

        let http_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .default_service(web::route().to(serve))
        })
        .workers(2)
        .bind(("127.0.0.1", 0))
        .expect("Failed to bind test server");

        let addr = http_server
            .addrs()
            .first()
            .cloned()
            .expect("No address bound");
        let url = format!("http://{}", addr);

        let app_server = http_server.run();
        tokio::spawn(async move {
            if let Err(e) = app_server.await {
                eprintln!("Test server error: {}", e);
            }
        });

        (url, hits)
    }
}

async fn serve(req: HttpRequest, state: web::Data<SiteState>) -> HttpResponse {
    let path = req.path().to_string();
    let Some(route) = state.routes.get(&path) else {
        return HttpResponse::NotFound()
            .content_type("text/html; charset=utf-8")
            .body("<html><head><title>Not found</title></head><body>Not found</body></html>");
    };

    if req.method() == Method::HEAD && route.forbid_head {
        return HttpResponse::Forbidden().finish();
    }

    if req.method() == Method::GET {
        let count = state.hits.record(&path);
        if count <= route.throttle_first {
            return HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", "0"))
                .finish();
        }
        if !route.delay.is_zero() {
            actix_web::rt::time::sleep(route.delay).await;
        }
    }

    let status = StatusCode::from_u16(route.status).expect("valid status");
    let mut response = HttpResponse::build(status);
    if let Some(location) = &route.location {
        response.insert_header(("Location", location.as_str()));
    }
    let info = req.connection_info().clone();
    let origin = format!("{}://{}", info.scheme(), info.host());
    response
        .content_type(route.content_type.as_str())
        .body(route.body.replace("{origin}", &origin))
}

/// A small but valid HTML page.
#[allow(dead_code)]
pub fn html_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
  <h1>{title}</h1>
  {body}
</body>
</html>"#
    )
}
