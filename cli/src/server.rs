//! HTTP surface: `POST /execute` and `GET /health`.

use {
    crate::runner::Runner,
    chrono::{SecondsFormat, Utc},
    hyper::{
        header::{HeaderValue, CONTENT_TYPE},
        service::{make_service_fn, service_fn},
        Body, Method, Request, Response, Server, StatusCode,
    },
    playground_runner::{request::ExecutionRequest, Execute, RunnerError},
    serde::Serialize,
    serde_json::json,
    std::{convert::Infallible, future::Future, net::SocketAddr},
};

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(body) {
        Ok(body) => (status, body),
        Err(err) => {
            log::error!("Failed to serialize response: {err}");
            let body = json!({ "success": false, "error": "Internal server error" });
            (StatusCode::INTERNAL_SERVER_ERROR, body.to_string().into_bytes())
        }
    };
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, error: &str) -> Response<Body> {
    json_response(status, &json!({ "success": false, "error": error }))
}

async fn execute<E: Execute + 'static>(runner: &Runner<E>, body: Body) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let request: ExecutionRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("Rejected request body: {err}");
            let err = RunnerError::InvalidRequest(err.to_string());
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };

    log::info!(
        "Executing {} of {}",
        request.scenario_label(),
        request.template_id()
    );
    match runner.execute(request).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(err) => {
            log::error!("Execution task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Route one HTTP request.
pub async fn handle<E: Execute + 'static>(
    runner: Runner<E>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::POST, "/execute") => execute(&runner, request.into_body()).await,
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &json!({
                "status": "ok",
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        ),
        (method, path) => error_response(
            StatusCode::NOT_FOUND,
            &format!("No route for {method} {path}"),
        ),
    };
    Ok(response)
}

/// Serve until `shutdown` resolves.
pub async fn serve<E, F>(addr: SocketAddr, runner: Runner<E>, shutdown: F) -> hyper::Result<()>
where
    E: Execute + 'static,
    F: Future<Output = ()>,
{
    let make_service = make_service_fn(move |_| {
        let runner = runner.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| handle(runner.clone(), request)))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_service);
    log::info!("Listening on http://{}", server.local_addr());
    server.with_graceful_shutdown(shutdown).await
}
