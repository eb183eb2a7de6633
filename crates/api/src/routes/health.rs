use axum::response::Json as ResponseJson;
use serde::Serialize;

/// Liveness response (spec.md §6: `GET /health` -> `{status:"healthy"}`).
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /health`. Always 200 once the process is up -- this endpoint
/// requires no authentication and is meant for load balancer liveness
/// probes, not readiness.
pub async fn health_check() -> ResponseJson<HealthResponse> {
    ResponseJson(HealthResponse { status: "healthy" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let ResponseJson(response) = health_check().await;
        assert_eq!(response.status, "healthy");
    }
}
