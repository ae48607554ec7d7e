use axum::response::IntoResponse;

// Undocumented landing route; the interesting surface lives under /v1.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
