use thiserror::Error;

/// Errors raised anywhere in the application.
///
/// Library code returns `Result<T, AppError>`; with the `web` feature the
/// error also converts into an HTTP response so handlers can use `?`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("login required")]
    LoginRequired,

    #[error("file {0} not found")]
    FileNotFound(u64),

    #[error("not authorized to access file {0}")]
    Forbidden(u64),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("malformed upload: {0}")]
    Multipart(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataset encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("xlsx export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[cfg(feature = "web")]
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[cfg(feature = "web")]
    #[error("render error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[cfg(feature = "web")]
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(feature = "web")]
mod response {
    use super::AppError;
    use crate::flash::{self, Flash};
    use crate::paths;
    use axum::http::{StatusCode, header};
    use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};

    fn redirect_with_flash(to: &str, message: Flash) -> Response {
        let cookie = flash::cookie(&[message]);
        (
            AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
            Redirect::to(to),
        )
            .into_response()
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            match self {
                AppError::LoginRequired => {
                    redirect_with_flash(paths::LOGIN, Flash::danger("Login required."))
                }
                AppError::Forbidden(id) => {
                    log::warn!("rejected access to file {}", id);
                    redirect_with_flash(paths::FILES, Flash::danger("Not authorized."))
                }
                AppError::FileNotFound(id) => {
                    (StatusCode::NOT_FOUND, format!("File {} not found", id)).into_response()
                }
                other => {
                    log::error!("request failed: {}", other);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
                }
            }
        }
    }
}
