use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::analysis::{self, ReportSummary};
use crate::config::Config;
use crate::downloader::ReportFormat;
use crate::error::{AppError, Result};
use crate::flash::{self, Flash};
use crate::graph;
use crate::login;
use crate::model::{FileDataset, UploadedFile, User, is_excel_filename};
use crate::optimizer::{Geoapify, refresh_routes};
use crate::parser;
use crate::paths;
use crate::store::Store;
use crate::templates;
use crate::views::{self, FilesView, Page, Shell};

/// Multipart framing on top of the file itself
const BODY_OVERHEAD: usize = 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub templates: Handlebars<'static>,
    pub optimizer: Geoapify,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.data_dir)?;
        let optimizer = Geoapify::new(
            config.geoapify_url.clone(),
            config.geoapify_api_key.clone(),
            Duration::from_secs(config.geoapify_timeout_secs),
        )?;
        if !optimizer.is_enabled() {
            log::info!("no Geoapify API key configured, route optimisation disabled");
        }
        Ok(AppState {
            store,
            templates: templates::registry()?,
            optimizer,
            config,
        })
    }

    /// Render `template` inside the page shell, consuming pending flash
    /// messages.
    pub fn render_page<T: Serialize>(
        &self,
        jar: CookieJar,
        template: &str,
        title: &str,
        page: &T,
    ) -> Result<Response> {
        let user = login::session_user(&self.store, &jar)?;
        let files = match &user {
            Some(user) => self.store.files_for_user(user.id)?,
            None => Vec::new(),
        };
        let (jar, messages) = flash::take(jar);
        let shell = Shell::new(title, user.as_ref(), &files, messages);
        let html = self.templates.render(template, &Page { shell, page })?;
        Ok((jar, Html(html)).into_response())
    }

    /// The file `file_id`, provided `user` owns it.
    fn owned_file(&self, user: &User, file_id: u64) -> Result<UploadedFile> {
        let file = self
            .store
            .file(file_id)?
            .ok_or(AppError::FileNotFound(file_id))?;
        if file.user_id != user.id {
            return Err(AppError::Forbidden(file_id));
        }
        Ok(file)
    }

    /// Load a file's dataset, filling in any missing route optimisations.
    async fn dataset_with_routes(&self, file_id: u64) -> Result<FileDataset> {
        let mut dataset = self.store.load_dataset(file_id)?;
        if self.optimizer.is_enabled() && refresh_routes(&mut dataset.routes, &self.optimizer).await {
            self.store.save_dataset(file_id, &dataset)?;
        }
        Ok(dataset)
    }

    /// Every file of `user` with the number of routes stored for it.
    fn files_with_route_counts(&self, user: &User) -> Result<Vec<(UploadedFile, usize)>> {
        self.store
            .files_for_user(user.id)?
            .into_iter()
            .map(|file| -> Result<(UploadedFile, usize)> {
                let count = self.store.load_dataset(file.id)?.routes.len();
                Ok((file, count))
            })
            .collect()
    }

    async fn report_summary(&self, user: &User, file_id: u64) -> Result<ReportSummary> {
        let file = self.owned_file(user, file_id)?;
        let dataset = self.dataset_with_routes(file_id).await?;
        Ok(analysis::summarize(&file, user, &dataset.routes))
    }
}

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes + BODY_OVERHEAD;
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route(paths::HOME, get(home))
        .route(paths::REGISTER, get(login::register_page).post(login::handle_register))
        .route(paths::LOGIN, get(login::login_page).post(login::handle_login))
        .route(paths::LOGOUT, get(login::handle_logout))
        .route(paths::PROFILE, get(login::profile_page))
        .route(
            paths::EDIT_PROFILE,
            get(login::edit_profile_page).post(login::handle_edit_profile),
        )
        .route(paths::UPLOAD, get(upload_page).post(handle_upload))
        .route(paths::FILES, get(files))
        .route("/delete-file/:file_id", post(delete_file))
        .route("/view-summary/:file_id", get(view_summary))
        .route("/view-details/:file_id", get(view_details))
        .route("/analyze_route/:file_id", get(analyze_route))
        .route("/analyze_cost/:file_id", get(analyze_cost))
        .route("/view-all-excel-data/:file_id", get(view_all_excel_data))
        .route(paths::INEFFICIENT, get(inefficient_index).post(rescan_routes))
        .route("/inefficient/:file_id", get(inefficient_file).post(rescan_routes))
        .route(paths::COST_ANALYSIS, get(cost_index))
        .route("/cost-analysis/:file_id", get(cost_file))
        .route("/report/:file_id", get(report_preview))
        .route("/report/:file_id/chart.png", get(report_chart))
        .route("/download_report_pdf/:file_id", get(download_pdf))
        .route("/download_report_word/:file_id", get(download_word))
        .route("/download_report_excel/:file_id", get(download_excel))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind;
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(bind).await?;
    log::info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn home(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    state.render_page(jar, "home", "Home", &())
}

async fn not_found(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    #[derive(Serialize)]
    struct NotFound {
        message: &'static str,
    }
    let page = state.render_page(jar, "not_found", "Not Found", &NotFound {
        message: "The page you asked for does not exist.",
    })?;
    Ok((StatusCode::NOT_FOUND, page).into_response())
}

async fn upload_page(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    if login::session_user(&state.store, &jar)?.is_none() {
        return Ok(flash::redirect(jar, paths::LOGIN, Flash::danger("Login required to upload files.")));
    }
    state.render_page(jar, "upload", "Upload", &())
}

/// A body cut off by the size limit reads as an oversized file.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::InvalidUpload(parser::FILE_TOO_LARGE.into())
    } else {
        AppError::Multipart(e.body_text())
    }
}

/// Filename and contents of the `file` field, if one was sent.
async fn read_upload(mut multipart: Multipart) -> Result<Option<(String, Bytes)>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some((filename, data)));
    }
    Ok(None)
}

async fn handle_upload(
    State(state): State<SharedState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response> {
    let Some(user) = login::session_user(&state.store, &jar)? else {
        return Ok(flash::redirect(jar, paths::LOGIN, Flash::danger("Login required to upload files.")));
    };

    let (filename, data) = match read_upload(multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => (String::new(), Bytes::new()),
        Err(AppError::InvalidUpload(reason)) => {
            log::info!("rejected upload from user {}: {}", user.id, reason);
            return Ok(flash::redirect(jar, paths::UPLOAD, Flash::danger(reason)));
        }
        Err(e) => {
            log::warn!("unreadable upload from user {}: {}", user.id, e);
            return Ok(flash::redirect(jar, paths::UPLOAD, Flash::danger("Error processing the file.")));
        }
    };

    let safe_name = match parser::validate_upload(&filename, data.len(), state.config.max_upload_bytes) {
        Ok(name) => name,
        Err(AppError::InvalidUpload(reason)) => {
            log::info!("rejected upload {:?} ({} bytes): {}", filename, data.len(), reason);
            return Ok(flash::redirect(jar, paths::UPLOAD, Flash::danger(reason)));
        }
        Err(e) => return Err(e),
    };

    let size_kb = data.len() as f64 / 1024.0;
    let uploaded_at = Utc::now().naive_utc();

    if !is_excel_filename(&safe_name) {
        let record = state.store.add_file(user.id, &safe_name, size_kb, uploaded_at)?;
        log::info!("user {} uploaded {} ({:.2} KB) as file {}", user.id, safe_name, size_kb, record.id);
        return Ok(flash::redirect(
            jar,
            paths::UPLOAD,
            Flash::danger("Only Excel files are supported for parsing inefficient routes."),
        ));
    }

    // Nothing is recorded for a workbook that fails to parse
    let parsed = match parser::parse_workbook(&data) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("could not parse upload {} from user {}: {}", safe_name, user.id, e);
            return Ok(flash::redirect(jar, paths::UPLOAD, Flash::danger("Error processing the file.")));
        }
    };

    let record = state.store.add_file(user.id, &safe_name, size_kb, uploaded_at)?;
    log::info!("user {} uploaded {} ({:.2} KB) as file {}", user.id, safe_name, size_kb, record.id);

    let mut dataset = FileDataset {
        summary_rows: parsed.summary_rows,
        detail_rows: parsed.detail_rows,
        routes: parsed.routes,
        raw_rows: parsed.raw_rows,
        raw_sheets: parsed.raw_sheets,
    };
    if state.optimizer.is_enabled() {
        refresh_routes(&mut dataset.routes, &state.optimizer).await;
    }
    state.store.save_dataset(record.id, &dataset)?;
    log::info!(
        "file {}: {} summary rows, {} detail rows, {} inefficient routes",
        record.id,
        dataset.summary_rows.len(),
        dataset.detail_rows.len(),
        dataset.routes.len()
    );

    Ok(flash::redirect(jar, paths::FILES, Flash::success("File uploaded and processed successfully!")))
}

async fn files(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let files = state.store.files_for_user(user.id)?;
    state.render_page(jar, "files", "Files", &FilesView {
        files: views::file_rows(&files),
    })
}

async fn delete_file(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    state.owned_file(&user, file_id)?;
    state.store.remove_file(file_id)?;
    log::info!("user {} deleted file {}", user.id, file_id);
    Ok(flash::redirect(jar, paths::FILES, Flash::success("File and data deleted.")))
}

async fn view_summary(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.store.load_dataset(file_id)?;
    state.render_page(jar, "summary", "Summary", &views::summary_view(&file, &dataset.summary_rows))
}

async fn view_details(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.store.load_dataset(file_id)?;
    state.render_page(jar, "details", "Details", &views::details_view(&file, &dataset.detail_rows))
}

async fn analyze_route(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.dataset_with_routes(file_id).await?;
    let view = views::route_analysis_view(&file, &dataset, state.optimizer.is_enabled());
    state.render_page(jar, "route_analysis", "Route Analysis", &view)
}

async fn analyze_cost(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.store.load_dataset(file_id)?;
    let view = views::cost_analysis_view(&file, &dataset.summary_rows);
    state.render_page(jar, "cost_analysis", "Cost Analysis", &view)
}

async fn view_all_excel_data(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.store.load_dataset(file_id)?;
    let view = views::raw_data_view(&file, &dataset.raw_sheets, &dataset.raw_rows);
    state.render_page(jar, "raw_data", "All Data", &view)
}

async fn inefficient_index(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let files = state.files_with_route_counts(&user)?;
    state.render_page(jar, "route_files", "Inefficient Routes", &views::inefficient_files_view(&files))
}

/// Look for routes in every stored workbook of the user that are not saved
/// yet. Answers both `/inefficient` and `/inefficient/:file_id`.
async fn rescan_routes(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let mut added = 0;
    for file in state.store.files_for_user(user.id)? {
        let mut dataset = state.store.load_dataset(file.id)?;
        let found = parser::rescan_routes(&mut dataset);
        if found > 0 {
            state.store.save_dataset(file.id, &dataset)?;
            log::info!("file {}: {} inefficient routes recovered", file.id, found);
            added += found;
        }
    }

    let message = if added > 0 {
        Flash::success(format!(
            "{} inefficient route(s) identified and saved into the database.",
            added
        ))
    } else {
        Flash::info("No new inefficient routes found.")
    };
    Ok(flash::redirect(jar, paths::INEFFICIENT, message))
}

async fn inefficient_file(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.dataset_with_routes(file_id).await?;
    let view = views::route_analysis_view(&file, &dataset, state.optimizer.is_enabled());
    state.render_page(jar, "route_analysis", "Inefficient Routes", &view)
}

async fn cost_index(State(state): State<SharedState>, jar: CookieJar) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let files = state.files_with_route_counts(&user)?;
    state.render_page(jar, "route_files", "Cost Analysis", &views::cost_files_view(&files))
}

async fn cost_file(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let file = state.owned_file(&user, file_id)?;
    let dataset = state.dataset_with_routes(file_id).await?;
    state.render_page(jar, "route_costs", "Cost Analysis", &views::route_cost_view(&file, &dataset))
}

async fn report_preview(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let summary = state.report_summary(&user, file_id).await?;
    state.render_page(jar, "report", "Report", &views::report_view(&summary))
}

async fn report_chart(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    let user = login::current_user(&state.store, &jar)?;
    let summary = state.report_summary(&user, file_id).await?;
    match graph::cost_saved_chart(&summary.cost_table)? {
        Some(png) => Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response()),
        None => Err(AppError::FileNotFound(file_id)),
    }
}

async fn download(state: &AppState, jar: &CookieJar, file_id: u64, format: ReportFormat) -> Result<Response> {
    let user = login::current_user(&state.store, jar)?;
    let summary = state.report_summary(&user, file_id).await?;
    let chart = graph::cost_saved_chart(&summary.cost_table)?;
    let body = format.render(&summary, chart.as_deref())?;

    let disposition = format!("attachment; filename=\"{}\"", format.file_name(file_id));
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn download_pdf(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    download(&state, &jar, file_id, ReportFormat::Pdf).await
}

async fn download_word(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    download(&state, &jar, file_id, ReportFormat::Docx).await
}

async fn download_excel(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(file_id): Path<u64>,
) -> Result<Response> {
    download(&state, &jar, file_id, ReportFormat::Xlsx).await
}
