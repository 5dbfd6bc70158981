use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc as StdArc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::attachments::AttachmentStore;
use crate::config::ServeConfig;
use crate::constants::UPLOAD_ROOT;
use crate::error::{ResourceError, ResourceResult};
use crate::record::{Fields, Record};
use crate::repository::{Page, Repository};
use crate::resource::ResourceSchema;
use crate::store::{DocumentStore, SqliteStore};

/// Transport limits applied to every route
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_page_limit: u64,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &ServeConfig) -> Self {
        Self {
            max_page_limit: config.max_page_limit,
            max_upload_bytes: config.max_upload_bytes,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Run the API server until Ctrl-C (for serve command)
pub fn serve(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let schemas = config.resource_schemas();
    let options = ServerOptions::from_config(&config);
    let db_path = config.database_path();

    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data directory '{}': {}",
            config.data_dir.display(),
            e
        )
    })?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let attachments = StdArc::new(AttachmentStore::new(&config.data_dir));
    std::fs::create_dir_all(attachments.upload_dir())?;

    info!("Data directory: {}", config.data_dir.display());
    info!("SQLite database: {}", db_path.display());
    info!("Listening on: http://[::]:{} (IPv4 + IPv6)", config.port);
    info!("Endpoints:");
    info!("  GET /health  - Health check");
    info!("  GET /api/resources  - Configured resource kinds");
    for schema in &schemas {
        info!(
            "  GET|POST|DELETE /api/{kind}  and  GET|PUT|PATCH|DELETE /api/{kind}/:id",
            kind = schema.kind
        );
        if let Some(field) = schema.attachment_field() {
            info!("  POST /api/{}/upload  - multipart '{}' upload", schema.kind, field);
        }
    }
    info!("  GET /{}/*  - Uploaded files", UPLOAD_ROOT);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = crate::db::open_database(&db_path)
            .await
            .map_err(|e| format!("Failed to open database '{}': {}", db_path.display(), e))?;
        crate::db::init_database_schema(&pool)
            .await
            .map_err(|e| format!("Failed to initialize schema: {}", e))?;
        let unique_id = crate::db::ensure_database_version(&pool)
            .await
            .map_err(|e| e.to_string())?;
        info!("Database unique_id: {}", unique_id);

        let store: StdArc<dyn DocumentStore> = StdArc::new(SqliteStore::new(pool));
        let app = create_router(store, attachments, &schemas, &options);

        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", config.port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", config.port, e))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        info!("Server stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build the full application router: one route set per resource, the
/// uploads file server, and the shared transport layers.
pub fn create_router(
    store: StdArc<dyn DocumentStore>,
    attachments: StdArc<AttachmentStore>,
    schemas: &[ResourceSchema],
    options: &ServerOptions,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/resources",
            get(resources_handler).with_state(StdArc::new(schemas.to_vec())),
        );

    for schema in schemas {
        let repository = StdArc::new(Repository::new(
            schema.clone(),
            store.clone(),
            attachments.clone(),
            options.max_page_limit,
        ));
        app = app.merge(resource_routes(repository));
    }

    app.nest_service(
        &format!("/{}", UPLOAD_ROOT),
        ServeDir::new(attachments.upload_dir()),
    )
    .layer(DefaultBodyLimit::max(options.max_upload_bytes))
    .layer(TimeoutLayer::new(options.request_timeout))
    .layer(cors)
}

// Route set for one resource kind; state is that kind's repository
fn resource_routes(repository: StdArc<Repository>) -> Router {
    let base = format!("/api/{}", repository.schema().kind);

    let mut routes = Router::new()
        .route(
            &base,
            get(list_handler)
                .post(create_handler)
                .delete(delete_all_handler),
        )
        .route(
            &format!("{}/{{id}}", base),
            get(get_handler)
                .put(update_handler)
                .patch(update_handler)
                .delete(delete_handler),
        );

    if repository.schema().attachment.is_some() {
        routes = routes.route(&format!("{}/upload", base), post(upload_handler));
    }

    routes.with_state(repository)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Serialize)]
struct ResourcesResponse<'a> {
    success: bool,
    data: &'a [ResourceSchema],
}

async fn resources_handler(State(schemas): State<StdArc<Vec<ResourceSchema>>>) -> impl IntoResponse {
    Json(ResourcesResponse {
        success: true,
        data: &schemas,
    })
    .into_response()
}

// Query parameters for listing; unparsable values fall back to defaults
#[derive(Deserialize)]
struct ListQuery {
    page: Option<String>,
    limit: Option<String>,
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    #[serde(flatten)]
    page: Page,
}

#[derive(Serialize)]
struct RecordResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Record>,
}

#[derive(Serialize)]
struct DeleteAllResponse {
    success: bool,
    message: String,
    deleted: u64,
}

fn json_body(body: Result<Json<Fields>, JsonRejection>) -> ResourceResult<Fields> {
    body.map(|Json(fields)| fields)
        .map_err(|rejection| ResourceError::Validation(rejection.body_text()))
}

async fn list_handler(
    State(repo): State<StdArc<Repository>>,
    Query(query): Query<ListQuery>,
) -> ResourceResult<Json<ListResponse>> {
    let page = repo
        .list(
            parse_positive(query.page.as_deref()),
            parse_positive(query.limit.as_deref()),
        )
        .await?;
    Ok(Json(ListResponse {
        success: true,
        page,
    }))
}

async fn create_handler(
    State(repo): State<StdArc<Repository>>,
    body: Result<Json<Fields>, JsonRejection>,
) -> ResourceResult<(StatusCode, Json<RecordResponse>)> {
    let record = repo.create(json_body(body)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            success: true,
            message: Some(format!("{} record created", repo.schema().kind)),
            data: Some(record),
        }),
    ))
}

async fn get_handler(
    State(repo): State<StdArc<Repository>>,
    Path(id): Path<String>,
) -> ResourceResult<Json<RecordResponse>> {
    let record = repo.get(&id).await?;
    Ok(Json(RecordResponse {
        success: true,
        message: None,
        data: Some(record),
    }))
}

async fn update_handler(
    State(repo): State<StdArc<Repository>>,
    Path(id): Path<String>,
    body: Result<Json<Fields>, JsonRejection>,
) -> ResourceResult<Json<RecordResponse>> {
    let record = repo.update(&id, json_body(body)?).await?;
    Ok(Json(RecordResponse {
        success: true,
        message: Some(format!("{} record updated", repo.schema().kind)),
        data: Some(record),
    }))
}

async fn delete_handler(
    State(repo): State<StdArc<Repository>>,
    Path(id): Path<String>,
) -> ResourceResult<Json<RecordResponse>> {
    repo.delete(&id).await?;
    Ok(Json(RecordResponse {
        success: true,
        message: Some(format!("{} record deleted", repo.schema().kind)),
        data: None,
    }))
}

async fn delete_all_handler(
    State(repo): State<StdArc<Repository>>,
) -> ResourceResult<Json<DeleteAllResponse>> {
    let deleted = repo.delete_all().await?;
    Ok(Json(DeleteAllResponse {
        success: true,
        message: format!(
            "Deleted {} {} record(s)",
            deleted,
            repo.schema().kind
        ),
        deleted,
    }))
}

/// Accepts the first file part named after the attachment field (or `file`).
async fn upload_handler(
    State(repo): State<StdArc<Repository>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ResourceResult<Json<serde_json::Value>> {
    let schema = repo.schema();
    let Some(field_name) = schema.attachment_field() else {
        return Err(ResourceError::Validation(format!(
            "{} does not accept uploads",
            schema.kind
        )));
    };
    let mut multipart =
        multipart.map_err(|rejection| ResourceError::Validation(rejection.body_text()))?;

    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| ResourceError::Validation(format!("Malformed upload: {}", e.body_text())))?
    {
        let Some(original_name) = part.file_name().map(str::to_string) else {
            continue;
        };
        if part.name() != Some(field_name) && part.name() != Some("file") {
            continue;
        }
        let mime_type = part
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = part
            .bytes()
            .await
            .map_err(|e| ResourceError::Validation(format!("Malformed upload: {}", e.body_text())))?;

        let relative = repo
            .attachments()
            .store(schema, &bytes, &original_name, &mime_type)
            .await?;

        let mut body = serde_json::Map::new();
        body.insert("success".to_string(), serde_json::Value::Bool(true));
        body.insert(field_name.to_string(), serde_json::Value::String(relative));
        return Ok(Json(serde_json::Value::Object(body)));
    }

    Err(ResourceError::Validation(format!(
        "No file uploaded in field '{}'",
        field_name
    )))
}
