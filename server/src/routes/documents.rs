//! Document endpoint routes.
//!
//! Paths mirror the remote layout `users/{userId}/{collection}/{docId}`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use farmasync_engine::{Document, DocumentPath};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_delete, handle_get, handle_list, handle_merge, handle_set, parse_collection,
};
use crate::AppState;

type JsonBody = std::result::Result<Json<serde_json::Value>, JsonRejection>;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/{collection}", get(list_handler))
        .route(
            "/users/{user_id}/{collection}/{doc_id}",
            get(get_handler)
                .put(set_handler)
                .patch(merge_handler)
                .delete(delete_handler),
        )
}

/// Authorize the caller and resolve the document path.
fn document_path(
    auth: &AuthUser,
    (user_id, collection, doc_id): (String, String, String),
) -> Result<DocumentPath> {
    auth.authorize(&user_id)?;
    let entity_type = parse_collection(&collection)?;
    Ok(DocumentPath::new(user_id, entity_type, doc_id))
}

/// GET /users/{userId}/{collection} - List a collection.
async fn list_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, collection)): Path<(String, String)>,
) -> Result<Json<Vec<Document>>> {
    auth.authorize(&user_id)?;
    let collection = parse_collection(&collection)?;
    let documents = handle_list(&state.pool, &user_id, collection).await?;
    Ok(Json(documents))
}

/// GET /users/{userId}/{collection}/{docId} - Fetch a document.
async fn get_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(params): Path<(String, String, String)>,
) -> Result<Json<Document>> {
    let path = document_path(&auth, params)?;
    let document = handle_get(&state.pool, &path).await?;
    Ok(Json(document))
}

/// PUT /users/{userId}/{collection}/{docId} - Create or replace a document.
async fn set_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(params): Path<(String, String, String)>,
    body: JsonBody,
) -> Result<StatusCode> {
    let path = document_path(&auth, params)?;
    let Json(data) = body?;
    handle_set(&state.pool, &path, &data).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /users/{userId}/{collection}/{docId} - Merge fields into a document.
async fn merge_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(params): Path<(String, String, String)>,
    body: JsonBody,
) -> Result<StatusCode> {
    let path = document_path(&auth, params)?;
    let Json(fields) = body?;
    handle_merge(&state.pool, &path, &fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /users/{userId}/{collection}/{docId} - Delete a document.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(params): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let path = document_path(&auth, params)?;
    handle_delete(&state.pool, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}
