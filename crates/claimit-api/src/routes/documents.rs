//! Document routes
//!
//! Every handler authenticates the caller, checks the access rules against
//! the stored document, then forwards to the configured store.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::rules;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use claimit_core::store::{CollectionPath, DocPath, Document, FieldUpdate, Query, WriteBatch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize)]
pub struct CreatedResponse {
    pub path: DocPath,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub updates: Vec<FieldUpdate>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub committed: usize,
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<Json<Document>> {
    let path = DocPath::parse(&raw)?;
    let doc = state.store.get(&path).await?;
    rules::check_get(&caller, &path, doc.as_ref())?;

    doc.map(Json).ok_or(ApiError::NotFound(raw))
}

pub async fn add_document(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(raw): Path<String>,
    Json(data): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let collection = CollectionPath::parse(&raw)?;
    rules::check_add(&caller, &collection, &data)?;

    let path = state.store.add(&collection, data).await?;
    info!(user = caller.uid(), "Added {}", path);
    Ok((StatusCode::CREATED, Json(CreatedResponse { path })))
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(raw): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<StatusCode> {
    let path = DocPath::parse(&raw)?;
    let batch = WriteBatch::new().update(path, request.updates);
    let batch = authorize_batch(&state, &caller, batch).await?;

    state.store.commit(batch).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<StatusCode> {
    let path = DocPath::parse(&raw)?;
    let batch = authorize_batch(&state, &caller, WriteBatch::new().delete(path.clone())).await?;

    state.store.commit(batch).await?;
    info!(user = caller.uid(), "Deleted {}", path);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Json(query): Json<Query>,
) -> ApiResult<Json<Vec<Document>>> {
    rules::check_query(&caller, &query)?;
    let docs = state.store.list(&query).await?;
    debug!(count = docs.len(), "Query answered");
    Ok(Json(docs))
}

pub async fn commit_batch(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Json(batch): Json<WriteBatch>,
) -> ApiResult<Json<BatchResponse>> {
    if batch.is_empty() {
        return Err(ApiError::BadRequest("empty batch".into()));
    }
    let batch = authorize_batch(&state, &caller, batch).await?;

    let committed = batch.len();
    state.store.commit(batch).await?;
    info!(user = caller.uid(), ops = committed, "Committed batch");
    Ok(Json(BatchResponse { committed }))
}

/// Checks every write against the document it targets; one refusal rejects
/// the batch. The returned batch carries preconditions on what was checked,
/// so a document changed in the meantime fails the commit with a conflict.
async fn authorize_batch(
    state: &AppState,
    caller: &CurrentUser,
    batch: WriteBatch,
) -> ApiResult<WriteBatch> {
    let mut existing = Vec::with_capacity(batch.len());
    for op in &batch.ops {
        existing.push(state.store.get(op.path()).await?);
    }
    rules::check_batch(caller, &batch, &existing)?;
    Ok(rules::pin(batch, &existing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppConfig;
    use claimit_core::model::{claim_path, claims_of, found_items, item_path};
    use claimit_core::store::{Condition, DocumentStore, MemoryStore};
    use claimit_core::User;
    use serde_json::json;

    fn state_with(store: Arc<MemoryStore>) -> Arc<AppState> {
        Arc::new(AppState {
            store,
            config: AppConfig {
                database_url: String::new(),
                jwt_secret: "test-secret".into(),
                bind_addr: "127.0.0.1:0".into(),
                max_connections: 1,
            },
        })
    }

    fn member(uid: &str) -> CurrentUser {
        CurrentUser::new(User::member(uid, &format!("{}@example.com", uid)))
    }

    fn admin() -> CurrentUser {
        CurrentUser::new(User::admin("admin", "admin@example.com"))
    }

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                item_path("i1"),
                json!({
                    "name": "Blue Umbrella",
                    "description": "Left by the north entrance",
                    "category": "Other",
                    "locationFound": "Library",
                    "userId": "finder",
                    "dateFound": "2026-10-01T09:00:00Z",
                    "status": "reported",
                    "claims": ["owner"]
                }),
            )
            .await
            .unwrap();
        store
            .insert(
                claim_path("i1", "c1"),
                json!({
                    "claimReason": "It has my initials on the handle",
                    "contactInformation": "owner@example.com",
                    "foundItemId": "i1",
                    "userId": "owner",
                    "status": "Pending",
                    "itemName": "Blue Umbrella",
                    "itemImage": ""
                }),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let state = state_with(Arc::new(MemoryStore::new()));
        let result = get_document(
            State(state),
            member("owner"),
            Path("found_items/nope".to_string()),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_claims_hidden_from_other_members() {
        let state = state_with(seeded().await);
        let path = "found_items/i1/claims/c1".to_string();

        let own = get_document(State(state.clone()), member("owner"), Path(path.clone())).await;
        assert!(own.is_ok());

        let other = get_document(State(state), member("stranger"), Path(path)).await;
        assert!(matches!(other, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_member_cannot_approve() {
        let store = seeded().await;
        let state = state_with(store.clone());
        let batch = WriteBatch::new()
            .update(
                claim_path("i1", "c1"),
                vec![
                    FieldUpdate::set("status", "Approved"),
                    FieldUpdate::set("adminReason", "Looks right to me"),
                ],
            )
            .delete(item_path("i1"));

        let result = commit_batch(State(state), member("owner"), Json(batch)).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert!(store.peek(&item_path("i1")).await.is_some());
    }

    #[tokio::test]
    async fn test_admin_approval_commits_atomically() {
        let store = seeded().await;
        let state = state_with(store.clone());
        let batch = WriteBatch::new()
            .update(
                claim_path("i1", "c1"),
                vec![
                    FieldUpdate::set("status", "Approved"),
                    FieldUpdate::set("adminReason", "Initials match the description"),
                ],
            )
            .delete(item_path("i1"));

        let Json(response) = commit_batch(State(state), admin(), Json(batch)).await.unwrap();
        assert_eq!(response.committed, 2);
        assert!(store.peek(&item_path("i1")).await.is_none());

        let claim = store.peek(&claim_path("i1", "c1")).await.unwrap();
        assert_eq!(claim["status"], "Approved");
    }

    fn approval(claim_id: &str, reason: &str) -> WriteBatch {
        WriteBatch::new()
            .update(
                claim_path("i1", claim_id),
                vec![
                    FieldUpdate::set("status", "Approved"),
                    FieldUpdate::set("adminReason", reason),
                ],
            )
            .delete(item_path("i1"))
    }

    #[tokio::test]
    async fn test_second_approval_on_item_refused() {
        let store = seeded().await;
        store
            .insert(
                claim_path("i1", "c2"),
                json!({
                    "claimReason": "Mine, it has a dent near the tip",
                    "contactInformation": "second@example.com",
                    "foundItemId": "i1",
                    "userId": "second",
                    "status": "Pending",
                    "itemName": "Blue Umbrella",
                    "itemImage": ""
                }),
            )
            .await
            .unwrap();
        let state = state_with(store.clone());

        commit_batch(State(state.clone()), admin(), Json(approval("c1", "Initials match")))
            .await
            .unwrap();
        let result =
            commit_batch(State(state.clone()), admin(), Json(approval("c2", "Dent matches"))).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        let claim_only = WriteBatch::new().update(
            claim_path("i1", "c2"),
            vec![
                FieldUpdate::set("status", "Approved"),
                FieldUpdate::set("adminReason", "Dent matches"),
            ],
        );
        let result = commit_batch(State(state), admin(), Json(claim_only)).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        let second = store.peek(&claim_path("i1", "c2")).await.unwrap();
        assert_eq!(second["status"], "Pending");
        assert_eq!(store.committed_batches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_committed_batch_pins_checked_status() {
        let store = seeded().await;
        let state = state_with(store.clone());

        commit_batch(State(state), admin(), Json(approval("c1", "Initials match")))
            .await
            .unwrap();

        let committed = store.committed_batches().await;
        let conditions: Vec<_> = committed[0]
            .expect
            .iter()
            .map(|p| (p.path.to_string(), p.condition.clone()))
            .collect();
        assert_eq!(
            conditions,
            vec![
                (
                    "found_items/i1/claims/c1".to_string(),
                    Condition::FieldEquals {
                        field: "status".to_string(),
                        equals: json!("Pending"),
                    }
                ),
                ("found_items/i1".to_string(), Condition::Exists),
            ]
        );
    }

    #[tokio::test]
    async fn test_review_changed_before_commit_conflicts() {
        let store = seeded().await;
        let state = state_with(store.clone());
        let checked = vec![store.get(&claim_path("i1", "c1")).await.unwrap()];
        let rejection = WriteBatch::new().update(
            claim_path("i1", "c1"),
            vec![
                FieldUpdate::set("status", "Rejected"),
                FieldUpdate::set("adminReason", "No proof"),
            ],
        );
        rules::check_batch(&admin(), &rejection, &checked).unwrap();
        let pinned = rules::pin(rejection, &checked);

        commit_batch(State(state.clone()), admin(), Json(approval("c1", "Initials match")))
            .await
            .unwrap();

        let result = state.store.commit(pinned).await.map_err(ApiError::from);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        let claim = store.peek(&claim_path("i1", "c1")).await.unwrap();
        assert_eq!(claim["status"], "Approved");
        assert_eq!(claim["adminReason"], "Initials match");
    }

    #[tokio::test]
    async fn test_member_query_must_filter_on_self() {
        let state = state_with(seeded().await);

        let everyone = Query::group("claims");
        let result = run_query(State(state.clone()), member("owner"), Json(everyone)).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        let mine = Query::group("claims").where_eq("userId", "owner");
        let Json(docs) = run_query(State(state.clone()), member("owner"), Json(mine))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        let Json(items) = run_query(
            State(state),
            member("stranger"),
            Json(Query::collection(found_items())),
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_report_created_under_own_uid() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());
        let body = json!({
            "name": "Keys",
            "description": "Three keys on a red ring",
            "category": "Keys",
            "locationFound": "Cafeteria",
            "userId": "finder",
            "dateFound": "2026-10-02T12:00:00Z",
            "status": "reported",
            "claims": []
        });
        let Value::Object(data) = body else {
            panic!("object expected");
        };

        let forged = add_document(
            State(state.clone()),
            member("someone-else"),
            Path("found_items".to_string()),
            Json(data.clone()),
        )
        .await;
        assert!(matches!(forged, Err(ApiError::Forbidden(_))));

        let (status, Json(created)) = add_document(
            State(state),
            member("finder"),
            Path("found_items".to_string()),
            Json(data),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.path.collection(), found_items());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_member_can_only_add_self_as_claimant() {
        let store = seeded().await;
        let state = state_with(store.clone());

        let new_claim = claims_of("i1").new_doc();
        let batch = WriteBatch::new()
            .set(
                new_claim.clone(),
                serde_json::from_value(json!({
                    "claimReason": "Mine, it has a dent near the tip",
                    "contactInformation": "555-0100",
                    "foundItemId": "i1",
                    "userId": "second",
                    "status": "Pending",
                    "itemName": "Blue Umbrella",
                    "itemImage": ""
                }))
                .unwrap(),
            )
            .update(item_path("i1"), vec![FieldUpdate::array_union("claims", "second")]);

        commit_batch(State(state.clone()), member("second"), Json(batch))
            .await
            .unwrap();
        let item = store.peek(&item_path("i1")).await.unwrap();
        assert_eq!(item["claims"], json!(["owner", "second"]));

        let spoofed = WriteBatch::new()
            .update(item_path("i1"), vec![FieldUpdate::array_union("claims", "victim")]);
        let result = commit_batch(State(state), member("second"), Json(spoofed)).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }
}
