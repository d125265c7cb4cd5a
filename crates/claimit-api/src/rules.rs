//! Per-document access rules
//!
//! Every read and write is checked here before it reaches the store. The
//! checks see the caller, the target path, the request body and, for writes,
//! the document as currently stored.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use claimit_core::model::{found_items, item_path, CLAIMS, FOUND_ITEMS, REPORTED};
use claimit_core::store::{
    CollectionPath, Condition, DocPath, Document, FieldUpdate, Query, Source, WriteBatch, WriteOp,
};
use claimit_core::ClaimStatus;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// What a document path points at
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    Item,
    Claim { item_id: &'a str },
    Other,
}

fn classify(path: &DocPath) -> Target<'_> {
    match path.segments() {
        [root, _] if root == FOUND_ITEMS => Target::Item,
        [root, item_id, sub, _] if root == FOUND_ITEMS && sub == CLAIMS => Target::Claim {
            item_id: item_id.as_str(),
        },
        _ => Target::Other,
    }
}

fn forbidden(reason: &str) -> ApiError {
    ApiError::Forbidden(reason.to_string())
}

fn text<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

fn stored_status(doc: Option<&Document>) -> Option<ClaimStatus> {
    doc.and_then(|d| text(&d.data, "status"))
        .and_then(|s| s.parse().ok())
}

/// Reading one document
pub fn check_get(caller: &CurrentUser, path: &DocPath, doc: Option<&Document>) -> ApiResult<()> {
    match classify(path) {
        Target::Item => Ok(()),
        Target::Claim { .. } => {
            let owner = doc.and_then(|d| text(&d.data, "userId"));
            if caller.admin || doc.is_none() || owner == Some(caller.uid()) {
                Ok(())
            } else {
                Err(forbidden("claims are visible to their author and administrators"))
            }
        }
        Target::Other if caller.admin => Ok(()),
        Target::Other => Err(forbidden("unknown collection")),
    }
}

fn filters_on_caller(caller: &CurrentUser, query: &Query) -> bool {
    query
        .filters
        .iter()
        .any(|f| f.field == "userId" && f.equals.as_str() == Some(caller.uid()))
}

/// Listing a collection or collection group
pub fn check_query(caller: &CurrentUser, query: &Query) -> ApiResult<()> {
    if caller.admin {
        return Ok(());
    }
    match &query.source {
        Source::Collection(collection) if *collection == found_items() => Ok(()),
        Source::Collection(collection) if collection.name() == CLAIMS => {
            if filters_on_caller(caller, query) {
                Ok(())
            } else {
                Err(forbidden("claim queries must filter on your own userId"))
            }
        }
        Source::Group(name) if name == CLAIMS => {
            if filters_on_caller(caller, query) {
                Ok(())
            } else {
                Err(forbidden("claim queries must filter on your own userId"))
            }
        }
        _ => Err(forbidden("unknown collection")),
    }
}

/// Adding a document under a generated id
pub fn check_add(
    caller: &CurrentUser,
    collection: &CollectionPath,
    data: &Map<String, Value>,
) -> ApiResult<()> {
    check_write(
        caller,
        &WriteOp::Set {
            path: collection.doc("new"),
            data: data.clone(),
        },
        None,
    )
}

/// One write, against the document as it is stored now
pub fn check_write(caller: &CurrentUser, op: &WriteOp, existing: Option<&Document>) -> ApiResult<()> {
    match (op, classify(op.path())) {
        (WriteOp::Set { data, .. }, Target::Item) => {
            if existing.is_some() && !caller.admin {
                return Err(forbidden("items cannot be overwritten"));
            }
            if text(data, "userId") != Some(caller.uid()) {
                return Err(forbidden("items must be reported under your own userId"));
            }
            if text(data, "status") != Some(REPORTED) {
                return Err(forbidden("new items must have status 'reported'"));
            }
            let claimants_empty = match data.get("claims") {
                None | Some(Value::Null) => true,
                Some(Value::Array(values)) => values.is_empty(),
                Some(_) => false,
            };
            if !claimants_empty {
                return Err(forbidden("new items start without claimants"));
            }
            Ok(())
        }
        (WriteOp::Set { data, .. }, Target::Claim { item_id }) => {
            if existing.is_some() {
                return Err(forbidden("claims cannot be overwritten"));
            }
            if text(data, "userId") != Some(caller.uid()) {
                return Err(forbidden("claims must be filed under your own userId"));
            }
            if text(data, "status") != Some(ClaimStatus::Pending.name()) {
                return Err(forbidden("new claims must be Pending"));
            }
            if text(data, "foundItemId") != Some(item_id) {
                return Err(forbidden("foundItemId must match the parent item"));
            }
            if data.contains_key("adminReason") {
                return Err(forbidden("only administrators give reasons"));
            }
            Ok(())
        }
        (WriteOp::Update { updates, .. }, Target::Item) => {
            if caller.admin {
                return Ok(());
            }
            let own_claim_only = !updates.is_empty()
                && updates.iter().all(|u| match u {
                    FieldUpdate::ArrayUnion { field, values } => {
                        field == "claims"
                            && values.iter().all(|v| v.as_str() == Some(caller.uid()))
                    }
                    _ => false,
                });
            if own_claim_only {
                Ok(())
            } else {
                Err(forbidden("members may only add themselves to an item's claimants"))
            }
        }
        (WriteOp::Update { updates, .. }, Target::Claim { .. }) => {
            if !caller.admin {
                return Err(forbidden("only administrators review claims"));
            }
            check_review(updates, stored_status(existing))
        }
        (WriteOp::Delete { .. }, Target::Item) => {
            if caller.admin {
                Ok(())
            } else {
                Err(forbidden("only administrators remove items"))
            }
        }
        (WriteOp::Delete { .. }, Target::Claim { .. }) => {
            if !caller.admin {
                return Err(forbidden("only administrators delete claims"));
            }
            match (existing, stored_status(existing)) {
                (None, _) => Ok(()),
                (Some(_), Some(status)) if status.is_terminal() => Ok(()),
                _ => Err(forbidden("only approved or rejected claims can be deleted")),
            }
        }
        (_, Target::Other) if caller.admin => Ok(()),
        (_, Target::Other) => Err(forbidden("unknown collection")),
    }
}

/// Item whose claim this op approves
fn approved_item(op: &WriteOp) -> Option<&str> {
    let WriteOp::Update { path, updates } = op else {
        return None;
    };
    let Target::Claim { item_id } = classify(path) else {
        return None;
    };
    updates
        .iter()
        .any(|u| {
            matches!(u, FieldUpdate::Set { field, value }
                if field == "status" && value.as_str() == Some(ClaimStatus::Approved.name()))
        })
        .then_some(item_id)
}

/// Every write of a batch, plus the rules spanning writes: an approval
/// removes its item in the same batch, and an item goes to one claimant.
///
/// `existing` holds the stored document for each op, in op order.
pub fn check_batch(
    caller: &CurrentUser,
    batch: &WriteBatch,
    existing: &[Option<Document>],
) -> ApiResult<()> {
    for (op, doc) in batch.ops.iter().zip(existing) {
        check_write(caller, op, doc.as_ref())?;
    }

    let mut approved = BTreeSet::new();
    for item_id in batch.ops.iter().filter_map(approved_item) {
        if !approved.insert(item_id) {
            return Err(forbidden("an item can be given to one claimant only"));
        }
        let item = item_path(item_id);
        let removal = batch
            .ops
            .iter()
            .zip(existing)
            .find(|(op, _)| matches!(op, WriteOp::Delete { path } if *path == item));
        match removal {
            None => return Err(forbidden("approving a claim must remove its item")),
            Some((_, None)) => {
                return Err(ApiError::NotFound(format!("{} has already been claimed", item)))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Pin what the checks saw so the store refuses the batch if it changed
/// before commit: a reviewed claim keeps its status, an approved item exists.
pub fn pin(mut batch: WriteBatch, existing: &[Option<Document>]) -> WriteBatch {
    let mut pins = Vec::new();
    for (op, doc) in batch.ops.iter().zip(existing) {
        let (WriteOp::Update { path, .. }, Some(doc)) = (op, doc) else {
            continue;
        };
        if let (Target::Claim { .. }, Some(status)) = (classify(path), doc.field("status")) {
            pins.push((
                path.clone(),
                Condition::FieldEquals {
                    field: "status".to_string(),
                    equals: status.clone(),
                },
            ));
        }
    }
    let items: Vec<DocPath> = batch.ops.iter().filter_map(approved_item).map(item_path).collect();
    pins.extend(items.into_iter().map(|item| (item, Condition::Exists)));

    for (path, condition) in pins {
        batch.push_precondition(path, condition);
    }
    batch
}

/// A review moves a Pending claim to a terminal status with a reason
fn check_review(updates: &[FieldUpdate], current: Option<ClaimStatus>) -> ApiResult<()> {
    let Some(current) = current else {
        return Err(ApiError::NotFound("claim".to_string()));
    };

    let mut next = None;
    let mut reason = None;
    for update in updates {
        match update {
            FieldUpdate::Set { field, value } if field == "status" => {
                next = value.as_str().and_then(|s| s.parse::<ClaimStatus>().ok());
            }
            FieldUpdate::Set { field, value } if field == "adminReason" => {
                reason = value.as_str().map(str::trim);
            }
            other => {
                return Err(forbidden(&format!(
                    "field '{}' cannot be changed on a claim",
                    other.field()
                )))
            }
        }
    }

    let Some(next) = next else {
        return Err(forbidden("a review must set the claim status"));
    };
    current
        .transition_to(next)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    if reason.map_or(true, str::is_empty) {
        return Err(forbidden("a review needs a non-empty adminReason"));
    }
    Ok(())
}
