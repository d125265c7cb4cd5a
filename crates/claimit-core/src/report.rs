//! Found item reports

use crate::identity::{resolved_user, IdentityProvider, Route};
use crate::image::{ImageNormalizer, ImageUpload};
use crate::model::{found_items, Category, FoundItem, REPORTED};
use crate::notify::{Notification, Notifier};
use crate::store::{to_body, DocumentStore};
use crate::validation::{
    Checker, ValidationError, MIN_DESCRIPTION, MIN_ITEM_NAME, MIN_LOCATION,
};
use crate::{CoreError, CoreResult};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

const FORM_ERRORS: &str = "Please correct the form errors.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportForm {
    pub name: String,
    pub description: String,
    pub category: Option<Category>,
    pub location_found: String,
    pub image: Option<ImageUpload>,
}

impl ReportForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checker = Checker::default();
        checker.min_len(
            "name",
            self.name.trim(),
            MIN_ITEM_NAME,
            "Item name must be at least 3 characters.",
        );
        checker.min_len(
            "description",
            self.description.trim(),
            MIN_DESCRIPTION,
            "Description must be at least 10 characters.",
        );
        if self.category.is_none() {
            checker.fail("category", "Please select a category.");
        }
        checker.min_len(
            "locationFound",
            self.location_found.trim(),
            MIN_LOCATION,
            "Location must be at least 3 characters.",
        );
        checker.finish(Some(FORM_ERRORS))
    }
}

pub struct ItemReporter {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    normalizer: Arc<dyn ImageNormalizer>,
}

impl ItemReporter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        normalizer: Arc<dyn ImageNormalizer>,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
            normalizer,
        }
    }

    /// Validate the form and add the item to the listing
    pub async fn submit(&self, form: &ReportForm) -> CoreResult<FoundItem> {
        let category = match (form.validate(), form.category) {
            (Ok(()), Some(category)) => category,
            (Err(invalid), _) => return Err(self.reject(invalid)),
            (Ok(()), None) => {
                return Err(self.reject(ValidationError::single("category", FORM_ERRORS)))
            }
        };

        let Some(user) = resolved_user(self.identity.as_ref()).await else {
            self.notifier.notify(Notification::failure(
                "Authentication Error",
                "You must be logged in to report an item.",
            ));
            return Err(CoreError::Unauthorized {
                redirect: Route::SignIn,
            });
        };

        let image_url = match &form.image {
            Some(upload) => self
                .normalizer
                .to_data_uri(upload)
                .map_err(|e| self.reject(ValidationError::single("image", e.to_string())))?,
            None => String::new(),
        };

        let mut item = FoundItem {
            id: String::new(),
            name: form.name.trim().to_string(),
            description: form.description.trim().to_string(),
            category,
            location_found: form.location_found.trim().to_string(),
            image_url,
            user_id: user.uid.clone(),
            date_found: Utc::now(),
            status: REPORTED.to_string(),
            claims: BTreeSet::new(),
        };

        let added = match to_body(&item) {
            Ok(body) => self.store.add(&found_items(), body).await,
            Err(e) => Err(e),
        };
        match added {
            Ok(path) => {
                item.id = path.id().to_string();
                info!(item = %item.id, user = %user.uid, "Item reported");
                self.notifier.notify(Notification::success(
                    "Report Submitted!",
                    "Thank you for helping our community.",
                ));
                Ok(item)
            }
            Err(source) => {
                error!(user = %user.uid, "Failed to submit report: {}", source);
                self.notifier.notify(Notification::failure(
                    "Submission Failed",
                    "An unexpected error occurred. Please try again.",
                ));
                Err(CoreError::Write {
                    what: "found item",
                    source,
                })
            }
        }
    }

    fn reject(&self, invalid: ValidationError) -> CoreError {
        self.notifier
            .notify(Notification::failure("Validation Error", invalid.summary.clone()));
        invalid.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{SessionIdentity, User};
    use crate::image::DataUriEncoder;
    use crate::model::item_path;
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryStore;

    fn form() -> ReportForm {
        ReportForm {
            name: "Blue umbrella".to_string(),
            description: "Folding umbrella with a wooden handle".to_string(),
            category: Some(Category::Other),
            location_found: "Bus stop".to_string(),
            image: None,
        }
    }

    fn reporter(store: Arc<MemoryStore>, notifier: Arc<MemoryNotifier>) -> ItemReporter {
        ItemReporter::new(
            store,
            Arc::new(SessionIdentity::signed_in(User::member("u1", "u1@example.com"))),
            notifier,
            Arc::new(DataUriEncoder::new()),
        )
    }

    #[test]
    fn test_all_field_errors_reported_together() {
        let err = ReportForm::default().validate().unwrap_err();
        assert_eq!(err.summary, FORM_ERRORS);
        let fields: Vec<&str> = err.fields.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["name", "description", "category", "locationFound"]);
    }

    #[tokio::test]
    async fn test_invalid_report_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let reporter = reporter(store.clone(), notifier.clone());

        let mut bad = form();
        bad.name = "ab".to_string();
        assert!(matches!(
            reporter.submit(&bad).await,
            Err(CoreError::Validation(_))
        ));
        assert_eq!(store.calls().total(), 0);
        assert_eq!(
            notifier.last().unwrap().description.as_deref(),
            Some(FORM_ERRORS)
        );
    }

    #[tokio::test]
    async fn test_report_adds_item() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let reporter = reporter(store.clone(), notifier.clone());

        let mut with_image = form();
        with_image.image = Some(ImageUpload::new(b"png".to_vec(), "image/png"));
        let item = reporter.submit(&with_image).await.unwrap();

        let stored = store.peek(&item_path(&item.id)).await.unwrap();
        assert_eq!(stored["status"], "reported");
        assert_eq!(stored["userId"], "u1");
        assert_eq!(stored["imageURL"], "data:image/png;base64,cG5n");
        assert_eq!(notifier.titles(), vec!["Report Submitted!"]);
    }

    #[tokio::test]
    async fn test_unsupported_image_is_a_field_error() {
        let store = Arc::new(MemoryStore::new());
        let reporter = reporter(store.clone(), Arc::new(MemoryNotifier::new()));

        let mut bad = form();
        bad.image = Some(ImageUpload::new(vec![1, 2, 3], "application/pdf"));
        let Err(CoreError::Validation(invalid)) = reporter.submit(&bad).await else {
            panic!("expected a validation error");
        };
        assert!(invalid.for_field("image").is_some());
        assert_eq!(store.calls().writes, 0);
    }
}
