use forest_places::{
    AppError,
    media::{Blob, DeleteOutcome, FailureReason, MediaError, MediaLimits, MediaPipeline, Namespace},
    storage::{MockStorageService, StorageState},
};
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

const PUBLIC_BASE: &str = "http://localhost:9000/place-images";

fn pipeline(store: &MockStorageService) -> MediaPipeline {
    MediaPipeline::new(
        Arc::new(store.clone()) as StorageState,
        MediaLimits::default(),
        PUBLIC_BASE,
    )
}

fn photo(name: &str) -> Blob {
    Blob::new(name, "image/jpeg", vec![0xFFu8; 1024])
}

#[cfg(test)]
mod validation {
    use super::*;

    #[test]
    fn accepts_allowed_types() {
        let media = pipeline(&MockStorageService::new());
        assert!(media.validate(&photo("a.jpg")).is_ok());
        assert!(media.validate(&Blob::new("b.PNG", "image/png", vec![1u8])).is_ok());
        assert!(
            media
                .validate(&Blob::new("c.webp", "IMAGE/WEBP; charset=binary", vec![1u8]))
                .is_ok()
        );
    }

    #[test]
    fn empty_file_is_rejected_first() {
        let media = pipeline(&MockStorageService::new());
        let blob = Blob::new("a.exe", "application/octet-stream", Vec::<u8>::new());
        assert_eq!(media.validate(&blob), Err(MediaError::EmptyFile));
    }

    #[test]
    fn wrong_type_or_extension_is_unsupported() {
        let media = pipeline(&MockStorageService::new());

        let pdf = Blob::new("doc.pdf", "application/pdf", vec![1u8]);
        assert!(matches!(media.validate(&pdf), Err(MediaError::UnsupportedType(_))));

        let disguised = Blob::new("script.sh", "image/jpeg", vec![1u8]);
        assert!(matches!(
            media.validate(&disguised),
            Err(MediaError::UnsupportedType(_))
        ));

        let untyped = Blob {
            filename: Some("a.jpg".into()),
            content_type: None,
            bytes: vec![1u8].into(),
        };
        assert!(matches!(media.validate(&untyped), Err(MediaError::UnsupportedType(_))));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let media = pipeline(&MockStorageService::new());
        let limit = MediaLimits::default().max_file_bytes;

        assert!(media.validate(&Blob::new("a.jpg", "image/jpeg", vec![0u8; limit])).is_ok());
        assert_eq!(
            media.validate(&Blob::new("a.jpg", "image/jpeg", vec![0u8; limit + 1])),
            Err(MediaError::TooLarge {
                size: limit + 1,
                limit
            })
        );
    }
}

#[cfg(test)]
mod keys {
    use super::*;

    #[test]
    fn key_layout_and_extension() {
        let media = pipeline(&MockStorageService::new());
        let place = Uuid::new_v4();

        let key = media.build_key(Namespace::Places, place, Some("IMG_1.JPEG"));
        assert!(key.starts_with(&format!("places/{}/", place)));
        assert!(key.ends_with(".jpeg"));

        let fallback = media.build_key(Namespace::Temp, place, None);
        assert!(fallback.starts_with(&format!("temp/{}/", place)));
        assert!(fallback.ends_with(".jpg"));
    }

    #[test]
    fn keys_never_collide() {
        let media = pipeline(&MockStorageService::new());
        let place = Uuid::new_v4();

        let keys: HashSet<String> = (0..500)
            .map(|_| media.build_key(Namespace::Places, place, Some("same.jpg")))
            .collect();
        assert_eq!(keys.len(), 500);
    }

    #[test]
    fn public_url_round_trips_to_the_key() {
        let media = pipeline(&MockStorageService::new());
        let key = media.build_key(Namespace::Places, Uuid::new_v4(), Some("a.png"));

        let url = media.public_url(&key);
        assert_eq!(url, format!("{}/{}", PUBLIC_BASE, key));
        assert_eq!(media.key_from_url(&url), Some(key.as_str()));
    }

    #[test]
    fn foreign_or_traversing_urls_have_no_key() {
        let media = pipeline(&MockStorageService::new());
        assert_eq!(media.key_from_url("https://elsewhere.example/a.jpg"), None);
        assert_eq!(media.key_from_url(&format!("{}/", PUBLIC_BASE)), None);
        assert_eq!(
            media.key_from_url(&format!("{}/places/../secrets", PUBLIC_BASE)),
            None
        );
    }
}

#[cfg(test)]
mod batch {
    use super::*;

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_store_calls() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let blobs: Vec<Blob> = (0..12).map(|i| photo(&format!("{}.jpg", i))).collect();

        let err = media
            .upload_batch(blobs, Uuid::new_v4(), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn quota_counts_existing_images() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let blobs = vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")];

        let err = media
            .upload_batch(blobs, Uuid::new_v4(), 8)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let store = MockStorageService::new();
        let err = pipeline(&store)
            .upload_batch(Vec::new(), Uuid::new_v4(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn one_bad_file_does_not_sink_the_batch() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let too_big = MediaLimits::default().max_file_bytes + 1;
        let blobs = vec![
            photo("0.jpg"),
            photo("1.jpg"),
            photo("2.jpg"),
            Blob::new("3.jpg", "image/jpeg", vec![0u8; too_big]),
            photo("4.jpg"),
        ];

        let outcome = media.upload_batch(blobs, Uuid::new_v4(), 0).await.unwrap();

        assert_eq!(outcome.total, 5);
        assert_eq!(outcome.succeeded.len(), 4);
        assert_eq!(
            outcome.succeeded.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 4]
        );
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 3);
        assert_eq!(outcome.failed[0].reason, FailureReason::TooLarge);
        assert_eq!(store.object_count(), 4);
    }

    #[tokio::test]
    async fn store_failure_on_one_item_is_isolated() {
        let store = MockStorageService::failing_put_at(1);
        let media = pipeline(&store);
        let blobs = vec![photo("0.jpg"), photo("1.jpg"), photo("2.jpg")];

        let outcome = media.upload_batch(blobs, Uuid::new_v4(), 0).await.unwrap();

        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert_eq!(outcome.failed[0].reason, FailureReason::StoreFailed);
    }

    #[tokio::test]
    async fn all_items_failing_is_an_upload_failure() {
        let store = MockStorageService::new_failing();
        let media = pipeline(&store);
        let blobs = vec![photo("0.jpg"), photo("1.jpg")];

        let err = media
            .upload_batch(blobs, Uuid::new_v4(), 0)
            .await
            .unwrap_err();

        match &err {
            AppError::UploadFailed { failed } => {
                assert_eq!(failed.len(), 2);
                assert!(failed.iter().all(|f| f.reason == FailureReason::StoreFailed));
            }
            other => panic!("expected UploadFailed, got {:?}", other),
        }
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn all_items_invalid_is_unprocessable() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let blobs = vec![Blob::new("a.pdf", "application/pdf", vec![1u8])];

        let err = media
            .upload_batch(blobs, Uuid::new_v4(), 0)
            .await
            .unwrap_err();

        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(store.calls(), 0);
    }
}

#[cfg(test)]
mod deletion {
    use super::*;

    #[tokio::test]
    async fn delete_removes_our_object() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let object = media
            .upload_one(&photo("a.jpg"), Namespace::Places, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(media.delete(&object.url).await, DeleteOutcome::Deleted);
        assert!(!store.contains(&object.key));
    }

    #[tokio::test]
    async fn foreign_url_is_skipped_without_a_call() {
        let store = MockStorageService::new();
        let media = pipeline(&store);

        let outcome = media.delete("https://cdn.example.com/someone/else.jpg").await;

        assert_eq!(outcome, DeleteOutcome::Skipped);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn store_refusal_is_swallowed() {
        let store = MockStorageService::with_failing_deletes();
        let media = pipeline(&store);
        let url = media.public_url("places/x/y.jpg");

        assert_eq!(media.delete(&url).await, DeleteOutcome::Failed);
    }
}

#[cfg(test)]
mod temp_flow {
    use super::*;

    #[tokio::test]
    async fn temp_image_moves_under_the_place() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let uploader = Uuid::new_v4();
        let place = Uuid::new_v4();

        let temp = media
            .upload_temp_image(&photo("shot.png"), uploader)
            .await
            .unwrap();
        assert!(temp.key.starts_with(&format!("temp/{}/", uploader)));
        assert_eq!(temp.resource_id, None);

        let moved = media
            .move_temp_to_place(&temp.url, uploader, place)
            .await
            .unwrap();

        assert!(moved.key.starts_with(&format!("places/{}/", place)));
        assert_eq!(moved.resource_id, Some(place));
        assert!(store.contains(&moved.key));
        assert!(!store.contains(&temp.key));
    }

    #[tokio::test]
    async fn another_users_temp_image_cannot_be_claimed() {
        let store = MockStorageService::new();
        let media = pipeline(&store);
        let owner = Uuid::new_v4();
        let thief = Uuid::new_v4();

        let temp = media.upload_temp_image(&photo("a.jpg"), owner).await.unwrap();
        let calls_before = store.calls();

        let err = media
            .move_temp_to_place(&temp.url, thief, Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::ForeignTemp(_)));
        assert_eq!(store.calls(), calls_before);
        assert!(store.contains(&temp.key));
    }

    #[tokio::test]
    async fn claiming_a_foreign_temp_image_is_an_ownership_refusal() {
        let store = MockStorageService::new();
        let media = pipeline(&store);

        let temp = media
            .upload_temp_image(&photo("a.jpg"), Uuid::new_v4())
            .await
            .unwrap();
        let err = media
            .move_temp_to_place(&temp.url, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), FailureReason::ForeignTemp);
        assert_ne!(err.reason(), FailureReason::UnsupportedType);
        assert_eq!(AppError::from(err).status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn failed_temp_cleanup_keeps_the_moved_copy() {
        let store = MockStorageService::with_failing_deletes();
        let media = pipeline(&store);
        let uploader = Uuid::new_v4();

        let temp = media.upload_temp_image(&photo("a.jpg"), uploader).await.unwrap();
        let moved = media
            .move_temp_to_place(&temp.url, uploader, Uuid::new_v4())
            .await
            .unwrap();

        assert!(store.contains(&moved.key));
        assert!(store.contains(&temp.key));
    }
}
