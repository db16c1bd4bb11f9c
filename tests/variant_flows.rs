mod common;

use common::{controller, drain, next, param};
use query_reconciler::{ControllerEvent, QueryTarget, RequestMethod, RowAction};
use serde_json::json;

fn owned() -> QueryTarget {
    QueryTarget::OwnedListing {
        exclude_deleted: true,
    }
}

#[tokio::test]
async fn patch_field_bypasses_the_query_pipeline() {
    let (mut controller, transport) = controller(owned());
    let mut dirty = controller.edit_session();
    let mut events = controller.subscribe();

    let request = controller
        .patch_field("idX", "tags", json!("video"))
        .expect("patch issued");
    assert_eq!(request.method, RequestMethod::Patch);
    assert_eq!(request.endpoint, "mychannel/torrents/idX");
    assert_eq!(request.body, Some(json!({"tags": "video"})));
    assert!(request.params.is_empty());
    assert_eq!(controller.current_epoch(), None);

    transport.answer(0, json!({"dirty": true}));
    assert!(next(&mut controller).await.expect("patch answer"));
    assert!(dirty.has_changed().expect("edit session open"));
    assert_eq!(*dirty.borrow_and_update(), Some(true));
    assert!(controller.items().is_empty());
    assert_eq!(controller.current_epoch(), None);
    assert!(matches!(
        drain(&mut events)[0].event,
        ControllerEvent::DirtyChanged { dirty: true }
    ));
}

#[tokio::test]
async fn patch_applies_locally_with_mapped_attribute() {
    let (mut controller, transport) = controller(owned());
    let ticket = controller.reset_and_query(None).expect("reset");
    transport.answer(
        0,
        json!({
            "uuid": ticket.epoch.as_token(),
            "results": [{"infohash": "aa", "title": "old", "type": "torrent"}],
            "total": 1,
            "dirty": false
        }),
    );
    next(&mut controller).await.expect("page");

    let request = controller
        .patch_field("aa", "name", json!("new"))
        .expect("patch issued");
    assert_eq!(request.body, Some(json!({"title": "new"})));
    assert_eq!(controller.items()[0].get("title"), Some(&json!("new")));
    assert_eq!(controller.window().first, 1);
    assert_eq!(controller.current_epoch(), Some(ticket.epoch));
}

#[tokio::test]
async fn patch_answer_without_dirty_flag_is_reported() {
    let (mut controller, transport) = controller(owned());
    let dirty = controller.edit_session();
    controller.patch_field("aa", "category", json!("music")).expect("patch");
    transport.answer(0, json!({"ok": true}));
    let error = next(&mut controller).await.unwrap_err();
    assert_eq!(error.error_code(), "MALFORMED_RESPONSE");
    assert_eq!(*dirty.borrow(), None);
}

#[tokio::test]
async fn owned_listing_reconciles_dirty_after_admission() {
    let (mut controller, transport) = controller(owned());
    let dirty = controller.edit_session();
    let ticket = controller.reset_and_query(None).expect("reset");
    let request = transport.request(0);
    assert_eq!(request.endpoint, "mychannel/torrents");
    assert_eq!(param(&request, "exclude_deleted"), &json!(true));

    transport.answer(
        0,
        json!({"uuid": ticket.epoch.as_token(), "results": [{"infohash": "aa"}], "total": 1, "dirty": true}),
    );
    assert!(next(&mut controller).await.expect("admitted"));
    assert_eq!(*dirty.borrow(), Some(true));

    // Stale answers do not touch the edit session.
    controller.refresh().expect("refresh");
    transport.answer(
        1,
        json!({"uuid": ticket.epoch.as_token(), "results": [], "total": 0, "dirty": false}),
    );
    assert!(!next(&mut controller).await.expect("stale"));
    assert_eq!(*dirty.borrow(), Some(true));
}

#[tokio::test]
async fn owned_listing_answer_without_dirty_is_malformed() {
    let (mut controller, transport) = controller(owned());
    let ticket = controller.reset_and_query(None).expect("reset");
    transport.answer(
        0,
        json!({"uuid": ticket.epoch.as_token(), "results": [{"infohash": "aa"}], "total": 1}),
    );
    let error = next(&mut controller).await.unwrap_err();
    assert_eq!(error.error_code(), "MALFORMED_RESPONSE");
    assert!(controller.items().is_empty());
}

#[tokio::test]
async fn filtered_listing_resets_on_text_change() {
    let (mut controller, transport) = controller(QueryTarget::FilteredListing { subscribed: true });
    let first = controller.reset_and_query(None).expect("reset");
    transport.answer(
        0,
        json!({"uuid": first.epoch.as_token(), "results": [{"public_key": "pk", "id": 1, "type": "channel"}], "total": 1}),
    );
    next(&mut controller).await.expect("page");
    assert_eq!(controller.items()[0].identity().as_deref(), Some("pk:1"));

    let filtered = controller.set_filter_text("Linux Distros").expect("filter");
    assert_ne!(filtered.epoch, first.epoch);
    assert!(controller.items().is_empty());
    let request = transport.request(1);
    assert_eq!(request.endpoint, "metadata/channels");
    assert_eq!(param(&request, "subscribed"), &json!(true));
    assert_eq!(param(&request, "filter"), &json!("\"linux\"* AND \"distros\"*"));
    assert_eq!(param(&request, "first"), &json!(1));
}

#[tokio::test]
async fn parent_scoped_preview_uses_its_own_epoch() {
    let target = QueryTarget::ParentScoped {
        public_key: "cafe".to_string(),
        channel_id: 4,
    };
    let (mut controller, transport) = controller(target);
    let listing = controller.reset_and_query(None).expect("reset");
    assert_eq!(transport.request(0).endpoint, "metadata/channels/cafe/4/torrents");

    let preview = controller.fetch_preview().expect("preview");
    assert_ne!(preview.epoch, listing.epoch);
    let request = transport.request(1);
    assert_eq!(request.endpoint, "search");
    assert_eq!(param(&request, "filter"), &json!("\"cafe\"*"));
    assert_eq!(param(&request, "metadata_type"), &json!("torrent"));
    assert_eq!(param(&request, "first"), &json!(1));
    assert_eq!(param(&request, "last"), &json!(50));

    transport.answer(0, json!({"uuid": listing.epoch.as_token(), "results": [{"infohash": "x"}], "total": 1}));
    assert!(!next(&mut controller).await.expect("listing answer is stale"));
    transport.answer(1, json!({"uuid": preview.epoch.as_token(), "results": [{"infohash": "p"}], "total": 1}));
    assert!(next(&mut controller).await.expect("preview admitted"));
    assert_eq!(controller.items()[0].identity().as_deref(), Some("p"));
}

#[tokio::test]
async fn preview_is_unsupported_elsewhere() {
    let (mut controller, transport) = controller(QueryTarget::Search { metadata_type: None });
    assert_eq!(controller.fetch_preview().unwrap_err().error_code(), "UNSUPPORTED");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn selection_and_actions_follow_row_type() {
    let (mut controller, transport) = controller(QueryTarget::Search { metadata_type: None });
    let ticket = controller.reset_and_query(None).expect("reset");
    transport.answer(
        0,
        json!({
            "uuid": ticket.epoch.as_token(),
            "results": [
                {"infohash": "t1", "type": "torrent"},
                {"public_key": "pk", "id": 2, "type": "channel"}
            ],
            "total": 2
        }),
    );
    next(&mut controller).await.expect("page");
    let mut events = controller.subscribe();

    assert!(controller.select_rows(&[0]).is_some());
    assert!(controller.select_rows(&[1]).is_none());
    assert!(controller.select_rows(&[]).is_none());
    let seen = drain(&mut events);
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[0].event, ControllerEvent::SelectionChanged { item: Some(_) }));
    assert!(matches!(&seen[1].event, ControllerEvent::SelectionChanged { item: None }));

    assert_eq!(
        controller.eligible_actions(&[0]),
        vec![RowAction::Download, RowAction::Play, RowAction::AddToOwnedListing]
    );
    assert_eq!(controller.eligible_actions(&[1]), vec![RowAction::Download, RowAction::Play]);
    assert_eq!(controller.eligible_actions(&[0, 1]), vec![RowAction::AddToOwnedListing]);
}
