use registry::*;
use std::sync::Arc;
use std::time::Duration;

fn init_service(name: &str) -> (Arc<Storage>, UserService) {
    let storage = Storage::temp(name).expect("Failed to create temp storage");
    let service = UserService::new(Arc::clone(&storage), Duration::from_secs(5));
    (storage, service)
}

fn user_view(name: &str, email: &str, passport: Option<(&str, &str)>) -> UserView {
    UserView {
        name: name.to_string(),
        email: email.to_string(),
        passport: passport.map(|(number, nationality)| PassportView {
            passport_number: number.to_string(),
            nationality: nationality.to_string(),
            ..PassportView::default()
        }),
        ..UserView::default()
    }
}

/// Every persisted passport points back at the persisted user holding it, numbers are unique.
fn assert_invariants(storage: &Storage) {
    let read = storage.begin_read_ctx().unwrap();
    let users = read.list_users().unwrap();
    let mut numbers = std::collections::HashSet::new();
    for user in users.iter() {
        assert!(user.is_consistent(), "inconsistent back-reference on {:?}", user);
        assert!(user.created_at.is_some() && user.modified_at.is_some());
        assert!(user.modified_at >= user.created_at);
        if let Some(passport) = &user.passport {
            assert!(numbers.insert(passport.number.clone()), "duplicate number {}", passport.number);
            let issue = passport.issue_date.unwrap();
            let expiry = passport.expiry_date.unwrap();
            assert!(expiry >= issue);
        }
    }
}

fn passport_of(storage: &Storage, number: &str) -> Option<Passport> {
    let ctx = storage.begin_write_ctx().unwrap();
    let found = ctx.find_passport_by_number(number).unwrap();
    ctx.abort().unwrap();
    found
}

#[tokio::test]
async fn it_should_create_user_with_passport() {
    let (storage, service) = init_service("create");
    let created = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.expect("Failed to create user");

    let user_id = created.id.expect("user id must be assigned");
    let passport = created.passport.clone().expect("passport must be attached");
    assert!(passport.id.is_some());
    assert_eq!(passport.passport_number, "P1");
    assert_eq!(passport.nationality, "NAT");

    let issue = passport.issue_date.unwrap();
    assert_eq!(passport.expiry_date, issue.checked_add_months(chrono::Months::new(120)));

    let stored = passport_of(&storage, "P1").unwrap();
    assert_eq!(stored.owner, Some(user_id));
    assert_eq!(service.get(user_id).await.unwrap(), created);
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_keep_supplied_passport_dates() {
    let (_storage, service) = init_service("dates");
    let issue = chrono::Utc::now() - chrono::Duration::days(30);
    let mut view = user_view("A", "a@x", Some(("P1", "NAT")));
    view.passport.as_mut().unwrap().issue_date = Some(issue);

    let created = service.create(view).await.unwrap();
    let passport = created.passport.unwrap();
    assert_eq!(passport.issue_date, Some(issue));
    assert_eq!(passport.expiry_date, issue.checked_add_months(chrono::Months::new(120)));
}

#[tokio::test]
async fn it_should_reject_expiry_before_defaulted_issue_date() {
    let (storage, service) = init_service("expiry_before_issue");
    let mut view = user_view("A", "a@x", Some(("P1", "NAT")));
    view.passport.as_mut().unwrap().expiry_date = Some(chrono::Utc::now() - chrono::Duration::days(365));

    let err = service.create(view).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(service.list().await.unwrap().is_empty());
    assert!(passport_of(&storage, "P1").is_none());
}

#[tokio::test]
async fn it_should_reject_second_user_with_taken_number() {
    let (storage, service) = init_service("taken_number");
    let first = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();

    let err = service.create(user_view("B", "b@x", Some(("P1", "NAT")))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RelationshipConflict);

    let users = service.list().await.unwrap();
    assert_eq!(users.len(), 1, "failed create must not leave a user behind");
    assert_eq!(passport_of(&storage, "P1").unwrap().owner, first.id);
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_allow_number_again_after_dissociation() {
    let (storage, service) = init_service("number_reuse");
    let first = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();
    service.update(first.id.unwrap(), user_view("A", "a@x", None)).await.unwrap();

    let second = service.create(user_view("B", "b@x", Some(("P1", "CZE")))).await.unwrap();
    assert_eq!(second.passport.unwrap().nationality, "CZE");
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_update_passport_in_place() {
    let (storage, service) = init_service("update_in_place");
    let created = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();
    let user_id = created.id.unwrap();
    let original = created.passport.unwrap();

    let updated = service.update(user_id, user_view("A2", "a2@x", Some(("P1", "SVK")))).await.unwrap();
    let passport = updated.passport.unwrap();
    assert_eq!(updated.name, "A2");
    assert_eq!(updated.email, "a2@x");
    assert_eq!(passport.id, original.id, "passport id must be preserved");
    assert_eq!(passport.nationality, "SVK");
    assert_eq!(passport.issue_date, original.issue_date);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.modified_at >= created.modified_at);
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_refuse_changing_the_passport_number() {
    let (storage, service) = init_service("number_change");
    let created = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();
    let user_id = created.id.unwrap();

    let err = service.update(user_id, user_view("A", "a@x", Some(("P2", "SVK")))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RelationshipConflict);

    let unchanged = service.get(user_id).await.unwrap();
    assert_eq!(unchanged, created);
    assert!(passport_of(&storage, "P2").is_none());
}

#[tokio::test]
async fn it_should_delete_passport_when_update_omits_it() {
    let (storage, service) = init_service("detach");
    let created = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();
    let user_id = created.id.unwrap();

    let updated = service.update(user_id, user_view("A", "a@x", None)).await.unwrap();
    assert_eq!(updated.passport, None);
    assert_eq!(service.get(user_id).await.unwrap().passport, None);
    assert!(passport_of(&storage, "P1").is_none(), "orphaned passport must be removed");
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_attach_passport_on_update() {
    let (storage, service) = init_service("attach");
    let created = service.create(user_view("A", "a@x", None)).await.unwrap();
    assert_eq!(created.passport, None);

    let updated = service.update(created.id.unwrap(), user_view("A", "a@x", Some(("P7", "NAT")))).await.unwrap();
    assert_eq!(updated.passport.unwrap().passport_number, "P7");
    assert_eq!(service.list_with_passports().await.unwrap().len(), 1);
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_cascade_delete_to_passport() {
    let (storage, service) = init_service("cascade");
    let with_passport = service.create(user_view("A", "a@x", Some(("P1", "NAT")))).await.unwrap();
    let without_passport = service.create(user_view("B", "b@x", None)).await.unwrap();

    service.delete(with_passport.id.unwrap()).await.unwrap();
    assert!(passport_of(&storage, "P1").is_none());
    assert_eq!(service.get(with_passport.id.unwrap()).await.unwrap_err().kind(), ErrorKind::NotFound);

    service.delete(without_passport.id.unwrap()).await.unwrap();
    assert!(service.list().await.unwrap().is_empty());
    assert_eq!(service.delete(without_passport.id.unwrap()).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn it_should_reject_create_with_existing_id() {
    let (_storage, service) = init_service("already_exists");
    let created = service.create(user_view("A", "a@x", None)).await.unwrap();

    let mut again = user_view("A", "a@x", None);
    again.id = created.id;
    let err = service.create(again).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn it_should_report_missing_user_on_update() {
    let (_storage, service) = init_service("missing_update");
    let err = service.update(UserId(404), user_view("A", "a@x", None)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn it_should_reject_empty_passport_number() {
    let (_storage, service) = init_service("empty_number");
    let err = service.create(user_view("A", "a@x", Some(("", "NAT")))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn it_should_list_nothing_on_empty_store() {
    let (_storage, service) = init_service("empty_list");
    assert!(service.list().await.unwrap().is_empty());
    assert!(service.list_with_passports().await.unwrap().is_empty());
}

#[tokio::test]
async fn it_should_create_new_user_on_each_create_without_id() {
    let (_storage, service) = init_service("not_idempotent");
    let first = service.create_or_update(None, user_view("A", "a@x", None)).await.unwrap();
    let second = service.create_or_update(None, user_view("A", "a@x", None)).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(service.list().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn it_should_let_exactly_one_concurrent_writer_claim_a_number() {
    let (storage, service) = init_service("race");
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service.create(user_view(&format!("U{}", i), "u@x", Some(("P1", "NAT")))).await
            })
        })
        .collect();

    let mut won = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::RelationshipConflict),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(service.list_with_passports().await.unwrap().len(), 1);
    assert_invariants(&storage);
}

#[tokio::test]
async fn it_should_time_out_without_changing_state() {
    let storage = Storage::temp("timeout").unwrap();
    let service = UserService::new(Arc::clone(&storage), Duration::from_millis(50));

    let blocker = storage.begin_write_ctx().unwrap();
    let err = service.create(user_view("A", "a@x", None)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.is_retryable());
    blocker.abort().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(service.list().await.unwrap().is_empty());

    let retried = retry_with_delay(3, Duration::from_millis(10), || service.create(user_view("A", "a@x", None))).await;
    assert!(retried.is_ok());
    assert_eq!(service.list().await.unwrap().len(), 1);
}
