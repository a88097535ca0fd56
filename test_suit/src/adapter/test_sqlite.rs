#[cfg(test)]
use super::*;
#[cfg(test)]
use timestamppb::{
    Config, Db, Error, Statement, TimestampPb, Value,
    callbacks::{BEFORE_DELETE, DELETE},
    prost_types::Timestamp,
    timestamp,
};

#[cfg(test)]
async fn setup_db() -> Db {
    let db = match Db::connect(&Config::new("sqlite::memory:")).await {
        Ok(db) => db,
        Err(err) => panic!("Failed to open SQLite: {}", err),
    };
    db.migrate::<User>().await.unwrap();
    db.migrate::<Note>().await.unwrap();
    db.migrate::<LegacyAccount>().await.unwrap();
    db
}

#[tokio::test]
async fn test_create_fills_timestamps() {
    let db = setup_db().await;

    let mut user = User::new("ada");
    db.create(&mut user).await.unwrap();

    assert!(user.created_at.is_some());
    assert!(user.updated_at.is_some());
    assert_eq!(user.created_at, user.updated_at);
    assert!(user.deleted_at.is_none());

    let fetched = db.fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(fetched, user);
}

#[tokio::test]
async fn test_create_keeps_preset_timestamps() {
    let db = setup_db().await;

    let preset = Timestamp {
        seconds: 1_500_000_000,
        nanos: 123_000_000,
    };
    let mut user = User::new("grace");
    user.created_at = Some(preset.clone());
    db.create(&mut user).await.unwrap();

    assert_eq!(user.created_at, Some(preset.clone()));
    assert_ne!(user.updated_at, Some(preset.clone()));

    let fetched = db.fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.created_at, Some(preset));
}

#[tokio::test]
async fn test_create_many() {
    let db = setup_db().await;

    let mut users = vec![User::new("a"), User::new("b"), User::new("c")];
    let inserted = db.create_many(&mut users).await.unwrap();
    assert_eq!(inserted, 3);
    assert!(users.iter().all(|u| u.created_at.is_some() && u.updated_at.is_some()));

    let all = db.query::<User>().order_by("name", true).all().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].name, "a");
    assert_eq!(all[2].name, "c");
}

#[tokio::test]
async fn test_update_fills_nil_updated_at() {
    let db = setup_db().await;

    let mut user = User::new("linus");
    db.create(&mut user).await.unwrap();
    let created_at = user.created_at.clone();

    user.name = "torvalds".to_string();
    user.updated_at = None;
    let updated = db.update(&mut user).await.unwrap();
    assert_eq!(updated, 1);
    assert!(user.updated_at.is_some());
    assert_eq!(user.created_at, created_at);

    let fetched = db.fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "torvalds");
    assert_eq!(fetched.updated_at, user.updated_at);
}

#[tokio::test]
async fn test_update_keeps_set_updated_at() {
    let db = setup_db().await;

    let mut user = User::new("ken");
    db.create(&mut user).await.unwrap();

    let preset = Timestamp {
        seconds: 1_700_000_000,
        nanos: 0,
    };
    user.updated_at = Some(preset.clone());
    db.update(&mut user).await.unwrap();

    let fetched = db.fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.updated_at, Some(preset));
}

#[tokio::test]
async fn test_delete_is_soft() {
    let db = setup_db().await;

    let mut user = User::new("barbara");
    db.create(&mut user).await.unwrap();

    let affected = db.delete(&mut user).await.unwrap();
    assert_eq!(affected, 1);
    assert!(user.deleted_at.is_some());

    // hidden from scoped queries
    assert!(db.fetch::<User>(user.id).await.unwrap().is_none());
    assert!(db.query::<User>().all().await.unwrap().is_empty());

    // still stored
    let stored = db.unscoped().fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(stored.deleted_at, user.deleted_at);
    assert_eq!(stored.name, "barbara");
}

#[tokio::test]
async fn test_unscoped_delete_is_hard() {
    let db = setup_db().await;

    let mut user = User::new("dennis");
    db.create(&mut user).await.unwrap();

    let affected = db.unscoped().delete(&mut user).await.unwrap();
    assert_eq!(affected, 1);
    assert!(user.deleted_at.is_none());
    assert!(db.unscoped().fetch::<User>(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_twice_moves_deleted_at() {
    let db = setup_db().await;

    let mut user = User::new("edsger");
    db.create(&mut user).await.unwrap();
    db.delete(&mut user).await.unwrap();
    let first = user.deleted_at.clone().unwrap();

    // soft delete does not filter on deleted_at
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    db.delete(&mut user).await.unwrap();
    let second = user.deleted_at.clone().unwrap();

    assert!(
        (second.seconds, second.nanos) > (first.seconds, first.nanos),
        "{:?} should be after {:?}",
        second,
        first
    );
}

#[tokio::test]
async fn test_model_without_deleted_at_is_hard_deleted() {
    let db = setup_db().await;

    let mut note = Note {
        id: 1,
        body: "remember the milk".to_string(),
        created_at: None,
        updated_at: None,
    };
    db.create(&mut note).await.unwrap();
    assert!(note.created_at.is_some());

    db.delete(&mut note).await.unwrap();
    assert!(db.unscoped().fetch::<Note>(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_plain_time_deleted_at_is_hard_deleted() {
    let db = setup_db().await;

    let mut account = LegacyAccount {
        id: 7,
        name: "old".to_string(),
        deleted_at: None,
    };
    db.create(&mut account).await.unwrap();
    db.delete(&mut account).await.unwrap();

    assert!(account.deleted_at.is_none());
    assert!(
        db.unscoped()
            .fetch::<LegacyAccount>(7)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_query_delete_soft_deletes_matches() {
    let db = setup_db().await;

    let mut users = vec![User::new("keep"), User::new("drop"), User::new("drop")];
    db.create_many(&mut users).await.unwrap();

    let affected = db
        .query::<User>()
        .where_eq("name", "drop")
        .delete()
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let visible = db.query::<User>().all().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "keep");

    let deleted = db
        .query::<User>()
        .unscoped()
        .where_not_null("deleted_at")
        .all()
        .await
        .unwrap();
    assert_eq!(deleted.len(), 2);
}

#[tokio::test]
async fn test_query_delete_requires_conditions() {
    let db = setup_db().await;
    let err = db.query::<User>().delete().await.unwrap_err();
    assert_eq!(err, Error::MissingWhereClause);
}

#[tokio::test]
async fn test_filter_on_wire_timestamp() {
    let db = setup_db().await;

    let mut old = User::new("old");
    old.created_at = Some(Timestamp {
        seconds: 1_000_000_000,
        nanos: 0,
    });
    let mut new = User::new("new");
    db.create(&mut old).await.unwrap();
    db.create(&mut new).await.unwrap();

    let cutoff = Timestamp {
        seconds: 1_500_000_000,
        nanos: 0,
    };
    let found = db
        .query::<User>()
        .where_lt("created_at", cutoff)
        .all()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "old");
}

#[tokio::test]
async fn test_text_in_timestamp_column_is_rejected() {
    let db = setup_db().await;

    let id = uuid::Uuid::now_v7();
    db.adapter()
        .execute(
            r#"INSERT INTO "users" ("id", "name", "created_at") VALUES (?, ?, ?)"#,
            &[
                Value::Uuid(id),
                Value::Text("broken".to_string()),
                Value::Text("yesterday".to_string()),
            ],
        )
        .await
        .unwrap();

    let err = db.fetch::<User>(id).await.unwrap_err();
    assert_eq!(err, Error::InvalidDatabaseType("text".to_string()));
}

#[tokio::test]
async fn test_unknown_field() {
    let db = setup_db().await;
    let err = db
        .query::<User>()
        .where_eq("nickname", "x")
        .all()
        .await
        .unwrap_err();
    assert_eq!(err, Error::UnknownField("User.nickname".to_string()));
}

#[tokio::test]
async fn test_plugin_registered_once() {
    let db = setup_db().await;
    let err = db.use_plugin(TimestampPb::new()).unwrap_err();
    assert_eq!(err, Error::PluginRegistered("timestamppb".to_string()));
}

#[tokio::test]
async fn test_soft_delete_runs_before_builtin_delete() {
    let db = setup_db().await;
    db.register_callbacks(|callbacks| {
        assert_eq!(
            callbacks.delete().names(),
            vec!["timestamppb", BEFORE_DELETE, DELETE]
        );
        callbacks
            .delete()
            .after(DELETE)
            .register("audit", |stmt: &mut Statement| {
                assert!(stmt.sql.starts_with("UPDATE"));
                Ok(())
            })
    })
    .unwrap();

    let mut user = User::new("audited");
    db.create(&mut user).await.unwrap();
    db.delete(&mut user).await.unwrap();
}

#[tokio::test]
async fn test_now_roundtrips_through_sqlite() {
    let db = setup_db().await;

    let at = timestamp::now();
    let mut user = User::new("clock");
    user.created_at = Some(at.clone());
    user.updated_at = Some(at.clone());
    db.create(&mut user).await.unwrap();

    let fetched = db.fetch::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.created_at, Some(at));
}
