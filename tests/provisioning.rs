//! Store invariants: provisioning, membership, and channel creation.

use quayd::db::{Database, DbError, ProfileUpdate, Visibility};
use uuid::Uuid;

async fn test_db() -> Database {
    Database::new(":memory:").await.expect("database")
}

#[tokio::test]
async fn ensure_user_is_idempotent() {
    let db = test_db().await;

    let first = db.users().ensure(42).await.expect("first contact");
    assert_eq!(first.id, 42);
    assert_eq!(first.username, "42");
    assert_eq!(first.display_name, "User42");
    assert!(first.avatar_url.is_none());

    // Repeated contact must not reset user-edited display fields.
    db.users()
        .update_profile(42, ProfileUpdate::DisplayName("Alice".to_string()))
        .await
        .expect("profile update");

    let again = db.users().ensure(42).await.expect("repeat contact");
    assert_eq!(again.id, 42);
    assert_eq!(again.username, "42");
    assert_eq!(again.display_name, "Alice");
}

#[tokio::test]
async fn ensure_user_concurrent_first_contact() {
    let db = test_db().await;

    let users = db.users();
    let (a, b) = tokio::join!(users.ensure(7), users.ensure(7));
    assert_eq!(a.expect("a").id, 7);
    assert_eq!(b.expect("b").id, 7);
}

#[tokio::test]
async fn profile_update_combinations() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("user");

    db.users()
        .update_profile(1, ProfileUpdate::AvatarUrl(Some("https://a.example/x.png".into())))
        .await
        .expect("avatar update");
    let user = db.users().find(1).await.expect("find").expect("exists");
    assert_eq!(user.display_name, "User1");
    assert_eq!(user.avatar_url.as_deref(), Some("https://a.example/x.png"));

    db.users()
        .update_profile(
            1,
            ProfileUpdate::Full {
                display_name: "One".to_string(),
                avatar_url: None,
            },
        )
        .await
        .expect("full update");
    let user = db.users().find(1).await.expect("find").expect("exists");
    assert_eq!(user.display_name, "One");
    assert!(user.avatar_url.is_none());
}

#[tokio::test]
async fn profile_update_unknown_user() {
    let db = test_db().await;
    let result = db
        .users()
        .update_profile(999, ProfileUpdate::DisplayName("ghost".into()))
        .await;
    assert!(matches!(result, Err(DbError::UserNotFound(999))));
}

#[tokio::test]
async fn create_server_provisions_membership_and_general() {
    let db = test_db().await;
    db.users().ensure(42).await.expect("user");

    let (server, general) = db
        .servers()
        .create(42, "Alice's Server", Visibility::Public)
        .await
        .expect("create server");

    assert_eq!(server.created_by, Some(42));
    assert_eq!(server.visibility, Visibility::Public);

    // Membership and the default channel are queryable immediately.
    assert!(db.servers().is_member(server.id, 42).await.expect("member"));

    let channels = db
        .channels()
        .list_for_server(server.id)
        .await
        .expect("channels");
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name, "general");
    assert_eq!(channels[0].id, general.id);
}

#[tokio::test]
async fn join_public_server_flows() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("owner");
    db.users().ensure(2).await.expect("joiner");

    let (public, _) = db
        .servers()
        .create(1, "Public", Visibility::Public)
        .await
        .expect("public server");
    let (private, _) = db
        .servers()
        .create(1, "Private", Visibility::Private)
        .await
        .expect("private server");

    // Joining a public server inserts a membership row.
    db.servers().join_public(2, public.id).await.expect("join");
    assert!(db.servers().is_member(public.id, 2).await.expect("member"));

    // Re-joining is a no-op, not an error.
    db.servers().join_public(2, public.id).await.expect("rejoin");
    let servers = db.servers().list_for_user(2).await.expect("list");
    assert_eq!(servers.len(), 1);

    // Private server: Forbidden, no membership insert.
    let result = db.servers().join_public(2, private.id).await;
    assert!(matches!(result, Err(DbError::ServerNotPublic(id)) if id == private.id));
    assert!(!db.servers().is_member(private.id, 2).await.expect("member"));

    // Non-existent server: NotFound.
    let ghost = Uuid::new_v4();
    let result = db.servers().join_public(2, ghost).await;
    assert!(matches!(result, Err(DbError::ServerNotFound(id)) if id == ghost));
}

#[tokio::test]
async fn create_channel_requires_membership() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("owner");
    db.users().ensure(2).await.expect("outsider");

    let (server, _) = db
        .servers()
        .create(1, "Server", Visibility::Private)
        .await
        .expect("server");

    let channel = db
        .channels()
        .create(1, server.id, "dev", Some("builds"))
        .await
        .expect("member may create");
    assert_eq!(channel.name, "dev");
    assert_eq!(channel.topic.as_deref(), Some("builds"));
    assert_eq!(channel.position, 1); // after "general"

    let result = db.channels().create(2, server.id, "intruder", None).await;
    assert!(matches!(result, Err(DbError::NotAMember)));
}

#[tokio::test]
async fn create_channel_conflicts_on_duplicate_name() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("user");

    let (server, _) = db
        .servers()
        .create(1, "Server", Visibility::Public)
        .await
        .expect("server");

    let result = db.channels().create(1, server.id, "general", None).await;
    assert!(matches!(result, Err(DbError::ChannelNameTaken(name)) if name == "general"));

    // Same name on a different server is fine.
    let (other, _) = db
        .servers()
        .create(1, "Other", Visibility::Public)
        .await
        .expect("other server");
    db.channels()
        .create(1, other.id, "dev", None)
        .await
        .expect("unique per server");
    db.channels()
        .create(1, server.id, "dev", None)
        .await
        .expect("same name, different server");
}

#[tokio::test]
async fn member_can_access_is_server_scoped() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("member");
    db.users().ensure(2).await.expect("outsider");

    let (_server, general) = db
        .servers()
        .create(1, "Server", Visibility::Private)
        .await
        .expect("server");

    assert!(
        db.channels()
            .member_can_access(general.id, 1)
            .await
            .expect("query")
    );
    assert!(
        !db.channels()
            .member_can_access(general.id, 2)
            .await
            .expect("query")
    );
    // Unknown channel is indistinguishable from no membership.
    assert!(
        !db.channels()
            .member_can_access(Uuid::new_v4(), 1)
            .await
            .expect("query")
    );
}

#[tokio::test]
async fn message_history_pages_in_insertion_order() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("user");
    let (_, general) = db
        .servers()
        .create(1, "Server", Visibility::Public)
        .await
        .expect("server");

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            db.messages()
                .append(general.id, 1, &format!("m{i}"))
                .await
                .expect("append"),
        );
    }

    // Ids are monotonic in append order.
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let newest = db
        .messages()
        .channel_history(general.id, 2, None)
        .await
        .expect("history");
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].content, "m3");
    assert_eq!(newest[1].content, "m4");

    let older = db
        .messages()
        .channel_history(general.id, 2, Some(newest[0].id))
        .await
        .expect("older page");
    assert_eq!(older.len(), 2);
    assert_eq!(older[0].content, "m1");
    assert_eq!(older[1].content, "m2");
}

#[tokio::test]
async fn message_join_reflects_current_profile() {
    let db = test_db().await;
    db.users().ensure(1).await.expect("user");
    let (_, general) = db
        .servers()
        .create(1, "Server", Visibility::Public)
        .await
        .expect("server");

    let id = db
        .messages()
        .append(general.id, 1, "hello")
        .await
        .expect("append");

    db.users()
        .update_profile(1, ProfileUpdate::DisplayName("Renamed".into()))
        .await
        .expect("rename");

    let record = db.messages().fetch_with_sender(id).await.expect("fetch");
    let sender = record.sender.expect("sender present");
    assert_eq!(sender.display_name, "Renamed");
    assert_eq!(record.content, "hello");
    assert_eq!(record.channel_id, general.id);
    assert!(record.edited_at.is_none());
}
