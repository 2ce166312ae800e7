//! Repository-level tests for the messaging database crate

use chrono::Utc;
use messaging_config::DatabaseConfig;
use messaging_database::{
    initialize_database, ConversationRepository, DatabaseError, MessageFilter, MessageOrder,
    MessageRepository, NewMessage, NewUser, NotificationRepository, Pagination, User,
    UserProfileUpdate, UserRepository,
};
use sqlx::SqlitePool;
use tempfile::TempDir;

struct TestContext {
    pool: SqlitePool,
    users: UserRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
    notifications: NotificationRepository,
    _temp_dir: TempDir,
}

impl TestContext {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("repository.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 4,
        };
        let pool = initialize_database(&config)
            .await
            .expect("database should initialise");

        Self {
            users: UserRepository::new(pool.clone()),
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            notifications: NotificationRepository::new(pool.clone()),
            pool,
            _temp_dir: temp_dir,
        }
    }

    async fn user(&self, email: &str) -> User {
        self.users
            .create(&NewUser {
                email: email.to_string(),
                password_hash: "not-a-real-hash".to_string(),
                first_name: email.split('@').next().unwrap_or_default().to_string(),
                ..NewUser::default()
            })
            .await
            .expect("user should be created")
    }

    async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.pool).await.unwrap()
    }

    async fn send(&self, conversation_id: i64, sender: &User, content: &str) -> messaging_database::Message {
        self.messages
            .create(&NewMessage {
                conversation_id,
                sender_id: sender.id,
                content: content.to_string(),
                parent_message_id: None,
            })
            .await
            .expect("message should be created")
    }
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.user("alice@example.com").await;

    let error = ctx
        .users
        .create(&NewUser {
            email: "alice@example.com".into(),
            password_hash: "x".into(),
            ..NewUser::default()
        })
        .await
        .expect_err("duplicate email must fail");

    assert!(matches!(error, DatabaseError::Duplicate(_)));
}

#[tokio::test]
async fn lookup_by_email_ignores_case_and_identifier_resolves_both_forms() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;

    let by_email = ctx.users.find_by_email("ALICE@example.com").await.unwrap();
    assert_eq!(by_email.map(|u| u.id), Some(alice.id));

    let by_public = ctx.users.find_by_identifier(&alice.public_id).await.unwrap();
    assert_eq!(by_public.map(|u| u.id), Some(alice.id));
}

#[tokio::test]
async fn profile_update_only_touches_given_fields() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;

    let updated = ctx
        .users
        .update_profile(
            alice.id,
            &UserProfileUpdate {
                last_name: Some("Liddell".into()),
                phone_number: Some("+4912345".into()),
                ..UserProfileUpdate::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name, "alice");
    assert_eq!(updated.last_name, "Liddell");
    assert_eq!(updated.phone_number.as_deref(), Some("+4912345"));
    assert_eq!(updated.email, alice.email);
}

#[tokio::test]
async fn creating_a_message_notifies_only_the_other_participant() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();

    let message = ctx.send(conversation.id, &alice, "hello bob").await;

    assert_eq!(ctx.count("SELECT COUNT(*) FROM notifications").await, 1);
    assert_eq!(ctx.notifications.unread_count(bob.id).await.unwrap(), 1);
    assert_eq!(ctx.notifications.unread_count(alice.id).await.unwrap(), 0);

    let page = ctx
        .notifications
        .list_for_user(bob.id, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].message_public_id, message.public_id);
    assert_eq!(page.items[0].sender_email, "alice@example.com");
}

#[tokio::test]
async fn group_messages_notify_every_other_participant() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let carol = ctx.user("carol@example.com").await;
    let conversation = ctx
        .conversations
        .create(alice.id, Some("team"), &[bob.id, carol.id, bob.id])
        .await
        .unwrap();

    assert_eq!(ctx.conversations.participants(conversation.id).await.unwrap().len(), 3);

    ctx.send(conversation.id, &bob, "hi all").await;
    assert_eq!(ctx.count("SELECT COUNT(*) FROM notifications").await, 2);
    assert_eq!(ctx.notifications.unread_count(bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn editing_content_appends_exactly_one_history_row() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();
    let message = ctx.send(conversation.id, &alice, "first draft").await;

    let (edited, changed) = ctx
        .messages
        .update_content(message.id, "second draft", alice.id)
        .await
        .unwrap();
    assert!(changed);
    assert!(edited.is_edited);
    assert_eq!(edited.content, "second draft");
    assert!(edited.edited_at.is_some());

    let (_, changed_again) = ctx
        .messages
        .update_content(message.id, "second draft", alice.id)
        .await
        .unwrap();
    assert!(!changed_again);

    let history = ctx.messages.history(message.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_content, "first draft");
    assert_eq!(history[0].editor_email.as_deref(), Some("alice@example.com"));
}

#[tokio::test]
async fn history_is_listed_newest_first() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[]).await.unwrap();
    let message = ctx.send(conversation.id, &alice, "v1").await;

    ctx.messages.update_content(message.id, "v2", alice.id).await.unwrap();
    ctx.messages.update_content(message.id, "v3", alice.id).await.unwrap();

    let history = ctx.messages.history(message.id).await.unwrap();
    let contents: Vec<_> = history.iter().map(|h| h.old_content.as_str()).collect();
    assert_eq!(contents, vec!["v2", "v1"]);
}

#[tokio::test]
async fn deleting_a_user_removes_their_messages_notifications_and_history() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();

    let from_alice = ctx.send(conversation.id, &alice, "ping").await;
    ctx.messages.update_content(from_alice.id, "ping!", alice.id).await.unwrap();
    ctx.send(conversation.id, &bob, "pong").await;

    let cleanup = ctx.users.delete(alice.id).await.unwrap();
    assert_eq!(cleanup.messages, 1);
    assert_eq!(cleanup.notifications, 1);
    assert_eq!(cleanup.history, 1);

    assert_eq!(ctx.count("SELECT COUNT(*) FROM messages").await, 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM message_history").await, 0);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM notifications").await, 0);
    assert!(ctx.users.find_by_id(alice.id).await.unwrap().is_none());

    // the conversation survives without its creator
    let remaining = ctx.conversations.find_by_public_id(&conversation.public_id).await.unwrap();
    assert_eq!(remaining.and_then(|c| c.created_by), None);
}

#[tokio::test]
async fn replies_must_stay_in_the_parent_conversation() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let first = ctx.conversations.create(alice.id, None, &[]).await.unwrap();
    let second = ctx.conversations.create(alice.id, None, &[]).await.unwrap();
    let parent = ctx.send(first.id, &alice, "root").await;

    let error = ctx
        .messages
        .create(&NewMessage {
            conversation_id: second.id,
            sender_id: alice.id,
            content: "misplaced".into(),
            parent_message_id: Some(parent.id),
        })
        .await
        .expect_err("cross-conversation reply must fail");

    assert!(matches!(error, DatabaseError::ValidationError(_)));
}

#[tokio::test]
async fn thread_nests_replies_recursively() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();

    let root = ctx.send(conversation.id, &alice, "root").await;
    let reply = |parent: i64, sender: i64, content: &str| NewMessage {
        conversation_id: conversation.id,
        sender_id: sender,
        content: content.to_string(),
        parent_message_id: Some(parent),
    };
    let first = ctx.messages.create(&reply(root.id, bob.id, "reply 1")).await.unwrap();
    ctx.messages.create(&reply(first.id, alice.id, "reply 1.1")).await.unwrap();
    ctx.messages.create(&reply(root.id, alice.id, "reply 2")).await.unwrap();
    ctx.send(conversation.id, &bob, "unrelated").await;

    let thread = ctx.messages.thread(root.id).await.unwrap().expect("thread exists");
    assert_eq!(thread.message_count(), 4);
    assert_eq!(thread.replies.len(), 2);
    assert_eq!(thread.replies[0].message.content, "reply 1");
    assert_eq!(thread.replies[0].replies[0].message.content, "reply 1.1");
    assert_eq!(
        thread.replies[0].replies[0].message.parent_public_id.as_deref(),
        Some(first.public_id.as_str())
    );

    assert!(ctx.messages.thread(9_999).await.unwrap().is_none());
}

#[tokio::test]
async fn message_listing_respects_visibility_and_filters() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let mallory = ctx.user("mallory@example.com").await;
    let shared = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();
    let private = ctx.conversations.create(mallory.id, None, &[]).await.unwrap();

    ctx.send(shared.id, &alice, "Hello Bob").await;
    ctx.send(shared.id, &bob, "hello alice").await;
    ctx.send(private.id, &mallory, "hello nobody").await;

    let visible = ctx
        .messages
        .list(&MessageFilter::visible_to(bob.id), MessageOrder::NewestFirst, Pagination::default())
        .await
        .unwrap();
    assert_eq!(visible.total, 2);
    assert_eq!(visible.items[0].content, "hello alice");

    let received = MessageFilter {
        receiver: Some(bob.id),
        ..MessageFilter::visible_to(bob.id)
    };
    let page = ctx
        .messages
        .list(&received, MessageOrder::OldestFirst, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].sender_email, "alice@example.com");

    let search = MessageFilter {
        search: Some("HELLO".into()),
        ..MessageFilter::default()
    };
    let everything = ctx
        .messages
        .list(&search, MessageOrder::OldestFirst, Pagination::new(2, 0))
        .await
        .unwrap();
    assert_eq!(everything.total, 3);
    assert_eq!(everything.items.len(), 2);

    let today = Utc::now().date_naive();
    let dated = MessageFilter::visible_to(alice.id)
        .from_date(today)
        .until_date(today);
    let page = ctx
        .messages
        .list(&dated, MessageOrder::OldestFirst, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let yesterday = today.pred_opt().unwrap();
    let stale = MessageFilter::visible_to(alice.id).until_date(yesterday);
    let page = ctx
        .messages
        .list(&stale, MessageOrder::OldestFirst, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn conversations_are_listed_by_latest_activity_with_search() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let carol = ctx.user("carol@example.com").await;

    let with_bob = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();
    let with_carol = ctx.conversations.create(alice.id, None, &[carol.id]).await.unwrap();
    ctx.send(with_bob.id, &bob, "latest").await;

    let page = ctx
        .conversations
        .list_for_user(alice.id, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].public_id, with_bob.public_id);
    assert_eq!(page.items[0].message_count, 1);
    assert_eq!(page.items[1].public_id, with_carol.public_id);
    assert!(page.items[1].last_message_at.is_none());

    let page = ctx
        .conversations
        .list_for_user(alice.id, Some("carol"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].public_id, with_carol.public_id);

    let bobs = ctx
        .conversations
        .list_for_user(bob.id, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(bobs.total, 1);
}

#[tokio::test]
async fn unread_messages_follow_notification_state() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[bob.id]).await.unwrap();

    ctx.send(conversation.id, &alice, "one").await;
    ctx.send(conversation.id, &alice, "two").await;

    let unread = ctx.messages.unread_for_user(bob.id, Pagination::default()).await.unwrap();
    assert_eq!(unread.total, 2);
    assert_eq!(unread.items[0].content, "two");

    let notifications = ctx
        .notifications
        .list_for_user(bob.id, true, Pagination::default())
        .await
        .unwrap();
    let first = &notifications.items[0];
    let marked = ctx.notifications.mark_read(bob.id, first.id).await.unwrap();
    assert!(marked.map(|n| n.is_read).unwrap_or(false));
    assert!(ctx.notifications.mark_read(alice.id, first.id).await.unwrap().is_none());

    assert_eq!(ctx.messages.unread_for_user(bob.id, Pagination::default()).await.unwrap().total, 1);
    assert_eq!(ctx.notifications.mark_all_read(bob.id).await.unwrap(), 1);
    assert_eq!(ctx.notifications.unread_count(bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn staff_flag_and_participation_checks() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice@example.com").await;
    let bob = ctx.user("bob@example.com").await;
    let conversation = ctx.conversations.create(alice.id, None, &[]).await.unwrap();

    assert!(ctx.conversations.is_participant(conversation.id, alice.id).await.unwrap());
    assert!(!ctx.conversations.is_participant(conversation.id, bob.id).await.unwrap());

    let (unchanged, added) = ctx
        .conversations
        .update(conversation.id, None, &[bob.id, alice.id])
        .await
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(unchanged.title, None);
    assert!(ctx.conversations.is_participant(conversation.id, bob.id).await.unwrap());

    let (renamed, added) = ctx
        .conversations
        .update(conversation.id, Some(Some("Standup")), &[bob.id])
        .await
        .unwrap();
    assert_eq!(added, 0);
    assert_eq!(renamed.title.as_deref(), Some("Standup"));

    let missing = ctx.conversations.update(conversation.id + 1000, Some(None), &[]).await;
    assert!(matches!(missing, Err(DatabaseError::NotFound(_))));

    assert!(ctx.users.set_staff("bob@example.com", true).await.unwrap());
    assert!(!ctx.users.set_staff("nobody@example.com", true).await.unwrap());
    assert!(ctx.users.find_by_id(bob.id).await.unwrap().unwrap().is_staff);

    assert!(ctx.conversations.delete(conversation.id).await.unwrap());
    assert_eq!(ctx.count("SELECT COUNT(*) FROM conversation_participants").await, 0);
}
