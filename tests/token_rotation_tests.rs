//! Refresh-token lifecycle: rotation chains, reuse detection, revocation.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use wordvault_auth::auth::tokens::{TokenMetadata, hash_refresh_token};
use wordvault_auth::database::AuditLogQueryParams;
use wordvault_auth::database::entities::refresh_tokens;
use wordvault_auth::database::entities::{AuditAction, AuditSeverity, RevocationReason, Role};
use wordvault_auth::error::AuthError;
use wordvault_auth::test_utils::{TestServerBuilder, create_test_user};

fn metadata() -> TokenMetadata {
    TokenMetadata {
        ip_address: Some("203.0.113.10".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

#[tokio::test]
async fn test_raw_token_never_equals_stored_hash() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "hash_user", Role::User).await;

    let pair = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap();

    let stored = server
        .database
        .refresh_tokens()
        .find_by_hash(&hash_refresh_token(&pair.refresh_token))
        .await
        .unwrap()
        .expect("token record should exist");

    assert_ne!(pair.refresh_token, stored.token_hash);
    assert_eq!(stored.user_id, user_id);
    assert_eq!(stored.ip_address.as_deref(), Some("203.0.113.10"));
    assert!(!stored.revoked);
}

#[tokio::test]
async fn test_rotating_n_times_yields_chain_with_single_live_tail() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "chain_user", Role::User).await;

    let mut raw = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    for _ in 0..4 {
        raw = server
            .token_service
            .refresh_tokens(&raw, &metadata())
            .await
            .unwrap()
            .refresh_token;
    }

    let dao = server.database.refresh_tokens();
    assert_eq!(dao.count_for_user(user_id).await.unwrap(), 5);
    assert_eq!(dao.count_active_for_user(user_id).await.unwrap(), 1);

    let tail = dao
        .find_by_hash(&hash_refresh_token(&raw))
        .await
        .unwrap()
        .unwrap();
    assert!(tail.is_usable());
    assert!(tail.replaced_by_token_id.is_none());

    // Walk the chain: every revoked predecessor links to its immediate
    // successor and carries the rotation reason.
    let chain = dao.chain_members(&tail).await.unwrap();
    assert_eq!(chain.len(), 5);
    for pair in chain.windows(2) {
        let (older, newer) = (&pair[0], &pair[1]);
        assert_eq!(older.replaced_by_token_id, Some(newer.id));
        assert_eq!(newer.replaces_token_id, Some(older.id));
        assert!(older.revoked);
        assert_eq!(older.revoked_reason, Some(RevocationReason::Rotated));
    }
}

#[tokio::test]
async fn test_replaying_rotated_token_revokes_whole_chain_and_audits_critical() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "victim", Role::User).await;

    let stolen = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    // Legitimate client rotates twice; the attacker still holds `stolen`.
    let second = server
        .token_service
        .refresh_tokens(&stolen, &metadata())
        .await
        .unwrap()
        .refresh_token;
    let third = server
        .token_service
        .refresh_tokens(&second, &metadata())
        .await
        .unwrap()
        .refresh_token;

    let result = server
        .token_service
        .refresh_tokens(&stolen, &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::TokenReuseDetected)));

    // The whole chain is dead, including the newest token.
    let dao = server.database.refresh_tokens();
    assert_eq!(dao.count_active_for_user(user_id).await.unwrap(), 0);
    let tail = dao
        .find_by_hash(&hash_refresh_token(&third))
        .await
        .unwrap()
        .unwrap();
    assert!(tail.revoked);
    assert_eq!(tail.revoked_reason, Some(RevocationReason::ReuseDetected));

    // And the legitimate holder is locked out too.
    let result = server
        .token_service
        .refresh_tokens(&third, &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));

    // At least one critical audit event records the detection.
    let page = server
        .audit
        .query(AuditLogQueryParams {
            action: Some(AuditAction::TokenReuse),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(page.total >= 1);
    assert_eq!(page.records[0].severity, AuditSeverity::Critical);
    assert_eq!(page.records[0].user_id, Some(user_id));
}

#[tokio::test]
async fn test_logout_revocation_is_not_treated_as_reuse() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "two_sessions", Role::User).await;

    let session_a = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;
    let session_b = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    server
        .token_service
        .revoke_refresh_token(&session_a, RevocationReason::Logout, &metadata())
        .await
        .unwrap();

    // Presenting the logged-out token is a plain failure, not a theft
    // signal, and must not nuke the other session.
    let result = server
        .token_service
        .refresh_tokens(&session_a, &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));

    assert!(
        server
            .token_service
            .refresh_tokens(&session_b, &metadata())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_expired_token_is_rejected_and_purged_by_cleanup() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "expired_user", Role::User).await;

    let raw = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    // Backdate the expiry directly in storage.
    let record = server
        .database
        .refresh_tokens()
        .find_by_hash(&hash_refresh_token(&raw))
        .await
        .unwrap()
        .unwrap();
    let mut model = refresh_tokens::ActiveModel::from(record);
    model.expires_at = Set(Utc::now() - Duration::hours(1));
    model.update(server.database.connection()).await.unwrap();

    let result = server.token_service.refresh_tokens(&raw, &metadata()).await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));

    let removed = server
        .database
        .refresh_tokens()
        .cleanup_expired()
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        server
            .database
            .refresh_tokens()
            .count_for_user(user_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let server = TestServerBuilder::new().build().await;

    let result = server
        .token_service
        .refresh_tokens("completely-made-up-value", &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_refresh_returns_verifiable_access_token() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "refresher", Role::Contributor).await;

    let first = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap();
    let second = server
        .token_service
        .refresh_tokens(&first.refresh_token, &metadata())
        .await
        .unwrap();

    let claims = server.issuer.verify(&second.access_token).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, Role::Contributor);
    assert_eq!(second.expires_in, server.config.jwt.access_token_ttl_secs);

    // The successor refresh token is itself usable exactly once.
    assert!(
        server
            .token_service
            .refresh_tokens(&second.refresh_token, &metadata())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_revoke_all_user_tokens_ends_every_session() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "everywhere", Role::User).await;

    for _ in 0..3 {
        server
            .token_service
            .generate_token_pair(user_id, &metadata())
            .await
            .unwrap();
    }

    let revoked = server
        .token_service
        .revoke_all_user_tokens(user_id, RevocationReason::Logout, &metadata())
        .await
        .unwrap();
    assert_eq!(revoked, 3);
    assert_eq!(
        server
            .database
            .refresh_tokens()
            .count_active_for_user(user_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_inactive_account_cannot_login_or_refresh() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "suspended", Role::User).await;

    let raw = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    server
        .database
        .users()
        .set_active(user_id, false)
        .await
        .unwrap();

    let result = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::SecurityViolation(_))));

    let result = server.token_service.refresh_tokens(&raw, &metadata()).await;
    assert!(matches!(result, Err(AuthError::SecurityViolation(_))));
}

#[tokio::test]
async fn test_last_used_is_touched_on_validation() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "touched", Role::User).await;

    let raw = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    let hash = hash_refresh_token(&raw);
    let before = server
        .database
        .refresh_tokens()
        .find_by_hash(&hash)
        .await
        .unwrap()
        .unwrap();
    assert!(before.last_used_at.is_none());

    server
        .token_service
        .validate(&raw, &metadata())
        .await
        .unwrap();

    let after = server
        .database
        .refresh_tokens()
        .find_by_hash(&hash)
        .await
        .unwrap()
        .unwrap();
    assert!(after.last_used_at.is_some());
}

#[tokio::test]
async fn test_chain_revocation_is_scoped_to_its_own_chain() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "parallel", Role::User).await;

    // Two independent chains for the same user.
    let chain_a = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;
    let chain_b = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;

    let rotated_a = server
        .token_service
        .refresh_tokens(&chain_a, &metadata())
        .await
        .unwrap()
        .refresh_token;

    // Replay on chain A revokes both of its members but leaves chain B
    // untouched.
    let result = server
        .token_service
        .refresh_tokens(&chain_a, &metadata())
        .await;
    assert!(matches!(result, Err(AuthError::TokenReuseDetected)));

    let dao = server.database.refresh_tokens();
    let rotated_a_record = dao
        .find_by_hash(&hash_refresh_token(&rotated_a))
        .await
        .unwrap()
        .unwrap();
    assert!(rotated_a_record.revoked);

    let chain_b_record = dao
        .find_by_hash(&hash_refresh_token(&chain_b))
        .await
        .unwrap()
        .unwrap();
    assert!(chain_b_record.is_usable());

    // The orthogonal chain stays fully functional.
    assert!(
        server
            .token_service
            .refresh_tokens(&chain_b, &metadata())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_rotation_inserts_exactly_one_row_per_refresh() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "row_counter", Role::User).await;

    let mut raw = server
        .token_service
        .generate_token_pair(user_id, &metadata())
        .await
        .unwrap()
        .refresh_token;
    for _ in 0..2 {
        raw = server
            .token_service
            .refresh_tokens(&raw, &metadata())
            .await
            .unwrap()
            .refresh_token;
    }

    let rows = refresh_tokens::Entity::find()
        .filter(refresh_tokens::Column::UserId.eq(user_id))
        .all(server.database.connection())
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| !r.revoked).count(), 1);
}
