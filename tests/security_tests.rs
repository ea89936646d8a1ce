//! Authorization guard behavior: role hierarchy, live-state checks,
//! escalation detection, fail-closed persistence errors.

use sea_orm::ConnectionTrait;
use wordvault_auth::auth::authorization::{RequestContext, RouteRequirement};
use wordvault_auth::database::AuditLogQueryParams;
use wordvault_auth::database::entities::{AuditAction, Role};
use wordvault_auth::error::{AuthError, SecurityViolation};
use wordvault_auth::test_utils::{TestServerBuilder, create_test_user, create_test_user_with_state};

fn context(user_id: i32, token_role: Role) -> RequestContext {
    RequestContext {
        user_id,
        token_role,
        ip_address: Some("198.51.100.4".to_string()),
        user_agent: Some("guard-test".to_string()),
    }
}

#[tokio::test]
async fn test_open_routes_skip_the_account_fetch() {
    let server = TestServerBuilder::new().build().await;

    // No account exists for this id; an open route must still pass.
    let result = server
        .guard
        .can_activate(&context(9999, Role::User), &RouteRequirement::default())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_role_hierarchy_is_enforced() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "plain_user", Role::User).await;
    let contributor_id = create_test_user(&server.database, "contributor", Role::Contributor).await;
    let superadmin_id = create_test_user(&server.database, "root", Role::SuperAdmin).await;

    let requirement = RouteRequirement::role(Role::Contributor);

    let result = server
        .guard
        .can_activate(&context(user_id, Role::User), &requirement)
        .await;
    assert!(matches!(result, Err(AuthError::PermissionDenied)));

    let allowed = server
        .guard
        .can_activate(&context(contributor_id, Role::Contributor), &requirement)
        .await
        .unwrap();
    assert_eq!(allowed.unwrap().id, contributor_id);

    // Higher roles satisfy lower requirements.
    let allowed = server
        .guard
        .can_activate(&context(superadmin_id, Role::SuperAdmin), &requirement)
        .await
        .unwrap();
    assert_eq!(allowed.unwrap().id, superadmin_id);
}

#[tokio::test]
async fn test_role_escalation_attempt_is_denied_and_logs_both_roles() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "escalator", Role::User).await;

    // Token claims admin, persisted role is user.
    let result = server
        .guard
        .can_activate(
            &context(user_id, Role::Admin),
            &RouteRequirement::role(Role::User),
        )
        .await;
    assert!(matches!(
        result,
        Err(AuthError::SecurityViolation(
            SecurityViolation::RoleEscalationAttempt
        ))
    ));

    let page = server
        .audit
        .query(AuditLogQueryParams {
            action: Some(AuditAction::SecurityViolation),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(page.total >= 1);

    let event = &page.records[0];
    assert_eq!(event.user_id, Some(user_id));
    assert_eq!(
        event.error_message.as_deref(),
        Some("role_escalation_attempt")
    );
    let states = event.before_state.as_deref().unwrap();
    assert!(states.contains("\"token_role\":\"admin\""));
    assert!(states.contains("\"db_role\":\"user\""));
}

#[tokio::test]
async fn test_inactive_account_is_denied_regardless_of_role() {
    let server = TestServerBuilder::new().build().await;
    let user_id =
        create_test_user_with_state(&server.database, "frozen_admin", Role::Admin, false, true)
            .await;

    let result = server
        .guard
        .can_activate(
            &context(user_id, Role::Admin),
            &RouteRequirement::role(Role::User),
        )
        .await;
    assert!(matches!(
        result,
        Err(AuthError::SecurityViolation(
            SecurityViolation::InactiveUserAccess
        ))
    ));
}

#[tokio::test]
async fn test_unverified_email_blocks_sensitive_routes_only() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user_with_state(
        &server.database,
        "unverified_admin",
        Role::Admin,
        true,
        false,
    )
    .await;

    let result = server
        .guard
        .can_activate(
            &context(user_id, Role::Admin),
            &RouteRequirement::sensitive_role(Role::Admin),
        )
        .await;
    assert!(matches!(
        result,
        Err(AuthError::SecurityViolation(
            SecurityViolation::UnverifiedEmailAccess
        ))
    ));

    // The same account passes a non-sensitive requirement.
    let allowed = server
        .guard
        .can_activate(
            &context(user_id, Role::Admin),
            &RouteRequirement::role(Role::Admin),
        )
        .await
        .unwrap();
    assert!(allowed.is_some());
}

#[tokio::test]
async fn test_unknown_account_is_denied() {
    let server = TestServerBuilder::new().build().await;

    let result = server
        .guard
        .can_activate(
            &context(424242, Role::User),
            &RouteRequirement::role(Role::User),
        )
        .await;
    assert!(matches!(result, Err(AuthError::PermissionDenied)));
}

#[tokio::test]
async fn test_persistence_error_fails_closed() {
    let server = TestServerBuilder::new().build().await;
    let user_id = create_test_user(&server.database, "orphaned", Role::Admin).await;

    // Break the users table out from under the guard.
    server
        .database
        .connection()
        .execute_unprepared("DROP TABLE users")
        .await
        .unwrap();

    let result = server
        .guard
        .can_activate(
            &context(user_id, Role::Admin),
            &RouteRequirement::role(Role::Admin),
        )
        .await;
    assert!(matches!(
        result,
        Err(AuthError::SecurityViolation(
            SecurityViolation::DatabaseErrorDuringAuth
        ))
    ));
}

#[tokio::test]
async fn test_admin_access_is_audited() {
    let server = TestServerBuilder::new().build().await;
    let admin_id = create_test_user(&server.database, "auditor", Role::Admin).await;

    server
        .guard
        .can_activate(
            &context(admin_id, Role::Admin),
            &RouteRequirement::sensitive_role(Role::Admin),
        )
        .await
        .unwrap();

    let page = server
        .audit
        .query(AuditLogQueryParams {
            action: Some(AuditAction::AdminAccess),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(page.records[0].success);
    assert_eq!(page.records[0].username.as_deref(), Some("auditor"));
}
