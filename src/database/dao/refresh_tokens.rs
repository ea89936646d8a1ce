use crate::database::entities::{RefreshTokenRecord, RevocationReason, refresh_tokens};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait, sea_query::Expr,
};

/// Upper bound on chain traversal; a healthy chain is far shorter, this
/// only guards against corrupted back-references.
const MAX_CHAIN_LENGTH: usize = 10_000;

/// Fields the caller supplies when minting a refresh token record.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
    pub replaces_token_id: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewRefreshToken {
    fn into_active_model(self, created_at: DateTime<Utc>) -> refresh_tokens::ActiveModel {
        refresh_tokens::ActiveModel {
            id: ActiveValue::NotSet,
            token_hash: Set(self.token_hash),
            user_id: Set(self.user_id),
            created_at: Set(created_at),
            expires_at: Set(self.expires_at),
            last_used_at: Set(None),
            revoked: Set(false),
            revoked_at: Set(None),
            revoked_reason: Set(None),
            replaces_token_id: Set(self.replaces_token_id),
            replaced_by_token_id: Set(None),
            ip_address: Set(self.ip_address),
            user_agent: Set(self.user_agent),
        }
    }
}

/// Refresh tokens DAO: append-only chain storage plus the rotation and
/// revocation mutations.
pub struct RefreshTokensDao {
    db: DatabaseConnection,
}

impl RefreshTokensDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, token: NewRefreshToken) -> DatabaseResult<RefreshTokenRecord> {
        token
            .into_active_model(Utc::now())
            .insert(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> DatabaseResult<Option<RefreshTokenRecord>> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::TokenHash.eq(token_hash))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn find_by_id(&self, id: i32) -> DatabaseResult<Option<RefreshTokenRecord>> {
        refresh_tokens::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn touch_last_used(&self, id: i32) -> DatabaseResult<()> {
        refresh_tokens::Entity::update_many()
            .col_expr(
                refresh_tokens::Column::LastUsedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(refresh_tokens::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    /// Rotate `old_id` into a successor. Runs in a transaction: the
    /// successor is inserted and the predecessor marked rotated with its
    /// `replaced_by_token_id` link in one atomic step, so a failure leaves
    /// the old token valid rather than revoked-without-replacement.
    pub async fn rotate(
        &self,
        old_id: i32,
        successor: NewRefreshToken,
    ) -> DatabaseResult<RefreshTokenRecord> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        let old = refresh_tokens::Entity::find_by_id(old_id)
            .one(&txn)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        if old.revoked {
            return Err(DatabaseError::Constraint(
                "cannot rotate a revoked token".to_string(),
            ));
        }

        let mut successor = successor;
        successor.replaces_token_id = Some(old_id);
        let new_token = successor
            .into_active_model(Utc::now())
            .insert(&txn)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        let mut old_model = refresh_tokens::ActiveModel::from(old);
        old_model.revoked = Set(true);
        old_model.revoked_at = Set(Some(Utc::now()));
        old_model.revoked_reason = Set(Some(RevocationReason::Rotated));
        old_model.replaced_by_token_id = Set(Some(new_token.id));

        old_model
            .update(&txn)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(new_token)
    }

    pub async fn revoke(&self, id: i32, reason: RevocationReason) -> DatabaseResult<()> {
        let token = refresh_tokens::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        if token.revoked {
            return Ok(());
        }

        let mut active_model = refresh_tokens::ActiveModel::from(token);
        active_model.revoked = Set(true);
        active_model.revoked_at = Set(Some(Utc::now()));
        active_model.revoked_reason = Set(Some(reason));

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    /// Revoke every non-revoked token belonging to a user.
    pub async fn revoke_all_for_user(
        &self,
        user_id: i32,
        reason: RevocationReason,
    ) -> DatabaseResult<u64> {
        let result = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .col_expr(
                refresh_tokens::Column::RevokedAt,
                Expr::value(Some(Utc::now())),
            )
            .col_expr(
                refresh_tokens::Column::RevokedReason,
                Expr::value(Some(reason.to_value())),
            )
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Collect the whole chain a token belongs to, oldest first. Traversal
    /// is iterative lookup over the `replaces`/`replaced_by` links, never a
    /// recursive walk.
    pub async fn chain_members(
        &self,
        token: &RefreshTokenRecord,
    ) -> DatabaseResult<Vec<RefreshTokenRecord>> {
        let mut ancestors = Vec::new();
        let mut cursor = token.replaces_token_id;
        while let Some(id) = cursor {
            if ancestors.len() >= MAX_CHAIN_LENGTH {
                break;
            }
            match self.find_by_id(id).await? {
                Some(member) => {
                    cursor = member.replaces_token_id;
                    ancestors.push(member);
                }
                None => break,
            }
        }

        let mut descendants = Vec::new();
        let mut cursor = token.replaced_by_token_id;
        while let Some(id) = cursor {
            if descendants.len() >= MAX_CHAIN_LENGTH {
                break;
            }
            match self.find_by_id(id).await? {
                Some(member) => {
                    cursor = member.replaced_by_token_id;
                    descendants.push(member);
                }
                None => break,
            }
        }

        ancestors.reverse();
        ancestors.push(token.clone());
        ancestors.extend(descendants);
        Ok(ancestors)
    }

    pub async fn count_active_for_user(&self, user_id: i32) -> DatabaseResult<u64> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(Utc::now()))
            .count(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn count_for_user(&self, user_id: i32) -> DatabaseResult<u64> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .count(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    /// Delete tokens past their expiry, ending their chains.
    pub async fn cleanup_expired(&self) -> DatabaseResult<u64> {
        let result = refresh_tokens::Entity::delete_many()
            .filter(refresh_tokens::Column::ExpiresAt.lt(Utc::now()))
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
