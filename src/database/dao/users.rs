use crate::database::entities::{Role, UserRecord, users};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

/// User accounts DAO. Account lifecycle is owned by the surrounding
/// platform; the security core needs live role/active/verified state plus
/// the mutations its own flows perform.
pub struct UsersDao {
    db: DatabaseConnection,
}

impl UsersDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, user: &UserRecord) -> DatabaseResult<i32> {
        let now = Utc::now();
        let active_model = users::ActiveModel {
            id: ActiveValue::NotSet,
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            role: Set(user.role),
            is_active: Set(user.is_active),
            email_verified: Set(user.email_verified),
            created_at: Set(now),
            updated_at: Set(now),
            last_login: Set(user.last_login),
        };

        let inserted = active_model
            .insert(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(inserted.id)
    }

    pub async fn find_by_id(&self, id: i32) -> DatabaseResult<Option<UserRecord>> {
        users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<UserRecord>> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn update_role(&self, id: i32, role: Role) -> DatabaseResult<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        let mut active_model = users::ActiveModel::from(user);
        active_model.role = Set(role);
        active_model.updated_at = Set(Utc::now());

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> DatabaseResult<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        let mut active_model = users::ActiveModel::from(user);
        active_model.is_active = Set(is_active);
        active_model.updated_at = Set(Utc::now());

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn set_email_verified(&self, id: i32, verified: bool) -> DatabaseResult<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        let mut active_model = users::ActiveModel::from(user);
        active_model.email_verified = Set(verified);
        active_model.updated_at = Set(Utc::now());

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn touch_last_login(&self, id: i32) -> DatabaseResult<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?
            .ok_or(DatabaseError::NotFound)?;

        let mut active_model = users::ActiveModel::from(user);
        active_model.last_login = Set(Some(Utc::now()));

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }
}
