//! Users, categories, departments, and operators.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{short_id, Category, Department, Operator, Role, User};
use crate::error::AppError;

use super::Store;

/// Fields for an explicit user registration. Auth itself (passwords, tokens)
/// lives in the external auth service; we only keep the record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub phone: Option<String>,
}

impl Store {
    /// Fetch the author by id, creating a placeholder client when the caller
    /// is unauthenticated or unknown. Ingestion must never fail on a missing
    /// user row.
    pub async fn upsert_author(&self, id: Uuid, now: DateTime<Utc>) -> Result<User, AppError> {
        if let Some(user) = self.user(id).await? {
            return Ok(user);
        }

        let user = User {
            id,
            email: format!("user_{}@example.invalid", short_id(&id)),
            name: "Auto-created user".into(),
            role: Role::Client,
            password_hash: None,
            phone: None,
            created_at: now,
        };
        sqlx::query(
            "INSERT INTO users (id, email, name, role, password_hash, phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    /// Register a user. Email is normalized (trim + lowercase) before the
    /// unique check, so `Bob@x.com ` and `bob@x.com` collide.
    pub async fn create_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AppError::InvalidInput("email must not be empty".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email,
            name: new.name,
            role: new.role,
            password_hash: new.password_hash,
            phone: new.phone,
            created_at: now,
        };
        sqlx::query(
            "INSERT INTO users (id, email, name, role, password_hash, phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("email already registered".into()),
            other => other,
        })?;
        Ok(user)
    }

    pub async fn user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn admins(&self) -> Result<Vec<User>, AppError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = 'admin'")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Find a category by name (case-insensitive), creating it when the
    /// classifier names one we have not seen before.
    pub async fn ensure_category(&self, name: &str) -> Result<Category, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("category name must not be empty".into()));
        }
        if let Some(existing) =
            sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE name = ? COLLATE NOCASE")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
        {
            return Ok(existing);
        }

        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            sla_minutes: None,
        };
        sqlx::query(
            "INSERT INTO categories (id, name, description, sla_minutes) VALUES (?, ?, ?, ?)",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.sla_minutes)
        .execute(&self.pool)
        .await?;
        Ok(category)
    }

    pub async fn category(&self, id: Uuid) -> Result<Option<Category>, AppError> {
        Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn department_by_name(&self, name: &str) -> Result<Option<Department>, AppError> {
        Ok(sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn create_operator(
        &self,
        user_id: Uuid,
        department_id: Option<Uuid>,
    ) -> Result<Operator, AppError> {
        let operator = Operator { id: Uuid::new_v4(), user_id, department_id, is_active: true };
        sqlx::query(
            "INSERT INTO operators (id, user_id, department_id, is_active) VALUES (?, ?, ?, ?)",
        )
        .bind(operator.id)
        .bind(operator.user_id)
        .bind(operator.department_id)
        .bind(operator.is_active)
        .execute(&self.pool)
        .await?;
        Ok(operator)
    }

    pub async fn operator(&self, id: Uuid) -> Result<Option<Operator>, AppError> {
        Ok(sqlx::query_as::<_, Operator>("SELECT * FROM operators WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::memory_store;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            email: email.into(),
            name: "Someone".into(),
            role,
            password_hash: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn upsert_author_creates_a_placeholder_once() {
        let store = memory_store().await;
        let id = Uuid::new_v4();
        let now = Utc::now();

        let created = store.upsert_author(id, now).await.unwrap();
        assert_eq!(created.role, Role::Client);
        assert!(created.email.starts_with("user_"));

        let again = store.upsert_author(id, now).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.email, created.email);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_even_with_case_and_whitespace() {
        let store = memory_store().await;
        let now = Utc::now();
        store.create_user(new_user("bob@example.com", Role::Client), now).await.unwrap();

        let err = store
            .create_user(new_user("  BOB@Example.COM ", Role::Client), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn admins_returns_only_admin_users() {
        let store = memory_store().await;
        let now = Utc::now();
        store.create_user(new_user("a@example.com", Role::Admin), now).await.unwrap();
        store.create_user(new_user("b@example.com", Role::Admin), now).await.unwrap();
        store.create_user(new_user("c@example.com", Role::Client), now).await.unwrap();

        let admins = store.admins().await.unwrap();
        assert_eq!(admins.len(), 2);
        assert!(admins.iter().all(User::is_admin));
    }

    #[tokio::test]
    async fn ensure_category_reuses_case_insensitive_matches() {
        let store = memory_store().await;
        let first = store.ensure_category("Billing").await.unwrap();
        let second = store.ensure_category("billing").await.unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ensure_category_rejects_blank_names() {
        let store = memory_store().await;
        assert!(matches!(
            store.ensure_category("   ").await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn operator_round_trip() {
        let store = memory_store().await;
        let now = Utc::now();
        let user = store.create_user(new_user("op@example.com", Role::Employee), now).await.unwrap();
        let dept = store.department_by_name("TechSupport").await.unwrap().unwrap();

        let operator = store.create_operator(user.id, Some(dept.id)).await.unwrap();
        let fetched = store.operator(operator.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, user.id);
        assert_eq!(fetched.department_id, Some(dept.id));
        assert!(fetched.is_active);
    }
}
