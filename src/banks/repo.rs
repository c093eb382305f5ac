use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// One (user, bank) linking relationship. Token columns hold ciphertext,
/// never raw bank tokens.
#[derive(Debug, Clone, FromRow)]
pub struct BankConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<OffsetDateTime>,
    pub consent_id: Option<String>,
    pub consent_status: String,
    pub is_active: bool,
    pub connected_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub last_sync_at: Option<OffsetDateTime>,
}

pub struct NewConnection<'a> {
    pub user_id: Uuid,
    pub bank_code: &'a str,
    pub bank_name: &'a str,
    pub client_id: Option<&'a str>,
    pub client_secret: Option<&'a str>,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub token_expires_at: Option<OffsetDateTime>,
}

const COLUMNS: &str = r#"id, user_id, bank_code, bank_name, client_id, client_secret,
       access_token, refresh_token, token_expires_at, consent_id, consent_status,
       is_active, connected_at, revoked_at, last_sync_at"#;

impl BankConnection {
    /// The caller's active connection to one bank, if any. Scoping by
    /// user_id here is what makes foreign connections look like "not
    /// connected".
    pub async fn find_active(
        db: &PgPool,
        user_id: Uuid,
        bank_code: &str,
    ) -> anyhow::Result<Option<BankConnection>> {
        let row = sqlx::query_as::<_, BankConnection>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM bank_connections
            WHERE user_id = $1 AND bank_code = $2 AND is_active
            "#
        ))
        .bind(user_id)
        .bind(bank_code)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// All of the caller's connections, active and revoked, newest first.
    pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<BankConnection>> {
        let rows = sqlx::query_as::<_, BankConnection>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM bank_connections
            WHERE user_id = $1
            ORDER BY connected_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn insert(db: &PgPool, new: NewConnection<'_>) -> anyhow::Result<BankConnection> {
        let row = sqlx::query_as::<_, BankConnection>(&format!(
            r#"
            INSERT INTO bank_connections
                (user_id, bank_code, bank_name, client_id, client_secret,
                 access_token, refresh_token, token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.bank_code)
        .bind(new.bank_name)
        .bind(new.client_id)
        .bind(new.client_secret)
        .bind(new.access_token)
        .bind(new.refresh_token)
        .bind(new.token_expires_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Soft delete: flip the activity flag and stamp revoked_at. The row
    /// stays behind as history; reconnecting inserts a new row.
    pub async fn revoke(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE bank_connections
            SET is_active = FALSE, revoked_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Merge the bank's consent answer into the row. Status and id are only
    /// overwritten when the bank supplied them; last_sync_at is always
    /// stamped since the outbound call succeeded.
    pub async fn record_consent(
        db: &PgPool,
        id: Uuid,
        status: Option<&str>,
        consent_id: Option<&str>,
    ) -> anyhow::Result<BankConnection> {
        let row = sqlx::query_as::<_, BankConnection>(&format!(
            r#"
            UPDATE bank_connections
            SET consent_status = COALESCE($2, consent_status),
                consent_id = COALESCE($3, consent_id),
                last_sync_at = now()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(consent_id)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Stamp last_sync_at after a successful data fetch.
    pub async fn touch_sync(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE bank_connections
            SET last_sync_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::User;

    async fn seed_user(db: &PgPool, email: &str) -> User {
        User::create(db, email, "$argon2id$placeholder", None)
            .await
            .expect("seed user")
    }

    fn vbank_row(user_id: Uuid) -> NewConnection<'static> {
        NewConnection {
            user_id,
            bank_code: "vbank",
            bank_name: "Virtual Bank",
            client_id: Some("team227-1"),
            client_secret: Some("s3cret"),
            access_token: "sealed-access-token",
            refresh_token: None,
            token_expires_at: None,
        }
    }

    #[sqlx::test]
    async fn insert_then_find_active_roundtrip(pool: PgPool) {
        let user = seed_user(&pool, "owner@example.com").await;
        let row = BankConnection::insert(&pool, vbank_row(user.id))
            .await
            .expect("insert");
        assert!(row.is_active);
        assert_eq!(row.consent_status, "pending");
        assert!(row.consent_id.is_none());
        assert!(row.revoked_at.is_none());
        assert!(row.last_sync_at.is_none());

        let found = BankConnection::find_active(&pool, user.id, "vbank")
            .await
            .expect("query")
            .expect("active row");
        assert_eq!(found.id, row.id);

        // another user's lookup must not see this row
        let stranger = seed_user(&pool, "stranger@example.com").await;
        assert!(BankConnection::find_active(&pool, stranger.id, "vbank")
            .await
            .expect("query")
            .is_none());
    }

    #[sqlx::test]
    async fn second_active_row_per_bank_is_rejected(pool: PgPool) {
        let user = seed_user(&pool, "dup@example.com").await;
        BankConnection::insert(&pool, vbank_row(user.id))
            .await
            .expect("first insert");

        let err = BankConnection::insert(&pool, vbank_row(user.id))
            .await
            .expect_err("a second active row must not insert");
        assert!(err.to_string().contains("bank_connections_one_active_idx"));

        let rows = BankConnection::list_for_user(&pool, user.id)
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
    }

    #[sqlx::test]
    async fn revoke_frees_the_slot_for_a_fresh_connection(pool: PgPool) {
        let user = seed_user(&pool, "rotate@example.com").await;
        let first = BankConnection::insert(&pool, vbank_row(user.id))
            .await
            .expect("insert");

        BankConnection::revoke(&pool, first.id)
            .await
            .expect("revoke");
        assert!(BankConnection::find_active(&pool, user.id, "vbank")
            .await
            .expect("query")
            .is_none());

        let second = BankConnection::insert(&pool, vbank_row(user.id))
            .await
            .expect("reconnect after revoke");
        assert_ne!(second.id, first.id);

        let rows = BankConnection::list_for_user(&pool, user.id)
            .await
            .expect("list");
        assert_eq!(rows.len(), 2);
        let old = rows.iter().find(|r| r.id == first.id).expect("history row");
        assert!(!old.is_active);
        assert!(old.revoked_at.is_some());
    }
}
