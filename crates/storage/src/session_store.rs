use cardrail_domain::model::{NewSession, SessionId, SessionRecord, SessionStatus};
use cardrail_domain::storage::{SessionStore, StorageError, StorageResult};
use chrono::Utc;
use sea_orm::sea_query::{PostgresQueryBuilder, Query, SqliteQueryBuilder};
use sea_orm::{
    ActiveEnum, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, FromQueryResult, Set,
    Statement,
};

use crate::entity::sessions::{self, SessionStatusDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SessionStore for SeaOrmStorage {
    async fn insert_session(&self, session: NewSession) -> StorageResult<SessionRecord> {
        let now = Utc::now();
        let model = sessions::ActiveModel {
            id: Set(session.id.as_str().to_owned()),
            store: Set(session.store.clone()),
            amount_usd_cents: Set(session.amount_usd_cents),
            currency: Set(session.currency.clone()),
            status: Set(SessionStatusDb::Pending),
            wallet_id: Set(session.wallet_id.clone()),
            user_id: Set(session.user_id.clone()),
            gift_card_id: Set(None),
            created_at: Set(now),
            expires_at: Set(session.expires_at),
        };
        sessions::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        Ok(SessionRecord {
            id: session.id,
            store: session.store,
            amount_usd_cents: session.amount_usd_cents,
            currency: session.currency,
            status: SessionStatus::Pending,
            wallet_id: session.wallet_id,
            user_id: session.user_id,
            gift_card_id: None,
            created_at: now,
            expires_at: session.expires_at,
        })
    }

    async fn find_session(&self, id: &SessionId) -> StorageResult<Option<SessionRecord>> {
        let maybe = sessions::Entity::find_by_id(id.as_str().to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(session_to_record).transpose()
    }

    async fn check_and_expire_session(
        &self,
        id: &SessionId,
    ) -> StorageResult<Option<SessionRecord>> {
        let Some(session) = self.find_session(id).await? else {
            return Ok(None);
        };
        if session.status != SessionStatus::Pending || session.expires_at > Utc::now() {
            return Ok(Some(session));
        }

        // Conditional flip so a racing request cannot resurrect the session.
        let backend = self.connection().get_database_backend();
        let mut query = Query::update();
        query.table(sessions::Entity);
        query.value(
            sessions::Column::Status,
            SessionStatusDb::Expired.to_value(),
        );
        query.and_where(sessions::Column::Id.eq(id.as_str()));
        query.and_where(sessions::Column::Status.eq(SessionStatusDb::Pending.to_value()));
        query.returning_all();

        let (sql, values) = match backend {
            DatabaseBackend::Sqlite => query.build(SqliteQueryBuilder),
            DatabaseBackend::Postgres => query.build(PostgresQueryBuilder),
            DatabaseBackend::MySql => unreachable!("mysql backend is not supported"),
        };
        let stmt = Statement::from_sql_and_values(backend, sql, values);
        let maybe_row = self
            .connection()
            .query_one(stmt)
            .await
            .map_err(StorageError::from_source)?;

        match maybe_row {
            Some(row) => {
                let model = sessions::Model::from_query_result(&row, "")
                    .map_err(StorageError::from_source)?;
                session_to_record(model).map(Some)
            }
            // Someone else flipped it first; report what they left behind.
            None => self.find_session(id).await,
        }
    }
}

pub(crate) fn session_to_record(model: sessions::Model) -> StorageResult<SessionRecord> {
    let id = SessionId::parse(&model.id)
        .map_err(|err| StorageError::Database(format!("corrupt session id: {err}")))?;

    Ok(SessionRecord {
        id,
        store: model.store,
        amount_usd_cents: model.amount_usd_cents,
        currency: model.currency,
        status: model.status.into(),
        wallet_id: model.wallet_id,
        user_id: model.user_id,
        gift_card_id: model.gift_card_id,
        created_at: model.created_at,
        expires_at: model.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn storage() -> SeaOrmStorage {
        SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("storage inits")
    }

    fn new_session(id: &str, expires_in: Duration) -> NewSession {
        NewSession {
            id: SessionId::parse(id).unwrap(),
            store: "acme".into(),
            amount_usd_cents: 2_500,
            currency: "USD".into(),
            wallet_id: "w1".into(),
            user_id: "u1".into(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn inserts_and_finds_sessions() {
        let storage = storage().await;
        let inserted = storage
            .insert_session(new_session("cs_1", Duration::minutes(30)))
            .await
            .unwrap();
        assert_eq!(inserted.status, SessionStatus::Pending);

        let found = storage
            .find_session(&SessionId::parse("cs_1").unwrap())
            .await
            .unwrap()
            .expect("session present");
        assert_eq!(found.store, "acme");
        assert_eq!(found.amount_usd_cents, 2_500);
    }

    #[tokio::test]
    async fn expires_overdue_pending_sessions() {
        let storage = storage().await;
        storage
            .insert_session(new_session("cs_old", Duration::minutes(-5)))
            .await
            .unwrap();

        let checked = storage
            .check_and_expire_session(&SessionId::parse("cs_old").unwrap())
            .await
            .unwrap()
            .expect("session present");
        assert_eq!(checked.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn leaves_live_sessions_untouched() {
        let storage = storage().await;
        storage
            .insert_session(new_session("cs_live", Duration::minutes(30)))
            .await
            .unwrap();

        let checked = storage
            .check_and_expire_session(&SessionId::parse("cs_live").unwrap())
            .await
            .unwrap()
            .expect("session present");
        assert_eq!(checked.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let storage = storage().await;
        let checked = storage
            .check_and_expire_session(&SessionId::parse("cs_missing").unwrap())
            .await
            .unwrap();
        assert!(checked.is_none());
    }
}
