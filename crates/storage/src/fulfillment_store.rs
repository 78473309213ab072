use cardrail_domain::model::{
    derive_payment_reference, NewPayment, PaymentRecord, PaymentStatus, SessionId, TokenAmount,
    TxHash,
};
use cardrail_domain::storage::{
    BeginPaymentError, FulfillmentStore, StorageError, StorageResult, TerminalFailure,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::entity::payments::{self, PaymentStatusDb};
use crate::entity::sessions::{self, SessionStatusDb};
use crate::entity::gift_cards;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl FulfillmentStore for SeaOrmStorage {
    async fn find_payment_by_session(
        &self,
        session_id: &SessionId,
    ) -> StorageResult<Option<PaymentRecord>> {
        let maybe = payments::Entity::find()
            .filter(payments::Column::SessionId.eq(session_id.as_str()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(payment_to_record).transpose()
    }

    async fn begin_fulfillment(
        &self,
        payment: NewPayment,
    ) -> Result<PaymentRecord, BeginPaymentError> {
        let gift_card_id = payment
            .gift_card_id
            .ok_or(BeginPaymentError::GiftCardNotFound)?;

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;

        require_payable_session(&txn, &payment.session_id).await?;

        // The pre-read distinguishes "missing" from "held"; the conditional
        // update below is what actually closes the reservation race.
        let card = gift_cards::Entity::find_by_id(gift_card_id)
            .one(&txn)
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?
            .ok_or(BeginPaymentError::GiftCardNotFound)?;
        if !card.active || card.reserved_by_payment_id.is_some() {
            return Err(BeginPaymentError::GiftCardUnavailable);
        }

        let record = insert_payment(&txn, &payment, PaymentStatusDb::Confirming).await?;

        let reserved = gift_cards::Entity::update_many()
            .col_expr(
                gift_cards::Column::ReservedByPaymentId,
                Expr::value(Some(record.id)),
            )
            .col_expr(
                gift_cards::Column::ReservedAt,
                Expr::value(Some(record.created_at)),
            )
            .filter(gift_cards::Column::Id.eq(gift_card_id))
            .filter(gift_cards::Column::Active.eq(true))
            .filter(gift_cards::Column::ReservedByPaymentId.is_null())
            .exec(&txn)
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;
        if reserved.rows_affected == 0 {
            return Err(BeginPaymentError::GiftCardUnavailable);
        }

        sessions::Entity::update_many()
            .col_expr(
                sessions::Column::Status,
                Expr::value(SessionStatusDb::Paid.to_value()),
            )
            .col_expr(sessions::Column::GiftCardId, Expr::value(Some(gift_card_id)))
            .filter(sessions::Column::Id.eq(payment.session_id.as_str()))
            .exec(&txn)
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;

        txn.commit()
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;
        Ok(record)
    }

    async fn record_direct_payment(
        &self,
        payment: NewPayment,
    ) -> Result<PaymentRecord, BeginPaymentError> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;

        require_payable_session(&txn, &payment.session_id).await?;

        let record = insert_payment(&txn, &payment, PaymentStatusDb::Succeeded).await?;

        sessions::Entity::update_many()
            .col_expr(
                sessions::Column::Status,
                Expr::value(SessionStatusDb::Paid.to_value()),
            )
            .filter(sessions::Column::Id.eq(payment.session_id.as_str()))
            .exec(&txn)
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;

        txn.commit()
            .await
            .map_err(storage_err)
            .map_err(BeginPaymentError::Storage)?;
        Ok(record)
    }

    async fn complete_fulfillment(
        &self,
        payment_id: i64,
        session_id: &SessionId,
        gift_card_id: i64,
    ) -> StorageResult<()> {
        let txn = self.connection().begin().await.map_err(storage_err)?;

        let consumed = gift_cards::Entity::update_many()
            .col_expr(gift_cards::Column::Active, Expr::value(false))
            .col_expr(
                gift_cards::Column::ReservedByPaymentId,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(
                gift_cards::Column::ReservedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(gift_cards::Column::Id.eq(gift_card_id))
            .filter(gift_cards::Column::Active.eq(true))
            .filter(gift_cards::Column::ReservedByPaymentId.eq(payment_id))
            .exec(&txn)
            .await
            .map_err(storage_err)?;
        if consumed.rows_affected == 0 {
            return Err(StorageError::Database(format!(
                "gift card {gift_card_id} no longer reserved by payment {payment_id}"
            )));
        }

        update_payment_status(&txn, payment_id, PaymentStatusDb::Succeeded).await?;
        update_session_status(&txn, session_id, SessionStatusDb::Fulfilled).await?;

        txn.commit().await.map_err(storage_err)
    }

    async fn compensate_fulfillment(
        &self,
        payment_id: i64,
        session_id: &SessionId,
        gift_card_id: Option<i64>,
        terminal: TerminalFailure,
    ) -> StorageResult<()> {
        let (payment_status, session_status) = match terminal {
            TerminalFailure::Failed => (PaymentStatusDb::Failed, SessionStatusDb::Failed),
            TerminalFailure::EmailFailed => {
                (PaymentStatusDb::EmailFailed, SessionStatusDb::EmailFailed)
            }
        };

        let txn = self.connection().begin().await.map_err(storage_err)?;

        if let Some(card_id) = gift_card_id {
            gift_cards::Entity::update_many()
                .col_expr(
                    gift_cards::Column::ReservedByPaymentId,
                    Expr::value(Option::<i64>::None),
                )
                .col_expr(
                    gift_cards::Column::ReservedAt,
                    Expr::value(Option::<chrono::DateTime<Utc>>::None),
                )
                .filter(gift_cards::Column::Id.eq(card_id))
                .filter(gift_cards::Column::ReservedByPaymentId.eq(payment_id))
                .exec(&txn)
                .await
                .map_err(storage_err)?;
        }

        update_payment_status(&txn, payment_id, payment_status).await?;
        update_session_status(&txn, session_id, session_status).await?;

        txn.commit().await.map_err(storage_err)
    }
}

async fn require_payable_session(
    txn: &DatabaseTransaction,
    session_id: &SessionId,
) -> Result<(), BeginPaymentError> {
    let session = sessions::Entity::find_by_id(session_id.as_str().to_owned())
        .one(txn)
        .await
        .map_err(storage_err)
        .map_err(BeginPaymentError::Storage)?
        .ok_or(BeginPaymentError::SessionNotPayable)?;
    if session.status != SessionStatusDb::Pending {
        return Err(BeginPaymentError::SessionNotPayable);
    }
    Ok(())
}

async fn insert_payment(
    txn: &DatabaseTransaction,
    payment: &NewPayment,
    status: PaymentStatusDb,
) -> Result<PaymentRecord, BeginPaymentError> {
    let now = Utc::now();
    let reference = derive_payment_reference(&payment.session_id, &payment.tx_hash);
    let model = payments::ActiveModel {
        session_id: Set(payment.session_id.as_str().to_owned()),
        wallet_id: Set(payment.wallet_id.clone()),
        user_id: Set(payment.user_id.clone()),
        amount_base_units: Set(payment.amount.base_units().to_string()),
        token: Set(payment.token.clone()),
        tx_hash: Set(payment.tx_hash.as_str().to_owned()),
        reference: Set(reference.clone()),
        status: Set(status.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let inserted = payments::Entity::insert(model).exec(txn).await;
    let payment_id = match inserted {
        Ok(result) => result.last_insert_id,
        Err(err) => return Err(classify_insert_error(err)),
    };

    Ok(PaymentRecord {
        id: payment_id,
        session_id: payment.session_id.clone(),
        wallet_id: payment.wallet_id.clone(),
        user_id: payment.user_id.clone(),
        amount: payment.amount,
        token: payment.token.clone(),
        tx_hash: payment.tx_hash.clone(),
        reference,
        status: status.into(),
        created_at: now,
        updated_at: now,
    })
}

async fn update_payment_status(
    txn: &DatabaseTransaction,
    payment_id: i64,
    status: PaymentStatusDb,
) -> StorageResult<()> {
    payments::Entity::update_many()
        .col_expr(payments::Column::Status, Expr::value(status.to_value()))
        .col_expr(payments::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payments::Column::Id.eq(payment_id))
        .exec(txn)
        .await
        .map_err(storage_err)?;
    Ok(())
}

async fn update_session_status(
    txn: &DatabaseTransaction,
    session_id: &SessionId,
    status: SessionStatusDb,
) -> StorageResult<()> {
    sessions::Entity::update_many()
        .col_expr(sessions::Column::Status, Expr::value(status.to_value()))
        .filter(sessions::Column::Id.eq(session_id.as_str()))
        .exec(txn)
        .await
        .map_err(storage_err)?;
    Ok(())
}

fn storage_err(err: DbErr) -> StorageError {
    StorageError::from_source(err)
}

fn classify_insert_error(err: DbErr) -> BeginPaymentError {
    if err.to_string().to_lowercase().contains("unique") {
        BeginPaymentError::DuplicatePayment
    } else {
        BeginPaymentError::Storage(storage_err(err))
    }
}

fn payment_to_record(model: payments::Model) -> StorageResult<PaymentRecord> {
    let session_id = SessionId::parse(&model.session_id)
        .map_err(|err| StorageError::Database(format!("corrupt session id: {err}")))?;
    let tx_hash = TxHash::parse(&model.tx_hash)
        .map_err(|err| StorageError::Database(format!("corrupt tx hash: {err}")))?;
    let units: u128 = model
        .amount_base_units
        .parse()
        .map_err(|_| StorageError::Database("corrupt payment amount".into()))?;

    Ok(PaymentRecord {
        id: model.id,
        session_id,
        wallet_id: model.wallet_id,
        user_id: model.user_id,
        amount: TokenAmount::from_base_units(units),
        token: model.token,
        tx_hash,
        reference: model.reference,
        status: model.status.into(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
