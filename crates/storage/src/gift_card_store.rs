use cardrail_domain::model::{GiftCardRecord, NewGiftCard};
use cardrail_domain::storage::{GiftCardStore, StorageError, StorageResult};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::entity::gift_cards;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl GiftCardStore for SeaOrmStorage {
    async fn insert_gift_card(&self, card: NewGiftCard) -> StorageResult<GiftCardRecord> {
        let now = Utc::now();
        let model = gift_cards::ActiveModel {
            store: Set(card.store.clone()),
            currency: Set(card.currency.clone()),
            amount_usd_cents: Set(card.amount_usd_cents),
            encrypted_number: Set(card.encrypted_number.clone()),
            encrypted_pin: Set(card.encrypted_pin.clone()),
            iv: Set(card.iv.clone()),
            tag: Set(card.tag.clone()),
            active: Set(true),
            reserved_by_payment_id: Set(None),
            reserved_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        };
        let result = gift_cards::Entity::insert(model)
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        Ok(GiftCardRecord {
            id: result.last_insert_id,
            store: card.store,
            currency: card.currency,
            amount_usd_cents: card.amount_usd_cents,
            encrypted_number: card.encrypted_number,
            encrypted_pin: card.encrypted_pin,
            iv: card.iv,
            tag: card.tag,
            active: true,
            reserved_by_payment_id: None,
            reserved_at: None,
            created_at: now,
        })
    }

    async fn find_gift_card(&self, id: i64) -> StorageResult<Option<GiftCardRecord>> {
        let maybe = gift_cards::Entity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(gift_card_to_record))
    }

    async fn release_gift_card(&self, id: i64, payment_id: i64) -> StorageResult<bool> {
        let result = gift_cards::Entity::update_many()
            .col_expr(
                gift_cards::Column::ReservedByPaymentId,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(
                gift_cards::Column::ReservedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(gift_cards::Column::Id.eq(id))
            .filter(gift_cards::Column::ReservedByPaymentId.eq(payment_id))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(result.rows_affected > 0)
    }

    async fn consume_gift_card(&self, id: i64, payment_id: i64) -> StorageResult<bool> {
        let result = gift_cards::Entity::update_many()
            .col_expr(gift_cards::Column::Active, Expr::value(false))
            .col_expr(
                gift_cards::Column::ReservedByPaymentId,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(
                gift_cards::Column::ReservedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(gift_cards::Column::Id.eq(id))
            .filter(gift_cards::Column::Active.eq(true))
            .filter(gift_cards::Column::ReservedByPaymentId.eq(payment_id))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(result.rows_affected > 0)
    }
}

pub(crate) fn gift_card_to_record(model: gift_cards::Model) -> GiftCardRecord {
    GiftCardRecord {
        id: model.id,
        store: model.store,
        currency: model.currency,
        amount_usd_cents: model.amount_usd_cents,
        encrypted_number: model.encrypted_number,
        encrypted_pin: model.encrypted_pin,
        iv: model.iv,
        tag: model.tag,
        active: model.active,
        reserved_by_payment_id: model.reserved_by_payment_id,
        reserved_at: model.reserved_at,
        created_at: model.created_at,
    }
}
