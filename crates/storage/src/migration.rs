use cardrail_domain::storage::{StorageError, StorageResult};
use sea_orm::sea_query::{ColumnDef, Expr, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{gift_cards, payments, sessions, users, wallets};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let sessions_table = Table::create()
        .if_not_exists()
        .table(sessions::Entity)
        .col(
            ColumnDef::new(sessions::Column::Id)
                .string_len(32)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(sessions::Column::Store).string().not_null())
        .col(
            ColumnDef::new(sessions::Column::AmountUsdCents)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sessions::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(sessions::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(sessions::Column::WalletId)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(sessions::Column::UserId).string().not_null())
        .col(
            ColumnDef::new(sessions::Column::GiftCardId)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(sessions::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(sessions::Column::ExpiresAt)
                .date_time()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, sessions_table).await?;

    let payments_table = Table::create()
        .if_not_exists()
        .table(payments::Entity)
        .col(
            ColumnDef::new(payments::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(payments::Column::SessionId)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::WalletId)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(payments::Column::UserId).string().not_null())
        .col(
            ColumnDef::new(payments::Column::AmountBaseUnits)
                .string_len(40)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Token)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::TxHash)
                .string_len(66)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Reference)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(payments::Column::UpdatedAt)
                .date_time()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, payments_table).await?;

    // One payment per session; this is what turns a duplicate fulfillment
    // request into a conflict instead of a second payment.
    let payments_session_index = Index::create()
        .if_not_exists()
        .name("idx_payments_session_id")
        .table(payments::Entity)
        .col(payments::Column::SessionId)
        .unique()
        .to_owned();
    db.execute(backend.build(&payments_session_index))
        .await
        .map_err(StorageError::from_source)?;

    let gift_cards_table = Table::create()
        .if_not_exists()
        .table(gift_cards::Entity)
        .col(
            ColumnDef::new(gift_cards::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::Store)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::AmountUsdCents)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::EncryptedNumber)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::EncryptedPin)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(gift_cards::Column::Iv).string().not_null())
        .col(ColumnDef::new(gift_cards::Column::Tag).string().not_null())
        .col(
            ColumnDef::new(gift_cards::Column::Active)
                .boolean()
                .not_null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::ReservedByPaymentId)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::ReservedAt)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(gift_cards::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, gift_cards_table).await?;

    let users_table = Table::create()
        .if_not_exists()
        .table(users::Entity)
        .col(
            ColumnDef::new(users::Column::Id)
                .string()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(users::Column::Email).string().null())
        .to_owned();
    create_table(db, backend, users_table).await?;

    let wallets_table = Table::create()
        .if_not_exists()
        .table(wallets::Entity)
        .col(
            ColumnDef::new(wallets::Column::Id)
                .string()
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(wallets::Column::Address)
                .string_len(42)
                .not_null(),
        )
        .col(ColumnDef::new(wallets::Column::UserId).string().not_null())
        .to_owned();
    create_table(db, backend, wallets_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
