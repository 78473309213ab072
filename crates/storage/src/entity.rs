use cardrail_domain::model::{PaymentStatus, SessionStatus};

pub mod sessions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "sessions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub store: String,
        pub amount_usd_cents: i64,
        pub currency: String,
        pub status: SessionStatusDb,
        pub wallet_id: String,
        pub user_id: String,
        pub gift_card_id: Option<i64>,
        pub created_at: DateTimeUtc,
        pub expires_at: DateTimeUtc,
    }

    #[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum SessionStatusDb {
        #[sea_orm(string_value = "pending")]
        Pending,
        #[sea_orm(string_value = "paid")]
        Paid,
        #[sea_orm(string_value = "fulfilled")]
        Fulfilled,
        #[sea_orm(string_value = "failed")]
        Failed,
        #[sea_orm(string_value = "email_failed")]
        EmailFailed,
        #[sea_orm(string_value = "expired")]
        Expired,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod payments {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "payments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub session_id: String,
        pub wallet_id: String,
        pub user_id: String,
        pub amount_base_units: String,
        pub token: String,
        pub tx_hash: String,
        pub reference: String,
        pub status: PaymentStatusDb,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum PaymentStatusDb {
        #[sea_orm(string_value = "confirming")]
        Confirming,
        #[sea_orm(string_value = "succeeded")]
        Succeeded,
        #[sea_orm(string_value = "failed")]
        Failed,
        #[sea_orm(string_value = "email_failed")]
        EmailFailed,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod gift_cards {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "gift_cards")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub store: String,
        pub currency: String,
        pub amount_usd_cents: i64,
        pub encrypted_number: String,
        pub encrypted_pin: String,
        pub iv: String,
        pub tag: String,
        pub active: bool,
        pub reserved_by_payment_id: Option<i64>,
        pub reserved_at: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod users {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub email: Option<String>,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod wallets {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallets")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub address: String,
        pub user_id: String,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

impl From<sessions::SessionStatusDb> for SessionStatus {
    fn from(value: sessions::SessionStatusDb) -> Self {
        match value {
            sessions::SessionStatusDb::Pending => SessionStatus::Pending,
            sessions::SessionStatusDb::Paid => SessionStatus::Paid,
            sessions::SessionStatusDb::Fulfilled => SessionStatus::Fulfilled,
            sessions::SessionStatusDb::Failed => SessionStatus::Failed,
            sessions::SessionStatusDb::EmailFailed => SessionStatus::EmailFailed,
            sessions::SessionStatusDb::Expired => SessionStatus::Expired,
        }
    }
}

impl From<SessionStatus> for sessions::SessionStatusDb {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Pending => sessions::SessionStatusDb::Pending,
            SessionStatus::Paid => sessions::SessionStatusDb::Paid,
            SessionStatus::Fulfilled => sessions::SessionStatusDb::Fulfilled,
            SessionStatus::Failed => sessions::SessionStatusDb::Failed,
            SessionStatus::EmailFailed => sessions::SessionStatusDb::EmailFailed,
            SessionStatus::Expired => sessions::SessionStatusDb::Expired,
        }
    }
}

impl From<payments::PaymentStatusDb> for PaymentStatus {
    fn from(value: payments::PaymentStatusDb) -> Self {
        match value {
            payments::PaymentStatusDb::Confirming => PaymentStatus::Confirming,
            payments::PaymentStatusDb::Succeeded => PaymentStatus::Succeeded,
            payments::PaymentStatusDb::Failed => PaymentStatus::Failed,
            payments::PaymentStatusDb::EmailFailed => PaymentStatus::EmailFailed,
        }
    }
}

impl From<PaymentStatus> for payments::PaymentStatusDb {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Confirming => payments::PaymentStatusDb::Confirming,
            PaymentStatus::Succeeded => payments::PaymentStatusDb::Succeeded,
            PaymentStatus::Failed => payments::PaymentStatusDb::Failed,
            PaymentStatus::EmailFailed => payments::PaymentStatusDb::EmailFailed,
        }
    }
}
