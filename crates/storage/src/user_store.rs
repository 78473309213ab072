use cardrail_domain::model::{UserRecord, WalletAddress, WalletRecord};
use cardrail_domain::storage::{StorageError, StorageResult, UserStore};
use sea_orm::{EntityTrait, Set};

use crate::entity::{users, wallets};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl UserStore for SeaOrmStorage {
    async fn insert_user(&self, user: UserRecord) -> StorageResult<()> {
        let model = users::ActiveModel {
            id: Set(user.id),
            email: Set(user.email),
        };
        users::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let maybe = users::Entity::find_by_id(id.to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(|model| UserRecord {
            id: model.id,
            email: model.email,
        }))
    }

    async fn insert_wallet(&self, wallet: WalletRecord) -> StorageResult<()> {
        let model = wallets::ActiveModel {
            id: Set(wallet.id),
            address: Set(wallet.address.as_str().to_owned()),
            user_id: Set(wallet.user_id),
        };
        wallets::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn find_wallet(&self, id: &str) -> StorageResult<Option<WalletRecord>> {
        let maybe = wallets::Entity::find_by_id(id.to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe
            .map(|model| {
                let address = WalletAddress::parse(&model.address).map_err(|err| {
                    StorageError::Database(format!("corrupt wallet address: {err}"))
                })?;
                Ok(WalletRecord {
                    id: model.id,
                    address,
                    user_id: model.user_id,
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_users_and_wallets() {
        let storage = SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("storage inits");

        storage
            .insert_user(UserRecord {
                id: "u1".into(),
                email: Some("buyer@example.com".into()),
            })
            .await
            .unwrap();
        storage
            .insert_wallet(WalletRecord {
                id: "w1".into(),
                address: WalletAddress::parse("0xAbCdEf0123456789abcdef0123456789ABCDEF01")
                    .unwrap(),
                user_id: "u1".into(),
            })
            .await
            .unwrap();

        let user = storage.find_user("u1").await.unwrap().expect("user");
        assert_eq!(user.email.as_deref(), Some("buyer@example.com"));

        let wallet = storage.find_wallet("w1").await.unwrap().expect("wallet");
        assert_eq!(
            wallet.address.as_str(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert!(storage.find_wallet("w2").await.unwrap().is_none());
    }
}
