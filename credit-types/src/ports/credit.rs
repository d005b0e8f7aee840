//! Credit persistence port.

use crate::domain::{Credit, CreditId, UserId};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait CreditStore: Send + Sync + 'static {
    /// Persists a newly issued credit.
    async fn create_credit(&self, credit: &Credit) -> Result<(), RepoError>;

    async fn get_credit(&self, id: CreditId) -> Result<Option<Credit>, RepoError>;

    /// Lists a user's credits, oldest first.
    async fn list_credits_for_user(&self, user_id: UserId) -> Result<Vec<Credit>, RepoError>;
}
