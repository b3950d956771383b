//! Contract of the budgeting backend the dispatcher calls into.

use std::path::PathBuf;

use api_types::{
    account::{Account, AccountNew, AccountUpdate},
    category::{
        Category, CategoryGroup, CategoryGroupNew, CategoryGroupUpdate, CategoryNew,
        CategoryUpdate,
    },
    payee::{Payee, PayeeNew, PayeeUpdate},
    transaction::{AddOptions, ImportResult, Transaction, TransactionNew, TransactionUpdate},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::BackendError;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Arguments of [`BudgetBackend::init`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitConfig {
    pub server_url: String,
    pub password: String,
    /// Local cache directory for backends that keep the budget file on disk.
    pub data_dir: PathBuf,
}

/// Budgeting backend: session lifecycle plus one call per API operation.
///
/// Amounts are integer minor units everywhere. Ids are opaque strings owned
/// by the backend.
#[async_trait]
pub trait BudgetBackend: Send {
    async fn init(&mut self, config: &InitConfig) -> BackendResult<()>;
    async fn download_budget(
        &mut self,
        sync_id: &str,
        encryption_password: Option<&str>,
    ) -> BackendResult<()>;
    async fn shutdown(&mut self) -> BackendResult<()>;

    async fn get_accounts(&mut self) -> BackendResult<Vec<Account>>;
    async fn create_account(
        &mut self,
        account: &AccountNew,
        initial_balance: i64,
    ) -> BackendResult<String>;
    async fn update_account(&mut self, id: &str, fields: &AccountUpdate) -> BackendResult<()>;
    async fn close_account(
        &mut self,
        id: &str,
        transfer_account_id: Option<&str>,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()>;
    async fn reopen_account(&mut self, id: &str) -> BackendResult<()>;
    async fn delete_account(&mut self, id: &str) -> BackendResult<()>;
    async fn get_account_balance(
        &mut self,
        id: &str,
        cutoff: Option<NaiveDate>,
    ) -> BackendResult<i64>;

    async fn get_transactions(
        &mut self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> BackendResult<Vec<Transaction>>;
    /// Adds transactions verbatim and returns the new ids.
    async fn add_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
        options: AddOptions,
    ) -> BackendResult<Vec<String>>;
    /// Adds transactions, reconciling against existing ones by `imported_id`.
    async fn import_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
    ) -> BackendResult<ImportResult>;
    async fn update_transaction(
        &mut self,
        id: &str,
        fields: &TransactionUpdate,
    ) -> BackendResult<()>;
    async fn delete_transaction(&mut self, id: &str) -> BackendResult<()>;

    async fn get_categories(&mut self) -> BackendResult<Vec<Category>>;
    async fn create_category(&mut self, category: &CategoryNew) -> BackendResult<String>;
    async fn update_category(&mut self, id: &str, fields: &CategoryUpdate) -> BackendResult<()>;
    async fn delete_category(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()>;

    async fn get_category_groups(&mut self) -> BackendResult<Vec<CategoryGroup>>;
    async fn create_category_group(&mut self, group: &CategoryGroupNew) -> BackendResult<String>;
    async fn update_category_group(
        &mut self,
        id: &str,
        fields: &CategoryGroupUpdate,
    ) -> BackendResult<()>;
    async fn delete_category_group(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()>;

    async fn get_payees(&mut self) -> BackendResult<Vec<Payee>>;
    async fn create_payee(&mut self, payee: &PayeeNew) -> BackendResult<String>;
    async fn update_payee(&mut self, id: &str, fields: &PayeeUpdate) -> BackendResult<()>;
    async fn delete_payee(&mut self, id: &str) -> BackendResult<()>;

    /// Months with budget data, as `YYYY-MM`.
    async fn get_budget_months(&mut self) -> BackendResult<Vec<String>>;
    async fn get_budget_month(&mut self, month: &str) -> BackendResult<Value>;
    async fn set_budget_amount(
        &mut self,
        month: &str,
        category_id: &str,
        amount: i64,
    ) -> BackendResult<()>;

    async fn run_query(&mut self, query: &str) -> BackendResult<Value>;
    async fn sync(&mut self) -> BackendResult<()>;
}
