//! Wire types of the Actual Budget API.
//!
//! Field names follow the backend's JSON (`snake_case` entity fields,
//! `camelCase` request envelopes). Amounts are always integer minor units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Generic success envelope returned by the HTTP bridge.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

pub mod account {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum AccountType {
        #[default]
        Checking,
        Savings,
        Credit,
        Investment,
        Mortgage,
        Debt,
        Other,
    }

    impl AccountType {
        /// Returns the canonical type string used by the backend.
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Checking => "checking",
                Self::Savings => "savings",
                Self::Credit => "credit",
                Self::Investment => "investment",
                Self::Mortgage => "mortgage",
                Self::Debt => "debt",
                Self::Other => "other",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            match raw.trim().to_ascii_lowercase().as_str() {
                "checking" => Some(Self::Checking),
                "savings" => Some(Self::Savings),
                "credit" => Some(Self::Credit),
                "investment" => Some(Self::Investment),
                "mortgage" => Some(Self::Mortgage),
                "debt" => Some(Self::Debt),
                "other" => Some(Self::Other),
                _ => None,
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Account {
        pub id: String,
        pub name: String,
        #[serde(rename = "type", default)]
        pub account_type: Option<AccountType>,
        #[serde(default)]
        pub offbudget: bool,
        #[serde(default)]
        pub closed: bool,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct AccountNew {
        pub name: String,
        #[serde(rename = "type")]
        pub account_type: AccountType,
        #[serde(default)]
        pub offbudget: bool,
        #[serde(default)]
        pub closed: bool,
    }

    /// Partial update: only present fields are changed.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct AccountUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        pub account_type: Option<AccountType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub offbudget: Option<bool>,
    }

    impl AccountUpdate {
        pub fn is_empty(&self) -> bool {
            self.name.is_none() && self.account_type.is_none() && self.offbudget.is_none()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AccountCreate {
        pub account: AccountNew,
        pub initial_balance: i64,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AccountClose {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub transfer_account_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub transfer_category_id: Option<String>,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Transaction {
        pub id: String,
        pub account: String,
        pub date: NaiveDate,
        /// Signed amount in minor units.
        pub amount: i64,
        #[serde(default)]
        pub payee: Option<String>,
        #[serde(default)]
        pub payee_name: Option<String>,
        #[serde(default)]
        pub imported_payee: Option<String>,
        #[serde(default)]
        pub category: Option<String>,
        #[serde(default)]
        pub notes: Option<String>,
        #[serde(default)]
        pub imported_id: Option<String>,
        #[serde(default)]
        pub transfer_id: Option<String>,
        #[serde(default)]
        pub cleared: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub subtransactions: Vec<Transaction>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub date: NaiveDate,
        pub amount: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub payee: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub payee_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub notes: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub imported_id: Option<String>,
        #[serde(default)]
        pub cleared: bool,
    }

    /// Partial update: only present fields are changed.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub date: Option<NaiveDate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub amount: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub payee: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub notes: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub cleared: Option<bool>,
    }

    impl TransactionUpdate {
        pub fn is_empty(&self) -> bool {
            self.date.is_none()
                && self.amount.is_none()
                && self.payee.is_none()
                && self.category.is_none()
                && self.notes.is_none()
                && self.cleared.is_none()
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddOptions {
        pub run_transfers: bool,
        pub learn_categories: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransactionsAdd {
        pub transactions: Vec<TransactionNew>,
        #[serde(flatten)]
        pub options: AddOptions,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionsImport {
        pub transactions: Vec<TransactionNew>,
    }

    /// Outcome of an import: ids of added and updated transactions.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct ImportResult {
        pub added: Vec<String>,
        pub updated: Vec<String>,
        #[serde(default)]
        pub errors: Vec<String>,
    }
}

pub mod category {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Category {
        pub id: String,
        pub name: String,
        pub group_id: String,
        #[serde(default)]
        pub is_income: bool,
        #[serde(default)]
        pub hidden: bool,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CategoryNew {
        pub name: String,
        pub group_id: String,
        #[serde(default)]
        pub is_income: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct CategoryUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub group_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub hidden: Option<bool>,
    }

    impl CategoryUpdate {
        pub fn is_empty(&self) -> bool {
            self.name.is_none() && self.group_id.is_none() && self.hidden.is_none()
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CategoryGroup {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub is_income: bool,
        #[serde(default)]
        pub hidden: bool,
        #[serde(default)]
        pub categories: Vec<Category>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CategoryGroupNew {
        pub name: String,
        #[serde(default)]
        pub is_income: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct CategoryGroupUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub hidden: Option<bool>,
    }

    impl CategoryGroupUpdate {
        pub fn is_empty(&self) -> bool {
            self.name.is_none() && self.hidden.is_none()
        }
    }
}

pub mod payee {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Payee {
        pub id: String,
        pub name: String,
        /// Set when the payee is the transfer payee of an account.
        #[serde(default)]
        pub transfer_acct: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct PayeeNew {
        pub name: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct PayeeUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
    }
}

pub mod budget {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BudgetAmount {
        /// Budgeted amount in minor units.
        pub budgeted: i64,
    }
}

pub mod auth {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Login {
        pub login_method: String,
        pub password: String,
    }

    impl Login {
        pub fn password(password: &str) -> Self {
            Self {
                login_method: "password".to_string(),
                password: password.to_string(),
            }
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct LoginData {
        pub token: Option<String>,
    }

    /// Body of `POST /account/login`.
    ///
    /// The server answers `{"status": "ok", "data": {"token": ...}}` on
    /// success and `{"status": "error", "reason": ...}` otherwise.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct LoginResponse {
        pub status: String,
        #[serde(default)]
        pub data: Option<LoginData>,
        #[serde(default)]
        pub reason: Option<String>,
    }
}

pub mod query {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct QueryRequest {
        pub query: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_update_skips_absent_fields() {
        let update = account::AccountUpdate {
            name: Some("Savings".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"name": "Savings"}));
    }

    #[test]
    fn account_type_uses_lowercase_wire_name() {
        let account: account::Account = serde_json::from_value(json!({
            "id": "a1",
            "name": "Checking",
            "type": "credit",
        }))
        .unwrap();
        assert_eq!(account.account_type, Some(account::AccountType::Credit));
        assert!(!account.closed);
    }

    #[test]
    fn login_body_matches_server_contract() {
        let body = serde_json::to_value(auth::Login::password("secret")).unwrap();
        assert_eq!(body, json!({"loginMethod": "password", "password": "secret"}));
    }

    #[test]
    fn add_options_are_flattened() {
        let body = transaction::TransactionsAdd {
            transactions: Vec::new(),
            options: transaction::AddOptions {
                run_transfers: true,
                learn_categories: false,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"transactions": [], "runTransfers": true, "learnCategories": false})
        );
    }
}
