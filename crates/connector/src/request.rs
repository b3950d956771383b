//! Typed operation requests.
//!
//! The host hands over string selectors and a [`Parameters`] bag. Both are
//! validated here, before any backend session is opened, into a [`Request`]
//! with one variant per supported (resource, operation) pair.

use std::{fmt, str::FromStr};

use api_types::{
    account::{AccountNew, AccountType, AccountUpdate},
    category::{CategoryGroupNew, CategoryGroupUpdate, CategoryNew, CategoryUpdate},
    transaction::{AddOptions, TransactionNew, TransactionUpdate},
};
use chrono::NaiveDate;
use serde_json::Value;

use crate::{Amount, ConnectorError, Parameters, Result, parameters::amount_from_value};

/// Entity type an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Account,
    Transaction,
    Category,
    CategoryGroup,
    Payee,
    Budget,
    Utility,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::Category => "category",
            Self::CategoryGroup => "categoryGroup",
            Self::Payee => "payee",
            Self::Budget => "budget",
            Self::Utility => "utility",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "account" => Ok(Self::Account),
            "transaction" => Ok(Self::Transaction),
            "category" => Ok(Self::Category),
            "categoryGroup" => Ok(Self::CategoryGroup),
            "payee" => Ok(Self::Payee),
            "budget" => Ok(Self::Budget),
            "utility" => Ok(Self::Utility),
            other => Err(ConnectorError::UnknownResource(other.to_string())),
        }
    }
}

/// Verb applied to a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    GetAll,
    Update,
    Delete,
    Close,
    Reopen,
    GetBalance,
    Import,
    GetMonths,
    GetMonth,
    SetAmount,
    RunQuery,
    Sync,
    AmountToInteger,
    IntegerToAmount,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::GetAll => "getAll",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::GetBalance => "getBalance",
            Self::Import => "import",
            Self::GetMonths => "getMonths",
            Self::GetMonth => "getMonth",
            Self::SetAmount => "setAmount",
            Self::RunQuery => "runQuery",
            Self::Sync => "sync",
            Self::AmountToInteger => "amountToInteger",
            Self::IntegerToAmount => "integerToAmount",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim() {
            "create" => Self::Create,
            "get" => Self::Get,
            "getAll" => Self::GetAll,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "close" => Self::Close,
            "reopen" => Self::Reopen,
            "getBalance" => Self::GetBalance,
            "import" => Self::Import,
            "getMonths" => Self::GetMonths,
            "getMonth" => Self::GetMonth,
            "setAmount" => Self::SetAmount,
            "runQuery" => Self::RunQuery,
            "sync" => Self::Sync,
            "amountToInteger" => Self::AmountToInteger,
            "integerToAmount" => Self::IntegerToAmount,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AccountRequest {
    Create {
        account: AccountNew,
        initial_balance: Amount,
    },
    Get {
        id: String,
    },
    GetAll,
    Update {
        id: String,
        fields: AccountUpdate,
    },
    Close {
        id: String,
        transfer_account_id: Option<String>,
        transfer_category_id: Option<String>,
    },
    Reopen {
        id: String,
    },
    Delete {
        id: String,
    },
    GetBalance {
        id: String,
        cutoff: Option<NaiveDate>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransactionRequest {
    Create {
        account_id: String,
        transaction: TransactionNew,
        options: AddOptions,
    },
    GetAll {
        account_id: String,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    },
    Update {
        id: String,
        fields: TransactionUpdate,
    },
    Delete {
        id: String,
    },
    Import {
        account_id: String,
        transactions: Vec<TransactionNew>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CategoryRequest {
    Create(CategoryNew),
    GetAll,
    Update {
        id: String,
        fields: CategoryUpdate,
    },
    Delete {
        id: String,
        transfer_category_id: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CategoryGroupRequest {
    Create(CategoryGroupNew),
    GetAll,
    Update {
        id: String,
        fields: CategoryGroupUpdate,
    },
    Delete {
        id: String,
        transfer_category_id: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PayeeRequest {
    Create { name: String },
    GetAll,
    Update { id: String, name: String },
    Delete { id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum BudgetRequest {
    GetMonths,
    GetMonth {
        month: String,
    },
    SetAmount {
        month: String,
        category_id: String,
        amount: Amount,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum UtilityRequest {
    RunQuery { query: String },
    Sync,
    AmountToInteger { amount: Amount },
    IntegerToAmount { amount: i64 },
}

/// A validated operation, ready to dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Account(AccountRequest),
    Transaction(TransactionRequest),
    Category(CategoryRequest),
    CategoryGroup(CategoryGroupRequest),
    Payee(PayeeRequest),
    Budget(BudgetRequest),
    Utility(UtilityRequest),
}

impl Request {
    /// Builds a request from the `resource` and `operation` selectors and
    /// the remaining named parameters of `params`.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let resource = params.string("resource")?;
        let operation = params.string("operation")?;
        Self::parse(&resource, &operation, params)
    }

    /// Builds a request from explicit selectors.
    pub fn parse(resource: &str, operation: &str, params: &Parameters) -> Result<Self> {
        let resource: Resource = resource.parse()?;
        let unsupported = || ConnectorError::UnsupportedOperation {
            resource: resource.to_string(),
            operation: operation.trim().to_string(),
        };
        let op = Operation::parse(operation).ok_or_else(unsupported)?;

        let request = match (resource, op) {
            (Resource::Account, Operation::Create) => Self::Account(AccountRequest::Create {
                account: AccountNew {
                    name: params.string("name")?,
                    account_type: account_type(params, "type")?
                        .ok_or_else(|| ConnectorError::MissingParameter("type".to_string()))?,
                    offbudget: params.bool_or("offbudget", false)?,
                    closed: params.bool_or("closed", false)?,
                },
                initial_balance: params
                    .optional_amount("initialBalance")?
                    .unwrap_or(Amount::ZERO),
            }),
            (Resource::Account, Operation::Get) => Self::Account(AccountRequest::Get {
                id: params.string("accountId")?,
            }),
            (Resource::Account, Operation::GetAll) => Self::Account(AccountRequest::GetAll),
            (Resource::Account, Operation::Update) => {
                let fields = AccountUpdate {
                    name: params.optional_string("name")?,
                    account_type: account_type(params, "type")?,
                    offbudget: params.optional_bool("offbudget")?,
                };
                Self::Account(AccountRequest::Update {
                    id: params.string("accountId")?,
                    fields: non_empty(fields, AccountUpdate::is_empty, "name")?,
                })
            }
            (Resource::Account, Operation::Close) => Self::Account(AccountRequest::Close {
                id: params.string("accountId")?,
                transfer_account_id: params.optional_string("transferAccountId")?,
                transfer_category_id: params.optional_string("transferCategoryId")?,
            }),
            (Resource::Account, Operation::Reopen) => Self::Account(AccountRequest::Reopen {
                id: params.string("accountId")?,
            }),
            (Resource::Account, Operation::Delete) => Self::Account(AccountRequest::Delete {
                id: params.string("accountId")?,
            }),
            (Resource::Account, Operation::GetBalance) => {
                Self::Account(AccountRequest::GetBalance {
                    id: params.string("accountId")?,
                    cutoff: params.optional_date("cutoff")?,
                })
            }

            (Resource::Transaction, Operation::Create) => {
                Self::Transaction(TransactionRequest::Create {
                    account_id: params.string("accountId")?,
                    transaction: TransactionNew {
                        date: params.date("date")?,
                        amount: params.amount("amount")?.minor_units(),
                        payee: params.optional_string("payeeId")?,
                        payee_name: params.optional_string("payeeName")?,
                        category: params.optional_string("categoryId")?,
                        notes: params.optional_string("notes")?,
                        imported_id: params.optional_string("importedId")?,
                        cleared: params.bool_or("cleared", false)?,
                    },
                    options: AddOptions {
                        run_transfers: params.bool_or("runTransfers", false)?,
                        learn_categories: params.bool_or("learnCategories", false)?,
                    },
                })
            }
            (Resource::Transaction, Operation::GetAll) => {
                let start_date = params.date("startDate")?;
                let end_date = params.optional_date("endDate")?;
                if end_date.is_some_and(|end| end < start_date) {
                    return Err(ConnectorError::invalid(
                        "endDate",
                        "must not be before startDate",
                    ));
                }
                Self::Transaction(TransactionRequest::GetAll {
                    account_id: params.string("accountId")?,
                    start_date,
                    end_date,
                })
            }
            (Resource::Transaction, Operation::Update) => {
                let fields = TransactionUpdate {
                    date: params.optional_date("date")?,
                    amount: params.optional_amount("amount")?.map(Amount::minor_units),
                    payee: params.optional_string("payeeId")?,
                    category: params.optional_string("categoryId")?,
                    notes: params.optional_string("notes")?,
                    cleared: params.optional_bool("cleared")?,
                };
                Self::Transaction(TransactionRequest::Update {
                    id: params.string("transactionId")?,
                    fields: non_empty(fields, TransactionUpdate::is_empty, "amount")?,
                })
            }
            (Resource::Transaction, Operation::Delete) => {
                Self::Transaction(TransactionRequest::Delete {
                    id: params.string("transactionId")?,
                })
            }
            (Resource::Transaction, Operation::Import) => {
                let transactions = params
                    .array("transactions")?
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| import_item(idx, item))
                    .collect::<Result<Vec<_>>>()?;
                Self::Transaction(TransactionRequest::Import {
                    account_id: params.string("accountId")?,
                    transactions,
                })
            }

            (Resource::Category, Operation::Create) => Self::Category(CategoryRequest::Create(
                CategoryNew {
                    name: params.string("name")?,
                    group_id: params.string("groupId")?,
                    is_income: params.bool_or("isIncome", false)?,
                },
            )),
            (Resource::Category, Operation::GetAll) => Self::Category(CategoryRequest::GetAll),
            (Resource::Category, Operation::Update) => {
                let fields = CategoryUpdate {
                    name: params.optional_string("name")?,
                    group_id: params.optional_string("groupId")?,
                    hidden: params.optional_bool("hidden")?,
                };
                Self::Category(CategoryRequest::Update {
                    id: params.string("categoryId")?,
                    fields: non_empty(fields, CategoryUpdate::is_empty, "name")?,
                })
            }
            (Resource::Category, Operation::Delete) => Self::Category(CategoryRequest::Delete {
                id: params.string("categoryId")?,
                transfer_category_id: params.optional_string("transferCategoryId")?,
            }),

            (Resource::CategoryGroup, Operation::Create) => Self::CategoryGroup(
                CategoryGroupRequest::Create(CategoryGroupNew {
                    name: params.string("name")?,
                    is_income: params.bool_or("isIncome", false)?,
                }),
            ),
            (Resource::CategoryGroup, Operation::GetAll) => {
                Self::CategoryGroup(CategoryGroupRequest::GetAll)
            }
            (Resource::CategoryGroup, Operation::Update) => {
                let fields = CategoryGroupUpdate {
                    name: params.optional_string("name")?,
                    hidden: params.optional_bool("hidden")?,
                };
                Self::CategoryGroup(CategoryGroupRequest::Update {
                    id: params.string("groupId")?,
                    fields: non_empty(fields, CategoryGroupUpdate::is_empty, "name")?,
                })
            }
            (Resource::CategoryGroup, Operation::Delete) => {
                Self::CategoryGroup(CategoryGroupRequest::Delete {
                    id: params.string("groupId")?,
                    transfer_category_id: params.optional_string("transferCategoryId")?,
                })
            }

            (Resource::Payee, Operation::Create) => Self::Payee(PayeeRequest::Create {
                name: params.string("name")?,
            }),
            (Resource::Payee, Operation::GetAll) => Self::Payee(PayeeRequest::GetAll),
            (Resource::Payee, Operation::Update) => Self::Payee(PayeeRequest::Update {
                id: params.string("payeeId")?,
                name: params.string("name")?,
            }),
            (Resource::Payee, Operation::Delete) => Self::Payee(PayeeRequest::Delete {
                id: params.string("payeeId")?,
            }),

            (Resource::Budget, Operation::GetMonths) => Self::Budget(BudgetRequest::GetMonths),
            (Resource::Budget, Operation::GetMonth) => Self::Budget(BudgetRequest::GetMonth {
                month: params.month("month")?,
            }),
            (Resource::Budget, Operation::SetAmount) => Self::Budget(BudgetRequest::SetAmount {
                month: params.month("month")?,
                category_id: params.string("categoryId")?,
                amount: params.amount("amount")?,
            }),

            (Resource::Utility, Operation::RunQuery) => Self::Utility(UtilityRequest::RunQuery {
                query: params.string("query")?,
            }),
            (Resource::Utility, Operation::Sync) => Self::Utility(UtilityRequest::Sync),
            (Resource::Utility, Operation::AmountToInteger) => {
                Self::Utility(UtilityRequest::AmountToInteger {
                    amount: params.amount("amount")?,
                })
            }
            (Resource::Utility, Operation::IntegerToAmount) => {
                Self::Utility(UtilityRequest::IntegerToAmount {
                    amount: params.integer("amount")?,
                })
            }

            _ => return Err(unsupported()),
        };

        Ok(request)
    }

    pub fn resource(&self) -> Resource {
        match self {
            Self::Account(_) => Resource::Account,
            Self::Transaction(_) => Resource::Transaction,
            Self::Category(_) => Resource::Category,
            Self::CategoryGroup(_) => Resource::CategoryGroup,
            Self::Payee(_) => Resource::Payee,
            Self::Budget(_) => Resource::Budget,
            Self::Utility(_) => Resource::Utility,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Account(req) => match req {
                AccountRequest::Create { .. } => Operation::Create,
                AccountRequest::Get { .. } => Operation::Get,
                AccountRequest::GetAll => Operation::GetAll,
                AccountRequest::Update { .. } => Operation::Update,
                AccountRequest::Close { .. } => Operation::Close,
                AccountRequest::Reopen { .. } => Operation::Reopen,
                AccountRequest::Delete { .. } => Operation::Delete,
                AccountRequest::GetBalance { .. } => Operation::GetBalance,
            },
            Self::Transaction(req) => match req {
                TransactionRequest::Create { .. } => Operation::Create,
                TransactionRequest::GetAll { .. } => Operation::GetAll,
                TransactionRequest::Update { .. } => Operation::Update,
                TransactionRequest::Delete { .. } => Operation::Delete,
                TransactionRequest::Import { .. } => Operation::Import,
            },
            Self::Category(req) => match req {
                CategoryRequest::Create(_) => Operation::Create,
                CategoryRequest::GetAll => Operation::GetAll,
                CategoryRequest::Update { .. } => Operation::Update,
                CategoryRequest::Delete { .. } => Operation::Delete,
            },
            Self::CategoryGroup(req) => match req {
                CategoryGroupRequest::Create(_) => Operation::Create,
                CategoryGroupRequest::GetAll => Operation::GetAll,
                CategoryGroupRequest::Update { .. } => Operation::Update,
                CategoryGroupRequest::Delete { .. } => Operation::Delete,
            },
            Self::Payee(req) => match req {
                PayeeRequest::Create { .. } => Operation::Create,
                PayeeRequest::GetAll => Operation::GetAll,
                PayeeRequest::Update { .. } => Operation::Update,
                PayeeRequest::Delete { .. } => Operation::Delete,
            },
            Self::Budget(req) => match req {
                BudgetRequest::GetMonths => Operation::GetMonths,
                BudgetRequest::GetMonth { .. } => Operation::GetMonth,
                BudgetRequest::SetAmount { .. } => Operation::SetAmount,
            },
            Self::Utility(req) => match req {
                UtilityRequest::RunQuery { .. } => Operation::RunQuery,
                UtilityRequest::Sync => Operation::Sync,
                UtilityRequest::AmountToInteger { .. } => Operation::AmountToInteger,
                UtilityRequest::IntegerToAmount { .. } => Operation::IntegerToAmount,
            },
        }
    }

    /// `resource.operation`, used to annotate failures and logs.
    pub fn context(&self) -> String {
        format!("{}.{}", self.resource(), self.operation())
    }

    /// Pure conversions run without a backend session.
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            Self::Utility(UtilityRequest::AmountToInteger { .. })
                | Self::Utility(UtilityRequest::IntegerToAmount { .. })
        )
    }
}

fn account_type(params: &Parameters, name: &str) -> Result<Option<AccountType>> {
    params
        .optional_string(name)?
        .map(|raw| {
            AccountType::parse(&raw)
                .ok_or_else(|| ConnectorError::invalid(name, format!("unknown account type \"{raw}\"")))
        })
        .transpose()
}

fn non_empty<T>(fields: T, is_empty: fn(&T) -> bool, hint: &str) -> Result<T> {
    if is_empty(&fields) {
        return Err(ConnectorError::invalid(
            hint,
            "provide at least one field to update",
        ));
    }
    Ok(fields)
}

/// Converts one element of the `transactions` array of an import.
///
/// Elements use the display form (`amount` as a decimal) and the backend's
/// field names for everything else.
fn import_item(idx: usize, item: &Value) -> Result<TransactionNew> {
    let name = format!("transactions[{idx}]");
    let Value::Object(map) = item else {
        return Err(ConnectorError::invalid(&name, "expected an object"));
    };
    let params = Parameters::from(map.clone());
    let wrap = |err: ConnectorError| match err {
        ConnectorError::MissingParameter(field) => {
            ConnectorError::invalid(&name, format!("missing \"{field}\""))
        }
        ConnectorError::InvalidParameter { name: field, reason } => {
            ConnectorError::invalid(&name, format!("\"{field}\": {reason}"))
        }
        other => other,
    };

    let amount = params
        .get("amount")
        .ok_or_else(|| ConnectorError::MissingParameter("amount".to_string()))
        .and_then(amount_from_value)
        .map_err(wrap)?;

    Ok(TransactionNew {
        date: params.date("date").map_err(wrap)?,
        amount: amount.minor_units(),
        payee: params.optional_string("payee").map_err(wrap)?,
        payee_name: params.optional_string("payee_name").map_err(wrap)?,
        category: params.optional_string("category").map_err(wrap)?,
        notes: params.optional_string("notes").map_err(wrap)?,
        imported_id: params.optional_string("imported_id").map_err(wrap)?,
        cleared: params.bool_or("cleared", false).map_err(wrap)?,
    })
}
