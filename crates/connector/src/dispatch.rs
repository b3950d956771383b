//! Maps a validated [`Request`] onto the backend call that serves it.

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    BackendError, BudgetBackend, ConnectorError, Result, Session,
    amount::integer_to_amount,
    request::{
        AccountRequest, BudgetRequest, CategoryGroupRequest, CategoryRequest, PayeeRequest,
        Request, TransactionRequest, UtilityRequest,
    },
};
use api_types::payee::{PayeeNew, PayeeUpdate};

/// Literal returned by a successful `utility.sync`.
pub const SYNC_OK: &str = "OK";

/// Runs `request` and returns the value that goes under `data` in the
/// result record.
///
/// The session is opened first when the request needs the backend.
pub async fn dispatch<B: BudgetBackend + ?Sized>(
    session: &mut Session<'_, B>,
    request: &Request,
) -> Result<Value> {
    let context = request.context();
    tracing::debug!(operation = %context, "dispatching");

    if request.requires_session() {
        session.ensure_open().await?;
    }

    let backend = session.backend();
    let result = match request {
        Request::Account(req) => account(backend, req).await,
        Request::Transaction(req) => transaction(backend, req).await,
        Request::Category(req) => category(backend, req).await,
        Request::CategoryGroup(req) => category_group(backend, req).await,
        Request::Payee(req) => payee(backend, req).await,
        Request::Budget(req) => budget(backend, req).await,
        Request::Utility(req) => utility(backend, req).await,
    };

    result.map_err(|failure| failure.into_error(context))
}

/// Why a dispatched call produced no value.
#[derive(Debug)]
enum Failure {
    Backend(BackendError),
    Encode(serde_json::Error),
}

impl From<BackendError> for Failure {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

impl Failure {
    fn into_error(self, context: String) -> ConnectorError {
        match self {
            Self::Backend(source) => ConnectorError::Backend { context, source },
            Self::Encode(err) => ConnectorError::Encode {
                context,
                message: err.to_string(),
            },
        }
    }
}

type Outcome = std::result::Result<Value, Failure>;

fn to_value<T: Serialize>(value: T) -> Outcome {
    serde_json::to_value(value).map_err(Failure::Encode)
}

async fn account<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &AccountRequest,
) -> Outcome {
    match req {
        AccountRequest::Create {
            account,
            initial_balance,
        } => {
            let id = backend
                .create_account(account, initial_balance.minor_units())
                .await?;
            Ok(Value::String(id))
        }
        AccountRequest::Get { id } => {
            let account = backend
                .get_accounts()
                .await?
                .into_iter()
                .find(|account| &account.id == id)
                .ok_or_else(|| BackendError::NotFound(id.clone()))?;
            to_value(account)
        }
        AccountRequest::GetAll => to_value(backend.get_accounts().await?),
        AccountRequest::Update { id, fields } => {
            backend.update_account(id, fields).await?;
            Ok(Value::Null)
        }
        AccountRequest::Close {
            id,
            transfer_account_id,
            transfer_category_id,
        } => {
            backend
                .close_account(
                    id,
                    transfer_account_id.as_deref(),
                    transfer_category_id.as_deref(),
                )
                .await?;
            Ok(Value::Null)
        }
        AccountRequest::Reopen { id } => {
            backend.reopen_account(id).await?;
            Ok(Value::Null)
        }
        AccountRequest::Delete { id } => {
            backend.delete_account(id).await?;
            Ok(Value::Null)
        }
        AccountRequest::GetBalance { id, cutoff } => {
            let balance = backend.get_account_balance(id, *cutoff).await?;
            Ok(json!(balance))
        }
    }
}

async fn transaction<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &TransactionRequest,
) -> Outcome {
    match req {
        TransactionRequest::Create {
            account_id,
            transaction,
            options,
        } => {
            let ids = backend
                .add_transactions(account_id, std::slice::from_ref(transaction), *options)
                .await?;
            to_value(ids)
        }
        TransactionRequest::GetAll {
            account_id,
            start_date,
            end_date,
        } => to_value(
            backend
                .get_transactions(account_id, *start_date, *end_date)
                .await?,
        ),
        TransactionRequest::Update { id, fields } => {
            backend.update_transaction(id, fields).await?;
            Ok(Value::Null)
        }
        TransactionRequest::Delete { id } => {
            backend.delete_transaction(id).await?;
            Ok(Value::Null)
        }
        TransactionRequest::Import {
            account_id,
            transactions,
        } => to_value(backend.import_transactions(account_id, transactions).await?),
    }
}

async fn category<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &CategoryRequest,
) -> Outcome {
    match req {
        CategoryRequest::Create(category) => {
            Ok(Value::String(backend.create_category(category).await?))
        }
        CategoryRequest::GetAll => to_value(backend.get_categories().await?),
        CategoryRequest::Update { id, fields } => {
            backend.update_category(id, fields).await?;
            Ok(Value::Null)
        }
        CategoryRequest::Delete {
            id,
            transfer_category_id,
        } => {
            backend
                .delete_category(id, transfer_category_id.as_deref())
                .await?;
            Ok(Value::Null)
        }
    }
}

async fn category_group<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &CategoryGroupRequest,
) -> Outcome {
    match req {
        CategoryGroupRequest::Create(group) => {
            Ok(Value::String(backend.create_category_group(group).await?))
        }
        CategoryGroupRequest::GetAll => to_value(backend.get_category_groups().await?),
        CategoryGroupRequest::Update { id, fields } => {
            backend.update_category_group(id, fields).await?;
            Ok(Value::Null)
        }
        CategoryGroupRequest::Delete {
            id,
            transfer_category_id,
        } => {
            backend
                .delete_category_group(id, transfer_category_id.as_deref())
                .await?;
            Ok(Value::Null)
        }
    }
}

async fn payee<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &PayeeRequest,
) -> Outcome {
    match req {
        PayeeRequest::Create { name } => {
            let id = backend.create_payee(&PayeeNew { name: name.clone() }).await?;
            Ok(Value::String(id))
        }
        PayeeRequest::GetAll => to_value(backend.get_payees().await?),
        PayeeRequest::Update { id, name } => {
            let fields = PayeeUpdate {
                name: Some(name.clone()),
            };
            backend.update_payee(id, &fields).await?;
            Ok(Value::Null)
        }
        PayeeRequest::Delete { id } => {
            backend.delete_payee(id).await?;
            Ok(Value::Null)
        }
    }
}

async fn budget<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &BudgetRequest,
) -> Outcome {
    match req {
        BudgetRequest::GetMonths => to_value(backend.get_budget_months().await?),
        BudgetRequest::GetMonth { month } => Ok(backend.get_budget_month(month).await?),
        BudgetRequest::SetAmount {
            month,
            category_id,
            amount,
        } => {
            backend
                .set_budget_amount(month, category_id, amount.minor_units())
                .await?;
            Ok(Value::Null)
        }
    }
}

async fn utility<B: BudgetBackend + ?Sized>(
    backend: &mut B,
    req: &UtilityRequest,
) -> Outcome {
    match req {
        UtilityRequest::RunQuery { query } => Ok(query_rows(backend.run_query(query).await?)),
        UtilityRequest::Sync => {
            backend.sync().await?;
            Ok(Value::String(SYNC_OK.to_string()))
        }
        UtilityRequest::AmountToInteger { amount } => Ok(json!(amount.minor_units())),
        UtilityRequest::IntegerToAmount { amount } => {
            Ok(Value::String(integer_to_amount(*amount)))
        }
    }
}

/// Normalizes a query result into an array of rows.
fn query_rows(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        Value::Object(mut map) => match map.remove("data") {
            Some(rows @ Value::Array(_)) => rows,
            Some(Value::Null) => Value::Array(Vec::new()),
            Some(other) => Value::Array(vec![other]),
            None => Value::Array(vec![Value::Object(map)]),
        },
        other => Value::Array(vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_rows_always_yields_an_array() {
        assert_eq!(query_rows(Value::Null), json!([]));
        assert_eq!(query_rows(json!([{"id": 1}])), json!([{"id": 1}]));
        assert_eq!(query_rows(json!({"data": [{"id": 1}]})), json!([{"id": 1}]));
        assert_eq!(query_rows(json!({"data": null})), json!([]));
        assert_eq!(query_rows(json!({"data": 3})), json!([3]));
        assert_eq!(query_rows(json!({"id": 1})), json!([{"id": 1}]));
        assert_eq!(query_rows(json!(7)), json!([7]));
    }

    #[test]
    fn encoding_failures_are_not_backend_errors() {
        let mut unencodable = std::collections::BTreeMap::new();
        unencodable.insert((1, 2), "pair keys are not JSON object keys");

        let failure = to_value(unencodable).unwrap_err();
        let err = failure.into_error("account.getAll".to_string());
        assert!(matches!(
            err,
            ConnectorError::Encode { ref context, .. } if context == "account.getAll"
        ));
        assert_eq!(err.backend(), None);

        let err = Failure::from(BackendError::Invalid("bad".to_string()))
            .into_error("payee.create".to_string());
        assert!(matches!(err, ConnectorError::Backend { .. }));
    }
}
