use api_types::{
    DataResponse,
    account::{Account, AccountClose, AccountCreate, AccountNew, AccountUpdate},
    auth::{Login, LoginResponse},
    budget::BudgetAmount,
    category::{
        Category, CategoryGroup, CategoryGroupNew, CategoryGroupUpdate, CategoryNew,
        CategoryUpdate,
    },
    payee::{Payee, PayeeNew, PayeeUpdate},
    query::QueryRequest,
    transaction::{
        AddOptions, ImportResult, Transaction, TransactionNew, TransactionUpdate,
        TransactionsAdd, TransactionsImport,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use connector::{BudgetBackend, InitConfig, backend::BackendResult};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ClientError;

const TOKEN_HEADER: &str = "x-actual-token";
const ENCRYPTION_HEADER: &str = "budget-encryption-password";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`BudgetBackend`] talking to an HTTP bridge in front of an Actual server.
///
/// `init` logs in at the Actual server's `/account/login` and keeps the
/// session token; `download_budget` selects the budget every later call is
/// routed to. `shutdown` only forgets the token.
///
/// Budget calls go to `/v1/budgets/{syncId}/...` with the token in
/// `x-actual-token`. By default they share the server URL, which assumes a
/// bridge deployed behind the same origin as the Actual server and accepting
/// its session token. A bridge on its own origin is set with
/// [`HttpBackend::bridge`], and its API key is then sent as `x-api-key`.
#[derive(Clone, Default)]
pub struct HttpBackend {
    http: Client,
    server: Option<Url>,
    bridge: Option<Url>,
    api_key: Option<String>,
    token: Option<String>,
    sync_id: Option<String>,
    encryption_password: Option<String>,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            ..Self::default()
        }
    }

    /// Routes budget calls to a bridge at `bridge_url` instead of the
    /// Actual server, authenticating with `api_key` when given.
    pub fn bridge(
        mut self,
        bridge_url: &str,
        api_key: Option<&str>,
    ) -> Result<Self, ClientError> {
        self.bridge = Some(parse_server_url(bridge_url)?);
        self.api_key = api_key.map(str::to_string);
        Ok(self)
    }

    fn budget_request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, ClientError> {
        let (Some(server), Some(token)) = (&self.server, &self.token) else {
            return Err(ClientError::NotConnected("call init first"));
        };
        let Some(sync_id) = &self.sync_id else {
            return Err(ClientError::NotConnected("no budget downloaded"));
        };

        let mut path = vec!["v1", "budgets", sync_id.as_str()];
        path.extend_from_slice(segments);
        let base = self.bridge.as_ref().unwrap_or(server);
        let url = endpoint(base, &path)?;
        tracing::debug!(%method, %url, "budget request");

        let mut req = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, token.as_str());
        if let Some(api_key) = &self.api_key {
            req = req.header(API_KEY_HEADER, api_key.as_str());
        }
        if let Some(password) = &self.encryption_password {
            req = req.header(ENCRYPTION_HEADER, password.as_str());
        }
        Ok(req)
    }
}

pub(crate) fn parse_server_url(server_url: &str) -> Result<Url, ClientError> {
    let url = Url::parse(server_url.trim())
        .map_err(|err| ClientError::InvalidUrl(format!("{server_url}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(server_url.to_string()));
    }
    Ok(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `POST /account/login`; returns the session token.
pub(crate) async fn login(
    http: &Client,
    server: &Url,
    password: &str,
) -> Result<String, ClientError> {
    let resp = http
        .post(endpoint(server, &["account", "login"])?)
        .json(&Login::password(password))
        .send()
        .await?;

    let status = resp.status();
    let body = resp.json::<LoginResponse>().await.ok();
    let token = body
        .as_ref()
        .filter(|body| status.is_success() && body.status == "ok")
        .and_then(|body| body.data.as_ref())
        .and_then(|data| data.token.clone());

    match token {
        Some(token) => Ok(token),
        None => {
            let reason = body
                .and_then(|body| body.reason)
                .unwrap_or_else(|| format!("login rejected ({status})"));
            Err(ClientError::Unauthorized(reason))
        }
    }
}

async fn checked(req: RequestBuilder) -> Result<Response, ClientError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = match resp.json::<ErrorBody>().await {
        Ok(err) => err.error,
        Err(_) => "server error".to_string(),
    };
    Err(ClientError::from_status(status, message))
}

async fn data<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
    let resp = checked(req).await?;
    Ok(resp.json::<DataResponse<T>>().await?.data)
}

async fn unit(req: RequestBuilder) -> Result<(), ClientError> {
    checked(req).await?;
    Ok(())
}

#[async_trait]
impl BudgetBackend for HttpBackend {
    async fn init(&mut self, config: &InitConfig) -> BackendResult<()> {
        let server = parse_server_url(&config.server_url)?;
        let token = login(&self.http, &server, &config.password).await?;
        tracing::info!(server_url = %server, "logged in");
        self.server = Some(server);
        self.token = Some(token);
        Ok(())
    }

    async fn download_budget(
        &mut self,
        sync_id: &str,
        encryption_password: Option<&str>,
    ) -> BackendResult<()> {
        self.sync_id = Some(sync_id.to_string());
        self.encryption_password = encryption_password.map(str::to_string);
        let req = self.budget_request(Method::GET, &[])?;
        if let Err(err) = unit(req).await {
            self.sync_id = None;
            return Err(err.into());
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> BackendResult<()> {
        self.token = None;
        self.sync_id = None;
        self.encryption_password = None;
        Ok(())
    }

    async fn get_accounts(&mut self) -> BackendResult<Vec<Account>> {
        let req = self.budget_request(Method::GET, &["accounts"])?;
        Ok(data(req).await?)
    }

    async fn create_account(
        &mut self,
        account: &AccountNew,
        initial_balance: i64,
    ) -> BackendResult<String> {
        let body = AccountCreate {
            account: account.clone(),
            initial_balance,
        };
        let req = self.budget_request(Method::POST, &["accounts"])?.json(&body);
        Ok(data(req).await?)
    }

    async fn update_account(&mut self, id: &str, fields: &AccountUpdate) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["accounts", id])?
            .json(fields);
        Ok(unit(req).await?)
    }

    async fn close_account(
        &mut self,
        id: &str,
        transfer_account_id: Option<&str>,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let body = AccountClose {
            transfer_account_id: transfer_account_id.map(str::to_string),
            transfer_category_id: transfer_category_id.map(str::to_string),
        };
        let req = self
            .budget_request(Method::PUT, &["accounts", id, "close"])?
            .json(&body);
        Ok(unit(req).await?)
    }

    async fn reopen_account(&mut self, id: &str) -> BackendResult<()> {
        let req = self.budget_request(Method::PUT, &["accounts", id, "reopen"])?;
        Ok(unit(req).await?)
    }

    async fn delete_account(&mut self, id: &str) -> BackendResult<()> {
        let req = self.budget_request(Method::DELETE, &["accounts", id])?;
        Ok(unit(req).await?)
    }

    async fn get_account_balance(
        &mut self,
        id: &str,
        cutoff: Option<NaiveDate>,
    ) -> BackendResult<i64> {
        let mut req = self.budget_request(Method::GET, &["accounts", id, "balance"])?;
        if let Some(cutoff) = cutoff {
            req = req.query(&[("cutoff", cutoff.to_string())]);
        }
        Ok(data(req).await?)
    }

    async fn get_transactions(
        &mut self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> BackendResult<Vec<Transaction>> {
        let mut query = vec![("since_date", start_date.to_string())];
        if let Some(end_date) = end_date {
            query.push(("until_date", end_date.to_string()));
        }
        let req = self
            .budget_request(Method::GET, &["accounts", account_id, "transactions"])?
            .query(&query);
        Ok(data(req).await?)
    }

    async fn add_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
        options: AddOptions,
    ) -> BackendResult<Vec<String>> {
        let body = TransactionsAdd {
            transactions: transactions.to_vec(),
            options,
        };
        let req = self
            .budget_request(Method::POST, &["accounts", account_id, "transactions"])?
            .json(&body);
        Ok(data(req).await?)
    }

    async fn import_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
    ) -> BackendResult<ImportResult> {
        let body = TransactionsImport {
            transactions: transactions.to_vec(),
        };
        let req = self
            .budget_request(
                Method::POST,
                &["accounts", account_id, "transactions", "import"],
            )?
            .json(&body);
        Ok(data(req).await?)
    }

    async fn update_transaction(
        &mut self,
        id: &str,
        fields: &TransactionUpdate,
    ) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["transactions", id])?
            .json(fields);
        Ok(unit(req).await?)
    }

    async fn delete_transaction(&mut self, id: &str) -> BackendResult<()> {
        let req = self.budget_request(Method::DELETE, &["transactions", id])?;
        Ok(unit(req).await?)
    }

    async fn get_categories(&mut self) -> BackendResult<Vec<Category>> {
        let req = self.budget_request(Method::GET, &["categories"])?;
        Ok(data(req).await?)
    }

    async fn create_category(&mut self, category: &CategoryNew) -> BackendResult<String> {
        let req = self
            .budget_request(Method::POST, &["categories"])?
            .json(category);
        Ok(data(req).await?)
    }

    async fn update_category(&mut self, id: &str, fields: &CategoryUpdate) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["categories", id])?
            .json(fields);
        Ok(unit(req).await?)
    }

    async fn delete_category(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let mut req = self.budget_request(Method::DELETE, &["categories", id])?;
        if let Some(target) = transfer_category_id {
            req = req.query(&[("transfer_category_id", target)]);
        }
        Ok(unit(req).await?)
    }

    async fn get_category_groups(&mut self) -> BackendResult<Vec<CategoryGroup>> {
        let req = self.budget_request(Method::GET, &["categorygroups"])?;
        Ok(data(req).await?)
    }

    async fn create_category_group(&mut self, group: &CategoryGroupNew) -> BackendResult<String> {
        let req = self
            .budget_request(Method::POST, &["categorygroups"])?
            .json(group);
        Ok(data(req).await?)
    }

    async fn update_category_group(
        &mut self,
        id: &str,
        fields: &CategoryGroupUpdate,
    ) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["categorygroups", id])?
            .json(fields);
        Ok(unit(req).await?)
    }

    async fn delete_category_group(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let mut req = self.budget_request(Method::DELETE, &["categorygroups", id])?;
        if let Some(target) = transfer_category_id {
            req = req.query(&[("transfer_category_id", target)]);
        }
        Ok(unit(req).await?)
    }

    async fn get_payees(&mut self) -> BackendResult<Vec<Payee>> {
        let req = self.budget_request(Method::GET, &["payees"])?;
        Ok(data(req).await?)
    }

    async fn create_payee(&mut self, payee: &PayeeNew) -> BackendResult<String> {
        let req = self.budget_request(Method::POST, &["payees"])?.json(payee);
        Ok(data(req).await?)
    }

    async fn update_payee(&mut self, id: &str, fields: &PayeeUpdate) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["payees", id])?
            .json(fields);
        Ok(unit(req).await?)
    }

    async fn delete_payee(&mut self, id: &str) -> BackendResult<()> {
        let req = self.budget_request(Method::DELETE, &["payees", id])?;
        Ok(unit(req).await?)
    }

    async fn get_budget_months(&mut self) -> BackendResult<Vec<String>> {
        let req = self.budget_request(Method::GET, &["months"])?;
        Ok(data(req).await?)
    }

    async fn get_budget_month(&mut self, month: &str) -> BackendResult<Value> {
        let req = self.budget_request(Method::GET, &["months", month])?;
        Ok(data(req).await?)
    }

    async fn set_budget_amount(
        &mut self,
        month: &str,
        category_id: &str,
        amount: i64,
    ) -> BackendResult<()> {
        let req = self
            .budget_request(Method::PATCH, &["months", month, "categories", category_id])?
            .json(&BudgetAmount { budgeted: amount });
        Ok(unit(req).await?)
    }

    async fn run_query(&mut self, query: &str) -> BackendResult<Value> {
        let body = QueryRequest {
            query: query.to_string(),
        };
        let req = self
            .budget_request(Method::POST, &["run-query"])?
            .json(&body);
        Ok(data(req).await?)
    }

    async fn sync(&mut self) -> BackendResult<()> {
        let req = self.budget_request(Method::POST, &["sync"])?;
        Ok(unit(req).await?)
    }
}
