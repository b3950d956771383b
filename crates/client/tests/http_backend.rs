use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use actual_client::{ClientError, HttpBackend, check_credentials};
use api_types::{
    account::{AccountNew, AccountType},
    category::CategoryGroupNew,
    transaction::{AddOptions, TransactionNew, TransactionUpdate},
};
use axum::{
    Json, Router,
    extract::{MatchedPath, Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{delete, get, patch, post},
};
use chrono::NaiveDate;
use connector::{
    BackendError, BudgetBackend, ConnectorError, Credentials, InitConfig, Node, Parameters,
};
use serde_json::{Value, json};

const PASSWORD: &str = "secret";
const TOKEN: &str = "token-1";
const SYNC_ID: &str = "budget-1";
const TRANSACTIONS: &str = "/v1/budgets/{sync_id}/accounts/{id}/transactions";
const IMPORT: &str = "/v1/budgets/{sync_id}/accounts/{id}/transactions/import";
const GROUPS: &str = "/v1/budgets/{sync_id}/categorygroups";
const MONTHS: &str = "/v1/budgets/{sync_id}/months";

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// A budget call as the bridge received it.
#[derive(Clone, Debug)]
struct Seen {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    body: Value,
    encryption: Option<String>,
    api_key: Option<String>,
}

#[derive(Clone, Default)]
struct Mock {
    log: Arc<Mutex<Vec<String>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Mock {
    fn push(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn last(&self) -> Seen {
        self.calls().pop().unwrap()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

fn authorize(headers: &HeaderMap, sync_id: &str) -> Result<(), (StatusCode, Json<Value>)> {
    match headers.get("x-actual-token").and_then(|v| v.to_str().ok()) {
        Some(TOKEN) => {}
        _ => return Err(reject(StatusCode::UNAUTHORIZED, "token-expired")),
    }
    if sync_id != SYNC_ID {
        return Err(reject(StatusCode::NOT_FOUND, "budget not found"));
    }
    Ok(())
}

async fn login(State(mock): State<Mock>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    mock.push(format!("login {body}"));
    if body == json!({ "loginMethod": "password", "password": PASSWORD }) {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "data": { "token": TOKEN } })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "reason": "invalid-password" })),
        )
    }
}

async fn budget(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Path(sync_id): Path<String>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    match header(&headers, "budget-encryption-password") {
        Some(password) => mock.push(format!("download encrypted={password}")),
        None => mock.push("download"),
    }
    Ok(Json(json!({ "data": { "id": sync_id } })))
}

async fn accounts(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Path(sync_id): Path<String>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    mock.push("accounts");
    Ok(Json(json!({
        "data": [
            { "id": "acc-1", "name": "Checking", "type": "checking", "offbudget": false, "closed": false }
        ]
    })))
}

async fn create_account(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Path(sync_id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    mock.push(format!("create {body}"));
    Ok(Json(json!({ "data": "acc-2" })))
}

async fn balance(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Path((sync_id, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    if id != "acc-1" {
        return Err(reject(StatusCode::NOT_FOUND, "account not found"));
    }
    mock.push(format!("balance cutoff={:?}", query.get("cutoff")));
    Ok(Json(json!({ "data": 12345 })))
}

async fn update_category(
    headers: HeaderMap,
    Path((sync_id, _id)): Path<(String, String)>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    Err(reject(StatusCode::UNPROCESSABLE_ENTITY, "name is required"))
}

async fn delete_payee(headers: HeaderMap, Path((sync_id, _id)): Path<(String, String)>) -> Reply {
    authorize(&headers, &sync_id)?;
    Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "database locked"))
}

async fn run_query(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Path(sync_id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&headers, &sync_id)?;
    mock.push(format!("query {}", body["query"]));
    Ok(Json(json!({ "data": { "data": [{ "id": "acc-1" }] } })))
}

async fn sync(State(mock): State<Mock>, headers: HeaderMap, Path(sync_id): Path<String>) -> Reply {
    authorize(&headers, &sync_id)?;
    mock.push("sync");
    Ok(Json(json!({ "data": null })))
}

/// Records the call and answers with a canned payload for its route.
async fn answer(
    State(mock): State<Mock>,
    route: MatchedPath,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Reply {
    let sync_id = uri.path().split('/').nth(3).unwrap_or_default();
    authorize(&headers, sync_id)?;
    mock.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: uri.path().to_string(),
        query,
        body: if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap()
        },
        encryption: header(&headers, "budget-encryption-password"),
        api_key: header(&headers, "x-api-key"),
    });

    let data = match (method.as_str(), route.as_str()) {
        ("GET", TRANSACTIONS) => json!([{
            "id": "tx-1",
            "account": "acc-1",
            "date": "2024-05-02",
            "amount": -1250,
            "notes": "coffee",
            "cleared": true
        }]),
        ("POST", TRANSACTIONS) => json!(["tx-1", "tx-2"]),
        ("POST", IMPORT) => json!({ "added": ["tx-3"], "updated": ["tx-1"] }),
        ("GET", GROUPS) => json!([{
            "id": "grp-1",
            "name": "Bills",
            "categories": [{ "id": "cat-1", "name": "Rent", "group_id": "grp-1" }]
        }]),
        ("POST", GROUPS) => json!("grp-2"),
        ("GET", MONTHS) => json!(["2024-04", "2024-05"]),
        _ => Value::Null,
    };
    Ok(Json(json!({ "data": data })))
}

async fn spawn(mock: Mock) -> String {
    let app = Router::new()
        .route("/account/login", post(login))
        .route("/v1/budgets/{sync_id}", get(budget))
        .route(
            "/v1/budgets/{sync_id}/accounts",
            get(accounts).post(create_account),
        )
        .route("/v1/budgets/{sync_id}/accounts/{id}/balance", get(balance))
        .route(TRANSACTIONS, get(answer).post(answer))
        .route(IMPORT, post(answer))
        .route(
            "/v1/budgets/{sync_id}/transactions/{id}",
            patch(answer).delete(answer),
        )
        .route(
            "/v1/budgets/{sync_id}/categories/{id}",
            patch(update_category).delete(answer),
        )
        .route(GROUPS, get(answer).post(answer))
        .route("/v1/budgets/{sync_id}/categorygroups/{id}", delete(answer))
        .route(MONTHS, get(answer))
        .route(
            "/v1/budgets/{sync_id}/months/{month}/categories/{id}",
            patch(answer),
        )
        .route("/v1/budgets/{sync_id}/payees/{id}", delete(delete_payee))
        .route("/v1/budgets/{sync_id}/run-query", post(run_query))
        .route("/v1/budgets/{sync_id}/sync", post(sync))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn init_config(server_url: &str, password: &str) -> InitConfig {
    InitConfig {
        server_url: server_url.to_string(),
        password: password.to_string(),
        data_dir: "data".into(),
    }
}

async fn connected(mock: &Mock) -> HttpBackend {
    connected_with(mock, None).await
}

async fn connected_with(mock: &Mock, encryption_password: Option<&str>) -> HttpBackend {
    let server_url = spawn(mock.clone()).await;
    let mut backend = HttpBackend::new();
    backend
        .init(&init_config(&server_url, PASSWORD))
        .await
        .unwrap();
    backend
        .download_budget(SYNC_ID, encryption_password)
        .await
        .unwrap();
    backend
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn login_sends_password_and_token_reaches_data_calls() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let accounts = backend.get_accounts().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].name, "Checking");
    assert_eq!(accounts[0].account_type, Some(AccountType::Checking));

    let entries = mock.entries();
    assert_eq!(
        entries[0],
        format!("login {}", json!({ "loginMethod": "password", "password": PASSWORD }))
    );
    assert_eq!(&entries[1..], ["download", "accounts"]);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let server_url = spawn(Mock::default()).await;
    let mut backend = HttpBackend::new();

    let err = backend
        .init(&init_config(&server_url, "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::Unauthorized("invalid-password".to_string()));
}

#[tokio::test]
async fn unknown_budget_is_not_found() {
    let server_url = spawn(Mock::default()).await;
    let mut backend = HttpBackend::new();
    backend
        .init(&init_config(&server_url, PASSWORD))
        .await
        .unwrap();

    let err = backend.download_budget("missing", None).await.unwrap_err();
    assert_eq!(err, BackendError::NotFound("budget not found".to_string()));
}

#[tokio::test]
async fn create_account_posts_account_and_initial_balance() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let account = AccountNew {
        name: "Savings".to_string(),
        account_type: AccountType::Savings,
        offbudget: false,
        closed: false,
    };
    let id = backend.create_account(&account, 5000).await.unwrap();
    assert_eq!(id, "acc-2");

    let created = mock.entries().pop().unwrap();
    let body: Value = serde_json::from_str(created.trim_start_matches("create ")).unwrap();
    assert_eq!(body["account"]["name"], "Savings");
    assert_eq!(body["account"]["type"], "savings");
    assert_eq!(body["initialBalance"], 5000);
}

#[tokio::test]
async fn balance_passes_the_cutoff() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let cutoff = NaiveDate::from_ymd_opt(2024, 1, 31);
    let balance = backend.get_account_balance("acc-1", cutoff).await.unwrap();
    assert_eq!(balance, 12345);
    assert_eq!(
        mock.entries().last().map(String::as_str),
        Some("balance cutoff=Some(\"2024-01-31\")")
    );

    let err = backend.get_account_balance("acc-9", None).await.unwrap_err();
    assert_eq!(err, BackendError::NotFound("account not found".to_string()));
}

#[tokio::test]
async fn error_statuses_map_to_backend_errors() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let fields = api_types::category::CategoryUpdate {
        name: Some(String::new()),
        ..Default::default()
    };
    let err = backend.update_category("cat-1", &fields).await.unwrap_err();
    assert_eq!(err, BackendError::Invalid("name is required".to_string()));

    let err = backend.delete_payee("payee-1").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Server {
            status: 500,
            message: "database locked".to_string()
        }
    );
}

#[tokio::test]
async fn shutdown_forgets_the_token() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;
    backend.shutdown().await.unwrap();

    let err = backend.get_accounts().await.unwrap_err();
    assert!(matches!(err, BackendError::Invalid(_)));
    assert_eq!(mock.entries().last().map(String::as_str), Some("download"));
}

#[tokio::test]
async fn node_runs_against_the_bridge() {
    let mock = Mock::default();
    let server_url = spawn(mock.clone()).await;
    let node = Node::builder()
        .credentials(Credentials::new(&server_url, PASSWORD, SYNC_ID))
        .build()
        .unwrap();
    let mut backend = HttpBackend::new();

    let params = Parameters::new()
        .with("resource", "utility")
        .with("operation", "runQuery")
        .with("query", "SELECT * FROM accounts LIMIT 1");
    let records = node.execute(&mut backend, &params, 1).await.unwrap();
    assert_eq!(records[0].json, json!({ "data": [{ "id": "acc-1" }] }));

    let params = Parameters::new()
        .with("resource", "utility")
        .with("operation", "sync");
    let records = node.execute(&mut backend, &params, 2).await.unwrap();
    assert_eq!(records[1].json, json!({ "data": "OK" }));

    let logins = mock
        .entries()
        .iter()
        .filter(|e| e.starts_with("login"))
        .count();
    assert_eq!(logins, 2);
    assert!(mock.entries().contains(&"query \"SELECT * FROM accounts LIMIT 1\"".to_string()));
}

#[tokio::test]
async fn node_reports_login_failure_as_session_error() {
    let server_url = spawn(Mock::default()).await;
    let node = Node::builder()
        .credentials(Credentials::new(&server_url, "wrong", SYNC_ID))
        .build()
        .unwrap();
    let params = Parameters::new()
        .with("resource", "account")
        .with("operation", "getAll");

    let err = node
        .execute(&mut HttpBackend::new(), &params, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Session { .. }));
}

#[tokio::test]
async fn check_accepts_valid_credentials() {
    let mock = Mock::default();
    let server_url = spawn(mock.clone()).await;

    check_credentials(&Credentials::new(&server_url, PASSWORD, SYNC_ID))
        .await
        .unwrap();
    assert_eq!(mock.entries().len(), 1);

    let err = check_credentials(&Credentials::new(&server_url, "nope", SYNC_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(reason) if reason == "invalid-password"));
}

#[tokio::test]
async fn transactions_are_listed_within_the_date_window() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let transactions = backend
        .get_transactions("acc-1", date(2024, 5, 1), Some(date(2024, 5, 31)))
        .await
        .unwrap();
    assert_eq!(transactions[0].id, "tx-1");
    assert_eq!(transactions[0].amount, -1250);
    assert_eq!(transactions[0].notes.as_deref(), Some("coffee"));

    let seen = mock.last();
    assert_eq!(seen.method, Method::GET);
    assert_eq!(seen.path, "/v1/budgets/budget-1/accounts/acc-1/transactions");
    assert_eq!(
        seen.query,
        query(&[("since_date", "2024-05-01"), ("until_date", "2024-05-31")])
    );

    backend
        .get_transactions("acc-1", date(2024, 5, 1), None)
        .await
        .unwrap();
    assert_eq!(mock.last().query, query(&[("since_date", "2024-05-01")]));
}

#[tokio::test]
async fn added_and_imported_transactions_post_to_the_account() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;
    let transaction = TransactionNew {
        date: date(2024, 5, 3),
        amount: -500,
        payee: None,
        payee_name: Some("Bakery".to_string()),
        category: None,
        notes: None,
        imported_id: None,
        cleared: false,
    };
    let expected = json!({
        "date": "2024-05-03",
        "amount": -500,
        "payee_name": "Bakery",
        "cleared": false
    });

    let options = AddOptions {
        run_transfers: true,
        learn_categories: false,
    };
    let ids = backend
        .add_transactions("acc-1", std::slice::from_ref(&transaction), options)
        .await
        .unwrap();
    assert_eq!(ids, ["tx-1", "tx-2"]);

    let seen = mock.last();
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/v1/budgets/budget-1/accounts/acc-1/transactions");
    assert_eq!(
        seen.body,
        json!({
            "transactions": [expected.clone()],
            "runTransfers": true,
            "learnCategories": false
        })
    );

    let result = backend
        .import_transactions("acc-1", &[transaction])
        .await
        .unwrap();
    assert_eq!(result.added, ["tx-3"]);
    assert_eq!(result.updated, ["tx-1"]);
    assert!(result.errors.is_empty());

    let seen = mock.last();
    assert_eq!(seen.method, Method::POST);
    assert_eq!(
        seen.path,
        "/v1/budgets/budget-1/accounts/acc-1/transactions/import"
    );
    assert_eq!(seen.body, json!({ "transactions": [expected] }));
}

#[tokio::test]
async fn transactions_are_patched_and_deleted_by_id() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let fields = TransactionUpdate {
        amount: Some(-700),
        notes: Some("lunch".to_string()),
        ..Default::default()
    };
    backend.update_transaction("tx-1", &fields).await.unwrap();
    let seen = mock.last();
    assert_eq!(seen.method, Method::PATCH);
    assert_eq!(seen.path, "/v1/budgets/budget-1/transactions/tx-1");
    assert_eq!(seen.body, json!({ "amount": -700, "notes": "lunch" }));

    backend.delete_transaction("tx-1").await.unwrap();
    let seen = mock.last();
    assert_eq!(seen.method, Method::DELETE);
    assert_eq!(seen.path, "/v1/budgets/budget-1/transactions/tx-1");
    assert_eq!(seen.body, Value::Null);
}

#[tokio::test]
async fn category_groups_and_deletes_pass_the_transfer_target() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let groups = backend.get_category_groups().await.unwrap();
    assert_eq!(groups[0].name, "Bills");
    assert_eq!(groups[0].categories[0].name, "Rent");
    assert_eq!(mock.last().path, "/v1/budgets/budget-1/categorygroups");

    let group = CategoryGroupNew {
        name: "Savings".to_string(),
        is_income: false,
    };
    let id = backend.create_category_group(&group).await.unwrap();
    assert_eq!(id, "grp-2");
    let seen = mock.last();
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.body, json!({ "name": "Savings", "is_income": false }));

    backend
        .delete_category_group("grp-1", Some("cat-9"))
        .await
        .unwrap();
    let seen = mock.last();
    assert_eq!(seen.method, Method::DELETE);
    assert_eq!(seen.path, "/v1/budgets/budget-1/categorygroups/grp-1");
    assert_eq!(seen.query, query(&[("transfer_category_id", "cat-9")]));

    backend
        .delete_category("cat-1", Some("cat-2"))
        .await
        .unwrap();
    let seen = mock.last();
    assert_eq!(seen.method, Method::DELETE);
    assert_eq!(seen.path, "/v1/budgets/budget-1/categories/cat-1");
    assert_eq!(seen.query, query(&[("transfer_category_id", "cat-2")]));

    backend.delete_category("cat-3", None).await.unwrap();
    assert!(mock.last().query.is_empty());
}

#[tokio::test]
async fn budget_months_and_amounts() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;

    let months = backend.get_budget_months().await.unwrap();
    assert_eq!(months, ["2024-04", "2024-05"]);
    let seen = mock.last();
    assert_eq!(seen.method, Method::GET);
    assert_eq!(seen.path, "/v1/budgets/budget-1/months");

    backend
        .set_budget_amount("2024-05", "cat-1", 25000)
        .await
        .unwrap();
    let seen = mock.last();
    assert_eq!(seen.method, Method::PATCH);
    assert_eq!(seen.path, "/v1/budgets/budget-1/months/2024-05/categories/cat-1");
    assert_eq!(seen.body, json!({ "budgeted": 25000 }));
}

#[tokio::test]
async fn encryption_password_rides_on_every_budget_call() {
    let mock = Mock::default();
    let mut backend = connected_with(&mock, Some("hunter2")).await;

    backend.get_budget_months().await.unwrap();
    backend.get_category_groups().await.unwrap();
    backend.delete_transaction("tx-1").await.unwrap();

    assert!(mock.entries().contains(&"download encrypted=hunter2".to_string()));
    let calls = mock.calls();
    assert_eq!(calls.len(), 3);
    assert!(
        calls
            .iter()
            .all(|seen| seen.encryption.as_deref() == Some("hunter2"))
    );

    backend.download_budget(SYNC_ID, None).await.unwrap();
    backend.get_budget_months().await.unwrap();
    assert_eq!(mock.last().encryption, None);
}

#[tokio::test]
async fn bridge_serves_budget_calls_apart_from_login() {
    let server = Mock::default();
    let bridge = Mock::default();
    let server_url = spawn(server.clone()).await;
    let bridge_url = spawn(bridge.clone()).await;

    let mut backend = HttpBackend::new()
        .bridge(&bridge_url, Some("bridge-key"))
        .unwrap();
    backend
        .init(&init_config(&server_url, PASSWORD))
        .await
        .unwrap();
    backend.download_budget(SYNC_ID, None).await.unwrap();
    backend.get_budget_months().await.unwrap();

    assert_eq!(server.entries().len(), 1);
    assert!(server.entries()[0].starts_with("login"));
    assert!(server.calls().is_empty());

    assert_eq!(bridge.entries(), ["download"]);
    let seen = bridge.last();
    assert_eq!(seen.path, "/v1/budgets/budget-1/months");
    assert_eq!(seen.api_key.as_deref(), Some("bridge-key"));

    assert!(matches!(
        HttpBackend::new().bridge("not a url", None),
        Err(ClientError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn without_a_bridge_no_api_key_is_sent() {
    let mock = Mock::default();
    let mut backend = connected(&mock).await;
    backend.get_budget_months().await.unwrap();
    assert_eq!(mock.last().api_key, None);
}
