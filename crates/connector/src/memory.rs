//! In-process budget.
//!
//! [`MemoryBackend`] keeps a whole budget in memory. It backs the tests and
//! the CLI's offline mode, and records every call it receives so callers can
//! check the session lifecycle.

use std::collections::{BTreeMap, BTreeSet, HashMap};

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
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    BackendError, BudgetBackend,
    backend::{BackendResult, InitConfig},
};

const STARTING_BALANCE_PAYEE: &str = "Starting Balance";

#[derive(Debug, Default)]
struct Budget {
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    groups: Vec<CategoryGroup>,
    categories: Vec<Category>,
    payees: Vec<Payee>,
    /// (month, category id) -> budgeted minor units.
    budgeted: BTreeMap<(String, String), i64>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    budget: Budget,
    password: Option<String>,
    sync_id: Option<String>,
    initialized: bool,
    loaded: Option<String>,
    syncs: usize,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, BackendError>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn not_found(kind: &str, id: &str) -> BackendError {
    BackendError::NotFound(format!("{kind} {id}"))
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept sessions opened with this password and sync id.
    pub fn with_credentials(mut self, password: &str, sync_id: &str) -> Self {
        self.password = Some(password.to_string());
        self.sync_id = Some(sync_id.to_string());
        self
    }

    /// Makes the next call named `call` (e.g. `"sync"`) fail with `err`.
    pub fn fail_on(&mut self, call: &'static str, err: BackendError) {
        self.failures.insert(call, err);
    }

    /// Names of the backend calls received so far, in order.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sync_count(&self) -> usize {
        self.syncs
    }

    fn record(&mut self, call: &'static str) -> BackendResult<()> {
        self.calls.push(call);
        match self.failures.remove(call) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Records `call` and checks that a budget is loaded.
    fn enter(&mut self, call: &'static str) -> BackendResult<&mut Budget> {
        self.record(call)?;
        if self.loaded.is_none() {
            return Err(BackendError::Invalid("no budget loaded".to_string()));
        }
        Ok(&mut self.budget)
    }
}

impl Budget {
    fn account_mut(&mut self, id: &str) -> BackendResult<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found("account", id))
    }

    fn transaction_mut(&mut self, id: &str) -> BackendResult<&mut Transaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("transaction", id))
    }

    fn balance(&self, account_id: &str, cutoff: Option<NaiveDate>) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.account == account_id)
            .filter(|t| cutoff.is_none_or(|cutoff| t.date <= cutoff))
            .map(|t| t.amount)
            .sum()
    }

    fn payee_named(&mut self, name: &str) -> String {
        if let Some(payee) = self.payees.iter().find(|p| p.name == name) {
            return payee.id.clone();
        }
        let id = new_id();
        self.payees.push(Payee {
            id: id.clone(),
            name: name.to_string(),
            transfer_acct: None,
        });
        id
    }

    fn check_category(&self, id: Option<&str>) -> BackendResult<()> {
        match id {
            Some(id) if !self.categories.iter().any(|c| c.id == id) => {
                Err(not_found("category", id))
            }
            _ => Ok(()),
        }
    }

    fn insert_transaction(&mut self, account_id: &str, new: &TransactionNew) -> String {
        let payee = match (&new.payee, &new.payee_name) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(name)) => Some(self.payee_named(name)),
            (None, None) => None,
        };
        let id = new_id();
        self.transactions.push(Transaction {
            id: id.clone(),
            account: account_id.to_string(),
            date: new.date,
            amount: new.amount,
            payee,
            payee_name: new.payee_name.clone(),
            imported_payee: new.payee_name.clone(),
            category: new.category.clone(),
            notes: new.notes.clone(),
            imported_id: new.imported_id.clone(),
            transfer_id: None,
            cleared: new.cleared,
            subtransactions: Vec::new(),
        });
        id
    }

    fn reassign_category(&mut self, from: &[String], to: Option<&str>) {
        for tx in &mut self.transactions {
            if tx.category.as_ref().is_some_and(|c| from.contains(c)) {
                tx.category = to.map(str::to_string);
            }
        }
        self.budgeted.retain(|(_, category), _| !from.contains(category));
    }

    fn groups_with_categories(&self) -> Vec<CategoryGroup> {
        self.groups
            .iter()
            .map(|group| CategoryGroup {
                categories: self
                    .categories
                    .iter()
                    .filter(|c| c.group_id == group.id)
                    .cloned()
                    .collect(),
                ..group.clone()
            })
            .collect()
    }

    fn months(&self) -> Vec<String> {
        let mut months: BTreeSet<String> = self
            .transactions
            .iter()
            .map(|t| t.date.format("%Y-%m").to_string())
            .collect();
        months.extend(self.budgeted.keys().map(|(month, _)| month.clone()));
        months.insert(Utc::now().date_naive().format("%Y-%m").to_string());
        months.into_iter().collect()
    }

    fn month_summary(&self, month: &str) -> Value {
        let spent_in = |category: &str| -> i64 {
            self.transactions
                .iter()
                .filter(|t| t.category.as_deref() == Some(category))
                .filter(|t| t.date.format("%Y-%m").to_string() == month)
                .map(|t| t.amount)
                .sum()
        };

        let mut total_budgeted = 0;
        let mut total_spent = 0;
        let groups: Vec<Value> = self
            .groups_with_categories()
            .into_iter()
            .map(|group| {
                let categories: Vec<Value> = group
                    .categories
                    .iter()
                    .map(|category| {
                        let budgeted = self
                            .budgeted
                            .get(&(month.to_string(), category.id.clone()))
                            .copied()
                            .unwrap_or(0);
                        let spent = spent_in(&category.id);
                        if !category.is_income {
                            total_budgeted += budgeted;
                            total_spent += spent;
                        }
                        json!({
                            "id": category.id,
                            "name": category.name,
                            "is_income": category.is_income,
                            "budgeted": budgeted,
                            "spent": spent,
                            "balance": budgeted + spent,
                        })
                    })
                    .collect();
                json!({
                    "id": group.id,
                    "name": group.name,
                    "is_income": group.is_income,
                    "categories": categories,
                })
            })
            .collect();

        json!({
            "month": month,
            "totalBudgeted": total_budgeted,
            "totalSpent": total_spent,
            "categoryGroups": groups,
        })
    }

    fn table(&self, name: &str) -> Option<Vec<Value>> {
        fn rows<T: serde::Serialize>(items: &[T]) -> Vec<Value> {
            items
                .iter()
                .filter_map(|item| serde_json::to_value(item).ok())
                .collect()
        }
        let rows = match name {
            "accounts" => rows(&self.accounts),
            "transactions" => rows(&self.transactions),
            "categories" => rows(&self.categories),
            "category_groups" => rows(&self.groups),
            "payees" => rows(&self.payees),
            _ => return None,
        };
        Some(rows)
    }

    /// Serves `SELECT * FROM <table> [LIMIT n]`.
    fn query(&self, query: &str) -> BackendResult<Value> {
        let unsupported = || BackendError::Invalid(format!("unsupported query: {query}"));
        let tokens: Vec<&str> = query.trim().trim_end_matches(';').split_whitespace().collect();
        let (table, limit) = match tokens.as_slice() {
            [select, "*", from, table] if is_kw(select, "select") && is_kw(from, "from") => {
                (*table, None)
            }
            [select, "*", from, table, limit, n]
                if is_kw(select, "select") && is_kw(from, "from") && is_kw(limit, "limit") =>
            {
                (*table, Some(n.parse::<usize>().map_err(|_| unsupported())?))
            }
            _ => return Err(unsupported()),
        };

        let mut rows = self
            .table(&table.to_ascii_lowercase())
            .ok_or_else(|| BackendError::Invalid(format!("unknown table {table}")))?;
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(Value::Array(rows))
    }
}

fn is_kw(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

#[async_trait]
impl BudgetBackend for MemoryBackend {
    async fn init(&mut self, config: &InitConfig) -> BackendResult<()> {
        self.record("init")?;
        if self
            .password
            .as_ref()
            .is_some_and(|expected| *expected != config.password)
        {
            return Err(BackendError::Unauthorized("invalid-password".to_string()));
        }
        self.initialized = true;
        Ok(())
    }

    async fn download_budget(
        &mut self,
        sync_id: &str,
        _encryption_password: Option<&str>,
    ) -> BackendResult<()> {
        self.record("download_budget")?;
        if !self.initialized {
            return Err(BackendError::Invalid("backend not initialized".to_string()));
        }
        if self.sync_id.as_ref().is_some_and(|expected| expected != sync_id) {
            return Err(not_found("budget", sync_id));
        }
        self.loaded = Some(sync_id.to_string());
        Ok(())
    }

    async fn shutdown(&mut self) -> BackendResult<()> {
        self.record("shutdown")?;
        self.initialized = false;
        self.loaded = None;
        Ok(())
    }

    async fn get_accounts(&mut self) -> BackendResult<Vec<Account>> {
        Ok(self.enter("get_accounts")?.accounts.clone())
    }

    async fn create_account(
        &mut self,
        account: &AccountNew,
        initial_balance: i64,
    ) -> BackendResult<String> {
        let budget = self.enter("create_account")?;
        if account.name.trim().is_empty() {
            return Err(BackendError::Invalid("account name is required".to_string()));
        }
        let id = new_id();
        budget.accounts.push(Account {
            id: id.clone(),
            name: account.name.clone(),
            account_type: Some(account.account_type),
            offbudget: account.offbudget,
            closed: account.closed,
        });
        if initial_balance != 0 {
            let opening = TransactionNew {
                date: Utc::now().date_naive(),
                amount: initial_balance,
                payee: None,
                payee_name: Some(STARTING_BALANCE_PAYEE.to_string()),
                category: None,
                notes: None,
                imported_id: None,
                cleared: true,
            };
            budget.insert_transaction(&id, &opening);
        }
        Ok(id)
    }

    async fn update_account(&mut self, id: &str, fields: &AccountUpdate) -> BackendResult<()> {
        let account = self.enter("update_account")?.account_mut(id)?;
        if let Some(name) = &fields.name {
            account.name = name.clone();
        }
        if let Some(account_type) = fields.account_type {
            account.account_type = Some(account_type);
        }
        if let Some(offbudget) = fields.offbudget {
            account.offbudget = offbudget;
        }
        Ok(())
    }

    async fn close_account(
        &mut self,
        id: &str,
        transfer_account_id: Option<&str>,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let budget = self.enter("close_account")?;
        budget.account_mut(id)?;
        budget.check_category(transfer_category_id)?;

        let balance = budget.balance(id, None);
        if balance != 0 {
            let Some(target) = transfer_account_id else {
                return Err(BackendError::Invalid(
                    "account has a balance: a transfer account is required".to_string(),
                ));
            };
            budget.account_mut(target)?;
            let today = Utc::now().date_naive();
            let closing = TransactionNew {
                date: today,
                amount: -balance,
                payee: None,
                payee_name: None,
                category: transfer_category_id.map(str::to_string),
                notes: Some("Account closed".to_string()),
                imported_id: None,
                cleared: true,
            };
            let out_id = budget.insert_transaction(id, &closing);
            let incoming = TransactionNew {
                amount: balance,
                ..closing
            };
            let in_id = budget.insert_transaction(target, &incoming);
            budget.transaction_mut(&out_id)?.transfer_id = Some(in_id.clone());
            budget.transaction_mut(&in_id)?.transfer_id = Some(out_id);
        }

        budget.account_mut(id)?.closed = true;
        Ok(())
    }

    async fn reopen_account(&mut self, id: &str) -> BackendResult<()> {
        self.enter("reopen_account")?.account_mut(id)?.closed = false;
        Ok(())
    }

    async fn delete_account(&mut self, id: &str) -> BackendResult<()> {
        let budget = self.enter("delete_account")?;
        budget.account_mut(id)?;
        budget.accounts.retain(|a| a.id != id);
        budget.transactions.retain(|t| t.account != id);
        Ok(())
    }

    async fn get_account_balance(
        &mut self,
        id: &str,
        cutoff: Option<NaiveDate>,
    ) -> BackendResult<i64> {
        let budget = self.enter("get_account_balance")?;
        budget.account_mut(id)?;
        Ok(budget.balance(id, cutoff))
    }

    async fn get_transactions(
        &mut self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> BackendResult<Vec<Transaction>> {
        let budget = self.enter("get_transactions")?;
        budget.account_mut(account_id)?;
        let mut found: Vec<Transaction> = budget
            .transactions
            .iter()
            .filter(|t| t.account == account_id && t.date >= start_date)
            .filter(|t| end_date.is_none_or(|end| t.date <= end))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(found)
    }

    async fn add_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
        _options: AddOptions,
    ) -> BackendResult<Vec<String>> {
        let budget = self.enter("add_transactions")?;
        budget.account_mut(account_id)?;
        for tx in transactions {
            budget.check_category(tx.category.as_deref())?;
        }
        Ok(transactions
            .iter()
            .map(|tx| budget.insert_transaction(account_id, tx))
            .collect())
    }

    async fn import_transactions(
        &mut self,
        account_id: &str,
        transactions: &[TransactionNew],
    ) -> BackendResult<ImportResult> {
        let budget = self.enter("import_transactions")?;
        budget.account_mut(account_id)?;

        let mut result = ImportResult::default();
        for tx in transactions {
            if let Err(err) = budget.check_category(tx.category.as_deref()) {
                result.errors.push(err.to_string());
                continue;
            }
            let existing = tx.imported_id.as_ref().and_then(|imported| {
                budget.transactions.iter_mut().find(|t| {
                    t.account == account_id && t.imported_id.as_ref() == Some(imported)
                })
            });
            match existing {
                Some(current) => {
                    current.date = tx.date;
                    current.amount = tx.amount;
                    current.notes = tx.notes.clone().or(current.notes.take());
                    current.cleared = tx.cleared;
                    result.updated.push(current.id.clone());
                }
                None => result.added.push(budget.insert_transaction(account_id, tx)),
            }
        }
        Ok(result)
    }

    async fn update_transaction(
        &mut self,
        id: &str,
        fields: &TransactionUpdate,
    ) -> BackendResult<()> {
        let budget = self.enter("update_transaction")?;
        budget.check_category(fields.category.as_deref())?;
        let tx = budget.transaction_mut(id)?;
        if let Some(date) = fields.date {
            tx.date = date;
        }
        if let Some(amount) = fields.amount {
            tx.amount = amount;
        }
        if let Some(payee) = &fields.payee {
            tx.payee = Some(payee.clone());
        }
        if let Some(category) = &fields.category {
            tx.category = Some(category.clone());
        }
        if let Some(notes) = &fields.notes {
            tx.notes = Some(notes.clone());
        }
        if let Some(cleared) = fields.cleared {
            tx.cleared = cleared;
        }
        Ok(())
    }

    async fn delete_transaction(&mut self, id: &str) -> BackendResult<()> {
        let budget = self.enter("delete_transaction")?;
        budget.transaction_mut(id)?;
        budget.transactions.retain(|t| t.id != id);
        Ok(())
    }

    async fn get_categories(&mut self) -> BackendResult<Vec<Category>> {
        Ok(self.enter("get_categories")?.categories.clone())
    }

    async fn create_category(&mut self, category: &CategoryNew) -> BackendResult<String> {
        let budget = self.enter("create_category")?;
        if !budget.groups.iter().any(|g| g.id == category.group_id) {
            return Err(not_found("category group", &category.group_id));
        }
        let id = new_id();
        budget.categories.push(Category {
            id: id.clone(),
            name: category.name.clone(),
            group_id: category.group_id.clone(),
            is_income: category.is_income,
            hidden: false,
        });
        Ok(id)
    }

    async fn update_category(&mut self, id: &str, fields: &CategoryUpdate) -> BackendResult<()> {
        let budget = self.enter("update_category")?;
        if let Some(group_id) = &fields.group_id {
            if !budget.groups.iter().any(|g| &g.id == group_id) {
                return Err(not_found("category group", group_id));
            }
        }
        let category = budget
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("category", id))?;
        if let Some(name) = &fields.name {
            category.name = name.clone();
        }
        if let Some(group_id) = &fields.group_id {
            category.group_id = group_id.clone();
        }
        if let Some(hidden) = fields.hidden {
            category.hidden = hidden;
        }
        Ok(())
    }

    async fn delete_category(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let budget = self.enter("delete_category")?;
        budget.check_category(Some(id))?;
        budget.check_category(transfer_category_id)?;
        budget.categories.retain(|c| c.id != id);
        budget.reassign_category(&[id.to_string()], transfer_category_id);
        Ok(())
    }

    async fn get_category_groups(&mut self) -> BackendResult<Vec<CategoryGroup>> {
        Ok(self.enter("get_category_groups")?.groups_with_categories())
    }

    async fn create_category_group(&mut self, group: &CategoryGroupNew) -> BackendResult<String> {
        let budget = self.enter("create_category_group")?;
        let id = new_id();
        budget.groups.push(CategoryGroup {
            id: id.clone(),
            name: group.name.clone(),
            is_income: group.is_income,
            hidden: false,
            categories: Vec::new(),
        });
        Ok(id)
    }

    async fn update_category_group(
        &mut self,
        id: &str,
        fields: &CategoryGroupUpdate,
    ) -> BackendResult<()> {
        let group = self
            .enter("update_category_group")?
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| not_found("category group", id))?;
        if let Some(name) = &fields.name {
            group.name = name.clone();
        }
        if let Some(hidden) = fields.hidden {
            group.hidden = hidden;
        }
        Ok(())
    }

    async fn delete_category_group(
        &mut self,
        id: &str,
        transfer_category_id: Option<&str>,
    ) -> BackendResult<()> {
        let budget = self.enter("delete_category_group")?;
        if !budget.groups.iter().any(|g| g.id == id) {
            return Err(not_found("category group", id));
        }
        budget.check_category(transfer_category_id)?;
        let removed: Vec<String> = budget
            .categories
            .iter()
            .filter(|c| c.group_id == id)
            .map(|c| c.id.clone())
            .collect();
        if transfer_category_id.is_some_and(|target| removed.iter().any(|c| c == target)) {
            return Err(BackendError::Invalid(
                "cannot transfer into a category of the deleted group".to_string(),
            ));
        }
        budget.groups.retain(|g| g.id != id);
        budget.categories.retain(|c| c.group_id != id);
        budget.reassign_category(&removed, transfer_category_id);
        Ok(())
    }

    async fn get_payees(&mut self) -> BackendResult<Vec<Payee>> {
        Ok(self.enter("get_payees")?.payees.clone())
    }

    async fn create_payee(&mut self, payee: &PayeeNew) -> BackendResult<String> {
        let budget = self.enter("create_payee")?;
        let id = new_id();
        budget.payees.push(Payee {
            id: id.clone(),
            name: payee.name.clone(),
            transfer_acct: None,
        });
        Ok(id)
    }

    async fn update_payee(&mut self, id: &str, fields: &PayeeUpdate) -> BackendResult<()> {
        let payee = self
            .enter("update_payee")?
            .payees
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("payee", id))?;
        if let Some(name) = &fields.name {
            payee.name = name.clone();
        }
        Ok(())
    }

    async fn delete_payee(&mut self, id: &str) -> BackendResult<()> {
        let budget = self.enter("delete_payee")?;
        if !budget.payees.iter().any(|p| p.id == id) {
            return Err(not_found("payee", id));
        }
        budget.payees.retain(|p| p.id != id);
        for tx in &mut budget.transactions {
            if tx.payee.as_deref() == Some(id) {
                tx.payee = None;
            }
        }
        Ok(())
    }

    async fn get_budget_months(&mut self) -> BackendResult<Vec<String>> {
        Ok(self.enter("get_budget_months")?.months())
    }

    async fn get_budget_month(&mut self, month: &str) -> BackendResult<Value> {
        let budget = self.enter("get_budget_month")?;
        if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
            return Err(BackendError::Invalid(format!("invalid month {month}")));
        }
        Ok(budget.month_summary(month))
    }

    async fn set_budget_amount(
        &mut self,
        month: &str,
        category_id: &str,
        amount: i64,
    ) -> BackendResult<()> {
        let budget = self.enter("set_budget_amount")?;
        budget.check_category(Some(category_id))?;
        budget
            .budgeted
            .insert((month.to_string(), category_id.to_string()), amount);
        Ok(())
    }

    async fn run_query(&mut self, query: &str) -> BackendResult<Value> {
        self.enter("run_query")?.query(query)
    }

    async fn sync(&mut self) -> BackendResult<()> {
        self.enter("sync")?;
        self.syncs += 1;
        Ok(())
    }
}
