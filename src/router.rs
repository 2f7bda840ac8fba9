//! Session state machine and per-dataset persistence routing.
//!
//! The router owns the in-memory collections and decides, per transition,
//! whether the local key/value store or the remote document store is
//! authoritative. UI mutations are applied optimistically to memory first;
//! remote writes are fire-and-forget (failures are logged, never surfaced),
//! local writes go through derived keys recorded in the owned-key index.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{Local, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::auth::{AuthProvider, Identity};
use crate::errors::{CoreError, CoreResult};
use crate::export::MonthlyReport;
use crate::keys::{self, storage_key};
use crate::ledger::{
    category_breakdown, compute_totals, filter_by_month, seed_categories, Category,
    CategoryBreakdown, Expense, Income, MonthKey, MonthlyBudget, Totals,
};
use crate::profiles::{OwnedKeyIndex, Profile, ProfileRegistry};
use crate::rates::DEFAULT_CURRENCY;
use crate::storage::{budget_path, data_path, LocalStore, RemoteStore, Subscription};

/// Which identity, if any, currently owns the active dataset. Exactly one
/// state holds at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    LocalProfileActive(String),
    RemoteIdentityActive(String),
}

/// In-memory working set for the active identity. Subscription callbacks
/// fully replace individual collections; logout resets the whole set.
#[derive(Debug, Clone, PartialEq)]
pub struct Collections {
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub categories: Vec<Category>,
    pub currency: String,
    pub budget: MonthlyBudget,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            expenses: Vec::new(),
            incomes: Vec::new(),
            categories: Vec::new(),
            currency: DEFAULT_CURRENCY.to_string(),
            budget: MonthlyBudget::default(),
        }
    }
}

/// Facade coordinating session state, both stores, the profile registry,
/// and the live remote subscriptions.
pub struct PersistenceRouter {
    session: SessionState,
    month: MonthKey,
    data: Rc<RefCell<Collections>>,
    local: Rc<dyn LocalStore>,
    remote: Rc<dyn RemoteStore>,
    registry: ProfileRegistry,
    data_subs: Vec<Subscription>,
    budget_sub: Option<Subscription>,
}

impl PersistenceRouter {
    /// Builds a router anchored to the current month. If durable storage
    /// records a previously selected local profile, the router starts in
    /// `LocalProfileActive`; otherwise it starts `Unauthenticated`.
    pub fn new(local: Rc<dyn LocalStore>, remote: Rc<dyn RemoteStore>) -> Self {
        Self::with_month(local, remote, MonthKey::current())
    }

    /// Same as [`PersistenceRouter::new`] with an explicit starting month.
    pub fn with_month(
        local: Rc<dyn LocalStore>,
        remote: Rc<dyn RemoteStore>,
        month: MonthKey,
    ) -> Self {
        let registry = ProfileRegistry::new(Rc::clone(&local));
        let mut router = Self {
            session: SessionState::Unauthenticated,
            month,
            data: Rc::new(RefCell::new(Collections::default())),
            local,
            remote,
            registry,
            data_subs: Vec::new(),
            budget_sub: None,
        };
        if let Some(profile_id) = router.registry.active() {
            if router.registry.list().iter().any(|p| p.id == profile_id) {
                router.enter_local(profile_id);
            } else {
                router.registry.clear_active();
            }
        }
        router
    }

    pub fn state(&self) -> &SessionState {
        &self.session
    }

    pub fn month(&self) -> MonthKey {
        self.month
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Clone of the in-memory working set.
    pub fn snapshot(&self) -> Collections {
        self.data.borrow().clone()
    }

    // ---- session transitions -------------------------------------------

    /// Entry point for the auth collaborator's identity notifications. An
    /// asserted identity takes precedence over any local profile; clearing
    /// it falls back to the recorded local profile when one exists.
    pub fn handle_auth_change(&mut self, identity: Option<Identity>) {
        match identity {
            Some(identity) => self.enter_remote(identity.user_id),
            None => {
                if !matches!(self.session, SessionState::RemoteIdentityActive(_)) {
                    return;
                }
                self.dispose_subscriptions();
                match self.recorded_profile() {
                    Some(profile_id) => self.enter_local(profile_id),
                    None => {
                        *self.data.borrow_mut() = Collections::default();
                        self.session = SessionState::Unauthenticated;
                    }
                }
            }
        }
    }

    pub fn sign_in(
        &mut self,
        auth: &dyn AuthProvider,
        email: &str,
        password: &str,
    ) -> CoreResult<Identity> {
        let identity = auth.sign_in(email, password)?;
        self.handle_auth_change(Some(identity.clone()));
        Ok(identity)
    }

    pub fn sign_up(
        &mut self,
        auth: &dyn AuthProvider,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> CoreResult<Identity> {
        let identity = auth.sign_up(email, password, display_name)?;
        self.handle_auth_change(Some(identity.clone()));
        Ok(identity)
    }

    /// Signs out of the remote identity and logs out locally.
    pub fn sign_out(&mut self, auth: &dyn AuthProvider) -> CoreResult<()> {
        auth.sign_out()?;
        self.log_out();
        Ok(())
    }

    /// Releases every subscription, clears the in-memory collections and the
    /// active-profile marker, and returns to `Unauthenticated`. Persisted
    /// data is left untouched.
    pub fn log_out(&mut self) {
        self.dispose_subscriptions();
        self.registry.clear_active();
        *self.data.borrow_mut() = Collections::default();
        self.session = SessionState::Unauthenticated;
    }

    /// Changes the active month. Budgets are month-partitioned at rest, so
    /// the budget is reloaded (and, in remote mode, resubscribed) for the
    /// new month; the other collections are only filtered at read time.
    pub fn set_month(&mut self, month: MonthKey) {
        if month == self.month {
            return;
        }
        self.month = month;
        match self.session.clone() {
            SessionState::LocalProfileActive(profile_id) => {
                let budget = self
                    .read_local(&storage_key(keys::BUDGET, Some(&profile_id), Some(month)))
                    .unwrap_or_default();
                self.data.borrow_mut().budget = budget;
            }
            SessionState::RemoteIdentityActive(user_id) => {
                if let Some(sub) = self.budget_sub.take() {
                    sub.dispose();
                }
                let budget = self.fetch_budget(&user_id);
                self.data.borrow_mut().budget = budget;
                self.budget_sub = Some(self.subscribe_budget(&user_id));
            }
            SessionState::Unauthenticated => {}
        }
    }

    pub fn next_month(&mut self) {
        self.set_month(self.month.next());
    }

    pub fn previous_month(&mut self) {
        self.set_month(self.month.previous());
    }

    // ---- profile lifecycle ---------------------------------------------

    pub fn create_profile(&self, name: &str) -> CoreResult<Option<Profile>> {
        self.registry.create(name)
    }

    /// Records the profile as active in durable storage and swaps the
    /// working set to its data.
    pub fn select_profile(&mut self, profile_id: &str) -> CoreResult<()> {
        self.registry.select(profile_id)?;
        self.dispose_subscriptions();
        self.enter_local(profile_id.to_string());
        Ok(())
    }

    /// Deletes a profile and all of its persisted keys. Deleting the active
    /// profile additionally behaves as a logout.
    pub fn delete_profile(&mut self, profile_id: &str) -> CoreResult<()> {
        let was_active = matches!(
            &self.session,
            SessionState::LocalProfileActive(active) if active == profile_id
        );
        self.registry.delete(profile_id)?;
        if was_active {
            self.log_out();
        }
        Ok(())
    }

    // ---- mutations ------------------------------------------------------

    pub fn add_expense(
        &mut self,
        amount: f64,
        description: &str,
        date: Option<NaiveDate>,
        category_id: Option<String>,
    ) -> CoreResult<Expense> {
        self.require_session()?;
        validate_entry(amount, description, date)?;
        let expense = Expense::new(amount, description.trim(), date, category_id);
        self.data.borrow_mut().expenses.push(expense.clone());
        self.persist_expenses();
        Ok(expense)
    }

    pub fn delete_expense(&mut self, id: &str) -> CoreResult<()> {
        self.require_session()?;
        self.data.borrow_mut().expenses.retain(|e| e.id != id);
        self.persist_expenses();
        Ok(())
    }

    pub fn add_income(
        &mut self,
        amount: f64,
        description: &str,
        date: Option<NaiveDate>,
        source: Option<String>,
    ) -> CoreResult<Income> {
        self.require_session()?;
        validate_entry(amount, description, date)?;
        let income = Income::new(amount, description.trim(), date, source);
        self.data.borrow_mut().incomes.push(income.clone());
        self.persist_incomes();
        Ok(income)
    }

    pub fn delete_income(&mut self, id: &str) -> CoreResult<()> {
        self.require_session()?;
        self.data.borrow_mut().incomes.retain(|i| i.id != id);
        self.persist_incomes();
        Ok(())
    }

    pub fn add_category(
        &mut self,
        name: &str,
        color: &str,
        icon: &str,
    ) -> CoreResult<Category> {
        self.require_session()?;
        if name.trim().is_empty() {
            return Err(CoreError::Validation("category name is required".into()));
        }
        let category = Category::new(name.trim(), color, icon);
        self.data.borrow_mut().categories.push(category.clone());
        self.persist_categories();
        Ok(category)
    }

    pub fn set_currency(&mut self, code: &str) -> CoreResult<()> {
        self.require_session()?;
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("currency code is required".into()));
        }
        self.data.borrow_mut().currency = trimmed.to_string();
        let payload = Value::String(trimmed.to_string());
        self.persist_dataset(keys::CURRENCY, payload);
        Ok(())
    }

    pub fn set_overall_budget(&mut self, amount: f64) -> CoreResult<()> {
        self.require_session()?;
        validate_amount(amount)?;
        self.data.borrow_mut().budget.overall = amount;
        self.persist_budget();
        Ok(())
    }

    pub fn set_category_budget(&mut self, category_id: &str, amount: f64) -> CoreResult<()> {
        self.require_session()?;
        validate_amount(amount)?;
        self.data
            .borrow_mut()
            .budget
            .per_category
            .insert(category_id.to_string(), amount);
        self.persist_budget();
        Ok(())
    }

    // ---- derived monthly views -----------------------------------------

    pub fn month_expenses(&self) -> Vec<Expense> {
        filter_by_month(&self.data.borrow().expenses, self.month)
    }

    pub fn month_incomes(&self) -> Vec<Income> {
        filter_by_month(&self.data.borrow().incomes, self.month)
    }

    pub fn totals(&self) -> Totals {
        let data = self.data.borrow();
        compute_totals(
            &filter_by_month(&data.expenses, self.month),
            &filter_by_month(&data.incomes, self.month),
            &data.budget,
        )
    }

    pub fn breakdown(&self) -> Vec<CategoryBreakdown> {
        let data = self.data.borrow();
        category_breakdown(
            &filter_by_month(&data.expenses, self.month),
            &data.categories,
            &data.budget,
        )
    }

    pub fn monthly_report(&self) -> MonthlyReport {
        let data = self.data.borrow();
        MonthlyReport::build(
            self.month,
            &data.expenses,
            &data.incomes,
            &data.categories,
            &data.budget,
        )
    }

    // ---- transitions ----------------------------------------------------

    fn enter_local(&mut self, profile_id: String) {
        let expenses = self
            .read_local(&storage_key(keys::EXPENSES, Some(&profile_id), None))
            .unwrap_or_default();
        let incomes = self
            .read_local(&storage_key(keys::INCOMES, Some(&profile_id), None))
            .unwrap_or_default();
        let currency = self
            .read_local(&storage_key(keys::CURRENCY, Some(&profile_id), None))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let budget = self
            .read_local(&storage_key(
                keys::BUDGET,
                Some(&profile_id),
                Some(self.month),
            ))
            .unwrap_or_default();
        let categories: Vec<Category> = self
            .read_local(&storage_key(keys::CATEGORIES, Some(&profile_id), None))
            .unwrap_or_default();

        self.session = SessionState::LocalProfileActive(profile_id);
        let categories = if categories.is_empty() {
            // First use of the profile installs the seed set.
            let seeds = seed_categories();
            if let Ok(payload) = serde_json::to_value(&seeds) {
                self.persist_dataset(keys::CATEGORIES, payload);
            }
            seeds
        } else {
            categories
        };

        *self.data.borrow_mut() = Collections {
            expenses,
            incomes,
            categories,
            currency,
            budget,
        };
    }

    fn enter_remote(&mut self, user_id: String) {
        self.dispose_subscriptions();
        self.session = SessionState::RemoteIdentityActive(user_id.clone());

        // One-time fetches before the live subscriptions take over.
        let expenses: Vec<Expense> = self.fetch_dataset(&user_id, keys::EXPENSES);
        let incomes: Vec<Income> = self.fetch_dataset(&user_id, keys::INCOMES);
        let mut categories: Vec<Category> = self.fetch_dataset(&user_id, keys::CATEGORIES);
        if categories.is_empty() {
            categories = seed_categories();
            if let Ok(payload) = serde_json::to_value(&categories) {
                self.persist_dataset(keys::CATEGORIES, payload);
            }
        }
        let currency = self.fetch_currency(&user_id);
        let budget = self.fetch_budget(&user_id);

        *self.data.borrow_mut() = Collections {
            expenses,
            incomes,
            categories,
            currency,
            budget,
        };

        self.data_subs.push(self.subscribe_dataset::<Expense, _>(
            &user_id,
            keys::EXPENSES,
            |data, items| data.expenses = items,
        ));
        self.data_subs.push(self.subscribe_dataset::<Income, _>(
            &user_id,
            keys::INCOMES,
            |data, items| data.incomes = items,
        ));
        self.data_subs.push(self.subscribe_dataset::<Category, _>(
            &user_id,
            keys::CATEGORIES,
            |data, items| data.categories = items,
        ));
        self.budget_sub = Some(self.subscribe_budget(&user_id));
    }

    /// Profile id recorded in durable storage, validated against the
    /// registry.
    fn recorded_profile(&self) -> Option<String> {
        let profile_id = self.registry.active()?;
        self.registry
            .list()
            .iter()
            .any(|p| p.id == profile_id)
            .then_some(profile_id)
    }

    fn dispose_subscriptions(&mut self) {
        for sub in self.data_subs.drain(..) {
            sub.dispose();
        }
        if let Some(sub) = self.budget_sub.take() {
            sub.dispose();
        }
    }

    // ---- persistence plumbing ------------------------------------------

    fn require_session(&self) -> CoreResult<()> {
        if matches!(self.session, SessionState::Unauthenticated) {
            Err(CoreError::NoSession)
        } else {
            Ok(())
        }
    }

    fn read_local<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.local.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "discarding malformed persisted value");
                None
            }
        }
    }

    fn persist_expenses(&self) {
        let payload = match serde_json::to_value(&self.data.borrow().expenses) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to serialize expenses");
                return;
            }
        };
        self.persist_dataset(keys::EXPENSES, payload);
    }

    fn persist_incomes(&self) {
        let payload = match serde_json::to_value(&self.data.borrow().incomes) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to serialize incomes");
                return;
            }
        };
        self.persist_dataset(keys::INCOMES, payload);
    }

    fn persist_categories(&self) {
        let payload = match serde_json::to_value(&self.data.borrow().categories) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to serialize categories");
                return;
            }
        };
        self.persist_dataset(keys::CATEGORIES, payload);
    }

    /// Routes a dataset write to the authoritative store for the current
    /// session. Remote writes are fire-and-forget.
    fn persist_dataset(&self, name: &str, payload: Value) {
        match &self.session {
            SessionState::LocalProfileActive(profile_id) => {
                let key = storage_key(name, Some(profile_id), None);
                self.local.set(&key, &payload.to_string());
                OwnedKeyIndex::record(self.local.as_ref(), profile_id, &key);
            }
            SessionState::RemoteIdentityActive(user_id) => {
                let mut fields = serde_json::Map::new();
                fields.insert(name.to_string(), payload);
                fields.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
                let doc = Value::Object(fields);
                if let Err(err) = self.remote.set_document(&data_path(user_id, name), doc, false) {
                    warn!(dataset = name, %err, "fire-and-forget remote write failed");
                }
            }
            SessionState::Unauthenticated => {}
        }
    }

    fn persist_budget(&self) {
        let budget = self.data.borrow().budget.clone();
        match &self.session {
            SessionState::LocalProfileActive(profile_id) => {
                let key = storage_key(keys::BUDGET, Some(profile_id), Some(self.month));
                match serde_json::to_string(&budget) {
                    Ok(json) => {
                        self.local.set(&key, &json);
                        OwnedKeyIndex::record(self.local.as_ref(), profile_id, &key);
                    }
                    Err(err) => warn!(%err, "failed to serialize budget"),
                }
            }
            SessionState::RemoteIdentityActive(user_id) => {
                let mut doc = budget.to_document();
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
                }
                let path = budget_path(user_id, self.month);
                if let Err(err) = self.remote.set_document(&path, doc, true) {
                    warn!(%err, "fire-and-forget budget write failed");
                }
            }
            SessionState::Unauthenticated => {}
        }
    }

    fn fetch_dataset<T: DeserializeOwned>(&self, user_id: &str, name: &str) -> Vec<T> {
        match self.remote.get_document(&data_path(user_id, name)) {
            Ok(doc) => dataset_items(name, doc.as_ref()),
            Err(err) => {
                warn!(dataset = name, %err, "initial remote fetch failed");
                Vec::new()
            }
        }
    }

    fn fetch_currency(&self, user_id: &str) -> String {
        match self.remote.get_document(&data_path(user_id, keys::CURRENCY)) {
            Ok(doc) => doc
                .as_ref()
                .and_then(|doc| doc.get(keys::CURRENCY))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_CURRENCY)
                .to_string(),
            Err(err) => {
                warn!(%err, "initial currency fetch failed");
                DEFAULT_CURRENCY.to_string()
            }
        }
    }

    fn fetch_budget(&self, user_id: &str) -> MonthlyBudget {
        match self.remote.get_document(&budget_path(user_id, self.month)) {
            Ok(doc) => MonthlyBudget::from_document(doc.as_ref()),
            Err(err) => {
                warn!(%err, "initial budget fetch failed");
                MonthlyBudget::default()
            }
        }
    }

    fn subscribe_dataset<T, F>(&self, user_id: &str, name: &'static str, apply: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(&mut Collections, Vec<T>) + 'static,
    {
        let data = Rc::clone(&self.data);
        self.remote.subscribe(
            &data_path(user_id, name),
            Rc::new(move |snapshot| {
                let items = dataset_items::<T>(name, snapshot.as_ref());
                apply(&mut data.borrow_mut(), items);
            }),
        )
    }

    fn subscribe_budget(&self, user_id: &str) -> Subscription {
        let data = Rc::clone(&self.data);
        self.remote.subscribe(
            &budget_path(user_id, self.month),
            Rc::new(move |snapshot| {
                data.borrow_mut().budget = MonthlyBudget::from_document(snapshot.as_ref());
            }),
        )
    }
}

/// Extracts the dataset's items from its document field; absent documents,
/// absent fields, and malformed payloads all read as empty.
fn dataset_items<T: DeserializeOwned>(name: &str, doc: Option<&Value>) -> Vec<T> {
    let Some(field) = doc.and_then(|doc| doc.get(name)) else {
        return Vec::new();
    };
    match serde_json::from_value(field.clone()) {
        Ok(items) => items,
        Err(err) => {
            warn!(dataset = name, %err, "discarding malformed remote dataset");
            Vec::new()
        }
    }
}

fn validate_amount(amount: f64) -> CoreResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(CoreError::Validation(
            "amount must be a non-negative number".into(),
        ));
    }
    Ok(())
}

fn validate_entry(amount: f64, description: &str, date: Option<NaiveDate>) -> CoreResult<()> {
    validate_amount(amount)?;
    if description.trim().is_empty() {
        return Err(CoreError::Validation("description is required".into()));
    }
    if let Some(date) = date {
        if date > Local::now().date_naive() {
            return Err(CoreError::Validation("date cannot be in the future".into()));
        }
    }
    Ok(())
}
