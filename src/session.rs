use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAssumption {
    pub key: String,
    pub description: String,
    pub value: Value,
    pub status: AssumptionStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationAssumption {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            value,
            status: AssumptionStatus::Pending,
            confirmed_at: None,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Confirmed and not past its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AssumptionStatus::Confirmed && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Moves a pending or confirmed assumption to `Expired` once its expiry
    /// has passed. Rejected assumptions keep their status.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> AssumptionStatus {
        if matches!(self.status, AssumptionStatus::Pending | AssumptionStatus::Confirmed)
            && self.is_expired_at(now)
        {
            self.status = AssumptionStatus::Expired;
        }
        self.status
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationGates {
    pub account_structure: bool,
    pub depreciation_periods: bool,
    pub safe_accounts: bool,
    pub benchmark_preferences: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub session_id: String,
    pub file_id: String,
    pub fully_validated: bool,
    pub validations: ValidationGates,
    pub assumptions_count: usize,
    pub valid_assumptions: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSession {
    pub session_id: String,
    pub file_id: String,
    pub gates: ValidationGates,
    pub assumptions: BTreeMap<String, ValidationAssumption>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub user_context: BTreeMap<String, Value>,
    #[serde(default)]
    pub validation_history: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl ValidationSession {
    pub fn new(session_id: impl Into<String>, file_id: impl Into<String>, history_limit: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            file_id: file_id.into(),
            gates: ValidationGates::default(),
            assumptions: BTreeMap::new(),
            created_at: now,
            last_updated: now,
            user_context: BTreeMap::new(),
            validation_history: Vec::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Bumps `last_updated` and appends to the bounded history.
    pub fn record(&mut self, event: impl AsRef<str>) {
        let now = Utc::now();
        self.last_updated = now;
        self.validation_history
            .push(format!("[{}] {}", now.to_rfc3339(), event.as_ref()));
        if self.validation_history.len() > self.history_limit {
            let overflow = self.validation_history.len() - self.history_limit;
            self.validation_history.drain(..overflow);
        }
    }

    /// Adds (or replaces) a pending assumption. `ttl = None`, or an expiry
    /// past the representable range, never expires.
    pub fn add_assumption(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        value: Value,
        ttl: Option<Duration>,
    ) -> &ValidationAssumption {
        let key = key.into();
        let expires_at = ttl.and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.record(format!("Added assumption: {}", key));
        self.assumptions.insert(
            key.clone(),
            ValidationAssumption::new(key.clone(), description, value, expires_at),
        );
        &self.assumptions[&key]
    }

    pub fn confirm_assumption(&mut self, key: &str) -> bool {
        let Some(assumption) = self.assumptions.get_mut(key) else {
            return false;
        };
        assumption.status = AssumptionStatus::Confirmed;
        assumption.confirmed_at = Some(Utc::now());
        self.record(format!("Confirmed assumption: {}", key));
        true
    }

    pub fn reject_assumption(&mut self, key: &str) -> bool {
        let Some(assumption) = self.assumptions.get_mut(key) else {
            return false;
        };
        assumption.status = AssumptionStatus::Rejected;
        self.record(format!("Rejected assumption: {}", key));
        true
    }

    pub fn refresh_assumptions(&mut self, now: DateTime<Utc>) {
        for assumption in self.assumptions.values_mut() {
            assumption.refresh(now);
        }
    }

    pub fn is_fully_validated_at(&self, now: DateTime<Utc>) -> bool {
        self.gates.account_structure
            && self.gates.depreciation_periods
            && self.gates.safe_accounts
            && self.assumptions.values().all(|a| a.is_valid_at(now))
    }

    pub fn is_fully_validated(&self) -> bool {
        self.is_fully_validated_at(Utc::now())
    }

    /// One reason per unmet condition: gates first, then assumptions in key order.
    pub fn blocking_reasons(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.refresh_assumptions(now);

        let mut reasons = Vec::new();
        if !self.gates.account_structure {
            reasons.push("Account structure not confirmed".to_string());
        }
        if !self.gates.depreciation_periods {
            reasons.push("Depreciation periods not confirmed".to_string());
        }
        if !self.gates.safe_accounts {
            reasons.push("Safe accounts selection not confirmed".to_string());
        }

        for (key, assumption) in &self.assumptions {
            match assumption.status {
                AssumptionStatus::Confirmed => {}
                AssumptionStatus::Expired => reasons.push(format!("Assumption expired: {}", key)),
                AssumptionStatus::Rejected => reasons.push(format!("Assumption rejected: {}", key)),
                AssumptionStatus::Pending => reasons.push(format!("Assumption pending: {}", key)),
            }
        }
        reasons
    }

    pub fn summary(&self) -> ValidationSummary {
        let now = Utc::now();
        ValidationSummary {
            session_id: self.session_id.clone(),
            file_id: self.file_id.clone(),
            fully_validated: self.is_fully_validated_at(now),
            validations: self.gates,
            assumptions_count: self.assumptions.len(),
            valid_assumptions: self.assumptions.values().filter(|a| a.is_valid_at(now)).count(),
            last_updated: self.last_updated,
        }
    }
}
