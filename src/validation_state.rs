//! Per-file confirmation workflow.
//!
//! A [`ValidationStateManager`] is created and owned by the host and shared by
//! reference. All session state sits behind one mutex that is held for the
//! whole of each operation. Expired sessions are reclaimed when the manager is
//! built and whenever sessions are created or looked up by file.

use crate::accounts::AccountPath;
use crate::error::{FinancialStructureError, Result};
use crate::schema::SessionConfig;
use crate::session::{AssumptionStatus, ValidationAssumption, ValidationSession, ValidationSummary};
use crate::HierarchySummary;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub const NO_SESSION_REASON: &str =
    "No validation session found for this file. Analyze and confirm its account structure first.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationReadiness {
    pub can_proceed: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_sessions: usize,
    pub fully_validated_sessions: usize,
    pub partially_validated_sessions: usize,
    pub total_assumptions: usize,
    pub cache_size: usize,
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
}

/// Lossless, plain-data copy of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: ValidationSession,
    pub exported_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Default)]
struct ManagerState {
    sessions: HashMap<String, ValidationSession>,
    file_cache: HashMap<String, String>,
}

impl ManagerState {
    fn insert_new_session(&mut self, file_id: &str, history_limit: usize) -> ValidationSession {
        let now = Utc::now();
        let session_id = format!(
            "session_{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let mut session = ValidationSession::new(session_id.clone(), file_id, history_limit);
        session.record("Session created");

        self.sessions.insert(session_id.clone(), session.clone());
        self.file_cache.insert(file_id.to_string(), session_id.clone());

        info!("Created validation session: {} for {}", session_id, file_id);
        session
    }

    fn session_id_for_file(&mut self, file_id: &str) -> Option<String> {
        if let Some(id) = self.file_cache.get(file_id).cloned() {
            if self.sessions.contains_key(&id) {
                return Some(id);
            }
            self.file_cache.remove(file_id);
        }

        let latest = self
            .sessions
            .values()
            .filter(|s| s.file_id == file_id)
            .max_by_key(|s| s.last_updated)?
            .session_id
            .clone();
        self.file_cache.insert(file_id.to_string(), latest.clone());
        Some(latest)
    }

    /// `None` means no session is old enough to expire.
    fn cleanup(&mut self, cutoff: Option<DateTime<Utc>>) -> usize {
        let Some(cutoff) = cutoff else {
            return 0;
        };
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.last_updated < cutoff)
            .map(|s| s.session_id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = self.sessions.remove(id) {
                if self.file_cache.get(&session.file_id) == Some(id) {
                    self.file_cache.remove(&session.file_id);
                }
                info!("Cleaned up expired session: {}", id);
            }
        }
        expired.len()
    }
}

pub struct ValidationStateManager {
    config: SessionConfig,
    state: Mutex<ManagerState>,
}

impl Default for ValidationStateManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ValidationStateManager {
    pub fn new(config: SessionConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Session config out of range: {}", e);
        }
        let manager = Self {
            config,
            state: Mutex::new(ManagerState::default()),
        };
        manager.cleanup_expired_sessions();
        manager
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cutoff(&self) -> Option<DateTime<Utc>> {
        Duration::try_hours(self.config.session_timeout_hours)
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
    }

    fn assumption_ttl(&self) -> Option<Duration> {
        self.config.assumption_ttl_hours.and_then(Duration::try_hours)
    }

    fn with_session<F>(&self, session_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ValidationSession),
    {
        let mut state = self.lock();
        match state.sessions.get_mut(session_id) {
            Some(session) => {
                f(session);
                true
            }
            None => {
                warn!("Validation session not found: {}", session_id);
                false
            }
        }
    }

    pub fn cleanup_expired_sessions(&self) -> usize {
        let cutoff = self.cutoff();
        self.lock().cleanup(cutoff)
    }

    pub fn create_session(&self, file_id: &str) -> ValidationSession {
        let cutoff = self.cutoff();
        let mut state = self.lock();
        state.cleanup(cutoff);
        state.insert_new_session(file_id, self.config.history_limit)
    }

    pub fn get_session(&self, session_id: &str) -> Option<ValidationSession> {
        self.lock().sessions.get(session_id).cloned()
    }

    /// Cached session for the file, else the most recently updated one.
    pub fn get_session_for_file(&self, file_id: &str) -> Option<ValidationSession> {
        let cutoff = self.cutoff();
        let mut state = self.lock();
        state.cleanup(cutoff);
        let id = state.session_id_for_file(file_id)?;
        state.sessions.get(&id).cloned()
    }

    /// Lookup and creation happen under one lock, so concurrent callers for
    /// the same file share a single session.
    pub fn get_or_create_session(&self, file_id: &str) -> ValidationSession {
        let cutoff = self.cutoff();
        let mut state = self.lock();
        state.cleanup(cutoff);
        let existing = state.session_id_for_file(file_id);
        if let Some(session) = existing.and_then(|id| state.sessions.get(&id).cloned()) {
            return session;
        }
        state.insert_new_session(file_id, self.config.history_limit)
    }

    pub fn can_proceed_with_calculation(&self, file_id: &str) -> CalculationReadiness {
        let cutoff = self.cutoff();
        let mut state = self.lock();
        state.cleanup(cutoff);

        let session = match state.session_id_for_file(file_id) {
            Some(id) => state.sessions.get_mut(&id),
            None => None,
        };
        let Some(session) = session else {
            return CalculationReadiness {
                can_proceed: false,
                reasons: vec![NO_SESSION_REASON.to_string()],
            };
        };

        let reasons = session.blocking_reasons(Utc::now());
        CalculationReadiness {
            can_proceed: reasons.is_empty(),
            reasons,
        }
    }

    pub fn add_assumption(&self, session_id: &str, key: &str, description: &str, value: Value) -> bool {
        let ttl = self.assumption_ttl();
        self.add_assumption_with_ttl(session_id, key, description, value, ttl)
    }

    pub fn add_assumption_with_ttl(
        &self,
        session_id: &str,
        key: &str,
        description: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> bool {
        self.with_session(session_id, |session| {
            session.add_assumption(key, description, value, ttl);
        })
    }

    pub fn confirm_assumption(&self, session_id: &str, key: &str) -> bool {
        let mut state = self.lock();
        state
            .sessions
            .get_mut(session_id)
            .is_some_and(|s| s.confirm_assumption(key))
    }

    /// Leaves the gates untouched; readiness picks the rejection up.
    pub fn reject_assumption(&self, session_id: &str, key: &str) -> bool {
        let mut state = self.lock();
        let rejected = state
            .sessions
            .get_mut(session_id)
            .is_some_and(|s| s.reject_assumption(key));
        if rejected {
            info!("Assumption '{}' rejected in session {}", key, session_id);
        }
        rejected
    }

    fn confirm_with_assumption(
        &self,
        session_id: &str,
        gate: fn(&mut ValidationSession),
        assumptions: Vec<(String, String, Value)>,
        event: &str,
    ) -> bool {
        let ttl = self.assumption_ttl();
        let confirmed = self.with_session(session_id, |session| {
            gate(session);
            session.record(event);
            for (key, description, value) in assumptions {
                session.add_assumption(key.clone(), description, value, ttl);
                session.confirm_assumption(&key);
            }
        });
        if confirmed {
            info!("{} for session: {}", event, session_id);
        }
        confirmed
    }

    pub fn confirm_account_structure(&self, session_id: &str, summary: &HierarchySummary) -> bool {
        self.confirm_with_assumption(
            session_id,
            |s| s.gates.account_structure = true,
            vec![(
                "hierarchy_structure".to_string(),
                "Account hierarchy structure and parent-child relationships".to_string(),
                json!({
                    "total_accounts": summary.total_accounts,
                    "safe_accounts": summary.safe_accounts.len(),
                    "potential_double_counting": summary.ambiguous_accounts,
                    "sum_mismatches": summary.sum_mismatches,
                }),
            )],
            "Account structure confirmed",
        )
    }

    /// `periods` maps account label to useful life in years.
    pub fn confirm_depreciation_periods(&self, session_id: &str, periods: &BTreeMap<String, u32>) -> bool {
        let assumptions = periods
            .iter()
            .map(|(account, years)| {
                (
                    format!("depreciation_{}", account),
                    format!("Depreciation period for {}", account),
                    json!(years),
                )
            })
            .collect();

        self.confirm_with_assumption(
            session_id,
            |s| s.gates.depreciation_periods = true,
            assumptions,
            "Depreciation periods confirmed",
        )
    }

    pub fn confirm_safe_accounts(&self, session_id: &str, accounts: &[AccountPath]) -> bool {
        let selected: Vec<String> = accounts.iter().map(|p| p.to_string()).collect();
        self.confirm_with_assumption(
            session_id,
            |s| s.gates.safe_accounts = true,
            vec![(
                "safe_accounts_selection".to_string(),
                "Selected accounts for calculations (leaf accounts only)".to_string(),
                json!(selected),
            )],
            "Safe accounts confirmed",
        )
    }

    pub fn confirm_benchmark_preferences(&self, session_id: &str, benchmarks: Value) -> bool {
        self.confirm_with_assumption(
            session_id,
            |s| s.gates.benchmark_preferences = true,
            vec![(
                "benchmark_preferences".to_string(),
                "Industry benchmark preferences and targets".to_string(),
                benchmarks,
            )],
            "Benchmark preferences confirmed",
        )
    }

    pub fn set_user_context(&self, session_id: &str, key: &str, value: Value) -> bool {
        self.with_session(session_id, |session| {
            session.user_context.insert(key.to_string(), value);
            session.record(format!("Updated context: {}", key));
        })
    }

    pub fn get_validation_summary(&self, session_id: &str) -> Option<ValidationSummary> {
        self.lock().sessions.get(session_id).map(ValidationSession::summary)
    }

    pub fn get_session_assumptions(&self, session_id: &str) -> Option<BTreeMap<String, ValidationAssumption>> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(session_id)?;
        session.refresh_assumptions(Utc::now());
        Some(session.assumptions.clone())
    }

    pub fn generate_validation_report(&self, session_id: &str) -> Option<String> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(session_id)?;
        let now = Utc::now();
        let reasons = session.blocking_reasons(now);
        let summary = session.summary();
        let mark = |ok: bool| if ok { "[x]" } else { "[ ]" };

        let mut report = String::new();
        report.push_str(&format!("VALIDATION REPORT FOR SESSION: {}\n", session_id));
        report.push_str(&format!("{}\n\n", "=".repeat(60)));
        report.push_str(&format!("File: {}\n", session.file_id));
        report.push_str(&format!(
            "Status: {}\n",
            if summary.fully_validated {
                "Fully validated"
            } else {
                "Incomplete validation"
            }
        ));
        report.push_str(&format!("Last updated: {}\n\n", session.last_updated.to_rfc3339()));

        report.push_str("Core validations:\n");
        let gates = summary.validations;
        report.push_str(&format!("  {} Account structure\n", mark(gates.account_structure)));
        report.push_str(&format!("  {} Depreciation periods\n", mark(gates.depreciation_periods)));
        report.push_str(&format!("  {} Safe accounts\n", mark(gates.safe_accounts)));
        report.push_str(&format!("  {} Benchmark preferences\n", mark(gates.benchmark_preferences)));

        report.push_str(&format!(
            "\nAssumptions ({}/{} valid):\n",
            summary.valid_assumptions, summary.assumptions_count
        ));
        for assumption in session.assumptions.values() {
            let status = match assumption.status {
                AssumptionStatus::Pending => "pending",
                AssumptionStatus::Confirmed => "confirmed",
                AssumptionStatus::Rejected => "rejected",
                AssumptionStatus::Expired => "expired",
            };
            report.push_str(&format!(
                "  {} {}: {} ({})\n",
                mark(assumption.is_valid_at(now)),
                assumption.description,
                assumption.value,
                status
            ));
        }

        if !reasons.is_empty() {
            report.push_str("\nMissing validations:\n");
            for reason in &reasons {
                report.push_str(&format!("  - {}\n", reason));
            }
        }
        Some(report)
    }

    pub fn session_statistics(&self) -> SessionStatistics {
        let state = self.lock();
        let now = Utc::now();
        let total_sessions = state.sessions.len();
        let fully_validated_sessions = state
            .sessions
            .values()
            .filter(|s| s.is_fully_validated_at(now))
            .count();

        SessionStatistics {
            total_sessions,
            fully_validated_sessions,
            partially_validated_sessions: total_sessions - fully_validated_sessions,
            total_assumptions: state.sessions.values().map(|s| s.assumptions.len()).sum(),
            cache_size: state.file_cache.len(),
            oldest_session: state.sessions.values().map(|s| s.created_at).min(),
            newest_session: state.sessions.values().map(|s| s.created_at).max(),
        }
    }

    pub fn export_session_state(&self, session_id: &str) -> Option<SessionSnapshot> {
        let state = self.lock();
        state.sessions.get(session_id).map(|session| SessionSnapshot {
            session: session.clone(),
            exported_at: Utc::now(),
        })
    }

    pub fn export_session_json(&self, session_id: &str) -> Result<String> {
        self.export_session_state(session_id)
            .ok_or_else(|| FinancialStructureError::SessionNotFound(session_id.to_string()))?
            .to_json()
    }

    /// Replaces any live session with the same id and points the file cache at it.
    pub fn import_session_state(&self, snapshot: SessionSnapshot) -> bool {
        let session = snapshot.session;
        if session.session_id.trim().is_empty() || session.file_id.trim().is_empty() {
            warn!("Failed to import session state: missing session or file id");
            return false;
        }

        let mut state = self.lock();
        state
            .file_cache
            .insert(session.file_id.clone(), session.session_id.clone());
        info!("Imported session state: {}", session.session_id);
        state.sessions.insert(session.session_id.clone(), session);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn summary() -> HierarchySummary {
        HierarchySummary {
            total_accounts: 4,
            safe_accounts: vec![AccountPath::from_segments(["长期待摊费用", "设施设备"])],
            ambiguous_accounts: 1,
            sum_mismatches: 1,
            circular_references: 0,
            calculation_safety_score: 0.0,
        }
    }

    fn confirm_required(manager: &ValidationStateManager, id: &str) {
        let periods = BTreeMap::from([("设备".to_string(), 5)]);
        assert!(manager.confirm_account_structure(id, &summary()));
        assert!(manager.confirm_depreciation_periods(id, &periods));
        assert!(manager.confirm_safe_accounts(id, &summary().safe_accounts));
    }

    #[test]
    fn test_session_ids_and_lookup() {
        let manager = ValidationStateManager::default();
        let session = manager.create_session("a.xlsx");

        assert!(session.session_id.starts_with("session_"));
        assert_eq!(manager.get_session(&session.session_id).unwrap().file_id, "a.xlsx");
        assert_eq!(
            manager.get_session_for_file("a.xlsx").unwrap().session_id,
            session.session_id
        );
        assert!(manager.get_session_for_file("b.xlsx").is_none());

        let again = manager.get_or_create_session("a.xlsx");
        assert_eq!(again.session_id, session.session_id);
        assert_eq!(manager.session_statistics().total_sessions, 1);
    }

    #[test]
    fn test_readiness_gates() {
        let manager = ValidationStateManager::default();

        let missing = manager.can_proceed_with_calculation("a.xlsx");
        assert!(!missing.can_proceed);
        assert_eq!(missing.reasons, vec![NO_SESSION_REASON]);
        assert!(missing.reasons[0].starts_with("No validation session found for this file"));

        let id = manager.create_session("a.xlsx").session_id;
        let fresh = manager.can_proceed_with_calculation("a.xlsx");
        assert!(!fresh.can_proceed);
        assert_eq!(fresh.reasons.len(), 3);

        confirm_required(&manager, &id);
        let ready = manager.can_proceed_with_calculation("a.xlsx");
        assert!(ready.can_proceed, "{:?}", ready.reasons);
        assert!(ready.reasons.is_empty());

        let assumptions = manager.get_session_assumptions(&id).unwrap();
        assert!(assumptions.contains_key("hierarchy_structure"));
        assert!(assumptions.contains_key("depreciation_设备"));
        assert!(assumptions.contains_key("safe_accounts_selection"));
        assert!(assumptions.values().all(|a| a.status == AssumptionStatus::Confirmed));
    }

    #[test]
    fn test_rejection_blocks_without_touching_gates() {
        let manager = ValidationStateManager::default();
        let id = manager.create_session("a.xlsx").session_id;
        confirm_required(&manager, &id);

        assert!(manager.reject_assumption(&id, "depreciation_设备"));
        let summary = manager.get_validation_summary(&id).unwrap();
        assert!(summary.validations.depreciation_periods);

        let readiness = manager.can_proceed_with_calculation("a.xlsx");
        assert!(!readiness.can_proceed);
        assert_eq!(readiness.reasons, vec!["Assumption rejected: depreciation_设备"]);
    }

    #[test]
    fn test_expired_assumption_blocks() {
        let manager = ValidationStateManager::default();
        let id = manager.create_session("a.xlsx").session_id;
        confirm_required(&manager, &id);

        assert!(manager.add_assumption_with_ttl(&id, "tax_rate", "Tax rate", json!(0.25), Some(Duration::hours(-1))));
        assert!(manager.confirm_assumption(&id, "tax_rate"));

        let readiness = manager.can_proceed_with_calculation("a.xlsx");
        assert_eq!(readiness.reasons, vec!["Assumption expired: tax_rate"]);
        assert_eq!(
            manager.get_session_assumptions(&id).unwrap()["tax_rate"].status,
            AssumptionStatus::Expired
        );
    }

    #[test]
    fn test_unknown_session_returns_false() {
        let manager = ValidationStateManager::default();
        assert!(!manager.confirm_account_structure("nope", &summary()));
        assert!(!manager.reject_assumption("nope", "k"));
        assert!(!manager.confirm_benchmark_preferences("nope", json!({})));
        assert!(manager.export_session_state("nope").is_none());
        assert!(manager.generate_validation_report("nope").is_none());
        assert!(manager.get_session_assumptions("nope").is_none());
    }

    #[test]
    fn test_idle_sessions_reclaimed() {
        let manager = ValidationStateManager::default();
        let live = manager.create_session("live.xlsx");

        let mut stale = ValidationSession::new("session_old", "old.xlsx", 50);
        stale.last_updated = Utc::now() - Duration::hours(25);
        assert!(manager.import_session_state(SessionSnapshot {
            session: stale,
            exported_at: Utc::now(),
        }));
        assert_eq!(manager.session_statistics().cache_size, 2);

        assert_eq!(manager.cleanup_expired_sessions(), 1);
        assert!(manager.get_session("session_old").is_none());
        assert!(manager.get_session(&live.session_id).is_some());

        let stats = manager.session_statistics();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.cache_size, 1);
    }

    #[test]
    fn test_stale_cache_falls_back_to_latest() {
        let manager = ValidationStateManager::default();
        let first = manager.create_session("a.xlsx");

        let mut newer = ValidationSession::new("session_newer", "a.xlsx", 50);
        newer.last_updated = first.last_updated + Duration::seconds(5);
        manager.import_session_state(SessionSnapshot {
            session: newer,
            exported_at: Utc::now(),
        });
        // Point the cache at a session that no longer exists.
        manager
            .lock()
            .file_cache
            .insert("a.xlsx".to_string(), "session_gone".to_string());

        let found = manager.get_session_for_file("a.xlsx").unwrap();
        assert_eq!(found.session_id, "session_newer");
        assert_eq!(
            manager.lock().file_cache.get("a.xlsx").map(String::as_str),
            Some("session_newer")
        );
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = ValidationStateManager::default();
        let id = source.create_session("a.xlsx").session_id;
        confirm_required(&source, &id);
        source.add_assumption(&id, "growth", "Growth outlook", json!("flat"));
        source.reject_assumption(&id, "growth");

        let json = source.export_session_state(&id).unwrap().to_json().unwrap();

        let target = ValidationStateManager::default();
        assert!(target.import_session_state(SessionSnapshot::from_json(&json).unwrap()));

        let before = source.get_session(&id).unwrap();
        let after = target.get_session(&id).unwrap();
        assert_eq!(before, after);
        assert_eq!(
            target.can_proceed_with_calculation("a.xlsx"),
            source.can_proceed_with_calculation("a.xlsx")
        );
    }

    #[test]
    fn test_export_json_unknown_session() {
        let manager = ValidationStateManager::default();
        assert!(matches!(
            manager.export_session_json("nope"),
            Err(FinancialStructureError::SessionNotFound(_))
        ));

        let id = manager.create_session("a.xlsx").session_id;
        assert!(manager.export_session_json(&id).unwrap().contains("a.xlsx"));
    }

    #[test]
    fn test_import_rejects_missing_ids() {
        let manager = ValidationStateManager::default();
        let snapshot = SessionSnapshot {
            session: ValidationSession::new("", "a.xlsx", 50),
            exported_at: Utc::now(),
        };
        assert!(!manager.import_session_state(snapshot));
    }

    #[test]
    fn test_report_lists_missing() {
        let manager = ValidationStateManager::default();
        let id = manager.create_session("a.xlsx").session_id;
        manager.confirm_benchmark_preferences(&id, json!({"gross_margin": 0.6}));

        let report = manager.generate_validation_report(&id).unwrap();
        assert!(report.contains("Incomplete validation"));
        assert!(report.contains("[x] Benchmark preferences"));
        assert!(report.contains("[ ] Account structure"));
        assert!(report.contains("- Depreciation periods not confirmed"));
    }

    #[test]
    fn test_concurrent_confirmations() {
        let manager = Arc::new(ValidationStateManager::default());
        let ids: Vec<String> = (0..8)
            .map(|i| manager.create_session(&format!("file{}.xlsx", i)).session_id)
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || confirm_required(&manager, &id))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = manager.session_statistics();
        assert_eq!(stats.total_sessions, 8);
        assert_eq!(stats.fully_validated_sessions, 8);
        assert_eq!(stats.total_assumptions, 8 * 3);
    }

    #[test]
    fn test_concurrent_get_or_create_shares_one_session() {
        for _ in 0..50 {
            let manager = Arc::new(ValidationStateManager::default());
            let barrier = Arc::new(Barrier::new(8));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let manager = Arc::clone(&manager);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        manager.get_or_create_session("same.xlsx").session_id
                    })
                })
                .collect();
            let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert!(ids.iter().all(|id| *id == ids[0]));
            assert_eq!(manager.session_statistics().total_sessions, 1);
        }
    }

    #[test]
    fn test_out_of_range_timing_does_not_panic() {
        let manager = ValidationStateManager::new(SessionConfig {
            session_timeout_hours: i64::MAX,
            assumption_ttl_hours: Some(1_000_000_000_000),
            history_limit: 50,
        });
        let id = manager.create_session("huge.xlsx").session_id;

        assert!(manager.add_assumption(&id, "k", "d", json!(1)));
        let assumptions = manager.get_session_assumptions(&id).unwrap();
        assert_eq!(assumptions["k"].expires_at, None);
        assert!(manager.get_session_for_file("huge.xlsx").is_some());
        assert_eq!(manager.cleanup_expired_sessions(), 0);
    }
}
