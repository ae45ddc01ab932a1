//! Fail-closed After-Hours authorization.
//!
//! ```text
//! principal? ──no──▶ 401 AUTH_REQUIRED
//!     │
//! active subscription? ──no──▶ 403 PREMIUM_REQUIRED
//!     │
//! id verified? ──no──▶ 403 VERIFICATION_REQUIRED
//!     │
//! consent given? ──no──▶ 403 CONSENT_REQUIRED
//!     │
//!   allow          (any query error ─▶ 500 AUTH_ERROR)
//! ```

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::error;

use vlvt_common::{ErrorCode, Principal};

use crate::clock::Clock;
use crate::db::{DbError, QueryExecutor, Row};

const ACTIVE_SUBSCRIPTION_SQL: &str = "SELECT id FROM subscriptions \
     WHERE user_id = ?1 AND is_active = 1 AND (expires_at IS NULL OR expires_at > ?2) \
     LIMIT 1";

const ID_VERIFIED_SQL: &str = "SELECT id_verified FROM users WHERE id = ?1";

const CONSENT_SQL: &str = "SELECT after_hours_consent FROM users WHERE id = ?1";

/// Outcome of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted { user_id: String },
    Denied(ErrorCode),
}

pub struct AfterHoursGate {
    db: Arc<dyn QueryExecutor>,
    clock: Arc<dyn Clock>,
}

impl AfterHoursGate {
    pub fn new(db: Arc<dyn QueryExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Walk the chain in order; the first failing step decides
    pub async fn authorize(&self, principal: Option<&Principal>) -> AccessDecision {
        let Some(user_id) = principal.and_then(Principal::id) else {
            return AccessDecision::Denied(ErrorCode::AuthRequired);
        };

        match self.check(user_id).await {
            Ok(None) => AccessDecision::Granted {
                user_id: user_id.to_string(),
            },
            Ok(Some(code)) => AccessDecision::Denied(code),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "After Hours authorization failed");
                AccessDecision::Denied(ErrorCode::AuthError)
            }
        }
    }

    async fn check(&self, user_id: &str) -> Result<Option<ErrorCode>, DbError> {
        let now = self.clock.now_millis();
        let subscription = self
            .db
            .execute(ACTIVE_SUBSCRIPTION_SQL, &[json!(user_id), json!(now)])
            .await?;
        if subscription.is_empty() {
            return Ok(Some(ErrorCode::PremiumRequired));
        }

        let user = self.db.execute(ID_VERIFIED_SQL, &[json!(user_id)]).await?;
        if !flag(&user, "id_verified") {
            return Ok(Some(ErrorCode::VerificationRequired));
        }

        let user = self.db.execute(CONSENT_SQL, &[json!(user_id)]).await?;
        if !flag(&user, "after_hours_consent") {
            return Ok(Some(ErrorCode::ConsentRequired));
        }

        Ok(None)
    }
}

/// JSON `true` or integer `1` in the first row; anything else is false
fn flag(rows: &[Row], column: &str) -> bool {
    match rows.first().and_then(|row| row.get(column)) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::db::SqliteExecutor;
    use crate::db::mock::{ScriptedExecutor, row};

    fn gate(script: Vec<Result<Vec<Row>, String>>) -> (AfterHoursGate, Arc<ScriptedExecutor>) {
        let db = Arc::new(ScriptedExecutor::new(script));
        let gate = AfterHoursGate::new(db.clone(), Arc::new(MockClock::new(1_000)));
        (gate, db)
    }

    fn subscribed() -> Result<Vec<Row>, String> {
        Ok(vec![row(&[("id", json!("sub_1"))])])
    }

    #[tokio::test]
    async fn test_no_principal_makes_no_query() {
        let (gate, db) = gate(vec![]);
        assert_eq!(
            gate.authorize(None).await,
            AccessDecision::Denied(ErrorCode::AuthRequired)
        );
        assert_eq!(
            gate.authorize(Some(&Principal::new(""))).await,
            AccessDecision::Denied(ErrorCode::AuthRequired)
        );
        assert_eq!(db.calls(), 0);
    }

    #[tokio::test]
    async fn test_premium_denial_stops_chain() {
        let (gate, db) = gate(vec![Ok(vec![])]);
        let alice = Principal::new("alice");
        assert_eq!(
            gate.authorize(Some(&alice)).await,
            AccessDecision::Denied(ErrorCode::PremiumRequired)
        );
        assert_eq!(db.calls(), 1);
    }

    #[tokio::test]
    async fn test_verification_denial() {
        let (gate, db) = gate(vec![
            subscribed(),
            Ok(vec![row(&[("id_verified", json!(false))])]),
        ]);
        assert_eq!(
            gate.authorize(Some(&Principal::new("alice"))).await,
            AccessDecision::Denied(ErrorCode::VerificationRequired)
        );
        assert_eq!(db.calls(), 2);
    }

    #[tokio::test]
    async fn test_consent_denial_for_null_and_zero() {
        for consent in [Value::Null, json!(0)] {
            let (gate, db) = gate(vec![
                subscribed(),
                Ok(vec![row(&[("id_verified", json!(1))])]),
                Ok(vec![row(&[("after_hours_consent", consent)])]),
            ]);
            assert_eq!(
                gate.authorize(Some(&Principal::new("alice"))).await,
                AccessDecision::Denied(ErrorCode::ConsentRequired)
            );
            assert_eq!(db.calls(), 3);
        }
    }

    #[tokio::test]
    async fn test_missing_user_row_fails_closed() {
        let (gate, _) = gate(vec![subscribed(), Ok(vec![])]);
        assert_eq!(
            gate.authorize(Some(&Principal::new("ghost"))).await,
            AccessDecision::Denied(ErrorCode::VerificationRequired)
        );
    }

    #[tokio::test]
    async fn test_granted_when_all_steps_pass() {
        let (gate, db) = gate(vec![
            subscribed(),
            Ok(vec![row(&[("id_verified", json!(true))])]),
            Ok(vec![row(&[("after_hours_consent", json!(1))])]),
        ]);
        assert_eq!(
            gate.authorize(Some(&Principal::new("alice"))).await,
            AccessDecision::Granted {
                user_id: "alice".to_string()
            }
        );
        assert_eq!(db.calls(), 3);
    }

    #[tokio::test]
    async fn test_entitlement_error_skips_later_checks() {
        let (gate, db) = gate(vec![Err("connection refused".to_string())]);
        assert_eq!(
            gate.authorize(Some(&Principal::new("alice"))).await,
            AccessDecision::Denied(ErrorCode::AuthError)
        );
        assert_eq!(db.calls(), 1);
    }

    #[tokio::test]
    async fn test_query_error_is_auth_error_and_stops() {
        let (gate, db) = gate(vec![
            subscribed(),
            Err("connection reset".to_string()),
        ]);
        assert_eq!(
            gate.authorize(Some(&Principal::new("alice"))).await,
            AccessDecision::Denied(ErrorCode::AuthError)
        );
        assert_eq!(db.calls(), 2);
    }

    #[test]
    fn test_flag_truthiness() {
        assert!(flag(&[row(&[("f", json!(true))])], "f"));
        assert!(flag(&[row(&[("f", json!(1))])], "f"));
        assert!(!flag(&[row(&[("f", json!(2))])], "f"));
        assert!(!flag(&[row(&[("f", json!("1"))])], "f"));
        assert!(!flag(&[row(&[("f", json!(false))])], "f"));
        assert!(!flag(&[row(&[("other", json!(true))])], "f"));
        assert!(!flag(&[], "f"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_against_sqlite_schema() {
        let db = SqliteExecutor::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE users (id TEXT PRIMARY KEY, id_verified INTEGER, after_hours_consent INTEGER);
             CREATE TABLE subscriptions (id TEXT, user_id TEXT, is_active INTEGER, expires_at INTEGER);
             INSERT INTO users VALUES ('alice', 1, 1), ('bob', 1, 1), ('carol', 1, 0);
             INSERT INTO subscriptions VALUES
                ('s1', 'alice', 1, NULL),
                ('s2', 'bob', 1, 500),
                ('s3', 'carol', 1, 5000);",
        )
        .unwrap();
        let gate = AfterHoursGate::new(Arc::new(db), Arc::new(MockClock::new(1_000)));

        assert!(matches!(
            gate.authorize(Some(&Principal::new("alice"))).await,
            AccessDecision::Granted { .. }
        ));
        // Subscription expired at 500 ms, before the clock's 1000 ms
        assert_eq!(
            gate.authorize(Some(&Principal::new("bob"))).await,
            AccessDecision::Denied(ErrorCode::PremiumRequired)
        );
        assert_eq!(
            gate.authorize(Some(&Principal::new("carol"))).await,
            AccessDecision::Denied(ErrorCode::ConsentRequired)
        );
    }
}
