//! Entitlement ledger: which parent may view which student's report for
//! which term/session.
//!
//! The ledger never surfaces an error to its caller. Invalid input and
//! lookup misses are silent no-ops that return the best-effort current
//! view; a store that fails to load serves as empty; a store that fails to
//! save leaves the previous state in force. Only calls that actually
//! change state broadcast.

use std::sync::Mutex;

use crate::broadcast::{Broadcaster, Subscription};
use crate::records::{AccessCheck, AccessGrant, GrantSource};
use crate::store::GrantStore;
use crate::term;

fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct Ledger<S: GrantStore> {
    store: Mutex<S>,
    broadcaster: Broadcaster<AccessGrant>,
}

impl<S: GrantStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger {
            store: Mutex::new(store),
            broadcaster: Broadcaster::new(),
        }
    }

    /// Observe the full grant set after every effective mutation. No
    /// replay; call [`Ledger::records`] to catch up first.
    pub fn subscribe<F>(&self, observer: F) -> Subscription<AccessGrant>
    where
        F: Fn(&[AccessGrant]) + Send + 'static,
    {
        self.broadcaster.subscribe(observer)
    }

    /// Grant access, replacing any existing grant for the same
    /// (parent, student, session, term) key whatever its source. Returns
    /// the (term, session)-scoped view after the call; an empty required
    /// field leaves the ledger untouched.
    pub fn grant(
        &self,
        parent_id: &str,
        student_id: &str,
        term_label: &str,
        session: &str,
        granted_by: GrantSource,
    ) -> Vec<AccessGrant> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let records = load_or_empty(&*store);

        if [parent_id, student_id, term_label, session]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return scoped(&records, term_label, session);
        }

        let key = term::grant_key(parent_id, student_id, term_label, session);
        let mut next: Vec<AccessGrant> = records
            .iter()
            .filter(|r| term::grant_key(&r.parent_id, &r.student_id, &r.term, &r.session) != key)
            .cloned()
            .collect();
        next.push(AccessGrant {
            parent_id: parent_id.trim().to_string(),
            student_id: student_id.trim().to_string(),
            term: term::normalize_term(term_label),
            session: session.trim().to_string(),
            granted_by,
            granted_at: now_ts(),
        });

        if let Err(e) = store.save(&next) {
            tracing::warn!(error = %e, "access grant not persisted; keeping previous ledger state");
            return scoped(&records, term_label, session);
        }
        self.broadcaster.publish(&next);
        scoped(&next, term_label, session)
    }

    /// Key-exact removal. Persists and broadcasts only when a record was
    /// actually removed.
    pub fn revoke(
        &self,
        parent_id: &str,
        student_id: &str,
        term_label: &str,
        session: &str,
    ) -> Vec<AccessGrant> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let records = load_or_empty(&*store);

        if [parent_id, student_id, term_label, session]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return scoped(&records, term_label, session);
        }

        let key = term::grant_key(parent_id, student_id, term_label, session);
        let next: Vec<AccessGrant> = records
            .iter()
            .filter(|r| term::grant_key(&r.parent_id, &r.student_id, &r.term, &r.session) != key)
            .cloned()
            .collect();
        if next.len() == records.len() {
            return scoped(&records, term_label, session);
        }

        if let Err(e) = store.save(&next) {
            tracing::warn!(error = %e, "access revoke not persisted; keeping previous ledger state");
            return scoped(&records, term_label, session);
        }
        self.broadcaster.publish(&next);
        scoped(&next, term_label, session)
    }

    /// Read-side filter of the ledger down to one (term, session). The
    /// full store is left untouched: grants for other terms survive a
    /// sync (see DESIGN.md; evicting them would silently drop paid-for
    /// access across terms).
    pub fn sync(&self, term_label: &str, session: &str) -> Vec<AccessGrant> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        scoped(&load_or_empty(&*store), term_label, session)
    }

    pub fn has_access(
        &self,
        parent_id: &str,
        student_id: &str,
        term_label: &str,
        session: &str,
    ) -> AccessCheck {
        let record = self
            .sync(term_label, session)
            .into_iter()
            .find(|r| same_party(r, parent_id, student_id));
        AccessCheck {
            granted: record.is_some(),
            record,
        }
    }

    /// Empties the ledger and broadcasts the empty set. Test/reset paths
    /// only.
    pub fn clear_all(&self) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = store.save(&[]) {
            tracing::warn!(error = %e, "ledger clear not persisted");
            return;
        }
        self.broadcaster.publish(&[]);
    }

    /// Current full grant set (broadcast catch-up accessor).
    pub fn records(&self) -> Vec<AccessGrant> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        load_or_empty(&*store)
    }
}

fn load_or_empty<S: GrantStore>(store: &S) -> Vec<AccessGrant> {
    match store.load() {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "grant store unreadable; serving empty ledger");
            Vec::new()
        }
    }
}

fn scoped(records: &[AccessGrant], term_label: &str, session: &str) -> Vec<AccessGrant> {
    let want_term = term::normalize_term(term_label);
    records
        .iter()
        .filter(|r| {
            term::normalize_term(&r.term) == want_term
                && r.session.trim().eq_ignore_ascii_case(session.trim())
        })
        .cloned()
        .collect()
}

fn same_party(record: &AccessGrant, parent_id: &str, student_id: &str) -> bool {
    record.parent_id.trim().eq_ignore_ascii_case(parent_id.trim())
        && record.student_id.trim().eq_ignore_ascii_case(student_id.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGrantStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ledger() -> Ledger<MemoryGrantStore> {
        Ledger::new(MemoryGrantStore::default())
    }

    fn broadcast_counter(ledger: &Ledger<MemoryGrantStore>) -> (Arc<AtomicUsize>, Subscription<AccessGrant>) {
        let count = Arc::new(AtomicUsize::new(0));
        let writer = Arc::clone(&count);
        let sub = ledger.subscribe(move |_| {
            writer.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn granting_twice_keeps_one_record_per_key() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn manual_grant_overrides_payment_for_the_same_key() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        // Different term spelling, same identity key.
        let view = ledger.grant("P1", "S1", "first term", "2024/2025", GrantSource::Manual);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].granted_by, GrantSource::Manual);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn revoke_is_key_exact() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        ledger.grant("P1", "S1", "Second Term", "2024/2025", GrantSource::Payment);

        ledger.revoke("P1", "S1", "First Term", "2024/2025");

        assert!(!ledger.has_access("P1", "S1", "First Term", "2024/2025").granted);
        assert!(ledger.has_access("P1", "S1", "Second Term", "2024/2025").granted);
    }

    #[test]
    fn empty_fields_mutate_nothing_and_broadcast_nothing() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);

        let (count, _sub) = broadcast_counter(&ledger);
        ledger.grant("", "S1", "First Term", "2024/2025", GrantSource::Manual);
        ledger.grant("P1", " ", "First Term", "2024/2025", GrantSource::Manual);
        ledger.revoke("P1", "", "First Term", "2024/2025");

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].granted_by, GrantSource::Payment);
    }

    #[test]
    fn revoking_a_missing_key_does_not_broadcast() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);

        let (count, _sub) = broadcast_counter(&ledger);
        ledger.revoke("P1", "S2", "First Term", "2024/2025");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sync_filters_without_evicting_other_terms() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        ledger.grant("P2", "S2", "Second Term", "2024/2025", GrantSource::Manual);

        let view = ledger.sync("1st term", "2024/2025");
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].parent_id, "P1");

        // The narrowing is read-side only.
        assert_eq!(ledger.records().len(), 2);
        assert!(ledger.has_access("P2", "S2", "Second Term", "2024/2025").granted);
    }

    #[test]
    fn payment_grant_then_manual_override_then_revoke_scenario() {
        let ledger = ledger();

        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        let check = ledger.has_access("P1", "S1", "First Term", "2024/2025");
        assert!(check.granted);
        assert_eq!(check.record.expect("record").granted_by, GrantSource::Payment);

        ledger.grant("P1", "S1", "first term", "2024/2025", GrantSource::Manual);
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].granted_by, GrantSource::Manual);

        ledger.revoke("P1", "S1", "First Term", "2024/2025");
        let check = ledger.has_access("P1", "S1", "First Term", "2024/2025");
        assert!(!check.granted);
        assert!(check.record.is_none());
    }

    #[test]
    fn clear_all_broadcasts_an_empty_set() {
        let ledger = ledger();
        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);

        let (count, _sub) = broadcast_counter(&ledger);
        ledger.clear_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(ledger.records().is_empty());
    }

    #[test]
    fn broadcast_carries_the_full_set_not_a_diff() {
        let ledger = ledger();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&seen);
        let _sub = ledger.subscribe(move |records: &[AccessGrant]| {
            writer.lock().unwrap().push(records.len());
        });

        ledger.grant("P1", "S1", "First Term", "2024/2025", GrantSource::Payment);
        ledger.grant("P2", "S2", "First Term", "2024/2025", GrantSource::Payment);
        ledger.revoke("P1", "S1", "First Term", "2024/2025");

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }
}
