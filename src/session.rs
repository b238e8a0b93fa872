//! Per-browser state: the uploaded dataset, edited templates, progress of
//! the current run and the reports of past runs.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::documents::DocumentKind;
use crate::error::BatchError;
use crate::packager::{BatchReport, Progress};

pub const SESSION_COOKIE: &str = "session";

/// User session data
#[derive(Debug)]
pub struct Session {
    pub dataset: Option<Arc<Dataset>>,
    templates: HashMap<DocumentKind, String>,
    pub progress: Option<Progress>,
    pub reports: HashMap<DocumentKind, BatchReport>,
    /// Set while a batch runs; only one may be in flight.
    pub busy: bool,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Session {
            dataset: None,
            templates: HashMap::new(),
            progress: None,
            reports: HashMap::new(),
            busy: false,
            last_seen: Instant::now(),
        }
    }

    /// The edited template of `kind`, or its default.
    pub fn template(&self, kind: DocumentKind) -> String {
        self.templates
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_template().to_string())
    }

    pub fn set_template(&mut self, kind: DocumentKind, template: String) {
        self.templates.insert(kind, template);
    }
}

/// In-memory sessions keyed by the `session` cookie.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve the session of a request, creating one (and its cookie) when
    /// the cookie is missing or the session expired.
    pub fn identify(&self, jar: CookieJar) -> (CookieJar, String) {
        let mut sessions = self.lock();
        let ttl = self.ttl;
        sessions.retain(|_, s| s.busy || s.last_seen.elapsed() < ttl);

        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            if let Some(session) = sessions.get_mut(cookie.value()) {
                session.last_seen = Instant::now();
                let id = cookie.value().to_string();
                return (jar, id);
            }
        }

        let id = Uuid::new_v4().to_string();
        sessions.insert(id.clone(), Session::new());
        debug!("new session {}", id);

        let mut cookie = Cookie::new(SESSION_COOKIE, id.clone());
        cookie.set_path("/");
        cookie.set_http_only(true);
        (jar.add(cookie), id)
    }

    /// Run `f` on the session `id`, recreating it if it vanished meanwhile.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.lock();
        let session = sessions.entry(id.to_string()).or_insert_with(Session::new);
        f(session)
    }

    /// Mark the session busy for the lifetime of the returned guard.
    pub fn begin_run(self: &Arc<Self>, id: &str) -> Result<RunGuard, BatchError> {
        self.with(id, |session| {
            if session.busy {
                return Err(BatchError::Busy);
            }
            session.busy = true;
            session.progress = None;
            Ok(())
        })?;
        Ok(RunGuard {
            store: Arc::clone(self),
            id: id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Clears the session's busy flag when the run ends, however it ends.
pub struct RunGuard {
    store: Arc<SessionStore>,
    id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.store.with(&self.id, |session| session.busy = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_run_per_session() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let (_, id) = store.identify(CookieJar::new());

        let guard = store.begin_run(&id).unwrap();
        assert!(matches!(store.begin_run(&id), Err(BatchError::Busy)));
        drop(guard);
        assert!(store.begin_run(&id).is_ok());
    }

    #[test]
    fn cookie_round_trip_keeps_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (jar, id) = store.identify(CookieJar::new());
        assert_eq!(jar.get(SESSION_COOKIE).map(|c| c.value().to_string()), Some(id.clone()));

        store.with(&id, |s| s.set_template(DocumentKind::Fiche, "x".to_string()));
        let (_, again) = store.identify(jar);
        assert_eq!(again, id);
        assert_eq!(store.with(&id, |s| s.template(DocumentKind::Fiche)), "x");
        assert_eq!(
            store.with(&id, |s| s.template(DocumentKind::Convocation)),
            DocumentKind::Convocation.default_template()
        );
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let (jar, first) = store.identify(CookieJar::new());
        let (_, second) = store.identify(jar);
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
    }
}
