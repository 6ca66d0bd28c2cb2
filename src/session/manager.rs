use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sonic_rs::Value;
use uuid::Uuid;

use super::record::{Flash, FlashKind, FormReplay, SessionRecord, UserRef};
use crate::error::{AppError, Result};
use crate::kv::KvStore;
use crate::signer::Signer;

/// KV TTL for sessions created by bot traffic.
pub const BOT_TTL_SECS: u64 = 5;
/// Default KV TTL for anonymous human sessions (1 day).
pub const LOGGED_OUT_TTL_SECS: u64 = 86_400;
/// Default KV TTL for authenticated sessions (2 days).
pub const LOGGED_IN_TTL_SECS: u64 = 2 * 86_400;

const KEY_PREFIX: &str = "session:";

/// TTL durations re-evaluated on every persist.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub logged_out_secs: u64,
    pub logged_in_secs: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            logged_out_secs: LOGGED_OUT_TTL_SECS,
            logged_in_secs: LOGGED_IN_TTL_SECS,
        }
    }
}

impl TtlPolicy {
    /// Bot sessions stay short-lived regardless of authentication state.
    fn ttl_for(&self, record: &SessionRecord) -> u64 {
        if record.is_bot {
            BOT_TTL_SECS
        } else if record.user.is_some() {
            self.logged_in_secs
        } else {
            self.logged_out_secs
        }
    }
}

/// Opaque handle over one server-side session record.
///
/// Instances only come out of [`SessionManager::create`] and
/// [`SessionManager::get`]; the record inside is not constructible or
/// mutable from outside this module.
#[derive(Debug, Clone)]
pub struct Session {
    record: SessionRecord,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// The cookie value: `"<id>.<signature>"`.
    pub fn signed_id(&self) -> String {
        format!("{}.{}", self.record.id, self.record.signature)
    }

    /// Unix timestamp (seconds) at which the record expires.
    pub fn expiry(&self) -> i64 {
        self.record.expiry
    }

    pub fn is_bot(&self) -> bool {
        self.record.is_bot
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.record.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.record.user.is_some()
    }

    /// Free-form extra attached under `key`, if any.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.record.extras.as_ref()?.get(key)
    }

    fn kv_key(&self) -> String {
        format!("{}{}", KEY_PREFIX, self.record.id)
    }
}

/// Creates, loads, verifies, mutates, persists, rotates, and invalidates
/// session records through the configured KV backend.
#[derive(Clone)]
pub struct SessionManager {
    kv: Arc<dyn KvStore>,
    signer: Arc<Signer>,
    policy: TtlPolicy,
}

impl SessionManager {
    pub fn new(kv: Arc<dyn KvStore>, signer: Signer, policy: TtlPolicy) -> Self {
        Self {
            kv,
            signer: Arc::new(signer),
            policy,
        }
    }

    /// Resolves a presented `"<id>.<signature>"` token.
    ///
    /// Every failure mode (missing separator, bad signature, absent key,
    /// malformed payload, stale expiry mirror) comes back as `Ok(None)`,
    /// indistinguishable from a session that never existed. KV transport
    /// failures are the only errors.
    pub async fn get(&self, signed_id: &str) -> Result<Option<Session>> {
        let Some((id, signature)) = signed_id.split_once('.') else {
            tracing::debug!("session token has no signature separator");
            return Ok(None);
        };
        if !self.signer.verify(id, signature) {
            tracing::debug!("session token failed signature check");
            return Ok(None);
        }

        let key = format!("{}{}", KEY_PREFIX, id);
        let Some(payload) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        let record: SessionRecord = match sonic_rs::from_str(&payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("discarding malformed session payload: {}", e);
                return Ok(None);
            }
        };

        // The stored copy must agree with the presented token and carry a
        // valid signature of its own.
        if record.id != id || !self.signer.verify(&record.id, &record.signature) {
            tracing::warn!("discarding session record with mismatched identity");
            return Ok(None);
        }

        // Honor the expiry mirror even if the store has not evicted the
        // key yet.
        if record.expiry <= Utc::now().timestamp() {
            if let Err(e) = self.kv.delete(&key).await {
                tracing::warn!("failed to evict stale session {}: {}", record.id, e);
            }
            return Ok(None);
        }

        Ok(Some(Session { record }))
    }

    /// Creates, signs, and persists a fresh anonymous session.
    pub async fn create(&self, is_bot: bool) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let signature = self.signer.sign(&id);
        let mut session = Session {
            record: SessionRecord::new(id, signature, is_bot),
        };
        self.save(&mut session).await?;
        tracing::debug!("🔑 Created session {} (bot: {})", session.id(), is_bot);
        Ok(session)
    }

    /// Persists the record, re-arming the KV TTL.
    ///
    /// The TTL is selected by policy from the record's current state, and
    /// the expiry mirror is rewritten in the same operation so record and
    /// store never disagree. A record whose signature does not verify is
    /// refused outright: that is a programming error, not a user-facing
    /// session miss.
    pub async fn save(&self, session: &mut Session) -> Result<()> {
        let record = &mut session.record;
        if !self.signer.verify(&record.id, &record.signature) {
            return Err(AppError::Internal(
                "Refusing to persist a session whose signature does not verify".to_string(),
            ));
        }

        let ttl = self.policy.ttl_for(record);
        record.expiry = Utc::now().timestamp() + ttl as i64;

        let payload = sonic_rs::to_string(record)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;
        self.kv.set(&session.kv_key(), &payload, Some(ttl)).await
    }

    /// Recomputes the expiry from the current authentication state and
    /// re-arms the KV TTL. The edge middleware calls this at most once per
    /// human page view.
    pub async fn extend_validity(&self, session: &mut Session) -> Result<()> {
        self.save(session).await
    }

    /// Rotation on login: the old record is deleted and a brand-new id is
    /// issued with `user` attached, carrying over pending flash messages
    /// and extras. The caller must re-issue the cookie.
    pub async fn rotate_for_user(&self, session: Session, user: UserRef) -> Result<Session> {
        let rotated = self.rotate(session, Some(user)).await?;
        tracing::info!("🔄 Session rotated for login: {}", rotated.id());
        Ok(rotated)
    }

    /// Rotation on logout: like [`Self::rotate_for_user`] but the new
    /// record is anonymous. The caller must re-issue the cookie.
    pub async fn invalidate(&self, session: Session) -> Result<Session> {
        let rotated = self.rotate(session, None).await?;
        tracing::info!("🔄 Session rotated for logout: {}", rotated.id());
        Ok(rotated)
    }

    async fn rotate(&self, old: Session, user: Option<UserRef>) -> Result<Session> {
        self.kv.delete(&old.kv_key()).await?;

        let id = Uuid::new_v4().to_string();
        let signature = self.signer.sign(&id);
        let mut session = Session {
            record: SessionRecord {
                id,
                signature,
                expiry: 0,
                is_bot: old.record.is_bot,
                user,
                flash_messages: old.record.flash_messages,
                form_data: None,
                extras: old.record.extras,
            },
        };
        self.save(&mut session).await?;
        Ok(session)
    }

    /// Queues a flash message. A second message of the same kind replaces
    /// the pending one.
    pub async fn add_flash(
        &self,
        session: &mut Session,
        kind: FlashKind,
        message: impl Into<String>,
    ) -> Result<()> {
        session
            .record
            .flash_messages
            .get_or_insert_with(HashMap::new)
            .insert(kind, message.into());
        self.save(session).await
    }

    /// Drains pending flash messages: read, clear, persist, return.
    /// An immediate second call comes back empty.
    pub async fn take_flashes(&self, session: &mut Session) -> Result<Vec<Flash>> {
        let Some(pending) = session.record.flash_messages.take() else {
            return Ok(Vec::new());
        };
        self.save(session).await?;
        Ok(pending
            .into_iter()
            .map(|(kind, message)| Flash { kind, message })
            .collect())
    }

    /// Replaces the form-replay payload wholesale.
    pub async fn put_form_data(&self, session: &mut Session, form: FormReplay) -> Result<()> {
        session.record.form_data = Some(form);
        self.save(session).await
    }

    /// Drains the form-replay payload: read, clear, persist, return.
    /// An immediate second call returns `None`.
    pub async fn take_form_data(&self, session: &mut Session) -> Result<Option<FormReplay>> {
        let Some(form) = session.record.form_data.take() else {
            return Ok(None);
        };
        self.save(session).await?;
        Ok(Some(form))
    }

    /// Escape hatch for arbitrary additional state. Extras survive
    /// rotation and are not read-once.
    pub async fn put_extra(
        &self,
        session: &mut Session,
        key: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        session
            .record
            .extras
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self.save(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKvStore;

    fn manager() -> SessionManager {
        manager_with_kv(Arc::new(MemoryKvStore::new()))
    }

    fn manager_with_kv(kv: Arc<dyn KvStore>) -> SessionManager {
        SessionManager::new(kv, Signer::new(&[7u8; 32]).unwrap(), TtlPolicy::default())
    }

    fn assert_expiry_close(session: &Session, ttl: u64) {
        let delta = session.expiry() - Utc::now().timestamp();
        assert!(
            (delta - ttl as i64).abs() <= 2,
            "expiry delta {} not close to ttl {}",
            delta,
            ttl
        );
    }

    #[test]
    fn ttl_policy_table() {
        let policy = TtlPolicy::default();
        let user = Some(UserRef { id: "u-1".into() });
        for (is_bot, user, expected) in [
            (true, None, BOT_TTL_SECS),
            (true, user.clone(), BOT_TTL_SECS),
            (false, user, LOGGED_IN_TTL_SECS),
            (false, None, LOGGED_OUT_TTL_SECS),
        ] {
            let mut record = SessionRecord::new("id".into(), "sig".into(), is_bot);
            record.user = user;
            assert_eq!(policy.ttl_for(&record), expected);
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let m = manager();
        let session = m.create(false).await.unwrap();
        let loaded = m.get(&session.signed_id()).await.unwrap().unwrap();
        assert_eq!(loaded.id(), session.id());
        assert!(!loaded.is_authenticated());
        assert_expiry_close(&loaded, LOGGED_OUT_TTL_SECS);
    }

    #[tokio::test]
    async fn bot_session_gets_short_ttl() {
        let m = manager();
        let session = m.create(true).await.unwrap();
        assert!(session.is_bot());
        assert_expiry_close(&session, BOT_TTL_SECS);
    }

    #[tokio::test]
    async fn tampered_signature_reads_as_absent() {
        let m = manager();
        let session = m.create(false).await.unwrap();
        let signed = session.signed_id();

        let (id, sig) = signed.split_once('.').unwrap();
        let mut sig_bytes = sig.as_bytes().to_vec();
        sig_bytes[0] = if sig_bytes[0] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{}.{}", id, String::from_utf8(sig_bytes).unwrap());

        assert!(m.get(&tampered).await.unwrap().is_none());
        assert!(m.get("no-separator-here").await.unwrap().is_none());
        assert!(m.get("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_absent() {
        let kv = Arc::new(MemoryKvStore::new());
        let m = manager_with_kv(kv.clone());
        let session = m.create(false).await.unwrap();
        kv.set(&format!("session:{}", session.id()), "{not json", Some(60))
            .await
            .unwrap();
        assert!(m.get(&session.signed_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_expiry_mirror_reads_as_absent() {
        let kv = Arc::new(MemoryKvStore::new());
        let m = manager_with_kv(kv.clone());
        let session = m.create(false).await.unwrap();

        // Rewrite the stored record with an expiry in the past while the
        // store key itself is still live.
        let key = format!("session:{}", session.id());
        let payload = kv.get(&key).await.unwrap().unwrap();
        let stale = payload.replace(
            &format!("\"expiry\":{}", session.expiry()),
            "\"expiry\":1000",
        );
        kv.set(&key, &stale, Some(60)).await.unwrap();

        assert!(m.get(&session.signed_id()).await.unwrap().is_none());
        // The eviction also removed the key.
        assert!(kv.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extend_validity_rearms_expiry() {
        let kv = Arc::new(MemoryKvStore::new());
        let m = manager_with_kv(kv.clone());
        let session = m.create(false).await.unwrap();

        // Age the stored record so the re-arm is observable.
        let key = format!("session:{}", session.id());
        let aged = kv.get(&key).await.unwrap().unwrap().replace(
            &format!("\"expiry\":{}", session.expiry()),
            &format!("\"expiry\":{}", Utc::now().timestamp() + 60),
        );
        kv.set(&key, &aged, Some(60)).await.unwrap();

        let mut loaded = m.get(&session.signed_id()).await.unwrap().unwrap();
        m.extend_validity(&mut loaded).await.unwrap();
        assert_eq!(loaded.id(), session.id());
        assert_expiry_close(&loaded, LOGGED_OUT_TTL_SECS);
    }

    #[tokio::test]
    async fn rotation_changes_id_and_attaches_user() {
        let kv = Arc::new(MemoryKvStore::new());
        let m = manager_with_kv(kv.clone());
        let session = m.create(false).await.unwrap();
        let old_id = session.id().to_string();
        let old_key = format!("session:{}", old_id);

        let rotated = m
            .rotate_for_user(session, UserRef { id: "u-1".into() })
            .await
            .unwrap();

        assert_ne!(rotated.id(), old_id);
        assert_eq!(rotated.user().unwrap().id, "u-1");
        assert!(kv.get(&old_key).await.unwrap().is_none());
        assert_expiry_close(&rotated, LOGGED_IN_TTL_SECS);
    }

    #[tokio::test]
    async fn rotation_carries_flashes_and_extras_but_not_form_data() {
        let m = manager();
        let mut session = m.create(false).await.unwrap();
        m.add_flash(&mut session, FlashKind::Success, "queued before login")
            .await
            .unwrap();
        m.put_extra(&mut session, "theme", sonic_rs::json!("dark"))
            .await
            .unwrap();
        m.put_form_data(&mut session, FormReplay::default())
            .await
            .unwrap();

        let mut rotated = m
            .rotate_for_user(session, UserRef { id: "u-1".into() })
            .await
            .unwrap();

        assert_eq!(rotated.extra("theme"), Some(&sonic_rs::json!("dark")));
        assert!(m.take_form_data(&mut rotated).await.unwrap().is_none());
        let flashes = m.take_flashes(&mut rotated).await.unwrap();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].message, "queued before login");
    }

    #[tokio::test]
    async fn invalidate_drops_user_and_keeps_flashes() {
        let kv = Arc::new(MemoryKvStore::new());
        let m = manager_with_kv(kv.clone());
        let session = m.create(false).await.unwrap();
        let mut session = m
            .rotate_for_user(session, UserRef { id: "u-1".into() })
            .await
            .unwrap();
        m.add_flash(&mut session, FlashKind::Success, "Logged out")
            .await
            .unwrap();
        let authed_id = session.id().to_string();

        let mut anon = m.invalidate(session).await.unwrap();

        assert_ne!(anon.id(), authed_id);
        assert!(!anon.is_authenticated());
        assert!(
            kv.get(&format!("session:{}", authed_id))
                .await
                .unwrap()
                .is_none()
        );
        assert_expiry_close(&anon, LOGGED_OUT_TTL_SECS);
        let flashes = m.take_flashes(&mut anon).await.unwrap();
        assert_eq!(flashes[0].message, "Logged out");
    }

    #[tokio::test]
    async fn flashes_are_read_once() {
        let m = manager();
        let mut session = m.create(false).await.unwrap();
        m.add_flash(&mut session, FlashKind::Success, "saved")
            .await
            .unwrap();
        m.add_flash(&mut session, FlashKind::Error, "but also this")
            .await
            .unwrap();

        let flashes = m.take_flashes(&mut session).await.unwrap();
        assert_eq!(flashes.len(), 2);
        assert!(m.take_flashes(&mut session).await.unwrap().is_empty());

        // The cleared state was persisted, not just dropped in memory.
        let mut reloaded = m.get(&session.signed_id()).await.unwrap().unwrap();
        assert!(m.take_flashes(&mut reloaded).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_kind_flash_overwrites_pending_one() {
        let m = manager();
        let mut session = m.create(false).await.unwrap();
        m.add_flash(&mut session, FlashKind::Error, "first")
            .await
            .unwrap();
        m.add_flash(&mut session, FlashKind::Error, "second")
            .await
            .unwrap();

        let flashes = m.take_flashes(&mut session).await.unwrap();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].message, "second");
    }

    #[tokio::test]
    async fn form_data_is_read_once() {
        let m = manager();
        let mut session = m.create(false).await.unwrap();
        m.put_form_data(
            &mut session,
            FormReplay {
                data: Some(HashMap::from([(
                    "username".to_string(),
                    sonic_rs::json!("alice"),
                )])),
                errors: Some(HashMap::from([(
                    "password".to_string(),
                    vec!["too short".to_string()],
                )])),
            },
        )
        .await
        .unwrap();

        let form = m.take_form_data(&mut session).await.unwrap().unwrap();
        assert_eq!(form.errors.unwrap()["password"], vec!["too short"]);
        assert!(m.take_form_data(&mut session).await.unwrap().is_none());

        let mut reloaded = m.get(&session.signed_id()).await.unwrap().unwrap();
        assert!(m.take_form_data(&mut reloaded).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_refuses_unverifiable_record() {
        let m = manager();
        // A record signed under a different secret must be refused.
        let foreign = SessionManager::new(
            Arc::new(MemoryKvStore::new()),
            Signer::new(&[9u8; 32]).unwrap(),
            TtlPolicy::default(),
        );
        let mut session = foreign.create(false).await.unwrap();
        let err = m.save(&mut session).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
