//! Live, editable list of deeds for one partition.
//!
//! `DeedTable` keeps an in-memory copy of the rows a user owns in one
//! partition and reconciles it with the remote store:
//!
//! - an initial fetch on mount and whenever the signed-in user changes
//! - realtime insert/update/delete notifications, filtered by partition
//! - local edits, applied immediately and persisted after a quiet period
//!
//! Create, delete, and copy are optimistic and roll back when the store
//! rejects them. Late notifications for deleted ids are ignored, and a
//! notification never overwrites a field whose local edit is still unsent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::debounce::{Debouncer, WriteKey, WriteTarget};
use super::identity::resolve_user_id;
use super::lock;
use crate::constants::DEFAULT_DEBOUNCE;
use crate::deeds::{
    AuthProviderTrait, ChangeEvent, ChangeFeedTrait, CopyOutcome, Deed, DeedField, DeedPatch,
    DeedStoreTrait, Partition,
};
use crate::errors::{Error, Result, ValidationError};
use crate::notices::{Notice, NoticeSink};
use crate::templates::{render_preview, TemplateCatalog};

/// Settings for one table instance.
#[derive(Debug, Clone)]
pub struct DeedTableConfig {
    pub partition: Partition,
    pub debounce: Duration,
    pub templates: Arc<TemplateCatalog>,
}

impl DeedTableConfig {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            debounce: DEFAULT_DEBOUNCE,
            templates: Arc::new(TemplateCatalog::builtin()),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = Arc::new(templates);
        self
    }
}

/// Progress of the initial fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed,
}

struct TableState {
    user_id: Option<String>,
    /// Bumped on every (re)connect so results for a previous user are dropped.
    session: u64,
    status: LoadStatus,
    deeds: Vec<Deed>,
    tombstones: HashSet<String>,
    /// Rows that left the partition while edits to them were still unsent.
    departed: HashMap<String, Deed>,
}

impl TableState {
    fn position(&self, deed_id: &str) -> Option<usize> {
        self.deeds.iter().position(|d| d.id == deed_id)
    }
}

struct TableInner {
    config: DeedTableConfig,
    store: Arc<dyn DeedStoreTrait>,
    feed: Arc<dyn ChangeFeedTrait>,
    auth: Arc<dyn AuthProviderTrait>,
    notices: Arc<dyn NoticeSink>,
    state: Mutex<TableState>,
    writes: Debouncer<WriteKey>,
    snapshots: watch::Sender<Vec<Deed>>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

/// Record-list synchronizer for one (user, partition) pair.
pub struct DeedTable {
    inner: Arc<TableInner>,
    identity_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeedTable {
    pub fn new(
        config: DeedTableConfig,
        store: Arc<dyn DeedStoreTrait>,
        feed: Arc<dyn ChangeFeedTrait>,
        auth: Arc<dyn AuthProviderTrait>,
        notices: Arc<dyn NoticeSink>,
    ) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        let writes = Debouncer::new(config.debounce);
        Self {
            inner: Arc::new(TableInner {
                config,
                store,
                feed,
                auth,
                notices,
                state: Mutex::new(TableState {
                    user_id: None,
                    session: 0,
                    status: LoadStatus::Idle,
                    deeds: Vec::new(),
                    tombstones: HashSet::new(),
                    departed: HashMap::new(),
                }),
                writes,
                snapshots,
                feed_task: Mutex::new(None),
            }),
            identity_task: Mutex::new(None),
        }
    }

    /// Loads the current user's rows, opens the change feed, and starts
    /// following sign-in changes. Returns the load error, if any; the feed
    /// is opened either way.
    pub async fn mount(&self) -> Result<()> {
        let mut user_changes = self.inner.auth.watch_user_id();
        let user_id = resolve_user_id(user_changes.borrow_and_update().as_deref());
        let loaded = self.inner.connect(user_id).await;

        let weak = Arc::downgrade(&self.inner);
        let watcher = tokio::spawn(async move {
            while user_changes.changed().await.is_ok() {
                let next = resolve_user_id(user_changes.borrow_and_update().as_deref());
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.user_id().as_deref() == Some(next.as_str()) {
                    continue;
                }
                info!("[DeedTable] Signed-in user changed, reconnecting");
                // load errors were already surfaced as a notice
                let _ = inner.connect(next).await;
            }
        });
        if let Some(previous) = lock(&self.identity_task).replace(watcher) {
            previous.abort();
        }
        loaded
    }

    /// Stops following the feed and sign-in changes and persists any unsent
    /// edits immediately.
    pub async fn unmount(&self) {
        if let Some(watcher) = lock(&self.identity_task).take() {
            watcher.abort();
        }
        self.inner.disconnect_feed();
        let pending = self.inner.writes.len();
        if pending > 0 {
            debug!("[DeedTable] Flushing {} pending write(s) on unmount", pending);
        }
        self.inner.writes.flush_all().await;
        lock(&self.inner.state).status = LoadStatus::Idle;
    }

    /// Re-runs the fetch for the current user.
    pub async fn reload(&self) -> Result<()> {
        let (session, user_id) = {
            let mut state = lock(&self.inner.state);
            state.status = LoadStatus::Loading;
            (state.session, self.inner.active_user_id(&state))
        };
        self.inner.load(session, &user_id).await
    }

    pub fn partition(&self) -> &Partition {
        &self.inner.config.partition
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.inner.config.templates
    }

    pub fn status(&self) -> LoadStatus {
        lock(&self.inner.state).status
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.user_id()
    }

    /// Copy of the current list, in display order.
    pub fn deeds(&self) -> Vec<Deed> {
        lock(&self.inner.state).deeds.clone()
    }

    pub fn get(&self, deed_id: &str) -> Option<Deed> {
        let state = lock(&self.inner.state);
        state.position(deed_id).map(|pos| state.deeds[pos].clone())
    }

    /// Receiver updated after every change to the list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Deed>> {
        self.inner.snapshots.subscribe()
    }

    /// Number of edits not yet sent to the store.
    pub fn pending_writes(&self) -> usize {
        self.inner.writes.len()
    }

    /// Preview sentence for a row, or `None` if the id is unknown.
    pub fn preview(&self, deed_id: &str) -> Option<String> {
        self.get(deed_id)
            .map(|deed| render_preview(&deed, &self.inner.config.templates))
    }

    /// Appends a blank deed and inserts it remotely.
    pub async fn add_deed(&self) -> Result<Deed> {
        let inner = &self.inner;
        let (session, deed) = {
            let mut state = lock(&inner.state);
            let deed = Deed::blank(
                Uuid::new_v4().to_string(),
                inner.active_user_id(&state),
                inner.config.partition.as_str(),
                today(),
            );
            state.deeds.push(deed.clone());
            inner.publish(&state);
            (state.session, deed)
        };

        match inner.store.insert_deeds(vec![deed.clone()]).await {
            Ok(rows) => {
                inner.apply_for_session(session, rows.into_iter().map(ChangeEvent::Insert));
                info!("[DeedTable] Added deed {}", deed.id);
                inner.notices.notify(Notice::success("Deed added"));
                Ok(deed)
            }
            Err(e) => {
                error!("[DeedTable] Failed to add deed {}: {}", deed.id, e);
                inner.remove_ids(session, &[deed.id.as_str()]);
                inner
                    .notices
                    .notify(Notice::error(format!("Failed to add deed: {}", e)));
                Err(e)
            }
        }
    }

    /// Removes a deed locally and remotely. Restored if the store refuses.
    pub async fn delete_deed(&self, deed_id: &str) -> Result<()> {
        let inner = &self.inner;
        let (session, index, removed) = {
            let mut state = lock(&inner.state);
            let index = state
                .position(deed_id)
                .ok_or_else(|| Error::NotFound(deed_id.to_string()))?;
            let removed = state.deeds.remove(index);
            state.tombstones.insert(deed_id.to_string());
            inner.publish(&state);
            (state.session, index, removed)
        };
        let cancelled = inner.writes.cancel_where(|key| key.deed_id == deed_id);
        if cancelled > 0 {
            debug!(
                "[DeedTable] Dropped {} pending write(s) for deleted deed {}",
                cancelled, deed_id
            );
        }

        match inner.store.delete_deed(deed_id).await {
            Ok(()) => {
                info!("[DeedTable] Deleted deed {}", deed_id);
                inner.notices.notify(Notice::success("Deed deleted"));
                Ok(())
            }
            Err(e) => {
                error!("[DeedTable] Failed to delete deed {}: {}", deed_id, e);
                {
                    let mut state = lock(&inner.state);
                    // a different user's list is showing now
                    if state.session == session {
                        state.tombstones.remove(deed_id);
                        if state.position(deed_id).is_none() {
                            let at = index.min(state.deeds.len());
                            state.deeds.insert(at, removed);
                        }
                        inner.publish(&state);
                    }
                }
                inner
                    .notices
                    .notify(Notice::error(format!("Failed to delete deed: {}", e)));
                Err(e)
            }
        }
    }

    /// Sets a scalar field now and persists it after the quiet period.
    pub fn edit_field(&self, deed_id: &str, field: DeedField, value: &str) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            let index = state
                .position(deed_id)
                .ok_or_else(|| Error::NotFound(deed_id.to_string()))?;
            state.deeds[index].set_field(field, value)?;
            self.inner.publish(&state);
        }
        self.schedule_write(WriteKey::field(deed_id, field));
        Ok(())
    }

    /// Sets one extra field now; all extra-field edits on a deed share a
    /// single debounced write of the whole map.
    pub fn edit_extra_field(&self, deed_id: &str, key: &str, value: &str) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            let index = state
                .position(deed_id)
                .ok_or_else(|| Error::NotFound(deed_id.to_string()))?;
            let deed = &mut state.deeds[index];
            let allowed = deed.custom_fields.contains_key(key)
                || self
                    .inner
                    .config
                    .templates
                    .allows_extra_field(&deed.deed_type, key);
            if !allowed {
                return Err(ValidationError::ExtraFieldNotAllowed {
                    key: key.to_string(),
                    deed_type: deed.deed_type.clone(),
                }
                .into());
            }
            deed.custom_fields.insert(key, value);
            self.inner.publish(&state);
        }
        self.schedule_write(WriteKey::extra_fields(deed_id));
        Ok(())
    }

    /// Clones every deed of `source` into this table's partition.
    pub async fn copy_from(&self, source: &Partition) -> Result<CopyOutcome> {
        let inner = &self.inner;
        let destination = &inner.config.partition;
        if source == destination {
            return Err(ValidationError::InvalidInput(format!(
                "Cannot copy table '{}' onto itself",
                source
            ))
            .into());
        }

        let (session, user_id) = {
            let state = lock(&inner.state);
            (state.session, inner.active_user_id(&state))
        };
        let rows = match inner.store.list_deeds(&user_id, source).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[DeedTable] Failed to read deeds from '{}': {}", source, e);
                inner
                    .notices
                    .notify(Notice::error(format!("Failed to copy deeds: {}", e)));
                return Err(e);
            }
        };

        let copies: Vec<Deed> = rows
            .iter()
            .filter(|d| source.matches(d.table_type.as_deref()))
            .map(|d| {
                d.clone_into_partition(
                    Uuid::new_v4().to_string(),
                    &user_id,
                    destination.as_str(),
                )
            })
            .collect();
        if copies.is_empty() {
            info!("[DeedTable] No deeds in '{}' to copy", source);
            inner.notices.notify(Notice::info(format!(
                "No deeds found in '{}' to copy",
                source
            )));
            return Ok(CopyOutcome::SourceEmpty);
        }

        let count = copies.len();
        {
            let mut state = lock(&inner.state);
            if state.session != session {
                drop(state);
                warn!("[DeedTable] Signed-in user changed while copying from '{}'", source);
                inner.notices.notify(Notice::error(
                    "Copy cancelled: the signed-in user changed",
                ));
                return Err(ValidationError::InvalidInput(
                    "Signed-in user changed while copying".to_string(),
                )
                .into());
            }
            state.deeds.extend(copies.iter().cloned());
            inner.publish(&state);
        }

        match inner.store.insert_deeds(copies.clone()).await {
            Ok(rows) => {
                inner.apply_for_session(session, rows.into_iter().map(ChangeEvent::Insert));
                info!(
                    "[DeedTable] Copied {} deed(s) from '{}' to '{}'",
                    count, source, destination
                );
                inner.notices.notify(Notice::success(format!(
                    "Copied {} deed(s) from '{}'",
                    count, source
                )));
                Ok(CopyOutcome::Copied(count))
            }
            Err(e) => {
                error!("[DeedTable] Failed to insert copied deeds: {}", e);
                let ids: Vec<&str> = copies.iter().map(|d| d.id.as_str()).collect();
                inner.remove_ids(session, &ids);
                inner
                    .notices
                    .notify(Notice::error(format!("Failed to copy deeds: {}", e)));
                Err(e)
            }
        }
    }

    /// Applies a change notification as if it came from the feed.
    pub fn apply_change(&self, event: ChangeEvent) {
        self.inner.apply_change(event);
    }

    fn schedule_write(&self, key: WriteKey) {
        let weak: Weak<TableInner> = Arc::downgrade(&self.inner);
        let write_key = key.clone();
        self.inner.writes.schedule(key, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.persist(write_key).await;
            }
        });
    }
}

impl Drop for DeedTable {
    fn drop(&mut self) {
        if let Some(watcher) = lock(&self.identity_task).take() {
            watcher.abort();
        }
        self.inner.disconnect_feed();
    }
}

impl TableInner {
    fn user_id(&self) -> Option<String> {
        lock(&self.state).user_id.clone()
    }

    /// The user new rows are written under.
    fn active_user_id(&self, state: &TableState) -> String {
        state
            .user_id
            .clone()
            .unwrap_or_else(|| resolve_user_id(self.auth.current_user_id().as_deref()))
    }

    fn publish(&self, state: &TableState) {
        self.snapshots.send_replace(state.deeds.clone());
    }

    /// Merges rows returned by the store, unless the list has since been
    /// switched to another user.
    fn apply_for_session(&self, session: u64, events: impl IntoIterator<Item = ChangeEvent>) {
        let mut state = lock(&self.state);
        if state.session != session {
            debug!("[DeedTable] Dropping store result from stale session {}", session);
            return;
        }
        let mut changed = false;
        for event in events {
            changed |= self.merge(&mut state, event);
        }
        if changed {
            self.publish(&state);
        }
    }

    /// Rolls back optimistic rows, unless the list has since been switched to
    /// another user.
    fn remove_ids(&self, session: u64, ids: &[&str]) {
        let mut state = lock(&self.state);
        if state.session != session {
            return;
        }
        state.deeds.retain(|d| !ids.contains(&d.id.as_str()));
        self.publish(&state);
    }

    /// Tears down the feed, then fetches and subscribes for `user_id`.
    async fn connect(self: &Arc<Self>, user_id: String) -> Result<()> {
        self.disconnect_feed();
        if !self.writes.is_empty() {
            warn!(
                "[DeedTable] Flushing {} unsent write(s) before switching user",
                self.writes.len()
            );
            self.writes.flush_all().await;
        }

        let session = {
            let mut state = lock(&self.state);
            state.session += 1;
            state.user_id = Some(user_id.clone());
            state.status = LoadStatus::Loading;
            state.deeds.clear();
            state.tombstones.clear();
            state.departed.clear();
            self.publish(&state);
            state.session
        };

        let loaded = self.load(session, &user_id).await;
        self.subscribe(session, &user_id).await;
        loaded
    }

    async fn load(&self, session: u64, user_id: &str) -> Result<()> {
        let partition = &self.config.partition;
        debug!(
            "[DeedTable] Loading deeds for partition '{}' (session {})",
            partition, session
        );
        let result = self.store.list_deeds(user_id, partition).await;

        let mut state = lock(&self.state);
        if state.session != session {
            debug!("[DeedTable] Discarding load result from stale session {}", session);
            return Ok(());
        }

        match result {
            Ok(rows) => {
                let pending = self.writes.pending_keys();
                let mut seen = HashSet::new();
                let mut deeds = Vec::with_capacity(rows.len());
                for mut row in rows {
                    if !partition.matches(row.table_type.as_deref())
                        || state.tombstones.contains(&row.id)
                        || !seen.insert(row.id.clone())
                    {
                        continue;
                    }
                    if let Some(local) = state.position(&row.id).map(|i| &state.deeds[i]) {
                        keep_pending_edits(&mut row, local, &pending);
                    }
                    deeds.push(row);
                }
                info!(
                    "[DeedTable] Loaded {} deed(s) for partition '{}'",
                    deeds.len(),
                    partition
                );
                state.deeds = deeds;
                state.status = LoadStatus::Loaded;
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                error!("[DeedTable] Failed to load deeds: {}", e);
                state.deeds.clear();
                state.status = LoadStatus::Failed;
                self.publish(&state);
                drop(state);
                self.notices
                    .notify(Notice::error(format!("Failed to load deeds: {}", e)));
                Err(e)
            }
        }
    }

    async fn subscribe(self: &Arc<Self>, session: u64, user_id: &str) {
        let channel = self.config.partition.channel_name();
        let mut subscription = match self.feed.subscribe(&channel, user_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("[DeedTable] Failed to subscribe to '{}': {}", channel, e);
                self.notices
                    .notify(Notice::error(format!("Live updates unavailable: {}", e)));
                return;
            }
        };
        if lock(&self.state).session != session {
            // dropping the subscription leaves the channel
            return;
        }

        let weak = Arc::downgrade(self);
        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.apply_change(event);
            }
            // teardown aborts this task, so reaching here means the feed died
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if lock(&inner.state).session == session {
                warn!("[DeedTable] Change feed '{}' closed unexpectedly", task_channel);
                inner
                    .notices
                    .notify(Notice::error("Live updates disconnected"));
            }
        });
        if let Some(previous) = lock(&self.feed_task).replace(task) {
            previous.abort();
        }
        debug!("[DeedTable] Subscribed to '{}'", channel);
    }

    fn disconnect_feed(&self) {
        if let Some(task) = lock(&self.feed_task).take() {
            task.abort();
        }
    }

    fn apply_change(&self, event: ChangeEvent) {
        let mut state = lock(&self.state);
        if self.merge(&mut state, event) {
            self.publish(&state);
        }
    }

    /// Applies one change to the list. Returns whether anything changed.
    fn merge(&self, state: &mut TableState, event: ChangeEvent) -> bool {
        let partition = &self.config.partition;

        if !matches!(event, ChangeEvent::Delete { .. })
            && state.tombstones.contains(event.deed_id())
        {
            debug!(
                "[DeedTable] Ignoring late {} for deleted deed {}",
                event.kind(),
                event.deed_id()
            );
            return false;
        }

        match event {
            ChangeEvent::Insert(mut deed) => {
                if !partition.matches(deed.table_type.as_deref()) {
                    return false;
                }
                match state.position(&deed.id) {
                    Some(index) => {
                        let pending = self.writes.pending_keys();
                        keep_pending_edits(&mut deed, &state.deeds[index], &pending);
                        state.deeds[index] = deed;
                    }
                    None => state.deeds.push(deed),
                }
            }
            ChangeEvent::Update(mut deed) => {
                let pending = self.writes.pending_keys();
                if let Some(index) = state.position(&deed.id) {
                    keep_pending_edits(&mut deed, &state.deeds[index], &pending);
                    if partition.matches(deed.table_type.as_deref()) {
                        state.deeds[index] = deed;
                    } else {
                        state.deeds.remove(index);
                        if pending.iter().any(|key| key.deed_id == deed.id) {
                            debug!(
                                "[DeedTable] Deed {} left partition '{}' with unsent edits",
                                deed.id, partition
                            );
                            state.departed.insert(deed.id.clone(), deed);
                        }
                    }
                } else if let Some(departed) = state.departed.get_mut(&deed.id) {
                    keep_pending_edits(&mut deed, departed, &pending);
                    *departed = deed;
                }
                state
                    .deeds
                    .retain(|d| partition.matches(d.table_type.as_deref()));
            }
            ChangeEvent::Delete { id } => {
                state.deeds.retain(|d| d.id != id);
                state.departed.remove(&id);
                state.tombstones.insert(id.clone());
                self.writes.cancel_where(|key| key.deed_id == id);
            }
        }
        true
    }

    /// Sends the latest local value for `key`.
    async fn persist(&self, key: WriteKey) {
        let patch = {
            let mut state = lock(&self.state);
            let (deed, departed) = match state.position(&key.deed_id) {
                Some(index) => (&state.deeds[index], false),
                None => match state.departed.get(&key.deed_id) {
                    Some(deed) => (deed, true),
                    None if state.tombstones.contains(&key.deed_id) => {
                        debug!("[DeedTable] Skipping write for deleted deed {}", key.deed_id);
                        return;
                    }
                    None => {
                        warn!(
                            "[DeedTable] Dropping unsent edit for deed {} no longer in view",
                            key.deed_id
                        );
                        return;
                    }
                },
            };
            let patch = match key.target {
                WriteTarget::Field(field) => DeedPatch::Field {
                    field,
                    value: deed.field(field),
                },
                WriteTarget::ExtraFields => DeedPatch::ExtraFields(deed.custom_fields.clone()),
            };
            let last_pending = !self
                .writes
                .pending_keys()
                .iter()
                .any(|pending| pending.deed_id == key.deed_id);
            if departed && last_pending {
                state.departed.remove(&key.deed_id);
            }
            patch
        };

        let what = match key.target {
            WriteTarget::Field(field) => field.column(),
            WriteTarget::ExtraFields => "custom_fields",
        };
        match self.store.update_deed(&key.deed_id, patch).await {
            Ok(()) => debug!("[DeedTable] Saved {} of deed {}", what, key.deed_id),
            Err(e) => {
                error!(
                    "[DeedTable] Failed to save {} of deed {}: {}",
                    what, key.deed_id, e
                );
                self.notices
                    .notify(Notice::error(format!("Failed to save {}: {}", what, e)));
            }
        }
    }
}

/// Carries unsent local values from `local` over a row coming from the store.
fn keep_pending_edits(incoming: &mut Deed, local: &Deed, pending: &[WriteKey]) {
    let deed_id = incoming.id.clone();
    for key in pending.iter().filter(|key| key.deed_id == deed_id) {
        match key.target {
            WriteTarget::Field(field) => incoming.copy_field_from(local, field),
            WriteTarget::ExtraFields => incoming.custom_fields = local.custom_fields.clone(),
        }
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
