//! Aligns the live mirrors of a message with what its reactions currently ask for.

use super::{
    decision::decide,
    messenger::{DeleteOutcome, Messenger},
    score::{extract, ScoreSpec},
    store::{Adoption, MirrorDocument, MirrorStore},
};
use crate::{document_store::SharedDocument, log_error, log_internal};
use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, MessageId};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{Mutex, MutexGuard};

/// Default upper bound on any single call to the chat platform.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What one reconciliation did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<ChannelId>,
    pub deleted: Vec<ChannelId>,
    /// Targets left out of line with the wanted set; retried on the next event.
    pub failed: Vec<ChannelId>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.deleted.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct BacklogReport {
    pub adopted: usize,
    /// Surplus mirrors of a target that already had one
    pub duplicates_removed: usize,
    pub reconciled: usize,
    pub failed_messages: usize,
    pub skipped_channels: Vec<ChannelId>,
}

/// Owns the mirror store and applies reconciliations against a [`Messenger`].
pub struct Reconciler<M> {
    messenger: M,
    store: Mutex<MirrorStore>,
    /// One lock per source message currently being reconciled
    locks: Mutex<HashMap<MessageId, Arc<Mutex<()>>>>,
    timeout: Duration,
    persistence: Option<SharedDocument>,
}

impl<M: Messenger> Reconciler<M> {
    pub fn new(messenger: M, timeout: Duration) -> Self {
        Self {
            messenger,
            store: Mutex::new(MirrorStore::new()),
            locks: Mutex::new(HashMap::new()),
            timeout,
            persistence: None,
        }
    }

    /// Keep a copy of the store in `doc`, written after every change.
    pub fn with_persistence(mut self, doc: SharedDocument) -> Self {
        self.persistence = Some(doc);
        self
    }

    #[cfg(test)]
    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    /// Read access to the store, e.g. for status output.  Don't hold across awaits.
    pub async fn store(&self) -> MutexGuard<'_, MirrorStore> {
        self.store.lock().await
    }

    /// Load previously persisted mirrors.  Returns how many mirrors were added.
    pub async fn restore(&self) -> Result<usize> {
        let Some(doc) = &self.persistence else {
            return Ok(0);
        };

        let saved: MirrorDocument = doc.read().await?;
        let mut store = self.store.lock().await;
        let mut adopted = 0;
        for (source_id, record) in saved.mirrors {
            for (target, mirror_id) in record {
                if store.adopt(source_id, target, mirror_id) == Adoption::Added {
                    adopted += 1;
                }
            }
        }

        log_internal!("Restored {} mirror(s) from {}", adopted, doc.describe());
        Ok(adopted)
    }

    /// Bring the mirrors of one source message in line with its current reactions.
    ///
    /// Only fails if the source message could not be fetched.  Failures on individual targets
    /// are logged and reported, and leave the store describing what actually exists.
    pub async fn reconcile(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        spec: &ScoreSpec,
        min_threshold: u64,
    ) -> Result<ReconcileReport> {
        let lock = self.lock_for(message_id).await;
        let guard = lock.lock().await;
        let result = self
            .reconcile_locked(channel_id, message_id, spec, min_threshold)
            .await;
        if matches!(&result, Ok(report) if report.changed()) {
            self.persist(message_id).await;
        }
        drop(guard);
        self.release(message_id, lock).await;

        result
    }

    async fn reconcile_locked(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        spec: &ScoreSpec,
        min_threshold: u64,
    ) -> Result<ReconcileReport> {
        let source = self
            .timed(
                "Fetching message",
                self.messenger.fetch_message(channel_id, message_id),
            )
            .await?;

        // A deleted source wants nothing.
        let wanted = match &source {
            Some(source) => {
                let scores = extract(&source.reactions, spec);
                spec.targets_for(&decide(&scores, min_threshold))
            }
            None => BTreeSet::new(),
        };
        let current: BTreeSet<ChannelId> = self
            .store
            .lock()
            .await
            .targets_of(message_id)
            .into_iter()
            .collect();

        let mut report = ReconcileReport::default();

        for &target in current.difference(&wanted) {
            let mirror_id = self
                .store
                .lock()
                .await
                .get(message_id)
                .and_then(|record| record.get(&target).copied());
            let Some(mirror_id) = mirror_id else {
                continue;
            };

            let outcome = self.timed_delete(target, mirror_id).await;
            if outcome.is_success() {
                self.store.lock().await.remove(message_id, target);
                report.deleted.push(target);
            } else {
                log_error!(
                    "Could not delete mirror {} of {} in {}: {:?}",
                    mirror_id,
                    message_id,
                    target,
                    outcome
                );
                report.failed.push(target);
            }
        }

        if let Some(source) = &source {
            for &target in wanted.difference(&current) {
                match self
                    .timed("Sending mirror", self.messenger.send_mirror(target, source))
                    .await
                {
                    Ok(mirror_id) => {
                        let put = self.store.lock().await.put(message_id, target, mirror_id);
                        match put {
                            Ok(()) => report.created.push(target),
                            Err(recorded) => {
                                log_error!(
                                    "Mirror {} of {} in {} is already recorded, dropping new {}",
                                    recorded,
                                    message_id,
                                    target,
                                    mirror_id
                                );
                                self.delete_untracked(target, mirror_id).await;
                            }
                        }
                    }
                    Err(e) => {
                        log_error!("Could not mirror {} into {}: {}", message_id, target, e);
                        report.failed.push(target);
                    }
                }
            }
        }

        if report.changed() {
            log_internal!(
                "Reconciled {}: created in {:?}, deleted from {:?}",
                message_id,
                report.created.iter().map(|c| c.get()).collect::<Vec<_>>(),
                report.deleted.iter().map(|c| c.get()).collect::<Vec<_>>(),
            );
        }

        Ok(report)
    }

    /// Rebuild the store after a restart.
    ///
    /// First adopts mirrors already posted in the target channels, so they aren't posted again,
    /// then reconciles the most recent `limit` messages of every watched channel.  Unreachable
    /// channels are skipped.
    pub async fn scan_backlog(
        &self,
        watched: &[ChannelId],
        spec: &ScoreSpec,
        min_threshold: u64,
        limit: u8,
    ) -> BacklogReport {
        let mut report = BacklogReport::default();

        let mut found: BTreeMap<MessageId, Vec<(ChannelId, MessageId)>> = BTreeMap::new();
        for target in spec.all_targets() {
            match self
                .timed(
                    "Listing mirrors",
                    self.messenger.recent_mirrors(target, limit),
                )
                .await
            {
                Ok(mirrors) => {
                    for mirror in mirrors {
                        found
                            .entry(mirror.source_id)
                            .or_default()
                            .push((target, mirror.mirror_id));
                    }
                }
                Err(e) => {
                    log_error!("Skipping target channel {} in backlog scan: {}", target, e);
                    report.skipped_channels.push(target);
                }
            }
        }

        for (source_id, mirrors) in found {
            let (adopted, removed) = self.adopt_mirrors(source_id, &mirrors).await;
            report.adopted += adopted;
            report.duplicates_removed += removed;
        }

        for &channel_id in watched {
            let message_ids = match self
                .timed(
                    "Listing messages",
                    self.messenger.recent_messages(channel_id, limit),
                )
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    log_error!("Skipping channel {} in backlog scan: {}", channel_id, e);
                    report.skipped_channels.push(channel_id);
                    continue;
                }
            };

            // Newest first; mirror oldest first.
            for message_id in message_ids.into_iter().rev() {
                match self
                    .reconcile(channel_id, message_id, spec, min_threshold)
                    .await
                {
                    Ok(_) => report.reconciled += 1,
                    Err(e) => {
                        log_error!("Backlog reconcile of {} failed: {}", message_id, e);
                        report.failed_messages += 1;
                    }
                }
            }
        }

        report
    }

    /// Record mirrors of `source_id` found on Discord, holding the same lock as [`Self::reconcile`].
    /// Returns how many were adopted and how many surplus ones were deleted.
    async fn adopt_mirrors(
        &self,
        source_id: MessageId,
        found: &[(ChannelId, MessageId)],
    ) -> (usize, usize) {
        let lock = self.lock_for(source_id).await;
        let guard = lock.lock().await;

        let (mut adopted, mut removed) = (0, 0);
        for &(target, mirror_id) in found {
            let adoption = self.store.lock().await.adopt(source_id, target, mirror_id);
            match adoption {
                Adoption::Added => adopted += 1,
                Adoption::Known => {}
                Adoption::Duplicate { recorded } => {
                    log_internal!(
                        "Mirror {} of {} in {} duplicates {}, deleting it",
                        mirror_id,
                        source_id,
                        target,
                        recorded
                    );
                    if self.delete_untracked(target, mirror_id).await {
                        removed += 1;
                    }
                }
            }
        }
        if adopted > 0 {
            self.persist(source_id).await;
        }

        drop(guard);
        self.release(source_id, lock).await;
        (adopted, removed)
    }

    /// Delete a mirror the store doesn't point at.  Returns whether it is gone.
    async fn delete_untracked(&self, channel_id: ChannelId, message_id: MessageId) -> bool {
        let outcome = self.timed_delete(channel_id, message_id).await;
        if !outcome.is_success() {
            log_error!(
                "Could not delete surplus mirror {} in {}: {:?}",
                message_id,
                channel_id,
                outcome
            );
        }
        outcome.is_success()
    }

    async fn timed_delete(&self, channel_id: ChannelId, message_id: MessageId) -> DeleteOutcome {
        tokio::time::timeout(self.timeout, self.messenger.delete_message(channel_id, message_id))
            .await
            .unwrap_or_else(|_| DeleteOutcome::Failed(format!("timed out after {:?}", self.timeout)))
    }

    async fn timed<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", what, self.timeout))?
    }

    async fn lock_for(&self, message_id: MessageId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(message_id)
            .or_default()
            .clone()
    }

    async fn release(&self, message_id: MessageId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Ours plus the table's: nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&message_id);
        }
    }

    async fn persist(&self, message_id: MessageId) {
        let Some(doc) = &self.persistence else {
            return;
        };

        let record = self
            .store
            .lock()
            .await
            .get(message_id)
            .cloned()
            .unwrap_or_default();

        let result = doc
            .update(|saved: &mut MirrorDocument| {
                if record.is_empty() {
                    saved.mirrors.remove(&message_id);
                } else {
                    saved.mirrors.insert(message_id, record);
                }
            })
            .await;

        if let Err(e) = result {
            log_error!("Could not persist mirrors of {}: {}", message_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::FileStore;
    use crate::mirror::{
        messenger::{MirrorRef, SourceMessage},
        reaction::ReactionKind,
        score::tests::spec,
    };
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeState {
        messages: HashMap<MessageId, SourceMessage>,
        next_id: u64,
        /// (target, mirror id) of every successful send
        sent: Vec<(ChannelId, MessageId)>,
        /// (channel, message id) of every delete call
        delete_calls: Vec<(ChannelId, MessageId)>,
        fail_send_to: HashSet<ChannelId>,
        fail_delete: bool,
        /// Mirrors somebody already deleted by hand
        already_gone: HashSet<MessageId>,
        unreachable: HashSet<ChannelId>,
        posted_mirrors: HashMap<ChannelId, Vec<MirrorRef>>,
        send_delay: Option<Duration>,
    }

    #[derive(Default)]
    struct FakeMessenger(StdMutex<FakeState>);

    impl FakeMessenger {
        fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
            f(&mut self.0.lock().unwrap())
        }

        fn set_scores(&self, id: MessageId, channel_id: ChannelId, scores: [u64; 3]) {
            let spec = spec();
            let reactions = spec
                .scored
                .iter()
                .zip(scores)
                .map(|(scored, count)| (scored.reaction.clone(), count))
                .collect();
            let msg = SourceMessage {
                id,
                channel_id,
                author_name: "poster".to_owned(),
                author_avatar: None,
                content: "look at this".to_owned(),
                link: format!("https://discord.com/channels/1/{}/{}", channel_id, id),
                image_url: Some("https://cdn.example/cat.png".to_owned()),
                timestamp: None,
                reactions,
            };
            self.with(|s| s.messages.insert(id, msg));
        }

        fn sent_count(&self) -> usize {
            self.with(|s| s.sent.len())
        }

        fn delete_count(&self) -> usize {
            self.with(|s| s.delete_calls.len())
        }
    }

    #[serenity::async_trait]
    impl Messenger for FakeMessenger {
        async fn fetch_message(
            &self,
            channel_id: ChannelId,
            message_id: MessageId,
        ) -> Result<Option<SourceMessage>> {
            self.with(|s| {
                if s.unreachable.contains(&channel_id) {
                    return Err(anyhow!("missing access"));
                }
                Ok(s.messages.get(&message_id).cloned())
            })
        }

        async fn recent_messages(
            &self,
            channel_id: ChannelId,
            limit: u8,
        ) -> Result<Vec<MessageId>> {
            self.with(|s| {
                if s.unreachable.contains(&channel_id) {
                    return Err(anyhow!("missing access"));
                }
                let mut ids: Vec<MessageId> = s
                    .messages
                    .values()
                    .filter(|m| m.channel_id == channel_id)
                    .map(|m| m.id)
                    .collect();
                ids.sort();
                ids.reverse();
                ids.truncate(limit as usize);
                Ok(ids)
            })
        }

        async fn send_mirror(&self, target: ChannelId, _source: &SourceMessage) -> Result<MessageId> {
            if let Some(delay) = self.with(|s| s.send_delay) {
                tokio::time::sleep(delay).await;
            }
            self.with(|s| {
                if s.fail_send_to.contains(&target) {
                    return Err(anyhow!("rate limited"));
                }
                s.next_id += 1;
                let id = MessageId::new(10_000 + s.next_id);
                s.sent.push((target, id));
                Ok(id)
            })
        }

        async fn delete_message(
            &self,
            channel_id: ChannelId,
            message_id: MessageId,
        ) -> DeleteOutcome {
            self.with(|s| {
                s.delete_calls.push((channel_id, message_id));
                if s.fail_delete {
                    DeleteOutcome::Failed("rate limited".to_owned())
                } else if s.already_gone.contains(&message_id) {
                    DeleteOutcome::AlreadyAbsent
                } else {
                    DeleteOutcome::Deleted
                }
            })
        }

        async fn recent_mirrors(&self, target: ChannelId, _limit: u8) -> Result<Vec<MirrorRef>> {
            self.with(|s| {
                if s.unreachable.contains(&target) {
                    return Err(anyhow!("missing access"));
                }
                Ok(s.posted_mirrors.get(&target).cloned().unwrap_or_default())
            })
        }
    }

    fn source_channel() -> ChannelId {
        ChannelId::new(5)
    }

    fn target(i: usize) -> ChannelId {
        spec().scored[i].target_channel.unwrap()
    }

    fn reconciler() -> Reconciler<FakeMessenger> {
        Reconciler::new(FakeMessenger::default(), DEFAULT_TIMEOUT)
    }

    async fn targets(r: &Reconciler<FakeMessenger>, id: MessageId) -> HashSet<ChannelId> {
        r.store().await.targets_of(id)
    }

    #[tokio::test]
    async fn scenario_growing_tie() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 1, 1]);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.created, vec![target(0)]);
        assert_eq!(r.messenger().sent_count(), 1);
        let first_mirror = r.store().await.get(msg).unwrap()[&target(0)];

        r.messenger().set_scores(msg, source_channel(), [2, 2, 1]);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.created, vec![target(1)]);
        assert!(report.deleted.is_empty());
        assert_eq!(r.messenger().sent_count(), 2);
        assert_eq!(r.messenger().delete_count(), 0);
        assert_eq!(r.store().await.get(msg).unwrap()[&target(0)], first_mirror);
    }

    #[tokio::test]
    async fn scenario_votes_vanish() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [3, 3, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(targets(&r, msg).await.len(), 2);

        r.messenger().set_scores(msg, source_channel(), [0, 0, 0]);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(r.messenger().delete_count(), 2);
        assert!(r.store().await.get(msg).is_none());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [4, 4, 4]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(r.messenger().sent_count(), 3);

        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(r.messenger().sent_count(), 3);
        assert_eq!(r.messenger().delete_count(), 0);
    }

    #[tokio::test]
    async fn converges_to_latest_scores() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        let sequence = [
            [2, 0, 0],
            [2, 3, 0],
            [4, 4, 4],
            [1, 1, 1],
            [0, 0, 5],
            [6, 0, 6],
        ];
        for scores in sequence {
            r.messenger().set_scores(msg, source_channel(), scores);
            r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();

            let wanted: HashSet<ChannelId> = spec
                .targets_for(&decide(&scores, 1))
                .into_iter()
                .collect();
            assert_eq!(targets(&r, msg).await, wanted, "{:?}", scores);
        }
    }

    #[tokio::test]
    async fn partial_failure_is_isolated_and_retried() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [3, 3, 0]);
        r.messenger().with(|s| s.fail_send_to.insert(target(0)));
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.created, vec![target(1)]);
        assert_eq!(report.failed, vec![target(0)]);
        assert_eq!(targets(&r, msg).await, [target(1)].into_iter().collect());

        r.messenger().with(|s| s.fail_send_to.clear());
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.created, vec![target(0)]);
        assert_eq!(targets(&r, msg).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_delete_keeps_entry_for_retry() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();

        r.messenger().set_scores(msg, source_channel(), [0, 0, 0]);
        r.messenger().with(|s| s.fail_delete = true);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.failed, vec![target(0)]);
        assert_eq!(targets(&r, msg).await.len(), 1);

        r.messenger().with(|s| s.fail_delete = false);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.deleted, vec![target(0)]);
        assert!(r.store().await.is_empty());
    }

    #[tokio::test]
    async fn already_absent_counts_as_deleted() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        let mirror = r.store().await.get(msg).unwrap()[&target(0)];

        r.messenger().with(|s| s.already_gone.insert(mirror));
        r.messenger().set_scores(msg, source_channel(), [1, 0, 0]);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.deleted, vec![target(0)]);
        assert!(report.failed.is_empty());
        assert!(r.store().await.is_empty());
    }

    #[tokio::test]
    async fn deleted_source_removes_mirrors() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 2, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();

        r.messenger().with(|s| s.messages.remove(&msg));
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(r.store().await.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_target_is_skipped() {
        let r = reconciler();
        let mut spec = spec();
        spec.scored[0].target_channel = None;
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [3, 3, 0]);
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.created, vec![target(1)]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_reactions_do_not_score() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [0, 0, 0]);
        r.messenger().with(|s| {
            let m = s.messages.get_mut(&msg).unwrap();
            m.reactions
                .push((ReactionKind::Standard("\u{1F525}".to_owned()), 50));
        });
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn fetch_failure_is_an_error() {
        let r = reconciler();
        let spec = spec();
        r.messenger().with(|s| s.unreachable.insert(source_channel()));
        assert!(r
            .reconcile(source_channel(), MessageId::new(1), &spec, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn concurrent_reconciles_of_one_message_are_serialized() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.messenger()
            .with(|s| s.send_delay = Some(Duration::from_millis(20)));

        let (a, b) = tokio::join!(
            r.reconcile(source_channel(), msg, &spec, 1),
            r.reconcile(source_channel(), msg, &spec, 1),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(r.messenger().sent_count(), 1);
        assert!(r.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn slow_send_times_out() {
        let r = Reconciler::new(FakeMessenger::default(), Duration::from_millis(20));
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.messenger()
            .with(|s| s.send_delay = Some(Duration::from_millis(500)));
        let report = r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        assert_eq!(report.failed, vec![target(0)]);
        assert!(r.store().await.is_empty());
    }

    #[tokio::test]
    async fn backlog_adopts_existing_mirrors() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.messenger().with(|s| {
            s.posted_mirrors.insert(
                target(0),
                vec![MirrorRef {
                    source_id: msg,
                    mirror_id: MessageId::new(77),
                }],
            )
        });

        let report = r.scan_backlog(&[source_channel()], &spec, 1, 50).await;
        assert_eq!(report.adopted, 1);
        assert_eq!(report.reconciled, 1);
        assert_eq!(r.messenger().sent_count(), 0);
        assert_eq!(
            r.store().await.get(msg).unwrap()[&target(0)],
            MessageId::new(77)
        );
    }

    #[tokio::test]
    async fn backlog_adoption_racing_reconcile_leaves_one_tracked_mirror() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);
        let existing = MessageId::new(77);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.messenger().with(|s| {
            s.posted_mirrors.insert(
                target(0),
                vec![MirrorRef {
                    source_id: msg,
                    mirror_id: existing,
                }],
            );
            s.send_delay = Some(Duration::from_millis(50));
        });

        let channels = [source_channel()];
        let (reconciled, _) = tokio::join!(
            r.reconcile(source_channel(), msg, &spec, 1),
            r.scan_backlog(&channels, &spec, 1, 50),
        );
        reconciled.unwrap();

        let tracked = r.store().await.get(msg).unwrap()[&target(0)];
        let live: HashSet<MessageId> = r.messenger().with(|s| {
            let deleted: HashSet<MessageId> = s.delete_calls.iter().map(|&(_, id)| id).collect();
            std::iter::once(existing)
                .chain(s.sent.iter().map(|&(_, id)| id))
                .filter(|id| !deleted.contains(id))
                .collect()
        });
        assert_eq!(live, [tracked].into_iter().collect());
        assert!(r.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn backlog_deletes_surplus_mirrors() {
        let r = reconciler();
        let spec = spec();
        let msg = MessageId::new(1);

        r.messenger().set_scores(msg, source_channel(), [2, 0, 0]);
        r.messenger().with(|s| {
            s.posted_mirrors.insert(
                target(0),
                vec![
                    MirrorRef {
                        source_id: msg,
                        mirror_id: MessageId::new(78),
                    },
                    MirrorRef {
                        source_id: msg,
                        mirror_id: MessageId::new(77),
                    },
                ],
            )
        });

        let report = r.scan_backlog(&[source_channel()], &spec, 1, 50).await;
        assert_eq!(report.adopted, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(r.messenger().sent_count(), 0);
        assert_eq!(
            r.messenger().with(|s| s.delete_calls.clone()),
            vec![(target(0), MessageId::new(77))]
        );
        assert_eq!(
            r.store().await.get(msg).unwrap()[&target(0)],
            MessageId::new(78)
        );
    }

    #[tokio::test]
    async fn backlog_skips_unreachable_channels() {
        let r = reconciler();
        let spec = spec();
        let other = ChannelId::new(6);

        r.messenger().set_scores(MessageId::new(1), source_channel(), [2, 0, 0]);
        r.messenger().set_scores(MessageId::new(2), other, [0, 3, 0]);
        r.messenger().with(|s| s.unreachable.insert(source_channel()));

        let report = r
            .scan_backlog(&[source_channel(), other], &spec, 1, 50)
            .await;
        assert_eq!(report.skipped_channels, vec![source_channel()]);
        assert_eq!(report.reconciled, 1);
        assert_eq!(
            targets(&r, MessageId::new(2)).await,
            [target(1)].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn persisted_mirrors_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirrors.json");
        let spec = spec();
        let msg = MessageId::new(1);

        let r = reconciler().with_persistence(SharedDocument::new(FileStore::new(path.clone())));
        r.messenger().set_scores(msg, source_channel(), [2, 2, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();

        let restarted =
            reconciler().with_persistence(SharedDocument::new(FileStore::new(path.clone())));
        assert_eq!(restarted.restore().await.unwrap(), 2);
        assert_eq!(targets(&restarted, msg).await, targets(&r, msg).await);

        r.messenger().set_scores(msg, source_channel(), [0, 0, 0]);
        r.reconcile(source_channel(), msg, &spec, 1).await.unwrap();
        let again = reconciler().with_persistence(SharedDocument::new(FileStore::new(path)));
        assert_eq!(again.restore().await.unwrap(), 0);
    }
}
