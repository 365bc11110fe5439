//! The inbox: ordered notifications, unread counter and pagination cursor.
//!
//! Everything that arrives (pushes, fetched pages, server counts, read
//! confirmations) goes through the methods here, so the reconciliation rules
//! live in exactly one place:
//!
//! - Items are unique by id and ordered by arrival, newest first. The
//!   creation timestamp never re-sorts anything.
//! - A page-1 refresh keeps pushed items the server has not listed yet (in
//!   front), then takes the server page in server order. For ids on both
//!   sides the server's fields win, except `is_read`, which is local OR server.
//! - The unread count is the unread items held here plus unread items the
//!   server reported that are not paged in (the off-screen remainder). It
//!   cannot go below zero.
//! - Mark-read is optimistic; every local flip is tracked until the server
//!   confirms it or the mutation is rolled back.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::item::Notification;
use crate::domain::foundation::NotificationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Pushed while `count_epoch` had this value.
    Pushed(u64),
    Fetched,
}

/// Identifies one optimistic read mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

/// What a read mutation targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    One(NotificationId),
    All,
}

/// Record of an optimistic read, needed to confirm or roll it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMutation {
    id: MutationId,
    target: ReadTarget,
    flipped: Vec<NotificationId>,
    cleared_offscreen: u32,
    count_epoch: u64,
}

impl ReadMutation {
    pub fn target(&self) -> &ReadTarget {
        &self.target
    }

    /// Ids this mutation switched from unread to read.
    pub fn flipped(&self) -> &[NotificationId] {
        &self.flipped
    }
}

/// What to do with an optimistic read when the server rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Put the flipped notifications back to unread.
    #[default]
    Rollback,
    /// Leave them read locally; the next refresh reconciles.
    KeepOptimistic,
}

/// Result of applying a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Duplicate,
}

/// Immutable copy of the inbox handed to observers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboxSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: u32,
    pub page: u32,
    pub has_more: bool,
}

/// The per-session inbox.
#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    origins: HashMap<NotificationId, Origin>,
    offscreen_unread: u32,
    page: u32,
    has_more: bool,
    pending_reads: HashMap<NotificationId, MutationId>,
    next_mutation: u64,
    count_epoch: u64,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.origins.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> u32 {
        self.visible_unread().saturating_add(self.offscreen_unread)
    }

    /// Last page applied; 0 before the first fetch.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Number of reads still awaiting server confirmation.
    pub fn pending_read_count(&self) -> usize {
        self.pending_reads.len()
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        InboxSnapshot {
            items: self.items.clone(),
            unread_count: self.unread_count(),
            page: self.page,
            has_more: self.has_more,
        }
    }

    /// Prepends a pushed notification unless its id is already present.
    pub fn apply_push(&mut self, notification: Notification) -> PushOutcome {
        if self.contains(&notification.id) {
            return PushOutcome::Duplicate;
        }
        self.origins
            .insert(notification.id.clone(), Origin::Pushed(self.count_epoch));
        self.items.insert(0, notification);
        PushOutcome::Inserted
    }

    /// Applies one page from the list endpoint.
    ///
    /// Page 1 is a full refresh; later pages append ids not yet present.
    pub fn apply_fetched_page(&mut self, page: u32, server_items: Vec<Notification>, total_pages: u32) {
        if page <= 1 {
            self.replace_first_page(server_items);
        } else {
            self.append_page(server_items);
        }
        self.page = page.max(1);
        self.has_more = self.page < total_pages;
    }

    /// Applies the server's unread count.
    ///
    /// Reads still in flight are assumed not yet applied server-side.
    pub fn apply_unread_count(&mut self, server_count: u32) {
        self.count_epoch += 1;
        let pending_visible = self
            .pending_reads
            .keys()
            .filter(|id| self.contains(id))
            .count() as u32;
        let local = self.visible_unread().saturating_add(pending_visible);
        self.offscreen_unread = server_count.saturating_sub(local);
    }

    /// Optimistically marks one notification read.
    ///
    /// Returns `None` (and changes nothing) when the id is unknown or the
    /// notification is already read.
    pub fn mark_read(&mut self, id: &NotificationId) -> Option<ReadMutation> {
        let item = self.items.iter_mut().find(|n| &n.id == id)?;
        if item.is_read {
            return None;
        }
        item.is_read = true;

        let mutation = self.next_mutation_id();
        self.pending_reads.insert(id.clone(), mutation);
        Some(ReadMutation {
            id: mutation,
            target: ReadTarget::One(id.clone()),
            flipped: vec![id.clone()],
            cleared_offscreen: 0,
            count_epoch: self.count_epoch,
        })
    }

    /// Optimistically marks everything read and zeroes the counter.
    ///
    /// Always returns a mutation; the server call is issued even when nothing
    /// was unread locally.
    pub fn mark_all_read(&mut self) -> ReadMutation {
        let mutation = self.next_mutation_id();
        let mut flipped = Vec::new();
        for item in self.items.iter_mut().filter(|n| !n.is_read) {
            item.is_read = true;
            flipped.push(item.id.clone());
        }
        for id in &flipped {
            self.pending_reads.insert(id.clone(), mutation);
        }
        let cleared_offscreen = std::mem::take(&mut self.offscreen_unread);

        ReadMutation {
            id: mutation,
            target: ReadTarget::All,
            flipped,
            cleared_offscreen,
            count_epoch: self.count_epoch,
        }
    }

    /// Records server confirmation of a read mutation.
    pub fn confirm(&mut self, mutation: &ReadMutation) {
        match mutation.target {
            // The server marked everything read, including older in-flight reads.
            ReadTarget::All => self.pending_reads.clear(),
            ReadTarget::One(ref id) => {
                if self.pending_reads.get(id) == Some(&mutation.id) {
                    self.pending_reads.remove(id);
                }
            }
        }
    }

    /// Reverts a failed read mutation.
    ///
    /// Only ids still pending under this mutation go back to unread; anything
    /// confirmed read in the meantime stays read. Returns how many items were
    /// reverted.
    pub fn rollback(&mut self, mutation: &ReadMutation) -> usize {
        let mut reverted = 0;
        for id in &mutation.flipped {
            if self.pending_reads.get(id) != Some(&mutation.id) {
                continue;
            }
            self.pending_reads.remove(id);
            if let Some(item) = self.items.iter_mut().find(|n| &n.id == id) {
                item.is_read = false;
                reverted += 1;
            }
        }
        if mutation.target == ReadTarget::All && mutation.count_epoch == self.count_epoch {
            self.offscreen_unread = self
                .offscreen_unread
                .saturating_add(mutation.cleared_offscreen);
        }
        reverted
    }

    /// Stops tracking a failed mutation without reverting it.
    pub fn abandon(&mut self, mutation: &ReadMutation) {
        for id in &mutation.flipped {
            if self.pending_reads.get(id) == Some(&mutation.id) {
                self.pending_reads.remove(id);
            }
        }
    }

    fn replace_first_page(&mut self, server_items: Vec<Notification>) {
        let mut server_ids = HashSet::new();
        let server_items: Vec<Notification> = server_items
            .into_iter()
            .filter(|n| server_ids.insert(n.id.clone()))
            .collect();

        let old_items = std::mem::take(&mut self.items);
        let old_origins = std::mem::take(&mut self.origins);

        let mut overlapping: HashMap<NotificationId, Notification> = HashMap::new();
        let mut kept = Vec::new();
        let mut returned_offscreen = 0u32;
        for item in old_items {
            if server_ids.contains(&item.id) {
                overlapping.insert(item.id.clone(), item);
            } else if let Some(&Origin::Pushed(epoch)) = old_origins.get(&item.id) {
                kept.push((item, epoch));
            } else if !item.is_read {
                // Fetched earlier but not on page 1 any more.
                returned_offscreen += 1;
            }
        }

        for (item, epoch) in kept {
            self.origins.insert(item.id.clone(), Origin::Pushed(epoch));
            self.items.push(item);
        }

        let mut consumed = 0u32;
        for mut item in server_items {
            if item.is_read {
                self.pending_reads.remove(&item.id);
            }
            if let Some(local) = overlapping.get(&item.id) {
                item.is_read |= local.is_read;
            }
            // A server count taken after a push already left that item out
            // of the off-screen remainder.
            let in_remainder = match old_origins.get(&item.id) {
                None => true,
                Some(Origin::Pushed(epoch)) => *epoch == self.count_epoch,
                Some(Origin::Fetched) => false,
            };
            if in_remainder && !item.is_read {
                consumed += 1;
            }
            self.origins.insert(item.id.clone(), Origin::Fetched);
            self.items.push(item);
        }

        self.offscreen_unread = self
            .offscreen_unread
            .saturating_add(returned_offscreen)
            .saturating_sub(consumed);
    }

    fn append_page(&mut self, server_items: Vec<Notification>) {
        let mut consumed = 0u32;
        for item in server_items {
            if item.is_read {
                self.pending_reads.remove(&item.id);
            }
            if let Some(local) = self.items.iter_mut().find(|n| n.id == item.id) {
                local.is_read |= item.is_read;
                continue;
            }
            if !item.is_read {
                consumed += 1;
            }
            self.origins.insert(item.id.clone(), Origin::Fetched);
            self.items.push(item);
        }
        self.offscreen_unread = self.offscreen_unread.saturating_sub(consumed);
    }

    fn visible_unread(&self) -> u32 {
        self.items.iter().filter(|n| !n.is_read).count() as u32
    }

    fn next_mutation_id(&mut self) -> MutationId {
        self.next_mutation += 1;
        MutationId(self.next_mutation)
    }
}
